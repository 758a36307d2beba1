// Copyright 2025 Meta-Hybrid Mount Authors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Diagnostic module listing for the `scan` CLI subcommand. Never touches
//! the mount namespace.

use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use serde::Serialize;

use crate::defs::{DISABLE_FILE_NAME, MODULE_PROP_FILE_NAME, REMOVE_FILE_NAME, SKIP_MOUNT_FILE_NAME};

#[derive(Serialize)]
pub struct ModuleInfo {
    pub id: String,
    pub name: String,
    pub version: String,
    pub description: String,
    pub disabled: bool,
    pub skip: bool,
}

fn read_prop(path: &Path, key: &str) -> Option<String> {
    let file = File::open(path).ok()?;
    for line in BufReader::new(file).lines().map_while(Result::ok) {
        if line.starts_with(key)
            && let Some((_, value)) = line.split_once('=')
        {
            return Some(value.trim().to_string());
        }
    }
    None
}

pub fn scan_modules<P: AsRef<Path>>(module_dir: P) -> Vec<ModuleInfo> {
    let mut modules = Vec::new();

    if let Ok(entries) = module_dir.as_ref().read_dir() {
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let prop_path = path.join(MODULE_PROP_FILE_NAME);
            if !prop_path.exists() {
                continue;
            }

            let id = entry.file_name().to_string_lossy().to_string();
            let name = read_prop(&prop_path, "name").unwrap_or_else(|| id.clone());
            let version = read_prop(&prop_path, "version").unwrap_or_default();
            let description = read_prop(&prop_path, "description").unwrap_or_default();

            let disabled = path.join(DISABLE_FILE_NAME).exists() || path.join(REMOVE_FILE_NAME).exists();
            let skip = path.join(SKIP_MOUNT_FILE_NAME).exists();

            modules.push(ModuleInfo { id, name, version, description, disabled, skip });
        }
    }

    modules.sort_by(|a, b| a.id.cmp(&b.id));
    modules
}

#[cfg(test)]
mod tests {
    use std::fs::{create_dir_all, write};

    use super::*;

    #[test]
    fn scan_reports_disabled_and_enabled_modules() {
        let tmp = tempfile::tempdir().unwrap();
        let module_dir = tmp.path();

        create_dir_all(module_dir.join("A")).unwrap();
        write(module_dir.join("A/module.prop"), "id=A\nname=Module A\nversion=1.0\n").unwrap();

        create_dir_all(module_dir.join("B")).unwrap();
        write(module_dir.join("B/module.prop"), "id=B\nname=Module B\n").unwrap();
        write(module_dir.join("B/disable"), "").unwrap();

        let modules = scan_modules(module_dir);
        assert_eq!(modules.len(), 2);
        assert_eq!(modules[0].id, "A");
        assert!(!modules[0].disabled);
        assert_eq!(modules[1].id, "B");
        assert!(modules[1].disabled);
    }
}
