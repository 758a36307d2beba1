// Copyright 2025 Meta-Hybrid Mount Authors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE_DEFAULT: &str = "/data/adb/meta-hybrid/config.toml";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_moduledir")]
    pub moduledir: PathBuf,
    #[serde(default = "default_mountsource")]
    pub mountsource: String,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default, deserialize_with = "deserialize_partitions_flexible")]
    pub partitions: Vec<String>,
    #[serde(default)]
    pub disable_umount: bool,
}

fn default_moduledir() -> PathBuf {
    PathBuf::from("/data/adb/modules/")
}

fn default_mountsource() -> String {
    String::from("KSU")
}

fn deserialize_partitions_flexible<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrVec {
        String(String),
        Vec(Vec<String>),
    }

    match StringOrVec::deserialize(deserializer)? {
        StringOrVec::Vec(v) => Ok(v),
        StringOrVec::String(s) => Ok(s
            .split(',')
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect()),
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            moduledir: default_moduledir(),
            mountsource: default_mountsource(),
            verbose: false,
            partitions: Vec::new(),
            disable_umount: false,
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).context("failed to read config file")?;
        let config: Config = toml::from_str(&content).context("failed to parse config file")?;
        Ok(config)
    }

    pub fn load_default() -> Result<Self> {
        Self::from_file(CONFIG_FILE_DEFAULT)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).context("failed to serialize config")?;
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent).context("failed to create config directory")?;
        }
        fs::write(path.as_ref(), content).context("failed to write config file")?;
        Ok(())
    }

    /// CLI overrides always win over whatever was loaded from the file.
    pub fn merge_with_cli(&mut self, overrides: &crate::conf::cli::ConfigOverrides) {
        if let Some(dir) = &overrides.moduledir {
            self.moduledir = dir.clone();
        }
        if let Some(source) = &overrides.mountsource {
            self.mountsource = source.clone();
        }
        if overrides.verbose {
            self.verbose = true;
        }
        if !overrides.partitions.is_empty() {
            self.partitions = overrides.partitions.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partitions_accept_comma_separated_string() {
        let toml = "partitions = \"a, b ,c\"\n";
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.partitions, vec!["a", "b", "c"]);
    }

    #[test]
    fn defaults_apply_to_empty_file() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.mountsource, "KSU");
        assert_eq!(config.moduledir, PathBuf::from("/data/adb/modules/"));
        assert!(!config.disable_umount);
    }

    #[test]
    fn round_trips_through_toml() {
        let config = Config::default();
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        config.save_to_file(&path).unwrap();
        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.mountsource, config.mountsource);
    }
}
