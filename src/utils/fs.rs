// Copyright 2025 Meta-Hybrid Mount Authors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Path utilities: directory scaffolding, module id validation, and
//! SELinux context get/set.

use std::{
    fs::{create_dir_all, remove_dir_all},
    path::Path,
};

use anyhow::{Context, Result, bail};
#[cfg(any(target_os = "linux", target_os = "android"))]
use extattr::{Flags as XattrFlags, lgetxattr, llistxattr, lsetxattr};

use crate::defs::TMPFS_CANDIDATES;

const SELINUX_XATTR: &str = "security.selinux";
pub const OVERLAY_OPAQUE_XATTR: &str = "trusted.overlay.opaque";
const CONTEXT_SYSTEM: &str = "u:object_r:system_file:s0";

pub fn ensure_dir_exists<P: AsRef<Path>>(dir: P) -> Result<()> {
    if !dir.as_ref().exists() {
        create_dir_all(&dir)
            .with_context(|| format!("failed to create directory {}", dir.as_ref().display()))?;
    }
    Ok(())
}

pub fn ensure_temp_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        remove_dir_all(dir).ok();
    }
    create_dir_all(dir).with_context(|| format!("failed to create temp dir {}", dir.display()))
}

pub fn cleanup_temp_dir(dir: &Path) {
    if let Err(e) = remove_dir_all(dir) {
        log::warn!("failed to clean up temp dir {}: {e:#}", dir.display());
    }
}

/// Picks the first candidate mount point from `TMPFS_CANDIDATES` that exists
/// as a directory on this device, to host the scaffold tmpfs.
pub fn select_temp_dir() -> Result<std::path::PathBuf> {
    for candidate in TMPFS_CANDIDATES {
        let path = Path::new(candidate);
        if path.is_dir() {
            return Ok(path.to_path_buf());
        }
    }
    bail!("no usable tmpfs mount point found among candidates {TMPFS_CANDIDATES:?}")
}

/// Matches `^[a-zA-Z][a-zA-Z0-9._-]+$` without pulling in a regex engine.
pub fn validate_module_id(module_id: &str) -> Result<()> {
    let mut chars = module_id.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => chars
            .clone()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')),
        _ => false,
    };
    if valid && chars.count() >= 1 {
        Ok(())
    } else {
        bail!("invalid module id: {module_id}")
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
pub fn lgetfilecon<P: AsRef<Path>>(path: P) -> Result<String> {
    let con = lgetxattr(path.as_ref(), SELINUX_XATTR)
        .with_context(|| format!("failed to get SELinux context for {}", path.as_ref().display()))?;
    Ok(String::from_utf8_lossy(&con).trim_matches('\0').to_string())
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
pub fn lgetfilecon<P: AsRef<Path>>(_path: P) -> Result<String> {
    Ok(String::new())
}

pub fn lsetfilecon<P: AsRef<Path>>(path: P, con: &str) -> Result<()> {
    #[cfg(any(target_os = "linux", target_os = "android"))]
    {
        if let Err(e) = lsetxattr(path.as_ref(), SELINUX_XATTR, con.as_bytes(), XattrFlags::empty()) {
            log::debug!("failed to set SELinux context on {}: {e}", path.as_ref().display());
        }
    }
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    {
        let _ = (path, con);
    }
    Ok(())
}

/// Copies SELinux context and `trusted.overlay.*` xattrs (excluding the
/// opaque marker itself) from `src` to `dst`.
pub fn copy_extended_attributes(src: &Path, dst: &Path) -> Result<()> {
    #[cfg(any(target_os = "linux", target_os = "android"))]
    {
        if let Ok(mut ctx) = lgetfilecon(src) {
            if ctx.contains("u:object_r:rootfs:s0") {
                ctx = CONTEXT_SYSTEM.to_string();
            }
            lsetfilecon(dst, &ctx)?;
        } else {
            lsetfilecon(dst, CONTEXT_SYSTEM)?;
        }

        if let Ok(xattrs) = llistxattr(src) {
            for name in xattrs {
                let name_str = name.to_string_lossy();
                if name_str.starts_with("trusted.overlay.") && name_str != OVERLAY_OPAQUE_XATTR
                    && let Ok(val) = lgetxattr(src, &name)
                {
                    let _ = lsetxattr(dst, &name, &val, XattrFlags::empty());
                }
            }
        }
    }
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    {
        let _ = (src, dst);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_module_id_rejects_bad_ids() {
        assert!(validate_module_id("my_module-1.0").is_ok());
        assert!(validate_module_id("1bad").is_err());
        assert!(validate_module_id("").is_err());
    }

    #[test]
    fn ensure_dir_exists_creates_nested_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("a/b/c");
        ensure_dir_exists(&nested).unwrap();
        assert!(nested.is_dir());
    }
}
