// Copyright 2025 Meta-Hybrid Mount Authors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::{fs::read_link, os::unix::fs::symlink, path::Path};

use anyhow::Result;

use crate::utils::{lgetfilecon, lsetfilecon};

/// Clones a symlink into the work tmpfs: reads `src`'s target, recreates it
/// at `dst`, and copies its SELinux context.
pub fn clone_symlink<P: AsRef<Path>>(src: P, dst: P) -> Result<()> {
    let target = read_link(src.as_ref())?;
    symlink(&target, dst.as_ref())?;
    lsetfilecon(dst.as_ref(), lgetfilecon(src.as_ref())?.as_str())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_symlink_target() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src_link");
        symlink("../xbin/foo", &src).unwrap();
        let dst = tmp.path().join("dst_link");

        clone_symlink(&src, &dst).unwrap();

        assert_eq!(read_link(&dst).unwrap(), Path::new("../xbin/foo"));
    }
}
