// Copyright 2025 Meta-Hybrid Mount Authors
// SPDX-License-Identifier: GPL-3.0-or-later

pub const DISABLE_FILE_NAME: &str = "disable";
pub const REMOVE_FILE_NAME: &str = "remove";
pub const SKIP_MOUNT_FILE_NAME: &str = "skip_mount";
pub const MODULE_PROP_FILE_NAME: &str = "module.prop";

/// Built-in top-level partitions eligible for promotion out of `system`.
/// `vendor`/`system_ext`/`product` additionally require `/system/<name>` to
/// be a symlink; `odm` does not.
pub const SYMLINK_GATED_PARTITIONS: &[&str] = &["vendor", "system_ext", "product"];
pub const UNGATED_BUILTIN_PARTITIONS: &[&str] = &["odm"];

pub const REPLACE_DIR_FILE_NAME: &str = ".replace";
pub const REPLACE_DIR_XATTR: &str = "trusted.overlay.opaque";
pub const TMPFS_CANDIDATES: &[&str] = &["/debug_ramdisk", "/patch_hw", "/oem", "/root", "/sbin"];
pub const SCAFFOLD_WORKDIR_NAME: &str = "workdir";
