// Copyright 2025 Meta-Hybrid Mount Authors
// SPDX-License-Identifier: GPL-3.0-or-later

pub mod fs;
pub mod log;

pub use fs::{
    cleanup_temp_dir, copy_extended_attributes, ensure_dir_exists, ensure_temp_dir, lgetfilecon,
    lsetfilecon, select_temp_dir, validate_module_id,
};
