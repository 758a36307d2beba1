// Copyright 2025 Meta-Hybrid Mount Authors
// SPDX-License-Identifier: GPL-3.0-or-later

pub mod collector;
pub mod context;
pub mod executor;
pub mod mirror;
pub mod node;
pub mod orchestrator;
pub mod scan;
pub mod symlink;
