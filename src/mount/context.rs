// Copyright 2025 Meta-Hybrid Mount Authors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Execution bookkeeping threaded through the Collector, Executor, and
//! Orchestrator by unique reference, replacing process-wide statics.

use std::collections::HashSet;

use crate::notify::Notifier;

#[derive(Debug, Default, Clone, Copy)]
pub struct MountStats {
    pub modules_total: u32,
    pub nodes_total: u32,
    pub nodes_mounted: u32,
    pub nodes_skipped: u32,
    pub nodes_whiteout: u32,
    pub nodes_fail: u32,
}

pub struct MountContext<'a> {
    pub stats: MountStats,
    /// Insertion-ordered, deduplicated by linear scan: expected small n.
    failed_modules: Vec<String>,
    pub extra_parts: Vec<String>,
    pub notifier: &'a mut dyn Notifier,
}

impl<'a> MountContext<'a> {
    pub fn new(extra_parts: Vec<String>, notifier: &'a mut dyn Notifier) -> Self {
        Self {
            stats: MountStats::default(),
            failed_modules: Vec::new(),
            extra_parts,
            notifier,
        }
    }

    pub fn mark_module_failed(&mut self, module_name: &str) {
        if !self.failed_modules.iter().any(|m| m == module_name) {
            self.failed_modules.push(module_name.to_string());
        }
    }

    pub fn failed_modules(&self) -> &[String] {
        &self.failed_modules
    }

    pub fn failed_modules_set(&self) -> HashSet<String> {
        self.failed_modules.iter().cloned().collect()
    }

    pub fn ok(&self) -> bool {
        self.failed_modules.is_empty() && self.stats.nodes_fail == 0
    }
}
