// Copyright 2025 Meta-Hybrid Mount Authors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Sets up the top-level work tmpfs, drives the executor, and tears down
//! the scaffold.

use std::path::Path;

use anyhow::{Context, Result};
use rustix::mount::{MountFlags, MountPropagationFlags, UnmountFlags, mount, mount_change, unmount};

use crate::{
    defs::SCAFFOLD_WORKDIR_NAME,
    mount::{collector, context::MountContext, executor::do_magic},
    utils::ensure_dir_exists,
};

/// Runs one full overlay assembly pass: collects modules under
/// `module_dir`, mounts a scaffold tmpfs under `tmp_root`, executes
/// `do_magic` against it, tears the scaffold down, and returns the
/// populated `ctx`'s outcome via the caller-owned context.
pub fn run(tmp_root: &Path, module_dir: &Path, mount_source: &str, ctx: &mut MountContext) -> Result<()> {
    let Some(mut root) = collector::collect(module_dir, ctx)? else {
        log::info!("no module contributed any file, nothing to mount");
        return Ok(());
    };

    let workdir = tmp_root.join(SCAFFOLD_WORKDIR_NAME);
    ensure_dir_exists(&workdir).context("failed to create scaffold workdir")?;

    mount(mount_source, &workdir, "tmpfs", MountFlags::empty(), None::<&std::ffi::CStr>).context("failed to mount scaffold tmpfs")?;
    mount_change(&workdir, MountPropagationFlags::REC | MountPropagationFlags::PRIVATE).context("failed to privatize scaffold tmpfs")?;

    ctx.notifier.acquire().context("failed to acquire kernel-module notification handle")?;

    let result = do_magic(Path::new("/"), &workdir, &mut root, false, ctx);

    let _ = unmount(&workdir, UnmountFlags::DETACH);
    std::fs::remove_dir(&workdir).ok();

    log::info!(
        "magic mount finished: {} modules, {} nodes ({} mounted, {} skipped, {} whiteout, {} failed)",
        ctx.stats.modules_total,
        ctx.stats.nodes_total,
        ctx.stats.nodes_mounted,
        ctx.stats.nodes_skipped,
        ctx.stats.nodes_whiteout,
        ctx.stats.nodes_fail,
    );
    if !ctx.failed_modules().is_empty() {
        log::warn!("modules with at least one failure: {:?}", ctx.failed_modules());
    }

    result
}
