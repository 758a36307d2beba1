// Copyright 2025 Meta-Hybrid Mount Authors
// SPDX-License-Identifier: GPL-3.0-or-later

//! The recursive planner/executor that walks the unified Node tree and
//! applies a per-node mount strategy: `do_magic`.

use std::{fs, os::unix::fs::MetadataExt, path::Path};

use anyhow::{Context, Error, Result};
use rustix::{
    fs::{Gid, Mode, Uid, chmod, chown},
    mount::{MountFlags, MountPropagationFlags, mount_bind, mount_change, mount_move, mount_remount},
};

use crate::{
    mount::{context::MountContext, mirror::mirror_entry, node::{Node, NodeKind}, symlink::clone_symlink},
    notify::should_notify,
    utils::{copy_extended_attributes, ensure_dir_exists},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountErrorKind {
    Path,
    Enumeration,
    Mount,
    Allocation,
}

impl std::fmt::Display for MountErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Path => "path error",
            Self::Enumeration => "enumeration error",
            Self::Mount => "mount error",
            Self::Allocation => "allocation error",
        };
        write!(f, "{s}")
    }
}

impl std::error::Error for MountErrorKind {}

fn fatal(kind: MountErrorKind, msg: String) -> Error {
    Error::new(kind).context(msg)
}

/// Applies `node` into the live namespace under `live_path`, with
/// `work_path` the corresponding path inside the scaffold tmpfs.
/// `parent_uses_tmpfs` indicates whether the parent directory has been (or
/// will be) materialized as a fresh tmpfs directory to be moved into place.
pub fn do_magic(live_path: &Path, work_path: &Path, node: &mut Node, parent_uses_tmpfs: bool, ctx: &mut MountContext) -> Result<()> {
    ctx.stats.nodes_total += 1;

    match node.kind {
        NodeKind::Regular => handle_regular(live_path, work_path, node, parent_uses_tmpfs, ctx),
        NodeKind::Symlink => handle_symlink(work_path, node, ctx),
        NodeKind::Whiteout => {
            log::debug!("file {} is removed", live_path.display());
            ctx.stats.nodes_whiteout += 1;
            Ok(())
        }
        NodeKind::Directory => handle_directory(live_path, work_path, node, parent_uses_tmpfs, ctx),
    }
}

/// Records a child's failure at the point its parent observes it: increments
/// `nodes_fail` and attributes the failure to the child's own module if it
/// has one, else to the parent directory's. Under `now_tmp` the failure
/// aborts the whole subtree (the scaffold must be consistent before it's
/// moved); otherwise it's tolerated and the caller keeps iterating.
fn observe_child_failure(err: Error, child_module_name: Option<&str>, parent: &Node, now_tmp: bool, child_live: &Path, ctx: &mut MountContext) -> Result<()> {
    ctx.stats.nodes_fail += 1;
    if let Some(name) = child_module_name.or(parent.module_name.as_deref()) {
        ctx.mark_module_failed(name);
    }

    if now_tmp {
        return Err(err);
    }
    log::warn!("child {} failed, tolerating: {err:#}", child_live.display());
    Ok(())
}

fn notify_if_live(path: &Path, ctx: &mut MountContext) {
    if should_notify(path) {
        let _ = ctx.notifier.notify(path);
    }
}

fn handle_regular(live_path: &Path, work_path: &Path, node: &Node, parent_uses_tmpfs: bool, ctx: &mut MountContext) -> Result<()> {
    let Some(module_path) = &node.module_path else {
        return Err(fatal(MountErrorKind::Path, format!("cannot mount root file {}", live_path.display())));
    };

    let target_path = if parent_uses_tmpfs {
        fs::File::create(work_path).context(MountErrorKind::Path)?;
        work_path
    } else {
        live_path
    };

    mount_bind(module_path, target_path)
        .with_context(|| format!("mount module file {} -> {}", module_path.display(), target_path.display()))
        .context(MountErrorKind::Mount)?;

    if let Err(e) = mount_remount(target_path, MountFlags::RDONLY | MountFlags::BIND, "") {
        log::warn!("failed to make {} read-only: {e:#}", target_path.display());
    }

    notify_if_live(target_path, ctx);
    ctx.stats.nodes_mounted += 1;
    Ok(())
}

fn handle_symlink(work_path: &Path, node: &Node, ctx: &mut MountContext) -> Result<()> {
    let Some(module_path) = &node.module_path else {
        return Err(fatal(MountErrorKind::Path, format!("cannot mount root symlink {}", work_path.display())));
    };

    clone_symlink(module_path, work_path).context(MountErrorKind::Mount)?;
    ctx.stats.nodes_mounted += 1;
    Ok(())
}

/// A child demands tmpfs iff a targeted per-file bind on the live directory
/// cannot satisfy it (§4.2 step 3).
fn child_demands_tmpfs(live_path: &Path, child: &Node) -> bool {
    match child.kind {
        NodeKind::Symlink => true,
        NodeKind::Whiteout => live_path.join(&child.name).exists(),
        NodeKind::Regular | NodeKind::Directory => match live_path.join(&child.name).symlink_metadata() {
            Ok(metadata) => {
                let Some(live_kind) = NodeKind::from_file_type(metadata.file_type()) else {
                    return true;
                };
                live_kind != child.kind || live_kind == NodeKind::Symlink
            }
            Err(_) => true,
        },
    }
}

fn metadata_source<'a>(live_path: &'a Path, node: &'a Node) -> Result<(fs::Metadata, &'a Path)> {
    if live_path.exists() {
        Ok((live_path.metadata()?, live_path))
    } else if let Some(module_path) = &node.module_path {
        Ok((module_path.metadata()?, module_path.as_path()))
    } else {
        Err(fatal(MountErrorKind::Path, format!("no metadata source for directory {}", live_path.display())))
    }
}

fn handle_directory(live_path: &Path, work_path: &Path, node: &mut Node, parent_uses_tmpfs: bool, ctx: &mut MountContext) -> Result<()> {
    let has_tmpfs = parent_uses_tmpfs;
    let mut create_tmp = !has_tmpfs && node.replace && node.module_path.is_some();

    if !has_tmpfs && !create_tmp {
        for child in &mut node.children {
            if !child_demands_tmpfs(live_path, child) {
                continue;
            }
            if child.module_path.is_none() {
                child.skip = true;
                ctx.stats.nodes_skipped += 1;
                continue;
            }
            create_tmp = true;
            break;
        }
    }

    let now_tmp = has_tmpfs || create_tmp;

    if now_tmp {
        ensure_dir_exists(work_path)?;
        let (metadata, source) = metadata_source(live_path, node)?;
        chmod(work_path, Mode::from_raw_mode(metadata.mode())).context(MountErrorKind::Mount)?;
        chown(work_path, Some(Uid::from_raw(metadata.uid())), Some(Gid::from_raw(metadata.gid()))).context(MountErrorKind::Mount)?;
        copy_extended_attributes(source, work_path)?;
    }

    if create_tmp {
        mount_bind(work_path, work_path).context(MountErrorKind::Mount)?;
    }

    if live_path.exists() && !node.replace {
        let entries: Result<Vec<_>, _> = live_path.read_dir().context(MountErrorKind::Enumeration)?.collect();
        match entries {
            Ok(entries) => {
                for entry in entries {
                    let name = entry.file_name().to_string_lossy().to_string();
                    if let Some(idx) = node.child_index(&name) {
                        if node.children[idx].skip {
                            continue;
                        }
                        node.children[idx].done = true;
                        let mut child = std::mem::replace(&mut node.children[idx], Node::new_root(String::new()));
                        let child_live = live_path.join(&name);
                        let child_work = work_path.join(&name);
                        let result = do_magic(&child_live, &child_work, &mut child, now_tmp, ctx);
                        let child_module_name = child.module_name.clone();
                        node.children[idx] = child;
                        if let Err(e) = result {
                            observe_child_failure(e, child_module_name.as_deref(), node, now_tmp, &child_live, ctx)?;
                        }
                    } else if now_tmp {
                        mirror_entry(live_path, work_path, &entry).context(MountErrorKind::Mount)?;
                    }
                }
            }
            Err(e) => {
                if now_tmp {
                    return Err(e);
                }
                log::warn!("failed to enumerate live directory {}: {e:#}", live_path.display());
            }
        }
    }

    for idx in 0..node.children.len() {
        if node.children[idx].done || node.children[idx].skip {
            continue;
        }
        let mut child = std::mem::replace(&mut node.children[idx], Node::new_root(String::new()));
        let child_live = live_path.join(&child.name);
        let child_work = work_path.join(&child.name);
        let result = do_magic(&child_live, &child_work, &mut child, now_tmp, ctx);
        let child_module_name = child.module_name.clone();
        node.children[idx] = child;
        if let Err(e) = result {
            observe_child_failure(e, child_module_name.as_deref(), node, now_tmp, &child_live, ctx)?;
        }
    }

    if create_tmp {
        if let Err(e) = mount_remount(work_path, MountFlags::RDONLY | MountFlags::BIND, "") {
            log::warn!("failed to make {} read-only: {e:#}", work_path.display());
        }
        mount_move(work_path, live_path).context(MountErrorKind::Mount)?;
        mount_change(live_path, MountPropagationFlags::REC | MountPropagationFlags::PRIVATE).context(MountErrorKind::Mount)?;
        notify_if_live(live_path, ctx);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn whiteout_is_counted_without_side_effects() {
        use crate::notify::NullNotifier;

        let mut notifier = NullNotifier;
        let mut ctx = MountContext::new(vec![], &mut notifier);
        let mut node = Node {
            name: "badfile".into(),
            kind: NodeKind::Whiteout,
            children: Vec::new(),
            module_path: Some(PathBuf::from("/dev/null")),
            module_name: Some("A".into()),
            replace: false,
            skip: false,
            done: false,
        };

        do_magic(Path::new("/etc/badfile"), Path::new("/tmp/work/badfile"), &mut node, false, &mut ctx).unwrap();

        assert_eq!(ctx.stats.nodes_whiteout, 1);
        assert_eq!(ctx.stats.nodes_fail, 0);
    }

    #[test]
    fn regular_file_without_module_path_is_fatal() {
        use crate::notify::NullNotifier;

        let mut notifier = NullNotifier;
        let mut ctx = MountContext::new(vec![], &mut notifier);
        let mut node = Node::new_root("structural");
        node.kind = NodeKind::Regular;

        let err = do_magic(Path::new("/x"), Path::new("/work/x"), &mut node, false, &mut ctx).unwrap_err();
        assert!(err.downcast_ref::<MountErrorKind>().is_some() || err.chain().any(|c| c.to_string().contains("cannot mount")));
        // Nothing observed this failure as a child yet (it's a bare call, no
        // enclosing directory), so the counter stays untouched here; it's the
        // parent's enumeration loop that attributes and counts it.
        assert_eq!(ctx.stats.nodes_fail, 0);
    }

    #[test]
    fn observe_child_failure_aborts_under_tmpfs_and_attributes_to_child() {
        use crate::notify::NullNotifier;

        let mut notifier = NullNotifier;
        let mut ctx = MountContext::new(vec![], &mut notifier);
        let parent = Node::new_root("parent");
        let err = anyhow::anyhow!("boom");

        let result = observe_child_failure(err, Some("child-module"), &parent, true, Path::new("/x/y"), &mut ctx);

        assert!(result.is_err());
        assert_eq!(ctx.stats.nodes_fail, 1);
        assert_eq!(ctx.failed_modules(), ["child-module"]);
    }

    #[test]
    fn observe_child_failure_is_tolerated_without_tmpfs_and_falls_back_to_parent_module() {
        use crate::notify::NullNotifier;

        let mut notifier = NullNotifier;
        let mut ctx = MountContext::new(vec![], &mut notifier);
        let mut parent = Node::new_root("parent");
        parent.module_name = Some("parent-module".into());
        let err = anyhow::anyhow!("boom");

        // The failing child had no module of its own (a structural node),
        // so attribution falls back to the parent directory's module.
        let result = observe_child_failure(err, None, &parent, false, Path::new("/x/y"), &mut ctx);

        assert!(result.is_ok());
        assert_eq!(ctx.stats.nodes_fail, 1);
        assert_eq!(ctx.failed_modules(), ["parent-module"]);
    }
}
