// Copyright 2025 Meta-Hybrid Mount Authors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Walks each enabled module's `system/` tree and unifies them into one
//! virtual tree rooted at `/`, promoting known top-level partitions out of
//! `system/`.

use std::path::Path;

use anyhow::Result;

use crate::{
    defs::{DISABLE_FILE_NAME, REMOVE_FILE_NAME, SKIP_MOUNT_FILE_NAME, SYMLINK_GATED_PARTITIONS, UNGATED_BUILTIN_PARTITIONS},
    mount::{
        context::MountContext,
        node::{Node, NodeKind},
    },
    utils::validate_module_id,
};

const BUILTIN_CHECKS: [(&str, bool); 4] =
    [("vendor", true), ("system_ext", true), ("product", true), ("odm", false)];

/// Recursively populates `container`'s children from the on-disk contents of
/// `dir`, attributing every entry to `module_name`. `container` is assumed
/// freshly created (no pre-existing children), so no conflict handling is
/// needed here — that only arises once trees from different modules merge.
/// Returns whether this subtree has any content.
fn collect_into(container: &mut Node, module_name: &str, dir: &Path) -> Result<bool> {
    let mut has_content = false;

    let Ok(entries) = dir.read_dir() else {
        return Ok(false);
    };
    let mut entries: Vec<_> = entries.flatten().collect();
    entries.sort_by_key(std::fs::DirEntry::file_name);

    for entry in entries {
        let Some(mut node) = Node::from_module_entry(module_name, &entry) else {
            continue;
        };

        if node.kind == NodeKind::Directory {
            let sub_has_content = collect_into(&mut node, module_name, &entry.path())?;
            has_content |= sub_has_content || node.replace;
        } else {
            has_content = true;
        }

        container.push_child(node);
    }

    Ok(has_content)
}

/// Builds one module's contribution as the `system` node. Partition
/// subtrees (builtin or configured-extra) are never collected separately:
/// a module that ships `system/vendor/lib/libfoo.so` simply gets a
/// `vendor` child under `system` from the ordinary recursive walk, and
/// `collect` lifts it out to root afterwards if it qualifies for
/// promotion. Modules do not contribute directly at their own root.
fn process_module(module_name: &str, module_path: &Path) -> Result<(Node, bool)> {
    let mut system = Node::new_root("system");
    let contributes = collect_into(&mut system, module_name, &module_path.join("system"))?;
    Ok((system, contributes))
}

/// First-writer-wins merge of `low` into `high`. `high`'s own identity
/// (type, module source, replace flag) is kept if already set; otherwise it
/// adopts `low`'s. Children are unioned, recursing when both sides have an
/// entry of the same name — only a genuine leaf-vs-leaf conflict (both
/// sides already own an identity) drops a contribution, and that drop is
/// logged.
fn merge_into(mut high: Node, low: Node) -> Node {
    if high.module_path.is_none() && low.module_path.is_some() {
        high.module_path = low.module_path.clone();
        high.module_name = low.module_name.clone();
        high.kind = low.kind.clone();
        high.replace = low.replace;
    } else if high.module_path.is_some() && low.module_path.is_some() {
        log::debug!(
            "module {:?} contribution to {} shadowed by earlier module {:?}",
            low.module_name,
            high.name,
            high.module_name
        );
    }

    for low_child in low.children {
        match high.child_index(&low_child.name) {
            Some(idx) => {
                let existing = std::mem::replace(&mut high.children[idx], Node::new_root(String::new()));
                high.children[idx] = merge_into(existing, low_child);
            }
            None => high.push_child(low_child),
        }
    }

    high
}

/// Scans `module_root` for enabled modules and returns the unified tree
/// rooted at `/`, or `None` if no module contributed anything. The extra
/// partitions to promote are read from `ctx.extra_parts`.
pub fn collect(module_root: &Path, ctx: &mut MountContext) -> Result<Option<Node>> {
    let extra_partitions = ctx.extra_parts.clone();
    let mut final_system: Option<Node> = None;

    let mut dirs: Vec<_> = module_root.read_dir().map(|it| it.flatten().collect()).unwrap_or_default();
    dirs.sort_by_key(std::fs::DirEntry::file_name);

    for entry in dirs {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let Some(module_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };

        if path.join(DISABLE_FILE_NAME).exists() || path.join(REMOVE_FILE_NAME).exists() || path.join(SKIP_MOUNT_FILE_NAME).exists() {
            log::debug!("module {module_name} disabled, skipping");
            continue;
        }
        if let Err(e) = validate_module_id(module_name) {
            log::warn!("skipping invalid module id {module_name}: {e:#}");
            continue;
        }
        if !path.join("system").is_dir() {
            continue;
        }

        let (system_tree, contributes) = process_module(module_name, &path)?;
        if !contributes {
            continue;
        }

        ctx.stats.modules_total += 1;
        final_system = Some(match final_system {
            Some(high) => merge_into(high, system_tree),
            None => system_tree,
        });
    }

    let Some(mut final_system) = final_system else {
        return Ok(None);
    };

    let mut root = Node::new_root("");

    for (name, require_symlink) in BUILTIN_CHECKS {
        let path_of_root = Path::new("/").join(name);
        let path_of_system = Path::new("/system").join(name);
        if path_of_root.is_dir()
            && (!require_symlink || path_of_system.is_symlink())
            && let Some(node) = final_system.take_child(name)
        {
            root.push_child(node);
        }
    }

    for name in &extra_partitions {
        if SYMLINK_GATED_PARTITIONS.contains(&name.as_str()) || UNGATED_BUILTIN_PARTITIONS.contains(&name.as_str()) || name == "system" {
            continue;
        }
        let path_of_root = Path::new("/").join(name);
        if path_of_root.is_dir()
            && let Some(node) = final_system.take_child(name)
        {
            root.push_child(node);
        }
    }

    root.push_child(final_system);
    Ok(Some(root))
}

#[cfg(test)]
mod tests {
    use std::fs::{File, create_dir_all};

    use super::*;
    use crate::notify::NullNotifier;

    fn write_file(path: &Path, contents: &str) {
        create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    #[test]
    fn disabled_module_contributes_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let module_root = tmp.path().join("modules");
        write_file(&module_root.join("B/system/etc/hosts"), "1.1.1.1 x");
        File::create(module_root.join("B/disable")).unwrap();

        let mut notifier = NullNotifier;
        let mut ctx = MountContext::new(vec![], &mut notifier);
        let tree = collect(&module_root, &mut ctx).unwrap();

        assert!(tree.is_none());
        assert_eq!(ctx.stats.modules_total, 0);
    }

    #[test]
    fn single_file_overlay_is_collected() {
        let tmp = tempfile::tempdir().unwrap();
        let module_root = tmp.path().join("modules");
        write_file(&module_root.join("A/system/etc/hosts"), "127.0.0.1 x");

        let mut notifier = NullNotifier;
        let mut ctx = MountContext::new(vec![], &mut notifier);
        let tree = collect(&module_root, &mut ctx).unwrap().unwrap();

        assert_eq!(ctx.stats.modules_total, 1);
        let system = tree.child("system").unwrap();
        let etc = system.child("etc").unwrap();
        let hosts = etc.child("hosts").unwrap();
        assert_eq!(hosts.kind, NodeKind::Regular);
        assert_eq!(hosts.module_name.as_deref(), Some("A"));
    }

    #[test]
    fn first_writer_wins_on_conflicting_paths() {
        let tmp = tempfile::tempdir().unwrap();
        let module_root = tmp.path().join("modules");
        write_file(&module_root.join("A/system/etc/hosts"), "from-a");
        write_file(&module_root.join("B/system/etc/hosts"), "from-b");

        let mut notifier = NullNotifier;
        let mut ctx = MountContext::new(vec![], &mut notifier);
        let tree = collect(&module_root, &mut ctx).unwrap().unwrap();

        let hosts = tree.child("system").unwrap().child("etc").unwrap().child("hosts").unwrap();
        assert_eq!(hosts.module_name.as_deref(), Some("A"));
        assert_eq!(ctx.stats.modules_total, 2);
    }

    #[test]
    fn configured_extra_partition_is_promoted_out_of_system() {
        // "tmp" stands in for a configured extra partition here: the
        // promotion check only requires `/<name>` to exist as a directory,
        // which `/tmp` reliably does, without needing a real device layout.
        let tmp = tempfile::tempdir().unwrap();
        let module_root = tmp.path().join("modules");
        write_file(&module_root.join("A/system/tmp/marker"), "from-a");

        let mut notifier = NullNotifier;
        let mut ctx = MountContext::new(vec!["tmp".to_string()], &mut notifier);
        let tree = collect(&module_root, &mut ctx).unwrap().unwrap();

        assert!(tree.child("system").unwrap().child("tmp").is_none());
        let promoted = tree.child("tmp").unwrap();
        assert!(promoted.child("marker").is_some());
    }
}
