// Copyright 2025 Meta-Hybrid Mount Authors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::{
    ffi::CString,
    fmt,
    fs::{DirEntry, FileType},
    os::unix::fs::{FileTypeExt, MetadataExt},
    path::{Path, PathBuf},
};

use anyhow::Result;
use extattr::lgetxattr;
use rustix::path::Arg;

use crate::defs::{REPLACE_DIR_FILE_NAME, REPLACE_DIR_XATTR};

#[derive(PartialEq, Eq, Clone, Debug)]
pub enum NodeKind {
    Regular,
    Directory,
    Symlink,
    Whiteout,
}

impl NodeKind {
    pub fn from_file_type(file_type: FileType) -> Option<Self> {
        if file_type.is_file() {
            Some(Self::Regular)
        } else if file_type.is_dir() {
            Some(Self::Directory)
        } else if file_type.is_symlink() {
            Some(Self::Symlink)
        } else {
            None
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Directory => write!(f, "DIR"),
            Self::Regular => write!(f, "FILE"),
            Self::Symlink => write!(f, "LINK"),
            Self::Whiteout => write!(f, "WHT"),
        }
    }
}

/// One entry of the unified overlay tree.
///
/// `children` is an ordered sequence rather than a map: entries are appended
/// in the order they are first discovered and looked up by a linear scan, so
/// that traversal order is always insertion order (the determinism required
/// by the executor's live-side enumeration pass).
pub struct Node {
    pub name: String,
    pub kind: NodeKind,
    pub children: Vec<Node>,
    pub module_path: Option<PathBuf>,
    pub module_name: Option<String>,
    pub replace: bool,
    pub skip: bool,
    pub done: bool,
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn print_tree(node: &Node, f: &mut fmt::Formatter<'_>, prefix: &str, is_last: bool, is_root: bool) -> fmt::Result {
            let connector = if is_root {
                ""
            } else if is_last {
                "└── "
            } else {
                "├── "
            };
            let name = if node.name.is_empty() { "/" } else { &node.name };

            let mut flags = Vec::new();
            if node.replace {
                flags.push("REPLACE");
            }
            if node.skip {
                flags.push("SKIP");
            }
            let flag_str = if flags.is_empty() {
                String::new()
            } else {
                format!(" [{}]", flags.join("|"))
            };

            let source_str = if let Some(p) = &node.module_path {
                format!(" -> {}", p.display())
            } else {
                String::new()
            };

            writeln!(f, "{prefix}{connector}{name} [{}]{flag_str}{source_str}", node.kind)?;

            let child_prefix = if is_root {
                ""
            } else if is_last {
                "    "
            } else {
                "│   "
            };
            let new_prefix = format!("{prefix}{child_prefix}");

            for (i, child) in node.children.iter().enumerate() {
                let is_last_child = i == node.children.len() - 1;
                print_tree(child, f, &new_prefix, is_last_child, false)?;
            }
            Ok(())
        }

        print_tree(self, f, "", true, true)
    }
}

impl Node {
    pub fn new_root<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::Directory,
            children: Vec::new(),
            module_path: None,
            module_name: None,
            replace: false,
            skip: false,
            done: false,
        }
    }

    /// Builds a Node for a single on-disk entry contributed by a module, or
    /// `None` if its type is not one of regular/directory/symlink/char-device.
    pub fn from_module_entry(module_name: &str, entry: &DirEntry) -> Option<Self> {
        let metadata = entry.metadata().ok()?;
        let path = entry.path();

        let kind = if metadata.file_type().is_char_device() && metadata.rdev() == 0 {
            Some(NodeKind::Whiteout)
        } else {
            NodeKind::from_file_type(metadata.file_type())
        };
        let kind = kind?;

        let replace = kind == NodeKind::Directory && Self::dir_is_replace(&path).unwrap_or(false);

        Some(Self {
            name: entry.file_name().to_string_lossy().to_string(),
            kind,
            children: Vec::new(),
            module_path: Some(path),
            module_name: Some(module_name.to_string()),
            replace,
            skip: false,
            done: false,
        })
    }

    pub fn child_index(&self, name: &str) -> Option<usize> {
        self.children.iter().position(|c| c.name == name)
    }

    pub fn child(&self, name: &str) -> Option<&Node> {
        self.child_index(name).map(|i| &self.children[i])
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut Node> {
        self.child_index(name).map(move |i| &mut self.children[i])
    }

    /// Removes and returns the child with the given name, if any, preserving
    /// the relative order of the remaining children.
    pub fn take_child(&mut self, name: &str) -> Option<Node> {
        let idx = self.child_index(name)?;
        Some(self.children.remove(idx))
    }

    pub fn push_child(&mut self, child: Node) {
        self.children.push(child);
    }

    /// Returns true iff a directory's replace marker is set: the overlay
    /// opaque xattr with value `"y"`, or a `.replace` marker file inside it.
    pub fn dir_is_replace<P: AsRef<Path>>(path: P) -> Result<bool> {
        if let Ok(v) = lgetxattr(&path, REPLACE_DIR_XATTR)
            && v == b"y"
        {
            return Ok(true);
        }

        let c_path = CString::new(path.as_ref().as_str()?)?;
        let fd = unsafe { libc::open(c_path.as_ptr(), libc::O_RDONLY | libc::O_DIRECTORY) };
        if fd < 0 {
            return Ok(false);
        }

        let exists = unsafe {
            let replace = CString::new(REPLACE_DIR_FILE_NAME)?;
            let ret = libc::faccessat(fd, replace.as_ptr(), libc::F_OK, 0);
            libc::close(fd);
            ret
        };

        Ok(exists == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn children_preserve_insertion_order() {
        let mut root = Node::new_root("");
        root.push_child(Node::new_root("b"));
        root.push_child(Node::new_root("a"));
        root.push_child(Node::new_root("c"));

        let names: Vec<_> = root.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["b", "a", "c"]);
    }

    #[test]
    fn take_child_removes_exactly_one() {
        let mut root = Node::new_root("");
        root.push_child(Node::new_root("a"));
        root.push_child(Node::new_root("b"));

        let taken = root.take_child("a").unwrap();
        assert_eq!(taken.name, "a");
        assert!(root.child("a").is_none());
        assert!(root.child("b").is_some());
    }
}
