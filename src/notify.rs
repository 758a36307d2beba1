// Copyright 2025 Meta-Hybrid Mount Authors
// SPDX-License-Identifier: GPL-3.0-or-later

//! The kernel-module "register unmountable mountpoint" ioctl channel,
//! isolated behind a capability trait so tests can substitute a recording
//! fake instead of issuing real syscalls.

use std::path::Path;

use anyhow::Result;

/// Substring identifying a path as living inside the scaffold tmpfs rather
/// than on the live filesystem. Notifications are suppressed for such paths.
pub const SCAFFOLD_MARKER: &str = ".magic_mount/workdir/";

pub trait Notifier {
    /// Acquires the kernel-module handle. Idempotent; called once per
    /// orchestrator run.
    fn acquire(&mut self) -> Result<()>;

    /// Registers `mountpoint` as unmountable with the kernel module. A
    /// no-op if acquisition failed or yielded no handle.
    fn notify(&mut self, mountpoint: &Path) -> Result<()>;
}

pub fn should_notify(path: &Path) -> bool {
    !path.to_string_lossy().contains(SCAFFOLD_MARKER)
}

#[cfg(any(target_os = "linux", target_os = "android"))]
mod ksu {
    use std::{ffi::CString, os::fd::RawFd};

    use anyhow::Result;
    use rustix::path::Arg;

    use super::Notifier;

    const KSU_INSTALL_MAGIC1: u32 = 0xDEAD_BEEF;
    const KSU_INSTALL_MAGIC2: u32 = 0xCAFE_BABE;
    const KSU_IOCTL_ADD_TRY_UMOUNT: u32 = 0x4000_4b12;

    #[repr(C)]
    struct KsuAddTryUmount {
        arg: u64,
        flags: u32,
        mode: u8,
    }

    fn grab_fd() -> RawFd {
        let mut fd: RawFd = -1;
        unsafe {
            libc::syscall(
                libc::SYS_reboot,
                KSU_INSTALL_MAGIC1,
                KSU_INSTALL_MAGIC2,
                0,
                &mut fd,
            );
        }
        fd
    }

    /// Real notifier talking to a KernelSU-style kernel module via the
    /// reboot-syscall handle-acquisition trick and a fixed-layout ioctl.
    #[derive(Default)]
    pub struct KsuNotifier {
        fd: Option<RawFd>,
    }

    impl Notifier for KsuNotifier {
        fn acquire(&mut self) -> Result<()> {
            let fd = grab_fd();
            self.fd = if fd >= 0 { Some(fd) } else { None };
            Ok(())
        }

        fn notify(&mut self, mountpoint: &std::path::Path) -> Result<()> {
            let Some(fd) = self.fd else {
                return Ok(());
            };

            let path_str = mountpoint.as_str()?;
            let path = CString::new(path_str)?;
            let cmd = KsuAddTryUmount {
                arg: path.as_ptr() as u64,
                flags: 2,
                mode: 1,
            };

            unsafe {
                #[cfg(target_env = "gnu")]
                let ret = libc::ioctl(fd, KSU_IOCTL_ADD_TRY_UMOUNT as u64, &cmd);
                #[cfg(not(target_env = "gnu"))]
                let ret = libc::ioctl(fd, KSU_IOCTL_ADD_TRY_UMOUNT as i32, &cmd);

                if ret == 0 {
                    log::debug!("notified kernel module for {path_str}");
                } else {
                    log::debug!("kernel module notification failed for {path_str}");
                }
            }
            Ok(())
        }
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
pub use ksu::KsuNotifier;

/// A notifier that never talks to the kernel, used when the configuration
/// disables the try-umount channel (`disable_umount`) or on kernels without
/// the ioctl.
#[derive(Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn acquire(&mut self) -> Result<()> {
        Ok(())
    }

    fn notify(&mut self, _mountpoint: &Path) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
#[derive(Default)]
pub struct RecordingNotifier {
    pub acquired: bool,
    pub notified: Vec<std::path::PathBuf>,
}

#[cfg(test)]
impl Notifier for RecordingNotifier {
    fn acquire(&mut self) -> Result<()> {
        self.acquired = true;
        Ok(())
    }

    fn notify(&mut self, mountpoint: &Path) -> Result<()> {
        self.notified.push(mountpoint.to_path_buf());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaffold_paths_are_suppressed() {
        assert!(!should_notify(Path::new("/tmp/.magic_mount/workdir/system/bin")));
        assert!(should_notify(Path::new("/system/bin")));
    }

    #[test]
    fn recording_fake_tracks_calls() {
        let mut n = RecordingNotifier::default();
        n.acquire().unwrap();
        n.notify(Path::new("/vendor/lib/libfoo.so")).unwrap();
        assert!(n.acquired);
        assert_eq!(n.notified, vec![std::path::PathBuf::from("/vendor/lib/libfoo.so")]);
    }
}
