// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{
    io,
    os::unix::process::{CommandExt, ExitStatusExt},
    process::{Child, Command, ExitStatus},
};

pub(super) fn set_process_group(cmd: &mut Command) {
    // Put the child in its own process group so that killing it also kills anything it spawned.
    cmd.process_group(0);
}

pub(super) fn kill_child(child: &mut Child) {
    let pid = child.id() as libc::pid_t;
    // SAFETY: https://www.man7.org/linux/man-pages/man2/kill.2.html
    // A negative pid signals the whole process group, which the child leads.
    unsafe {
        libc::kill(-pid, libc::SIGKILL);
    }
    // Fall back to the child alone in case the group is already gone.
    _ = child.kill();
    _ = child.wait();
}

/// A process started by someone else, tracked by process ID.
#[derive(Debug)]
pub(super) struct AttachedProcess {
    pid: libc::pid_t,
    is_child: bool,
    // Set if the child was reaped while attaching.
    reaped: Option<ExitStatus>,
}

impl AttachedProcess {
    pub(super) fn attach(pid: u32) -> io::Result<Self> {
        let pid = libc::pid_t::try_from(pid)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "process ID out of range"))?;
        if pid <= 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "process ID must be positive",
            ));
        }

        // If the process is our child (debuggers hosted in-process usually spawn it directly), it
        // has to be reaped with waitpid. Otherwise all that can be done is check that it exists.
        let (is_child, reaped) = match waitpid_nohang(pid) {
            Ok(reaped) => (true, reaped),
            Err(error) if error.raw_os_error() == Some(libc::ECHILD) => (false, None),
            Err(error) => return Err(error),
        };
        let process = Self {
            pid,
            is_child,
            reaped,
        };
        if !is_child && !process.exists()? {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("process {pid} does not exist"),
            ));
        }
        Ok(process)
    }

    pub(super) fn try_wait(&mut self) -> io::Result<Option<Option<i32>>> {
        if let Some(status) = self.reaped {
            return Ok(Some(status.code()));
        }
        if self.is_child {
            return match waitpid_nohang(self.pid)? {
                Some(status) => Ok(Some(status.code())),
                None => Ok(None),
            };
        }
        // Not our child, so the exit code can't be observed.
        if self.exists()? {
            Ok(None)
        } else {
            Ok(Some(None))
        }
    }

    pub(super) fn kill(&mut self) {
        // SAFETY: https://www.man7.org/linux/man-pages/man2/kill.2.html
        unsafe {
            libc::kill(self.pid, libc::SIGKILL);
        }
        if self.is_child && self.reaped.is_none() {
            let mut status = 0;
            // SAFETY: https://www.man7.org/linux/man-pages/man2/waitpid.2.html
            unsafe {
                libc::waitpid(self.pid, &mut status, 0);
            }
        }
    }

    fn exists(&self) -> io::Result<bool> {
        // SAFETY: https://www.man7.org/linux/man-pages/man2/kill.2.html
        // Signal 0 performs error checking only.
        let ret = unsafe { libc::kill(self.pid, 0) };
        if ret == 0 {
            return Ok(true);
        }
        let error = io::Error::last_os_error();
        match error.raw_os_error() {
            Some(libc::ESRCH) => Ok(false),
            // The process exists but belongs to someone else.
            Some(libc::EPERM) => Ok(true),
            _ => Err(error),
        }
    }
}

fn waitpid_nohang(pid: libc::pid_t) -> io::Result<Option<ExitStatus>> {
    let mut status = 0;
    // SAFETY: https://www.man7.org/linux/man-pages/man2/waitpid.2.html
    let ret = unsafe { libc::waitpid(pid, &mut status, libc::WNOHANG) };
    match ret {
        0 => Ok(None),
        -1 => Err(io::Error::last_os_error()),
        _ => Ok(Some(ExitStatus::from_raw(status))),
    }
}
