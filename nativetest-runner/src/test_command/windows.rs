// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{
    io,
    process::{Child, Command},
};
use windows_sys::Win32::{
    Foundation::{CloseHandle, HANDLE, STILL_ACTIVE, WAIT_FAILED, WAIT_OBJECT_0, WAIT_TIMEOUT},
    System::Threading::{
        GetExitCodeProcess, OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION, PROCESS_SYNCHRONIZE,
        PROCESS_TERMINATE, TerminateProcess, WaitForSingleObject,
    },
};

pub(super) fn set_process_group(_cmd: &mut Command) {}

pub(super) fn kill_child(child: &mut Child) {
    _ = child.kill();
    _ = child.wait();
}

/// A process started by someone else, opened by process ID.
#[derive(Debug)]
pub(super) struct AttachedProcess {
    handle: HANDLE,
}

impl AttachedProcess {
    pub(super) fn attach(pid: u32) -> io::Result<Self> {
        // SAFETY: https://learn.microsoft.com/en-us/windows/win32/api/processthreadsapi/nf-processthreadsapi-openprocess
        let handle = unsafe {
            OpenProcess(
                PROCESS_QUERY_LIMITED_INFORMATION | PROCESS_SYNCHRONIZE | PROCESS_TERMINATE,
                0,
                pid,
            )
        };
        if handle.is_null() {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { handle })
    }

    pub(super) fn try_wait(&mut self) -> io::Result<Option<Option<i32>>> {
        // SAFETY: https://learn.microsoft.com/en-us/windows/win32/api/synchapi/nf-synchapi-waitforsingleobject
        match unsafe { WaitForSingleObject(self.handle, 0) } {
            WAIT_TIMEOUT => Ok(None),
            WAIT_OBJECT_0 => {
                let mut code = 0u32;
                // SAFETY: https://learn.microsoft.com/en-us/windows/win32/api/processthreadsapi/nf-processthreadsapi-getexitcodeprocess
                let ret = unsafe { GetExitCodeProcess(self.handle, &mut code) };
                if ret == 0 || code == STILL_ACTIVE as u32 {
                    // The process exited but its code isn't available.
                    Ok(Some(None))
                } else {
                    Ok(Some(Some(code as i32)))
                }
            }
            WAIT_FAILED => Err(io::Error::last_os_error()),
            other => Err(io::Error::other(format!(
                "unexpected result from WaitForSingleObject: {other}"
            ))),
        }
    }

    pub(super) fn kill(&mut self) {
        // SAFETY: https://learn.microsoft.com/en-us/windows/win32/api/processthreadsapi/nf-processthreadsapi-terminateprocess
        unsafe {
            TerminateProcess(self.handle, 1);
        }
    }
}

impl Drop for AttachedProcess {
    fn drop(&mut self) {
        // SAFETY: the handle was returned by OpenProcess and is closed exactly once.
        unsafe {
            CloseHandle(self.handle);
        }
    }
}
