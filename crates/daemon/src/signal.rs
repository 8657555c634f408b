//! Process signalling. The only place in the crate that calls into libc.
#![allow(unsafe_code)]

use mcpforge_core::{ForgeError, ForgeResult};

/// Asks `pid` to terminate. Does not wait and never escalates.
#[cfg(unix)]
pub(crate) fn send_sigterm(pid: u32) -> ForgeResult<()> {
    let raw = i32::try_from(pid).map_err(|_| ForgeError::Signal {
        pid,
        message: "pid out of range".into(),
    })?;
    // SAFETY: kill(2) takes plain integers and has no memory-safety preconditions.
    let rc = unsafe { libc::kill(raw, libc::SIGTERM) };
    if rc != 0 {
        return Err(ForgeError::Signal {
            pid,
            message: std::io::Error::last_os_error().to_string(),
        });
    }
    Ok(())
}

#[cfg(not(unix))]
pub(crate) fn send_sigterm(pid: u32) -> ForgeResult<()> {
    Err(ForgeError::Signal {
        pid,
        message: "graceful termination is only supported on unix".into(),
    })
}
