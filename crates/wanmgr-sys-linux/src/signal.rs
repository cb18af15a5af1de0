//! Process signalling by pid
//!
//! Helper processes started by someone else (the VLAN DHCP clients, a
//! client that survived a manager restart) are only known by pid, so they
//! are signalled directly rather than through a child handle.

use wanmgr_core::Error;

/// Signals the manager sends to helper processes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// udhcpc: renew the lease
    Renew,
    /// udhcpc: release the lease
    Release,
    Terminate,
}

#[cfg(target_os = "linux")]
impl Signal {
    fn as_raw(self) -> libc::c_int {
        match self {
            Signal::Renew => libc::SIGUSR1,
            Signal::Release => libc::SIGUSR2,
            Signal::Terminate => libc::SIGTERM,
        }
    }
}

/// True if a process with this pid exists
#[cfg(target_os = "linux")]
pub fn pid_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    // SAFETY: signal 0 performs the permission and existence checks only
    unsafe { libc::kill(pid, 0) == 0 }
}

#[cfg(not(target_os = "linux"))]
pub fn pid_alive(pid: u32) -> bool {
    std::path::Path::new(&format!("/proc/{}", pid)).exists()
}

/// Send `signal` to `pid`
#[cfg(target_os = "linux")]
pub fn send(pid: u32, signal: Signal) -> Result<(), Error> {
    let raw_pid = libc::pid_t::try_from(pid)
        .map_err(|_| Error::invalid_input(format!("pid {} out of range", pid)))?;
    if raw_pid <= 0 {
        return Err(Error::invalid_input(format!("invalid pid {}", pid)));
    }
    // SAFETY: kill(2) has no memory-safety preconditions
    let rc = unsafe { libc::kill(raw_pid, signal.as_raw()) };
    if rc != 0 {
        return Err(Error::process(format!(
            "Failed to send {:?} to pid {}: {}",
            signal,
            pid,
            std::io::Error::last_os_error()
        )));
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
pub fn send(pid: u32, signal: Signal) -> Result<(), Error> {
    Err(Error::process(format!(
        "Sending {:?} to pid {} is only supported on Linux",
        signal, pid
    )))
}
