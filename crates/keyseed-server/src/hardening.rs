//! Process hardening for a server that holds secret values in memory.
//!
//! On Unix the server sets `RLIMIT_CORE` to zero and pins its pages with
//! `mlockall`, so neither a crash dump nor swap can carry plaintext secrets
//! or the master key to disk. Elsewhere both steps are no-ops.

use std::io;

/// Outcome of [`apply`], reported once logging is up.
#[derive(Debug, Default)]
pub struct HardeningReport {
    /// `setrlimit` failure, if any.
    pub core_dumps: Option<io::Error>,
    /// `mlockall` failure, if any. `None` as well when skipped.
    pub memory_lock: Option<io::Error>,
    /// Whether `mlockall` was skipped by configuration.
    pub mlock_skipped: bool,
}

/// Disable core dumps, then lock memory unless `skip_mlock`.
#[must_use]
pub fn apply(skip_mlock: bool) -> HardeningReport {
    HardeningReport {
        core_dumps: disable_core_dumps().err(),
        memory_lock: if skip_mlock { None } else { lock_memory().err() },
        mlock_skipped: skip_mlock,
    }
}

/// Set `RLIMIT_CORE` to 0.
///
/// # Errors
///
/// Returns the OS error if `setrlimit` fails.
#[cfg(unix)]
pub fn disable_core_dumps() -> io::Result<()> {
    let limit = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    // SAFETY: `limit` is a valid, initialised `rlimit` that outlives the call.
    #[allow(unsafe_code)]
    let rc = unsafe { libc::setrlimit(libc::RLIMIT_CORE, &raw const limit) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
pub fn disable_core_dumps() -> io::Result<()> {
    Ok(())
}

/// Pin all current and future pages with `mlockall`.
///
/// Needs `CAP_IPC_LOCK` or root on Linux. Set `KEYSEED_DISABLE_MLOCK=true`
/// in development.
///
/// # Errors
///
/// Returns the OS error if `mlockall` fails.
#[cfg(unix)]
pub fn lock_memory() -> io::Result<()> {
    // SAFETY: takes only flag arguments and touches no Rust-managed memory.
    #[allow(unsafe_code)]
    let rc = unsafe { libc::mlockall(libc::MCL_CURRENT | libc::MCL_FUTURE) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
pub fn lock_memory() -> io::Result<()> {
    Ok(())
}
