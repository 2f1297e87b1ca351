//! Process hardening for a machine that holds seed material
//!
//! Core dumps are disabled with `setrlimit(RLIMIT_CORE, 0)` so a crash never
//! writes a mnemonic or xprv to disk. Best-effort: some sandboxes refuse it.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

static CORE_DUMPS_DISABLED: AtomicBool = AtomicBool::new(false);

/// Disable core dumps for this process. Idempotent.
pub fn disable_core_dumps() -> io::Result<()> {
    if CORE_DUMPS_DISABLED.load(Ordering::SeqCst) {
        return Ok(());
    }
    platform::disable_core_dumps()?;
    CORE_DUMPS_DISABLED.store(true, Ordering::SeqCst);
    Ok(())
}

#[cfg(unix)]
mod platform {
    use std::io;

    pub fn disable_core_dumps() -> io::Result<()> {
        let rlim = libc::rlimit {
            rlim_cur: 0,
            rlim_max: 0,
        };
        // SAFETY: setrlimit reads a valid, initialised rlimit
        let result = unsafe { libc::setrlimit(libc::RLIMIT_CORE, &rlim) };
        if result != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

#[cfg(not(unix))]
mod platform {
    use std::io;

    pub fn disable_core_dumps() -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "core dump prevention is only implemented on unix",
        ))
    }
}
