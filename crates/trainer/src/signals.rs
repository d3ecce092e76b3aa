//! Process-level termination handling.
//!
//! The manager installs handlers that only set a flag; its main loop turns
//! the flag into a shutdown request on the control block. Workers keep the
//! default action and instead mask termination signals around the few
//! instructions that must not be interrupted.

use std::io;
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};

const TERMINATION_SIGNALS: [libc::c_int; 3] = [libc::SIGINT, libc::SIGTERM, libc::SIGQUIT];

static TERMINATION_REQUESTED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_termination(_signal: libc::c_int) {
    TERMINATION_REQUESTED.store(true, Ordering::SeqCst);
}

/// Routes SIGINT, SIGTERM and SIGQUIT to the termination flag.
pub fn install_termination_handlers() -> io::Result<()> {
    let handler = on_termination as extern "C" fn(libc::c_int) as libc::sighandler_t;
    for signal in TERMINATION_SIGNALS {
        // SAFETY: the handler only performs an atomic store.
        if unsafe { libc::signal(signal, handler) } == libc::SIG_ERR {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

/// Returns `true` once a termination signal has been received.
pub fn termination_requested() -> bool {
    TERMINATION_REQUESTED.load(Ordering::SeqCst)
}

/// Sets the termination flag as if a signal had arrived.
pub fn request_termination() {
    TERMINATION_REQUESTED.store(true, Ordering::SeqCst);
}

/// Blocks termination signals for the calling thread until dropped.
///
/// A signal that arrives while the mask is held stays pending and is
/// delivered when the previous mask is restored.
pub struct TerminationMask {
    previous: libc::sigset_t,
}

impl TerminationMask {
    pub fn block() -> io::Result<Self> {
        // SAFETY: sigset_t is plain data, initialised by sigemptyset before
        // use; pthread_sigmask only touches the calling thread.
        unsafe {
            let mut set: libc::sigset_t = std::mem::zeroed();
            let mut previous: libc::sigset_t = std::mem::zeroed();
            libc::sigemptyset(&mut set);
            for signal in TERMINATION_SIGNALS {
                libc::sigaddset(&mut set, signal);
            }
            let rc = libc::pthread_sigmask(libc::SIG_BLOCK, &set, &mut previous);
            if rc != 0 {
                return Err(io::Error::from_raw_os_error(rc));
            }
            Ok(TerminationMask { previous })
        }
    }
}

impl Drop for TerminationMask {
    fn drop(&mut self) {
        // SAFETY: restores the mask saved by `block` on the same thread.
        unsafe {
            libc::pthread_sigmask(libc::SIG_SETMASK, &self.previous, ptr::null_mut());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_blocked(signal: libc::c_int) -> bool {
        unsafe {
            let mut current: libc::sigset_t = std::mem::zeroed();
            libc::pthread_sigmask(libc::SIG_BLOCK, ptr::null(), &mut current);
            libc::sigismember(&current, signal) == 1
        }
    }

    #[test]
    fn test_mask_restored_on_drop() {
        std::thread::spawn(|| {
            assert!(!is_blocked(libc::SIGTERM));
            let mask = TerminationMask::block().unwrap();
            assert!(is_blocked(libc::SIGTERM));
            assert!(is_blocked(libc::SIGINT));
            drop(mask);
            assert!(!is_blocked(libc::SIGTERM));
        })
        .join()
        .unwrap();
    }
}
