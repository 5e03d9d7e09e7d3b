//! SIGINT handling
//!
//! The handler only sets a flag; the coordinator polls it between child
//! status checks and does the actual teardown on its own thread.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

static SIGINT_RECEIVED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_sigint(_signal: std::ffi::c_int) {
    SIGINT_RECEIVED.store(true, Ordering::SeqCst);
}

/// Shared "user asked us to stop" flag
#[derive(Debug, Clone, Default)]
pub struct InterruptFlag {
    local: Option<Arc<AtomicBool>>,
}

impl InterruptFlag {
    /// Install the process SIGINT handler and return a flag backed by it
    #[cfg(unix)]
    pub fn install() -> io::Result<Self> {
        use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};

        let action = SigAction::new(
            SigHandler::Handler(on_sigint),
            SaFlags::empty(),
            SigSet::empty(),
        );
        // SAFETY: the handler only stores to an atomic, which is async-signal-safe
        #[allow(unsafe_code)]
        unsafe { sigaction(Signal::SIGINT, &action) }?;
        Ok(Self::default())
    }

    #[cfg(not(unix))]
    pub fn install() -> io::Result<Self> {
        Ok(Self::default())
    }

    /// A flag not connected to any signal
    pub fn detached() -> Self {
        Self {
            local: Some(Arc::new(AtomicBool::new(false))),
        }
    }

    pub fn trigger(&self) {
        match &self.local {
            Some(flag) => flag.store(true, Ordering::SeqCst),
            None => SIGINT_RECEIVED.store(true, Ordering::SeqCst),
        }
    }

    pub fn is_set(&self) -> bool {
        match &self.local {
            Some(flag) => flag.load(Ordering::SeqCst),
            None => SIGINT_RECEIVED.load(Ordering::SeqCst),
        }
    }
}
