use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread;

use crate::runtime::RunEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorization {
    Authorized,
    Denied,
}

impl From<bool> for Authorization {
    fn from(granted: bool) -> Self {
        if granted {
            Authorization::Authorized
        } else {
            Authorization::Denied
        }
    }
}

/// Host-side location permission check.
///
/// Implementations may block (e.g. while the user answers a prompt); callers
/// run them off the event loop through [`request_in_background`].
pub trait PermissionGate: Send + Sync + 'static {
    fn request_authorization(&self) -> Authorization;
}

/// Always answers the same way. Used for `--deny-location` and in tests.
#[derive(Debug)]
pub struct FixedPermissionGate {
    answer: Authorization,
    requests: AtomicUsize,
}

impl FixedPermissionGate {
    pub fn new(answer: Authorization) -> Self {
        Self {
            answer,
            requests: AtomicUsize::new(0),
        }
    }

    pub fn granting() -> Self {
        Self::new(Authorization::Authorized)
    }

    pub fn denying() -> Self {
        Self::new(Authorization::Denied)
    }

    /// How many times the platform was actually asked.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl PermissionGate for FixedPermissionGate {
    fn request_authorization(&self) -> Authorization {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.answer
    }
}

/// Once authorized, answers immediately without asking the inner gate again.
/// A denial is not remembered, so the next request re-checks.
#[derive(Debug)]
pub struct RememberingGate<G> {
    inner: G,
    granted: AtomicBool,
}

impl<G: PermissionGate> RememberingGate<G> {
    pub fn new(inner: G) -> Self {
        Self {
            inner,
            granted: AtomicBool::new(false),
        }
    }

    pub fn inner(&self) -> &G {
        &self.inner
    }
}

impl<G: PermissionGate> PermissionGate for RememberingGate<G> {
    fn request_authorization(&self) -> Authorization {
        if self.granted.load(Ordering::Acquire) {
            return Authorization::Authorized;
        }

        let outcome = self.inner.request_authorization();
        if outcome == Authorization::Authorized {
            self.granted.store(true, Ordering::Release);
        }
        outcome
    }
}

impl<G: PermissionGate + ?Sized> PermissionGate for Arc<G> {
    fn request_authorization(&self) -> Authorization {
        (**self).request_authorization()
    }
}

/// Ask the gate on a worker thread and deliver the answer as a
/// `RunEvent::Permission` tagged with `attempt`.
pub fn request_in_background(gate: Arc<dyn PermissionGate>, attempt: u64, tx: Sender<RunEvent>) {
    thread::spawn(move || {
        let outcome = gate.request_authorization();
        log::debug!("permission attempt {attempt} resolved: {outcome:?}");
        // receiver gone means the app is shutting down
        let _ = tx.send(RunEvent::Permission { attempt, outcome });
    });
}
