//! Shutdown signalling between the main task and the worker loops
//!
//! Async tasks await [`ShutdownSignal::wait`]; blocking loops use
//! [`ShutdownSignal::wait_timeout`], which wakes as soon as shutdown is
//! triggered.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;

/// Flag plus condition variable for blocking waiters
type BlockingFlag = Arc<(Mutex<bool>, Condvar)>;

/// Owner side: triggers shutdown for every [`ShutdownSignal`] cloned from it
#[derive(Debug)]
pub struct Shutdown {
    sender: watch::Sender<bool>,
    blocking: BlockingFlag,
}

/// Observer side, cheap to clone into each loop
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    receiver: watch::Receiver<bool>,
    blocking: BlockingFlag,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender,
            blocking: Arc::new((Mutex::new(false), Condvar::new())),
        }
    }

    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            receiver: self.sender.subscribe(),
            blocking: self.blocking.clone(),
        }
    }

    pub fn trigger(&self) {
        self.sender.send_replace(true);
        let (flag, condvar) = &*self.blocking;
        *flag.lock().unwrap_or_else(PoisonError::into_inner) = true;
        condvar.notify_all();
    }

    pub fn is_triggered(&self) -> bool {
        *self.sender.borrow()
    }
}

impl ShutdownSignal {
    /// Non-blocking check, usable from blocking threads
    pub fn is_triggered(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Block the current thread for up to `timeout`, returning early once
    /// shutdown is triggered. Returns whether it has been triggered.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (flag, condvar) = &*self.blocking;
        let guard = flag.lock().unwrap_or_else(PoisonError::into_inner);
        let (triggered, _) = condvar
            .wait_timeout_while(guard, timeout, |triggered| !*triggered)
            .unwrap_or_else(PoisonError::into_inner);
        *triggered
    }

    /// Resolve once shutdown has been triggered
    pub async fn wait(&mut self) {
        // An error means the owner is gone, which also ends the loops
        let _ = self.receiver.wait_for(|triggered| *triggered).await;
    }
}
