//! Readiness gate
//!
//! Cached device state is only trustworthy once the protocol bootstrap has
//! finished. Waiters block (or suspend) until the flag is raised; the default
//! wait has no timeout.

use parking_lot::{Condvar, Mutex};
use std::time::Duration;
use tokio::sync::watch;

/// Boolean flag with blocking and async waits
#[derive(Debug)]
pub struct Readiness {
    flag: Mutex<bool>,
    cond: Condvar,
    tx: watch::Sender<bool>,
}

impl Readiness {
    /// Create a lowered flag
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            flag: Mutex::new(false),
            cond: Condvar::new(),
            tx,
        }
    }

    /// Current value
    pub fn is_ready(&self) -> bool {
        *self.flag.lock()
    }

    /// Raise or lower the flag, waking every waiter on a raise
    pub fn set(&self, ready: bool) {
        let mut flag = self.flag.lock();
        *flag = ready;
        self.tx.send_replace(ready);
        if ready {
            self.cond.notify_all();
        }
    }

    /// Block the current thread until ready
    pub fn wait(&self) {
        let mut flag = self.flag.lock();
        while !*flag {
            self.cond.wait(&mut flag);
        }
    }

    /// Block until ready or until `timeout` elapses; returns the final value
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut flag = self.flag.lock();
        if *flag {
            return true;
        }
        let _ = self
            .cond
            .wait_while_for(&mut flag, |ready| !*ready, timeout);
        *flag
    }

    /// Suspend until ready; `None` waits indefinitely
    pub async fn wait_async(&self, timeout: Option<Duration>) -> bool {
        let mut rx = self.tx.subscribe();
        let wait = async move { rx.wait_for(|ready| *ready).await.is_ok() };
        match timeout {
            Some(limit) => tokio::time::timeout(limit, wait).await.unwrap_or(false),
            None => wait.await,
        }
    }
}

impl Default for Readiness {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_blocking_wait_wakes_on_set() {
        let readiness = Arc::new(Readiness::new());
        let setter = Arc::clone(&readiness);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            setter.set(true);
        });

        readiness.wait();
        assert!(readiness.is_ready());
        handle.join().unwrap();
    }

    #[test]
    fn test_wait_timeout_expires() {
        let readiness = Readiness::new();
        assert!(!readiness.wait_timeout(Duration::from_millis(20)));
    }

    #[tokio::test]
    async fn test_async_wait() {
        let readiness = Arc::new(Readiness::new());
        assert!(!readiness.wait_async(Some(Duration::from_millis(10))).await);

        let setter = Arc::clone(&readiness);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            setter.set(true);
        });
        assert!(readiness.wait_async(None).await);
    }
}
