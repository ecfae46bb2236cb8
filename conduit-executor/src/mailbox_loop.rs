//! Task-thread drive loop: the sole consumer of a `Mailbox`, alternating
//! between draining queued mail and invoking the task's `default_action`
//! (normally: read the next element from an `InputGate` and push it
//! through the `OperatorChain`). A `Controller` lets the default action
//! suspend itself — e.g. while waiting on an async checkpoint barrier or a
//! timer-fired future — so the loop falls back to blocking on `take()`
//! until a queued mail resumes it, rather than busy-polling.

use crate::mailbox::{Mailbox, MailboxState, DEFAULT_PRIORITY};
use conduit_core::error::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A resumable pause token returned by [`Controller::suspend_default_action`].
/// Idempotent: only the first `resume()` call has any effect.
#[derive(Clone)]
pub struct Suspension {
    resumed: Arc<AtomicBool>,
}

impl Suspension {
    /// Un-suspends the default action. Typically called from inside a mail
    /// posted back to the same mailbox once the awaited condition is met,
    /// so the blocked `take()` in the drive loop wakes up, runs that mail,
    /// and the loop observes the action is no longer suspended.
    pub fn resume(&self) {
        self.resumed.store(true, Ordering::SeqCst);
    }

    fn is_resumed(&self) -> bool {
        self.resumed.load(Ordering::SeqCst)
    }
}

/// Handed to `default_action` so it can request a suspension. Only one
/// suspension may be outstanding at a time.
#[derive(Clone, Default)]
pub struct Controller {
    current: Arc<parking_lot::Mutex<Option<Suspension>>>,
}

impl Controller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Suspends the default action until the returned `Suspension` is
    /// resumed. While suspended the drive loop blocks on mail alone.
    pub fn suspend_default_action(&self) -> Suspension {
        let suspension = Suspension {
            resumed: Arc::new(AtomicBool::new(false)),
        };
        *self.current.lock() = Some(suspension.clone());
        suspension
    }

    fn active_suspension(&self) -> Option<Suspension> {
        let mut guard = self.current.lock();
        match guard.as_ref() {
            Some(s) if s.is_resumed() => {
                *guard = None;
                None
            }
            other => other.cloned(),
        }
    }
}

/// Drives one task's mailbox: processes pending mail, then runs
/// `default_action` once per iteration unless suspended, in which case it
/// blocks on the next mail instead. `default_action` returns `Ok(true)` to
/// keep running or `Ok(false)` once the task has no more work (e.g. all
/// input channels reached end-of-partition).
pub async fn run_mailbox_loop(mailbox: &Mailbox, controller: &Controller, mut default_action: impl FnMut(&Controller) -> Result<bool> + Send) -> Result<()> {
    loop {
        while let Some(mail) = mailbox.try_take(DEFAULT_PRIORITY) {
            mail();
        }
        if mailbox.state() == MailboxState::Closed {
            return Ok(());
        }

        if controller.active_suspension().is_some() {
            let mail = mailbox.take(DEFAULT_PRIORITY).await;
            mail();
            continue;
        }

        if !default_action(controller)? {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mailbox::DEFAULT_PRIORITY as PRI;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn default_action_runs_until_it_reports_done() {
        let mailbox = Mailbox::new();
        let controller = Controller::new();
        let runs = Arc::new(AtomicUsize::new(0));

        let runs_clone = runs.clone();
        run_mailbox_loop(&mailbox, &controller, move |_ctl| {
            let n = runs_clone.fetch_add(1, Ordering::SeqCst);
            Ok(n < 4)
        })
        .await
        .unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn suspension_blocks_default_action_until_resumed_by_a_mail() {
        let mailbox = Mailbox::new();
        let controller = Controller::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let suspended_once = Arc::new(AtomicBool::new(false));

        let mailbox_for_mail = mailbox.clone();
        let runs_clone = runs.clone();
        let suspended_once_clone = suspended_once.clone();
        let task = tokio::spawn(async move {
            run_mailbox_loop(&mailbox, &controller, move |ctl| {
                let n = runs_clone.fetch_add(1, Ordering::SeqCst);
                if n == 0 && !suspended_once_clone.swap(true, Ordering::SeqCst) {
                    let suspension = ctl.suspend_default_action();
                    let mailbox = mailbox_for_mail.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                        let _ = mailbox.put(Box::new(move || suspension.resume()), PRI);
                    });
                }
                Ok(n < 2)
            })
            .await
        });

        task.await.unwrap().unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }
}
