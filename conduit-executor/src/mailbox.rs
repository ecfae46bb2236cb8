//! Task mailbox: "a *mailbox thread* is the sole mutator of
//! operator state; concurrent timers, checkpoint triggers, and cross-task
//! interrupts enqueue *mails* instead of acting directly." Distinct from
//! `conduit_coordination::endpoint::Mailbox` (control-plane, no
//! priorities, no suspension) — this one models the priority FIFO with
//! Open/Quiesced/Closed states the task runtime needs. The drive loop that
//! actually consumes this queue against a task's `default_action` lives in
//! `mailbox_loop`.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Notify;

pub type Mail = Box<dyn FnOnce() + Send>;

/// "States: Open (accepts submissions) -> Quiesced (no new
/// submissions, drain in progress) -> Closed (rejects + returns remaining
/// mails for cancellation)."
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MailboxState {
    Open,
    Quiesced,
    Closed,
}

struct Entry {
    mail: Mail,
    priority: u8,
}

struct Inner {
    queue: Mutex<VecDeque<Entry>>,
    state: Mutex<MailboxState>,
    notify: Notify,
}

/// Default priority for regular mails; control mails inserted via
/// `put_first` run ahead of everything regardless of their own priority
/// value ("put_first(mail) inserts control mails ahead of
/// everything else").
pub const DEFAULT_PRIORITY: u8 = 0;
pub const CONTROL_PRIORITY: u8 = u8::MAX;

#[derive(Clone)]
pub struct Mailbox {
    inner: Arc<Inner>,
}

#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    #[error("mailbox is closed")]
    Closed,
}

impl Mailbox {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                queue: Mutex::new(VecDeque::new()),
                state: Mutex::new(MailboxState::Open),
                notify: Notify::new(),
            }),
        }
    }

    pub fn state(&self) -> MailboxState {
        *self.inner.state.lock()
    }

    /// `put(mail, priority)`.
    pub fn put(&self, mail: Mail, priority: u8) -> Result<(), MailboxError> {
        if *self.inner.state.lock() == MailboxState::Closed {
            return Err(MailboxError::Closed);
        }
        let mut queue = self.inner.queue.lock();
        let pos = queue.iter().position(|e| e.priority < priority).unwrap_or(queue.len());
        queue.insert(pos, Entry { mail, priority });
        drop(queue);
        self.inner.notify.notify_one();
        Ok(())
    }

    /// `put_first(mail)`: control mails ahead of everything.
    pub fn put_first(&self, mail: Mail) -> Result<(), MailboxError> {
        if *self.inner.state.lock() == MailboxState::Closed {
            return Err(MailboxError::Closed);
        }
        self.inner.queue.lock().push_front(Entry {
            mail,
            priority: CONTROL_PRIORITY,
        });
        self.inner.notify.notify_one();
        Ok(())
    }

    /// `try_take(min_priority)`: non-blocking.
    pub fn try_take(&self, min_priority: u8) -> Option<Mail> {
        let mut queue = self.inner.queue.lock();
        let pos = queue.iter().position(|e| e.priority >= min_priority)?;
        Some(queue.remove(pos).unwrap().mail)
    }

    /// `take(min_priority)`: blocks until an eligible mail is
    /// available.
    pub async fn take(&self, min_priority: u8) -> Mail {
        loop {
            if let Some(mail) = self.try_take(min_priority) {
                return mail;
            }
            self.inner.notify.notified().await;
        }
    }

    /// `drain()`: removes all mails, used when transitioning
    /// Quiesced -> Closed so the caller can cancel whatever remained.
    pub fn drain(&self) -> Vec<Mail> {
        self.inner.queue.lock().drain(..).map(|e| e.mail).collect()
    }

    pub fn quiesce(&self) {
        *self.inner.state.lock() = MailboxState::Quiesced;
    }

    /// Closes the mailbox and returns any mails still queued, for the
    /// caller to route to cancellation handling ("Closed
    /// (rejects + returns remaining mails for cancellation)").
    pub fn close(&self) -> Vec<Mail> {
        *self.inner.state.lock() = MailboxState::Closed;
        self.drain()
    }
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn put_first_jumps_ahead_of_regular_priority() {
        let mailbox = Mailbox::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let o = order.clone();
        mailbox.put(Box::new(move || o.lock().push("regular")), DEFAULT_PRIORITY).unwrap();
        let o = order.clone();
        mailbox.put_first(Box::new(move || o.lock().push("control"))).unwrap();

        (mailbox.try_take(0).unwrap())();
        (mailbox.try_take(0).unwrap())();
        assert_eq!(*order.lock(), vec!["control", "regular"]);
    }

    #[tokio::test]
    async fn take_blocks_until_mail_arrives() {
        let mailbox = Mailbox::new();
        let ran = Arc::new(AtomicUsize::new(0));

        let mailbox_clone = mailbox.clone();
        let ran_clone = ran.clone();
        let handle = tokio::spawn(async move {
            let mail = mailbox_clone.take(0).await;
            mail();
            ran_clone.fetch_add(1, Ordering::SeqCst);
        });

        tokio::task::yield_now().await;
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        mailbox.put(Box::new(|| {}), DEFAULT_PRIORITY).unwrap();
        handle.await.unwrap();
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn closed_mailbox_rejects_new_mails_and_returns_remaining() {
        let mailbox = Mailbox::new();
        mailbox.put(Box::new(|| {}), DEFAULT_PRIORITY).unwrap();
        let remaining = mailbox.close();
        assert_eq!(remaining.len(), 1);
        assert!(mailbox.put(Box::new(|| {}), DEFAULT_PRIORITY).is_err());
    }
}
