//! Generic cooperatively-scheduled endpoint. The control plane is
//! single-threaded cooperative per endpoint: every RPC handler and
//! lifecycle callback runs on that endpoint's main executor; shared state
//! mutations require no locks because they are queued.
//!
//! Rather than a base-class hierarchy (RpcEndpoint -> FencedRpcEndpoint ->
//! concrete endpoint), concrete endpoints (ResourceManager, JobMaster,
//! TaskExecutor) embed an `Endpoint` by composition and submit closures to
//! its `Mailbox` instead of inheriting synchronized methods.

use conduit_core::ids::FencingToken;
use conduit_core::rpc::{FencingGuard, SharedFencingGuard};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

type Action = Box<dyn FnOnce(&mut dyn std::any::Any) + Send>;
type AsyncAction = Box<dyn for<'a> FnOnce(&'a mut dyn std::any::Any) -> futures::future::BoxFuture<'a, ()> + Send>;

/// A single-consumer FIFO of actions run serially on one dedicated task,
/// giving every handler on an endpoint mutual exclusion without locks.
/// Unlike the task-runtime mailbox, this mailbox has no priority classes:
/// control-plane endpoints don't need `put_first` semantics, since there's
/// no default action to suspend.
enum Mail {
    Sync(Action),
    Async(AsyncAction),
}

pub struct Mailbox {
    tx: mpsc::UnboundedSender<Mail>,
}

impl Mailbox {
    /// Spawns the consumer task driving `state` and returns a handle to
    /// submit actions to it. `state` becomes private to the mailbox loop;
    /// callers interact with it only through submitted closures.
    pub fn spawn<S: Send + 'static>(mut state: S) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Mail>();
        tokio::spawn(async move {
            while let Some(mail) = rx.recv().await {
                match mail {
                    Mail::Sync(action) => action(&mut state),
                    Mail::Async(action) => action(&mut state).await,
                }
            }
        });
        Self { tx }
    }

    /// Runs `f` against the mailbox's owned state and returns its result.
    /// Actions run strictly FIFO, in the order they were submitted.
    pub async fn submit<S, R, F>(&self, f: F) -> Result<R, MailboxClosed>
    where
        S: 'static,
        R: Send + 'static,
        F: FnOnce(&mut S) -> R + Send + 'static,
    {
        let (resp_tx, resp_rx) = oneshot::channel();
        let action: Action = Box::new(move |any: &mut dyn std::any::Any| {
            let state = any.downcast_mut::<S>().expect("mailbox state type mismatch");
            let _ = resp_tx.send(f(state));
        });
        self.tx.send(Mail::Sync(action)).map_err(|_| MailboxClosed)?;
        resp_rx.await.map_err(|_| MailboxClosed)
    }

    /// As `submit`, but `f` itself returns a future that the mailbox loop
    /// awaits before processing the next queued mail — still FIFO, still
    /// exclusive, but lets a handler perform async work (an RPC to another
    /// endpoint, a slot allocation) without blocking on a second round
    /// trip through the channel.
    pub async fn submit_async<S, R, F>(&self, f: F) -> Result<R, MailboxClosed>
    where
        S: 'static,
        R: Send + 'static,
        F: for<'a> FnOnce(&'a mut S) -> futures::future::BoxFuture<'a, R> + Send + 'static,
    {
        let (resp_tx, resp_rx) = oneshot::channel();
        let action: AsyncAction = Box::new(move |any: &mut dyn std::any::Any| {
            let state = any.downcast_mut::<S>().expect("mailbox state type mismatch");
            Box::pin(async move {
                let result = f(state).await;
                let _ = resp_tx.send(result);
            })
        });
        self.tx.send(Mail::Async(action)).map_err(|_| MailboxClosed)?;
        resp_rx.await.map_err(|_| MailboxClosed)
    }
}

#[derive(Debug)]
pub struct MailboxClosed;

impl fmt::Display for MailboxClosed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mailbox consumer task has terminated")
    }
}

impl std::error::Error for MailboxClosed {}

/// Lifecycle hooks every concrete endpoint implements ("lifecycle
/// hooks").
pub trait EndpointLifecycle: Send + Sync {
    fn on_start(&self) {}
    fn on_stop(&self) {}
    /// Called with the new token on grant, `None` on revoke.
    fn on_fencing_token_changed(&self, _token: Option<FencingToken>) {}
}

/// Identity, fencing token, and mailbox shared by every concrete endpoint.
/// Concrete endpoints (`ResourceManager`, `JobMaster`, `TaskExecutor`)
/// embed this rather than extending it.
pub struct EndpointContext {
    pub address: String,
    pub fencing: SharedFencingGuard,
}

impl EndpointContext {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            fencing: Arc::new(FencingGuard::new()),
        }
    }

    pub fn set_fencing_token(&self, token: Option<FencingToken>, lifecycle: &dyn EndpointLifecycle) {
        self.fencing.set(token);
        lifecycle.on_fencing_token_changed(token);
    }

    pub fn current_fencing_token(&self) -> Option<FencingToken> {
        self.fencing.current()
    }
}

/// Generic wrapper pairing an `EndpointContext` with the mailbox driving
/// its private state, so concrete endpoints get identity + fencing +
/// serialized execution "for free" by composition.
pub struct Endpoint<S> {
    pub context: EndpointContext,
    mailbox: Mailbox,
    _marker: std::marker::PhantomData<S>,
}

impl<S: Send + 'static> Endpoint<S> {
    pub fn new(address: impl Into<String>, state: S) -> Self {
        Self {
            context: EndpointContext::new(address),
            mailbox: Mailbox::spawn(state),
            _marker: std::marker::PhantomData,
        }
    }

    pub async fn submit<R, F>(&self, f: F) -> Result<R, MailboxClosed>
    where
        R: Send + 'static,
        F: FnOnce(&mut S) -> R + Send + 'static,
    {
        self.mailbox.submit::<S, R, F>(f).await
    }

    pub async fn submit_async<R, F>(&self, f: F) -> Result<R, MailboxClosed>
    where
        R: Send + 'static,
        F: for<'a> FnOnce(&'a mut S) -> futures::future::BoxFuture<'a, R> + Send + 'static,
    {
        self.mailbox.submit_async::<S, R, F>(f).await
    }
}
