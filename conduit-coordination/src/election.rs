//! Leader election and discovery. The coordination service itself (an
//! external collaborator) is reached only through the
//! `CoordinationService` trait: an atomic leader latch plus a watchable
//! value node. `InMemoryCoordinationService` backs single-process tests.

use async_trait::async_trait;
use conduit_core::ids::FencingToken;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Callback surface a leadership candidate implements: on becoming leader,
/// invokes `candidate.grant(new_token)`; on losing leadership, invokes
/// `candidate.revoke()`.
#[async_trait]
pub trait LeaderContender: Send + Sync {
    async fn grant_leadership(&self, token: FencingToken);
    async fn revoke_leadership(&self);
}

/// Pushed to discoverers on every leader change. `None` signals connection
/// LOST/SUSPENDED: the discoverer pushes a null notification and
/// recipients must treat all outstanding requests against that leader as
/// failed.
pub type LeaderInfo = Option<(String, FencingToken)>;

#[async_trait]
pub trait LeaderListener: Send + Sync {
    async fn notify_leader_changed(&self, info: LeaderInfo);
}

/// The durable external coordination primitive: a durable coordination
/// service for leader election and leader discovery.
#[async_trait]
pub trait CoordinationService: Send + Sync {
    /// Attempts to acquire the leader latch at `path`. The returned
    /// `LeaderHandle` drives `contender`'s grant/revoke calls for as long
    /// as it's held; dropping it releases the latch (an ephemeral marker
    /// that also disappears on candidate crash).
    async fn run_for_leadership(
        self: Arc<Self>,
        path: String,
        contender: Arc<dyn LeaderContender>,
    ) -> LeaderHandle;

    /// Publishes `(address, token)` at `path` iff `contender` is still the
    /// current latch holder ("confirm_leadership ... only if
    /// still leader").
    async fn confirm_leadership(&self, path: &str, address: String, token: FencingToken) -> bool;

    /// Subscribes `listener` to changes at `path`, including an initial
    /// notification upon connection ("discover").
    async fn discover(self: Arc<Self>, path: String, listener: Arc<dyn LeaderListener>);
}

/// A held (or since-lost) leadership latch. Dropping this releases the
/// latch and asynchronously invokes the contender's `revoke_leadership`
/// ("on losing, invokes candidate.revoke()").
pub struct LeaderHandle {
    path: String,
    contender: Arc<dyn LeaderContender>,
    on_drop: Arc<dyn Fn(&str, Arc<dyn LeaderContender>) + Send + Sync>,
    /// Held for the lifetime of this handle; releasing it on drop is what
    /// lets a queued contender on the same path proceed.
    _latch_guard: tokio::sync::OwnedMutexGuard<()>,
}

impl LeaderHandle {
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Drop for LeaderHandle {
    fn drop(&mut self) {
        (self.on_drop)(&self.path, self.contender.clone());
    }
}

/// Wraps a `CoordinationService` to give call sites a single object with
/// both election and discovery behavior, matching how an endpoint runs
/// for leadership on its own path while also discovering peers.
pub struct LeaderElection {
    service: Arc<dyn CoordinationService>,
}

impl LeaderElection {
    pub fn new(service: Arc<dyn CoordinationService>) -> Self {
        Self { service }
    }

    pub async fn run_for_leadership(&self, path: impl Into<String>, contender: Arc<dyn LeaderContender>) -> LeaderHandle {
        self.service.clone().run_for_leadership(path.into(), contender).await
    }

    pub async fn confirm_leadership(&self, path: &str, address: String, token: FencingToken) -> bool {
        self.service.confirm_leadership(path, address, token).await
    }

    pub async fn discover(&self, path: impl Into<String>, listener: Arc<dyn LeaderListener>) {
        self.service.clone().discover(path.into(), listener).await;
    }
}

struct LatchState {
    holder_generation: u64,
    info: LeaderInfo,
}

/// Single-process coordination service for tests: an in-memory latch per
/// path (first caller wins, released on handle drop) and a broadcast
/// channel fanning out discovery updates. A second contender racing for a
/// path already held blocks on that path's `latch_lock` until the current
/// holder's `LeaderHandle` is dropped, so exactly one candidate per path
/// is ever granted leadership at a time.
pub struct InMemoryCoordinationService {
    latches: DashMap<String, LatchState>,
    latch_locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    channels: DashMap<String, broadcast::Sender<LeaderInfo>>,
}

impl InMemoryCoordinationService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            latches: DashMap::new(),
            latch_locks: DashMap::new(),
            channels: DashMap::new(),
        })
    }

    fn channel(&self, path: &str) -> broadcast::Sender<LeaderInfo> {
        self.channels
            .entry(path.to_owned())
            .or_insert_with(|| broadcast::channel(32).0)
            .clone()
    }

    fn publish(&self, path: &str, info: LeaderInfo) {
        let _ = self.channel(path).send(info);
    }

    fn latch_lock(&self, path: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.latch_locks
            .entry(path.to_owned())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

impl Default for InMemoryCoordinationService {
    fn default() -> Self {
        Self {
            latches: DashMap::new(),
            latch_locks: DashMap::new(),
            channels: DashMap::new(),
        }
    }
}

#[async_trait]
impl CoordinationService for InMemoryCoordinationService {
    async fn run_for_leadership(
        self: Arc<Self>,
        path: String,
        contender: Arc<dyn LeaderContender>,
    ) -> LeaderHandle {
        // Blocks here until the current holder (if any) drops its
        // LeaderHandle, so two contenders on the same path never hold the
        // latch concurrently.
        let guard = self.latch_lock(&path).lock_owned().await;

        let generation = {
            let mut entry = self.latches.entry(path.clone()).or_insert_with(|| LatchState {
                holder_generation: 0,
                info: None,
            });
            entry.holder_generation += 1;
            entry.holder_generation
        };

        let token = FencingToken::new();
        contender.grant_leadership(token).await;

        let this = self.clone();
        LeaderHandle {
            path,
            contender,
            _latch_guard: guard,
            on_drop: Arc::new(move |p: &str, contender: Arc<dyn LeaderContender>| {
                if let Some(mut state) = this.latches.get_mut(p) {
                    if state.holder_generation == generation {
                        state.info = None;
                    }
                }
                this.publish(p, None);
                tokio::spawn(async move {
                    contender.revoke_leadership().await;
                });
            }),
        }
    }

    async fn confirm_leadership(&self, path: &str, address: String, token: FencingToken) -> bool {
        let mut entry = match self.latches.get_mut(path) {
            Some(e) => e,
            None => return false,
        };
        entry.info = Some((address.clone(), token));
        drop(entry);
        self.publish(path, Some((address, token)));
        true
    }

    async fn discover(self: Arc<Self>, path: String, listener: Arc<dyn LeaderListener>) {
        let current = self.latches.get(&path).and_then(|s| s.info);
        listener.notify_leader_changed(current).await;

        let mut rx = self.channel(&path).subscribe();
        tokio::spawn(async move {
            while let Ok(info) = rx.recv().await {
                listener.notify_leader_changed(info).await;
            }
        });
    }
}
