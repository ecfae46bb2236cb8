//! Retrying registration: the algorithm used wherever a
//! subordinate must register with a currently-elected leader (TM→RM,
//! JM→RM, TE→JM). Generic over the gateway/payload types so every
//! registration call site (executor registering with the RM, TE
//! registering with a JM) reuses the same retry/backoff state machine.

use conduit_core::backoff::ExponentialBackoff;
use conduit_core::ids::FencingToken;
use std::future::Future;
use std::time::Duration;

/// Outcome of one `invoke_registration` attempt ("On a
/// `Decline` response ... On `Success`, complete the registration future").
pub enum RegistrationOutcome<P> {
    Success(P),
    Decline(String),
}

#[derive(Debug, Clone, Copy)]
pub struct RetryingRegistrationConfig {
    pub initial_timeout: Duration,
    pub max_timeout: Duration,
    pub error_delay: Duration,
    pub refused_delay: Duration,
}

impl Default for RetryingRegistrationConfig {
    fn default() -> Self {
        Self {
            initial_timeout: Duration::from_millis(100),
            max_timeout: Duration::from_secs(30),
            error_delay: Duration::from_secs(10),
            refused_delay: Duration::from_secs(5),
        }
    }
}

/// Drives the connect → register → (retry on timeout | restart on decline)
/// loop described in . `G` is the resolved gateway proxy type,
/// `P` the registration success payload.
pub struct RetryingRegistration<G, P> {
    target_name: String,
    target_address: String,
    config: RetryingRegistrationConfig,
    _marker: std::marker::PhantomData<(G, P)>,
}

impl<G, P> RetryingRegistration<G, P> {
    pub fn new(target_name: impl Into<String>, target_address: impl Into<String>, config: RetryingRegistrationConfig) -> Self {
        Self {
            target_name: target_name.into(),
            target_address: target_address.into(),
            config,
            _marker: std::marker::PhantomData,
        }
    }

    /// Runs the registration loop to completion. `connect` resolves the
    /// target address into a gateway proxy (may fail transiently);
    /// `invoke_registration` performs one registration RPC against the
    /// resolved gateway with the given fencing token and per-attempt
    /// timeout, itself timing out (returning `None`) rather than hanging
    /// forever past `timeout`.
    pub async fn run<ConnectFut, InvokeFut>(
        &self,
        token: FencingToken,
        mut connect: impl FnMut(String) -> ConnectFut,
        mut invoke_registration: impl FnMut(&G, FencingToken, Duration) -> InvokeFut,
    ) -> (G, P)
    where
        ConnectFut: Future<Output = Result<G, String>>,
        InvokeFut: Future<Output = Option<RegistrationOutcome<P>>>,
    {
        loop {
            let gateway = match connect(self.target_address.clone()).await {
                Ok(gateway) => gateway,
                Err(reason) => {
                    tracing::warn!(target = %self.target_name, %reason, "registration connect failed, retrying");
                    tokio::time::sleep(self.config.error_delay).await;
                    continue;
                }
            };

            // Full jitter on the per-attempt timeout so many subordinates
            // retrying the same leader don't all re-attempt in lockstep.
            let mut backoff = ExponentialBackoff::new(self.config.initial_timeout, self.config.max_timeout, 2.0, 1.0);
            let mut timeout = self.config.initial_timeout;
            loop {
                match invoke_registration(&gateway, token, timeout).await {
                    Some(RegistrationOutcome::Success(payload)) => {
                        return (gateway, payload);
                    }
                    Some(RegistrationOutcome::Decline(reason)) => {
                        tracing::info!(target = %self.target_name, %reason, "registration declined, restarting");
                        tokio::time::sleep(self.config.refused_delay).await;
                        break;
                    }
                    None => {
                        timeout = backoff.next_delay();
                        tracing::debug!(target = %self.target_name, ?timeout, "registration attempt timed out, backing off");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn succeeds_after_timeout_then_decline_then_success() {
        let registration: RetryingRegistration<&'static str, &'static str> = RetryingRegistration::new(
            "resourcemanager",
            "127.0.0.1:9000",
            RetryingRegistrationConfig {
                initial_timeout: Duration::from_millis(1),
                max_timeout: Duration::from_millis(20),
                error_delay: Duration::from_millis(1),
                refused_delay: Duration::from_millis(1),
            },
        );

        let attempt = Arc::new(AtomicUsize::new(0));
        let attempt_clone = attempt.clone();

        let (gateway, payload) = registration
            .run(
                FencingToken::new(),
                |_addr| async { Ok::<_, String>("gateway") },
                move |_gw, _token, _timeout| {
                    let attempt = attempt_clone.clone();
                    async move {
                        match attempt.fetch_add(1, Ordering::SeqCst) {
                            0 => None, // times out
                            1 => Some(RegistrationOutcome::Decline("not yet leader".into())),
                            _ => Some(RegistrationOutcome::Success("registered")),
                        }
                    }
                },
            )
            .await;

        assert_eq!(gateway, "gateway");
        assert_eq!(payload, "registered");
        assert_eq!(attempt.load(Ordering::SeqCst), 3);
    }
}
