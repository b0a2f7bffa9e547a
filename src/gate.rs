//! Request admission, authentication and group-scoped execution.
//!
//! Every route passes through [`RequestGate`] in the same order: the client is
//! admitted by the rate limiter, the bearer token is verified, and storage work
//! runs on the blocking pool against a store bounded by the request deadline.
//! Group-scoped work is only handed the group after the membership oracle has
//! confirmed access, so request bodies are decoded after authorization.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error};

use crate::auth::TokenVerifier;
use crate::config::TripConfig;
use crate::error::{Result, TripError};
use crate::membership::MembershipOracle;
use crate::model::{GroupId, TravelGroup, UserId, VotingId};
use crate::ratelimit::{ClientKey, ClientRateLimiter};
use crate::store::Store;

/// Shared entry point for request handling.
#[derive(Clone)]
pub struct RequestGate {
    limiter: Arc<ClientRateLimiter>,
    verifier: Arc<TokenVerifier>,
    oracle: Arc<dyn MembershipOracle>,
    store: Store,
    timeout: Duration,
}

impl RequestGate {
    /// Create a gate whose membership checks are answered by `store` itself.
    pub fn new(
        limiter: Arc<ClientRateLimiter>,
        verifier: Arc<TokenVerifier>,
        store: Store,
        timeout: Duration,
    ) -> Self {
        let oracle = Arc::new(store.clone());
        Self::with_oracle(limiter, verifier, oracle, store, timeout)
    }

    pub fn with_oracle(
        limiter: Arc<ClientRateLimiter>,
        verifier: Arc<TokenVerifier>,
        oracle: Arc<dyn MembershipOracle>,
        store: Store,
        timeout: Duration,
    ) -> Self {
        Self {
            limiter,
            verifier,
            oracle,
            store,
            timeout,
        }
    }

    pub fn from_config(config: &TripConfig, store: Store) -> Self {
        Self::new(
            Arc::new(ClientRateLimiter::from_config(&config.rate_limiting)),
            Arc::new(TokenVerifier::from_config(&config.auth)),
            store,
            config.server.request_timeout(),
        )
    }

    pub fn limiter(&self) -> &Arc<ClientRateLimiter> {
        &self.limiter
    }

    pub fn verifier(&self) -> &TokenVerifier {
        &self.verifier
    }

    /// Admit or reject a request from `key`.
    pub fn admit(&self, key: &ClientKey) -> Result<()> {
        self.limiter
            .check(key)
            .map_err(|retry_after| TripError::RateLimited { retry_after })
    }

    /// Resolve the acting user from an `Authorization` header value.
    pub fn authenticate(&self, header: Option<&str>) -> Result<UserId> {
        self.verifier.verify_header(header)
    }

    /// Run storage work that is not tied to a group.
    ///
    /// The work gets a store handle bounded by the request deadline and its
    /// real outcome is returned: a write either committed and reports success,
    /// or was rolled back and reports `TripError::Timeout`.
    pub async fn unscoped<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Store) -> Result<T> + Send + 'static,
    {
        let store = self.store.with_deadline(Instant::now() + self.timeout);
        let result = tokio::task::spawn_blocking(move || op(&store))
            .await
            .map_err(|join_err| {
                error!(error = %join_err, "Storage task failed");
                TripError::internal(format!("storage task failed: {}", join_err))
            })?;

        if let Err(TripError::Timeout) = &result {
            debug!(timeout_ms = self.timeout.as_millis() as u64, "Request deadline elapsed");
        }
        result
    }

    /// Authorize `user_id` against `group_id`, then run `op` with the group.
    pub async fn group_scoped<T, F>(&self, group_id: GroupId, user_id: UserId, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Store, &TravelGroup) -> Result<T> + Send + 'static,
    {
        let oracle = Arc::clone(&self.oracle);
        self.unscoped(move |store| {
            let group = oracle.authorize(group_id, user_id)?;
            op(store, &group)
        })
        .await
    }

    /// Like [`group_scoped`](Self::group_scoped), resolving the group from a voting.
    ///
    /// A missing voting and a voting in a group the user cannot see are both
    /// `NotFound`.
    pub async fn voting_scoped<T, F>(&self, voting_id: VotingId, user_id: UserId, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Store, &TravelGroup) -> Result<T> + Send + 'static,
    {
        let oracle = Arc::clone(&self.oracle);
        self.unscoped(move |store| {
            let group_id = store.voting_group(voting_id)?;
            let group = oracle.authorize(group_id, user_id)?;
            op(store, &group)
        })
        .await
    }
}
