//! Claim eligibility.
//!
//! A request is refused if it carries the claim cookie, or if its identity
//! already owns a coupon. Both checks are advisory: clearing cookies or
//! rotating addresses gets around them.

use std::{fmt, str::FromStr, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    models::ClaimOutcome,
    store::{CouponStore, StoreError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimPolicy {
    /// Identity check and allocation are separate store calls.
    DualGate,
    /// Identity check and allocation share one store-level critical section.
    Strict,
}

impl FromStr for ClaimPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dual_gate" => Ok(ClaimPolicy::DualGate),
            "strict" => Ok(ClaimPolicy::Strict),
            other => Err(format!("unknown claim policy {other:?}")),
        }
    }
}

impl fmt::Display for ClaimPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClaimPolicy::DualGate => f.write_str("dual_gate"),
            ClaimPolicy::Strict => f.write_str("strict"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ClaimRequest<'a> {
    pub identity: &'a str,
    pub has_claim_cookie: bool,
}

#[async_trait]
pub trait ClaimGate: Send + Sync {
    async fn claim(&self, request: ClaimRequest<'_>) -> Result<ClaimOutcome, StoreError>;
}

pub fn gate_for(policy: ClaimPolicy, store: Arc<dyn CouponStore>) -> Arc<dyn ClaimGate> {
    match policy {
        ClaimPolicy::DualGate => Arc::new(DualGate::new(store)),
        ClaimPolicy::Strict => Arc::new(StrictGate::new(store)),
    }
}

/// Cookie check, then identity lookup, then allocation, each on its own.
/// Two simultaneous requests from one identity can both get through.
pub struct DualGate {
    store: Arc<dyn CouponStore>,
}

impl DualGate {
    pub fn new(store: Arc<dyn CouponStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ClaimGate for DualGate {
    async fn claim(&self, request: ClaimRequest<'_>) -> Result<ClaimOutcome, StoreError> {
        if request.has_claim_cookie {
            warn!("Claim cookie present for {}", request.identity);
            return Ok(ClaimOutcome::AlreadyClaimed);
        }

        if let Some(existing) = self.store.find_claim_by(request.identity).await? {
            warn!(
                "{} already claimed coupon {}",
                request.identity, existing.id
            );
            return Ok(ClaimOutcome::AlreadyClaimed);
        }

        Ok(match self.store.claim_next(request.identity).await? {
            Some(coupon) => ClaimOutcome::Claimed(coupon),
            None => ClaimOutcome::Exhausted,
        })
    }
}

/// Cookie check, then a single exclusive claim in the store.
pub struct StrictGate {
    store: Arc<dyn CouponStore>,
}

impl StrictGate {
    pub fn new(store: Arc<dyn CouponStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ClaimGate for StrictGate {
    async fn claim(&self, request: ClaimRequest<'_>) -> Result<ClaimOutcome, StoreError> {
        if request.has_claim_cookie {
            warn!("Claim cookie present for {}", request.identity);
            return Ok(ClaimOutcome::AlreadyClaimed);
        }

        let outcome = self.store.claim_exclusive(request.identity).await?;
        if outcome == ClaimOutcome::AlreadyClaimed {
            warn!("{} already owns a coupon", request.identity);
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryCouponStore;

    fn request(identity: &str, has_claim_cookie: bool) -> ClaimRequest<'_> {
        ClaimRequest {
            identity,
            has_claim_cookie,
        }
    }

    async fn gates() -> Vec<(Arc<MemoryCouponStore>, Arc<dyn ClaimGate>)> {
        let mut out = Vec::new();
        for policy in [ClaimPolicy::DualGate, ClaimPolicy::Strict] {
            let store = Arc::new(MemoryCouponStore::with_codes(["A", "B"]).await);
            let gate = gate_for(policy, store.clone());
            out.push((store, gate));
        }
        out
    }

    #[tokio::test]
    async fn cookie_rejects_even_with_stock() {
        for (store, gate) in gates().await {
            let outcome = gate.claim(request("1.2.3.4", true)).await.unwrap();
            assert_eq!(outcome, ClaimOutcome::AlreadyClaimed);
            assert_eq!(store.list_unclaimed().await.unwrap().len(), 2);
        }
    }

    #[tokio::test]
    async fn known_identity_is_rejected() {
        for (_, gate) in gates().await {
            assert!(matches!(
                gate.claim(request("1.2.3.4", false)).await.unwrap(),
                ClaimOutcome::Claimed(_)
            ));
            assert_eq!(
                gate.claim(request("1.2.3.4", false)).await.unwrap(),
                ClaimOutcome::AlreadyClaimed
            );
        }
    }

    #[tokio::test]
    async fn exhaustion_after_stock_runs_out() {
        for (_, gate) in gates().await {
            gate.claim(request("1.1.1.1", false)).await.unwrap();
            gate.claim(request("2.2.2.2", false)).await.unwrap();
            assert_eq!(
                gate.claim(request("3.3.3.3", false)).await.unwrap(),
                ClaimOutcome::Exhausted
            );
        }
    }

    #[tokio::test]
    async fn store_errors_propagate() {
        for (store, gate) in gates().await {
            store.set_unavailable(true).await;
            assert!(gate.claim(request("1.2.3.4", false)).await.is_err());
        }
    }

    #[test]
    fn policy_parses_from_config_names() {
        assert_eq!("dual_gate".parse::<ClaimPolicy>(), Ok(ClaimPolicy::DualGate));
        assert_eq!("strict".parse::<ClaimPolicy>(), Ok(ClaimPolicy::Strict));
        assert!("STRICT".parse::<ClaimPolicy>().is_err());
        assert_eq!(ClaimPolicy::Strict.to_string(), "strict");
    }
}
