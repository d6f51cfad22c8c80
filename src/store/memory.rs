use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{CouponStore, StoreError};
use crate::models::{ClaimOutcome, Coupon};

/// In-process store. Every operation runs under one lock, so claims are
/// trivially atomic.
#[derive(Default)]
pub struct MemoryCouponStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    coupons: BTreeMap<i32, Coupon>,
    next_id: i32,
    unavailable: bool,
}

impl Inner {
    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable {
            return Err(StoreError::Unavailable("memory store switched off".to_string()));
        }
        Ok(())
    }

    fn find_claim_by(&self, identity: &str) -> Option<Coupon> {
        self.coupons
            .values()
            .find(|c| c.is_claimed && c.claimed_by.as_deref() == Some(identity))
            .cloned()
    }

    fn claim_next(&mut self, identity: &str) -> Option<Coupon> {
        let coupon = self.coupons.values_mut().find(|c| !c.is_claimed)?;
        coupon.is_claimed = true;
        coupon.claimed_by = Some(identity.to_string());
        Some(coupon.clone())
    }
}

impl MemoryCouponStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn with_codes<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let store = Self::new();
        for code in codes {
            store.insert(code).await;
        }
        store
    }

    /// Provisions an unclaimed coupon.
    pub async fn insert(&self, code: impl Into<String>) -> Coupon {
        let mut inner = self.inner.lock().await;
        inner.next_id += 1;
        let coupon = Coupon {
            id: inner.next_id,
            code: code.into(),
            is_claimed: false,
            claimed_by: None,
        };
        inner.coupons.insert(coupon.id, coupon.clone());
        coupon
    }

    /// Makes every subsequent operation fail until switched back.
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.inner.lock().await.unavailable = unavailable;
    }

    pub async fn snapshot(&self) -> Vec<Coupon> {
        self.inner.lock().await.coupons.values().cloned().collect()
    }
}

#[async_trait]
impl CouponStore for MemoryCouponStore {
    async fn list_unclaimed(&self) -> Result<Vec<Coupon>, StoreError> {
        let inner = self.inner.lock().await;
        inner.check()?;
        Ok(inner
            .coupons
            .values()
            .filter(|c| !c.is_claimed)
            .cloned()
            .collect())
    }

    async fn find_claim_by(&self, identity: &str) -> Result<Option<Coupon>, StoreError> {
        let inner = self.inner.lock().await;
        inner.check()?;
        Ok(inner.find_claim_by(identity))
    }

    async fn claim_next(&self, identity: &str) -> Result<Option<Coupon>, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.check()?;
        Ok(inner.claim_next(identity))
    }

    async fn claim_exclusive(&self, identity: &str) -> Result<ClaimOutcome, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.check()?;
        if inner.find_claim_by(identity).is_some() {
            return Ok(ClaimOutcome::AlreadyClaimed);
        }
        Ok(match inner.claim_next(identity) {
            Some(coupon) => ClaimOutcome::Claimed(coupon),
            None => ClaimOutcome::Exhausted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn claims_lowest_id_first() {
        let store = MemoryCouponStore::with_codes(["A", "B"]).await;
        let first = store.claim_next("1.2.3.4").await.unwrap().unwrap();
        assert_eq!(first.code, "A");
        assert!(first.is_claimed);
        assert_eq!(first.claimed_by.as_deref(), Some("1.2.3.4"));

        let second = store.claim_next("5.6.7.8").await.unwrap().unwrap();
        assert_eq!(second.code, "B");
        assert!(store.claim_next("9.9.9.9").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn listing_hides_claimed_rows() {
        let store = MemoryCouponStore::with_codes(["A", "B", "C"]).await;
        store.claim_next("1.2.3.4").await.unwrap();
        let codes: Vec<_> = store
            .list_unclaimed()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.code)
            .collect();
        assert_eq!(codes, vec!["B", "C"]);
    }

    #[tokio::test]
    async fn claimed_by_tracks_claim_flag() {
        let store = MemoryCouponStore::with_codes(["A", "B"]).await;
        store.claim_next("1.2.3.4").await.unwrap();
        for coupon in store.snapshot().await {
            assert_eq!(coupon.is_claimed, coupon.claimed_by.is_some());
        }
    }

    #[tokio::test]
    async fn find_claim_by_matches_owner_only() {
        let store = MemoryCouponStore::with_codes(["A"]).await;
        assert!(store.find_claim_by("1.2.3.4").await.unwrap().is_none());
        store.claim_next("1.2.3.4").await.unwrap();
        assert!(store.find_claim_by("1.2.3.4").await.unwrap().is_some());
        assert!(store.find_claim_by("5.6.7.8").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn exclusive_claim_refuses_second_coupon() {
        let store = MemoryCouponStore::with_codes(["A", "B"]).await;
        assert!(matches!(
            store.claim_exclusive("1.2.3.4").await.unwrap(),
            ClaimOutcome::Claimed(_)
        ));
        assert_eq!(
            store.claim_exclusive("1.2.3.4").await.unwrap(),
            ClaimOutcome::AlreadyClaimed
        );
        assert!(matches!(
            store.claim_exclusive("5.6.7.8").await.unwrap(),
            ClaimOutcome::Claimed(_)
        ));
        assert_eq!(
            store.claim_exclusive("9.9.9.9").await.unwrap(),
            ClaimOutcome::Exhausted
        );
    }

    #[tokio::test]
    async fn unavailable_store_errors() {
        let store = MemoryCouponStore::with_codes(["A"]).await;
        store.set_unavailable(true).await;
        assert!(store.list_unclaimed().await.is_err());
        assert!(store.claim_next("1.2.3.4").await.is_err());
        store.set_unavailable(false).await;
        assert_eq!(store.list_unclaimed().await.unwrap().len(), 1);
    }
}
