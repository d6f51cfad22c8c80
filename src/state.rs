use std::sync::Arc;

use crate::{
    config::Config,
    gate::{gate_for, ClaimGate},
    store::CouponStore,
};

#[derive(Debug, Clone, Copy)]
pub struct CookieSettings {
    pub max_age_seconds: u64,
    pub secure: bool,
}

impl CookieSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_age_seconds: config.claim_cookie_seconds,
            secure: config.production,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CouponStore>,
    pub gate: Arc<dyn ClaimGate>,
    pub cookie: CookieSettings,
}

impl AppState {
    pub fn new(store: Arc<dyn CouponStore>, config: &Config) -> Self {
        let gate = gate_for(config.claim_policy, store.clone());
        Self::with_gate(store, gate, CookieSettings::from_config(config))
    }

    pub fn with_gate(
        store: Arc<dyn CouponStore>,
        gate: Arc<dyn ClaimGate>,
        cookie: CookieSettings,
    ) -> Self {
        Self {
            store,
            gate,
            cookie,
        }
    }
}
