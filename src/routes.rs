use axum::{extract::State, response::Json};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use tracing::info;

use crate::{
    error::AppError,
    gate::ClaimRequest,
    identity::ClientIdentity,
    models::{ClaimOutcome, ClaimResponse, Coupon},
    state::{AppState, CookieSettings},
};

pub const CLAIM_COOKIE: &str = "couponClaimed";

pub async fn root_handler() -> &'static str {
    "Coupon backend is live"
}

pub async fn coupons_handler(State(state): State<AppState>) -> Result<Json<Vec<Coupon>>, AppError> {
    let coupons = state.store.list_unclaimed().await?;
    Ok(Json(coupons))
}

pub async fn claim_handler(
    State(state): State<AppState>,
    identity: ClientIdentity,
    jar: CookieJar,
) -> Result<(CookieJar, Json<ClaimResponse>), AppError> {
    let has_claim_cookie = jar
        .get(CLAIM_COOKIE)
        .is_some_and(|cookie| !cookie.value().is_empty());
    info!("Claim request from {}", identity.as_str());

    let request = ClaimRequest {
        identity: identity.as_str(),
        has_claim_cookie,
    };

    match state.gate.claim(request).await? {
        ClaimOutcome::Claimed(coupon) => {
            info!("Coupon {} claimed by {}", coupon.id, identity.as_str());
            let jar = jar.add(claim_cookie(state.cookie));
            Ok((
                jar,
                Json(ClaimResponse {
                    message: "Coupon claimed successfully!".to_string(),
                    coupon,
                }),
            ))
        }
        ClaimOutcome::AlreadyClaimed => Err(AppError::RateLimited),
        ClaimOutcome::Exhausted => {
            info!("No coupons left for {}", identity.as_str());
            Err(AppError::Exhausted)
        }
    }
}

fn claim_cookie(settings: CookieSettings) -> Cookie<'static> {
    let max_age = i64::try_from(settings.max_age_seconds).unwrap_or(i64::MAX);
    Cookie::build((CLAIM_COOKIE, "true"))
        .path("/")
        .max_age(time::Duration::seconds(max_age))
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(settings.secure)
        .build()
}
