//! Rate limiting for mutation routes
//!
//! Counters are process-local and best effort. They only throttle abusive
//! call rates; nothing depends on them for correctness, and a restart
//! resets them.

use axum::{
    body::Body,
    extract::{MatchedPath, State},
    http::{Method, Request},
    middleware::Next,
    response::Response,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use core_kernel::UserId;

use crate::auth::CurrentUser;
use crate::error::ApiError;
use crate::AppState;

/// Family of write operations that share one limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Allocation,
    Bill,
    BulkBill,
    Payment,
    BulkPayment,
}

impl MutationKind {
    /// Classifies a mutation route by its path template
    pub fn for_route(path: &str) -> Self {
        if path.contains("/allocations") {
            MutationKind::Allocation
        } else if path.ends_with("/bills/bulk") {
            MutationKind::BulkBill
        } else if path.contains("/bulk") {
            MutationKind::BulkPayment
        } else if path.contains("/charges") || path.contains("/payments") {
            MutationKind::Payment
        } else {
            MutationKind::Bill
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RateLimitKey {
    pub user: UserId,
    pub kind: MutationKind,
}

impl RateLimitKey {
    pub fn new(user: UserId, kind: MutationKind) -> Self {
        Self { user, kind }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed { remaining: u32 },
    Limited { retry_after_secs: u64 },
}

impl RateLimitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitDecision::Allowed { .. })
    }
}

/// Decides whether one more call under `key` may proceed
pub trait RateLimiter: Send + Sync {
    fn check(&self, key: RateLimitKey) -> RateLimitDecision;

    /// Drops windows that have ended, returning how many were removed
    fn evict_expired(&self) -> usize;
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Counts calls per key in fixed windows of `window` length
#[derive(Debug)]
pub struct FixedWindowRateLimiter {
    max_requests: u32,
    window: Duration,
    windows: Mutex<HashMap<RateLimitKey, Window>>,
}

impl FixedWindowRateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Number of live windows
    pub fn tracked(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<RateLimitKey, Window>> {
        // A panic mid-update leaves at worst a stale counter
        self.windows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn check_at(&self, key: RateLimitKey, now: Instant) -> RateLimitDecision {
        let mut windows = self.lock();
        let window = windows.entry(key).or_insert(Window { started: now, count: 0 });

        if now.duration_since(window.started) >= self.window {
            *window = Window { started: now, count: 0 };
        }

        if window.count >= self.max_requests {
            let elapsed = now.duration_since(window.started);
            let retry_after = self.window.saturating_sub(elapsed);
            // Round up so a client that waits the advertised time gets through
            let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            return RateLimitDecision::Limited {
                retry_after_secs: secs.max(1),
            };
        }

        window.count += 1;
        RateLimitDecision::Allowed {
            remaining: self.max_requests - window.count,
        }
    }

    pub(crate) fn evict_expired_at(&self, now: Instant) -> usize {
        let mut windows = self.lock();
        let before = windows.len();
        windows.retain(|_, w| now.duration_since(w.started) < self.window);
        before - windows.len()
    }
}

impl RateLimiter for FixedWindowRateLimiter {
    fn check(&self, key: RateLimitKey) -> RateLimitDecision {
        self.check_at(key, Instant::now())
    }

    fn evict_expired(&self) -> usize {
        self.evict_expired_at(Instant::now())
    }
}

/// Throttles mutating requests per caller and mutation kind
///
/// Must run after `auth_middleware` so the caller is known. Reads pass
/// straight through.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    if request.method() == Method::GET {
        return Ok(next.run(request).await);
    }

    let user = request
        .extensions()
        .get::<CurrentUser>()
        .copied()
        .ok_or(ApiError::Unauthorized)?;
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let kind = MutationKind::for_route(&path);

    match state.rate_limiter.check(RateLimitKey::new(user.0, kind)) {
        RateLimitDecision::Allowed { remaining } => {
            debug!(user = %user.0, ?kind, remaining, "Rate limit check passed");
            Ok(next.run(request).await)
        }
        RateLimitDecision::Limited { retry_after_secs } => {
            warn!(user = %user.0, ?kind, retry_after_secs, "Rate limited");
            Err(ApiError::RateLimited { retry_after_secs })
        }
    }
}
