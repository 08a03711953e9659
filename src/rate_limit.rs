use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use actix_web::HttpRequest;
use dashmap::DashMap;

/// Sliding window in-memory rate limiter (process local).
#[derive(Clone)]
pub struct InMemoryRateLimiter {
    store: Arc<DashMap<String, VecDeque<Instant>>>,
    pub enabled: bool,
}

impl InMemoryRateLimiter {
    pub fn new(enabled: bool) -> Self {
        Self { store: Arc::new(DashMap::new()), enabled }
    }

    /// Returns true if allowed, false if limited.
    pub fn check(&self, key: &str, limit: usize, window: Duration) -> bool {
        if !self.enabled { return true; }
        let now = Instant::now();
        let mut entry = self.store.entry(key.to_string()).or_default();
        while let Some(front) = entry.front() {
            if now.duration_since(*front) >= window { entry.pop_front(); } else { break; }
        }
        if entry.len() < limit {
            entry.push_back(now);
            true
        } else {
            false
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Quota {
    pub limit: usize,
    pub window: Duration,
}

impl Quota {
    pub const fn new(limit: usize, window_secs: u64) -> Self {
        Self { limit, window: Duration::from_secs(window_secs) }
    }
}

/// Per-action quotas, overridable through `RL_<ACTION>_LIMIT` and
/// `RL_<ACTION>_WINDOW` (seconds).
#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    pub login: Quota,
    pub signup: Quota,
    pub otp: Quota,
    pub post: Quota,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            login: Quota::new(10, 60),
            signup: Quota::new(5, 3600),
            otp: Quota::new(5, 600),
            post: Quota::new(10, 300),
        }
    }
}

impl RateLimitConfig {
    pub fn from_env() -> Self {
        fn quota(action: &str, default: Quota) -> Quota {
            let limit = std::env::var(format!("RL_{action}_LIMIT")).ok().and_then(|v| v.parse().ok()).unwrap_or(default.limit);
            let window = std::env::var(format!("RL_{action}_WINDOW")).ok().and_then(|v| v.parse().ok()).map(Duration::from_secs).unwrap_or(default.window);
            Quota { limit, window }
        }
        let d = Self::default();
        Self {
            login: quota("LOGIN", d.login),
            signup: quota("SIGNUP", d.signup),
            otp: quota("OTP", d.otp),
            post: quota("POST", d.post),
        }
    }
}

/// High level guard used by handlers.
#[derive(Clone)]
pub struct RateLimiterFacade {
    pub limiter: InMemoryRateLimiter,
    pub cfg: RateLimitConfig,
}

impl RateLimiterFacade {
    pub fn new(limiter: InMemoryRateLimiter, cfg: RateLimitConfig) -> Self { Self { limiter, cfg } }

    /// A facade that lets everything through.
    pub fn disabled() -> Self { Self::new(InMemoryRateLimiter::new(false), RateLimitConfig::default()) }

    fn allow(&self, action: &str, who: &str, q: Quota) -> bool {
        self.limiter.check(&format!("{action}:{who}"), q.limit, q.window)
    }

    pub fn allow_login(&self, ip: &str) -> bool { self.allow("login", ip, self.cfg.login) }
    pub fn allow_signup(&self, ip: &str) -> bool { self.allow("signup", ip, self.cfg.signup) }
    pub fn allow_otp(&self, email: &str) -> bool { self.allow("otp", email, self.cfg.otp) }
    pub fn allow_post(&self, user: &str) -> bool { self.allow("post", user, self.cfg.post) }
}

/// Best-effort client address for keying limits.
pub fn client_ip(req: &HttpRequest) -> String {
    req.connection_info().realip_remote_addr().unwrap_or("unknown").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn sliding_window_basic() {
        let rl = InMemoryRateLimiter::new(true);
        let window = Duration::from_millis(50);
        for _ in 0..3 { assert!(rl.check("k", 3, window)); }
        assert!(!rl.check("k", 3, window));
        std::thread::sleep(Duration::from_millis(60));
        assert!(rl.check("k", 3, window));
    }

    #[test]
    fn actions_are_counted_separately() {
        let cfg = RateLimitConfig { login: Quota::new(1, 60), ..RateLimitConfig::default() };
        let f = RateLimiterFacade::new(InMemoryRateLimiter::new(true), cfg);
        assert!(f.allow_login("1.2.3.4"));
        assert!(!f.allow_login("1.2.3.4"));
        assert!(f.allow_login("5.6.7.8"));
        assert!(f.allow_signup("1.2.3.4"));
    }

    #[test]
    fn disabled_facade_never_limits() {
        let f = RateLimiterFacade::disabled();
        for _ in 0..100 { assert!(f.allow_otp("a@b.c")); }
    }
}
