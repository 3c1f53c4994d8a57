//! Randomized browsing identities.
//!
//! Each crawl session gets one [`Identity`]: an internally-consistent
//! bundle of request signature (user agent, accept-language, locale,
//! timezone), screen/fingerprint profile, and optionally a proxy egress
//! route. Identities are never shared across platforms or reused across
//! queries.

mod profiles;

pub use profiles::{FingerprintProfile, FINGERPRINT_PROFILES};

use crate::config::EngineConfig;
use crate::records::Platform;
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use uuid::Uuid;

/// One browsing identity, valid for a single crawl session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    pub user_agent: String,
    pub accept_language: String,
    pub locale: String,
    pub timezone: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// `navigator.platform` value consistent with the user agent.
    pub platform_hint: String,
    pub languages: Vec<String>,
    pub hardware_concurrency: u32,
    pub webgl_vendor: String,
    pub webgl_renderer: String,
    /// Per-session seed for deterministic canvas noise.
    pub session_seed: String,
    /// Upstream proxy endpoint; None means direct route.
    pub proxy: Option<String>,
    /// False when no egress route was available and the direct route is
    /// used. Callers may choose to skip or proceed.
    pub routed: bool,
}

/// Allocates identities with per-platform recency exclusion.
///
/// The recency window (last N identity profile indices used per platform)
/// is the manager's only shared mutable state and sits behind a mutex;
/// allocation is cheap and never blocks on I/O.
pub struct IdentityManager {
    proxy_pool: Vec<String>,
    recency_window: usize,
    state: Mutex<RecencyState>,
}

#[derive(Default)]
struct RecencyState {
    /// Profile indices recently handed out, per platform.
    recent: HashMap<Platform, VecDeque<usize>>,
    /// Round-robin cursor over the proxy pool.
    next_proxy: usize,
}

impl IdentityManager {
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            proxy_pool: config.proxy_pool().to_vec(),
            recency_window: config.identity_recency_window(),
            state: Mutex::new(RecencyState::default()),
        }
    }

    /// Allocate a fresh identity for a crawl against `platform`.
    ///
    /// The fingerprint profile is drawn at random, excluding the profiles
    /// most recently used for the same platform to reduce fingerprint
    /// correlation. If no proxy is configured the identity still succeeds
    /// with `routed = false`.
    #[must_use]
    pub fn allocate(&self, platform: Platform) -> Identity {
        let (profile_idx, proxy) = {
            let mut state = self.state.lock();
            let recent = state.recent.entry(platform).or_default();
            let idx = pick_excluding(FINGERPRINT_PROFILES.len(), recent);

            recent.push_back(idx);
            while recent.len() > self.recency_window {
                recent.pop_front();
            }

            let proxy = if self.proxy_pool.is_empty() {
                None
            } else {
                let p = self.proxy_pool[state.next_proxy % self.proxy_pool.len()].clone();
                state.next_proxy = state.next_proxy.wrapping_add(1);
                Some(p)
            };
            (idx, proxy)
        };

        let profile = &FINGERPRINT_PROFILES[profile_idx];
        let session_seed: Vec<u8> = (0..16).map(|_| rand::random::<u8>()).collect();
        let routed = proxy.is_some();

        Identity {
            id: Uuid::new_v4(),
            user_agent: profile.user_agent.to_string(),
            accept_language: profile.accept_language.to_string(),
            locale: profile.locale.to_string(),
            timezone: profile.timezone.to_string(),
            viewport_width: profile.viewport.0,
            viewport_height: profile.viewport.1,
            platform_hint: profile.platform_hint.to_string(),
            languages: profile.languages.iter().map(|s| s.to_string()).collect(),
            hardware_concurrency: profile.hardware_concurrency,
            webgl_vendor: profile.webgl_vendor.to_string(),
            webgl_renderer: profile.webgl_renderer.to_string(),
            session_seed: hex_encode(&session_seed),
            proxy,
            routed,
        }
    }
}

/// Random index into `0..len` avoiding the values in `excluded` when the
/// exclusion leaves at least one candidate.
fn pick_excluding(len: usize, excluded: &VecDeque<usize>) -> usize {
    let candidates: Vec<usize> = (0..len).filter(|i| !excluded.contains(i)).collect();
    let mut rng = rand::rng();
    if candidates.is_empty() {
        rng.random_range(0..len)
    } else {
        candidates[rng.random_range(0..candidates.len())]
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
