use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::config::AppConfig;

/// time source for the limiter, swapped for a manual clock in tests
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        *offset += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// requests a client may make per window, 0 turns limiting off
    pub max_requests_per_window: u32,
    pub window_seconds: u64,
    /// cap on tracked clients, the least recently active one is dropped past it. 0 means no cap
    pub max_clients: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests_per_window: 20,
            window_seconds: 60,
            max_clients: 100_000,
        }
    }
}

impl From<&AppConfig> for RateLimitConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_requests_per_window: config.rate_limit_max_requests,
            window_seconds: config.rate_limit_window_seconds,
            max_clients: config.rate_limit_max_clients,
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }

    pub fn is_disabled(&self) -> bool {
        self.max_requests_per_window == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitResult {
    Allowed { remaining: u32 },
    RateLimited { retry_after: u64 },
}

pub type DynRateLimitService = Arc<dyn RateLimitServiceTrait + Send + Sync>;

#[async_trait::async_trait]
pub trait RateLimitServiceTrait {
    /// admit or reject one request from `client_id`, an admitted request is recorded
    async fn check_rate_limit(&self, client_id: &str) -> RateLimitResult;

    /// drop clients with no requests left inside the window, returns how many went
    async fn sweep(&self) -> usize;

    async fn tracked_clients(&self) -> usize;

    fn config(&self) -> &RateLimitConfig;
}

#[derive(Debug)]
struct ClientWindow {
    hits: VecDeque<Instant>,
    last_seen: Instant,
}

/// per-client windows plus an index ordered by last activity, so the least recently active
/// client is found without scanning every window
#[derive(Debug, Default)]
struct ClientWindows {
    clients: HashMap<String, ClientWindow>,
    recency: BTreeSet<(Instant, String)>,
}

impl ClientWindows {
    fn touch(&mut self, client_id: &str, now: Instant) -> &mut ClientWindow {
        self.recency.insert((now, client_id.to_string()));

        match self.clients.entry(client_id.to_string()) {
            Entry::Occupied(entry) => {
                let client = entry.into_mut();
                if client.last_seen != now {
                    self.recency
                        .remove(&(client.last_seen, client_id.to_string()));
                    client.last_seen = now;
                }
                client
            }
            Entry::Vacant(entry) => entry.insert(ClientWindow {
                hits: VecDeque::new(),
                last_seen: now,
            }),
        }
    }

    fn evict_least_recent(&mut self) -> Option<String> {
        let (_, victim) = self.recency.pop_first()?;
        self.clients.remove(&victim);
        Some(victim)
    }

    fn sweep(&mut self, now: Instant, window: Duration) -> usize {
        let before = self.clients.len();
        let Self { clients, recency } = self;
        clients.retain(|client_id, client| {
            prune(&mut client.hits, now, window);
            if client.hits.is_empty() {
                recency.remove(&(client.last_seen, client_id.clone()));
                false
            } else {
                true
            }
        });
        before - clients.len()
    }
}

/// sliding window per client, kept in process memory. every admitted request's instant is stored
/// and requests older than the window are pruned whenever that client is looked at
pub struct MemoryRateLimitService {
    windows: Mutex<ClientWindows>,
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
}

impl MemoryRateLimitService {
    pub fn new(config: RateLimitConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            windows: Mutex::new(ClientWindows::default()),
            config,
            clock,
        }
    }

    /// true when the request is admitted
    pub fn admit(&self, client_id: &str, now: Instant) -> bool {
        matches!(
            self.check_at(client_id, now),
            RateLimitResult::Allowed { .. }
        )
    }

    pub fn check_at(&self, client_id: &str, now: Instant) -> RateLimitResult {
        if self.config.is_disabled() {
            return RateLimitResult::Allowed {
                remaining: u32::MAX,
            };
        }

        let window = self.config.window();
        let limit = self.config.max_requests_per_window as usize;
        // a poisoned lock still holds consistent timestamps, keep limiting with it
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);

        if self.config.max_clients > 0 && !windows.clients.contains_key(client_id) {
            while windows.clients.len() >= self.config.max_clients {
                let tracked = windows.clients.len();
                let Some(victim) = windows.evict_least_recent() else {
                    break;
                };
                warn!(
                    "Rate limiter tracking {} clients, evicting {}",
                    tracked, victim
                );
            }
        }

        // rejected requests still count as activity, evicting a client that keeps hammering
        // would hand it a fresh window
        let client = windows.touch(client_id, now);
        prune(&mut client.hits, now, window);

        if client.hits.len() >= limit {
            let oldest = client.hits.front().copied().unwrap_or(now);
            let retry_after = ceil_secs(window.saturating_sub(now.saturating_duration_since(oldest)));
            debug!(
                "Client {} rate limited: {} requests in window",
                client_id,
                client.hits.len()
            );
            return RateLimitResult::RateLimited { retry_after };
        }

        client.hits.push_back(now);

        RateLimitResult::Allowed {
            remaining: (limit - client.hits.len()) as u32,
        }
    }

    pub fn sweep_at(&self, now: Instant) -> usize {
        let window = self.config.window();
        self.windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .sweep(now, window)
    }
}

fn prune(timestamps: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while timestamps
        .front()
        .is_some_and(|t| now.saturating_duration_since(*t) >= window)
    {
        timestamps.pop_front();
    }
}

fn ceil_secs(d: Duration) -> u64 {
    let secs = d.as_secs() + u64::from(d.subsec_nanos() > 0);
    secs.max(1)
}

#[async_trait::async_trait]
impl RateLimitServiceTrait for MemoryRateLimitService {
    async fn check_rate_limit(&self, client_id: &str) -> RateLimitResult {
        self.check_at(client_id, self.clock.now())
    }

    async fn sweep(&self) -> usize {
        self.sweep_at(self.clock.now())
    }

    async fn tracked_clients(&self) -> usize {
        self.windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clients
            .len()
    }

    fn config(&self) -> &RateLimitConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max: u32, window_seconds: u64) -> MemoryRateLimitService {
        MemoryRateLimitService::new(RateLimitConfig {
            max_requests_per_window: max,
            window_seconds,
            max_clients: 100,
        })
    }

    #[test]
    fn admits_up_to_the_limit_then_rejects() {
        let limiter = limiter(3, 60);
        let t0 = Instant::now();

        assert!(limiter.admit("a", t0));
        assert!(limiter.admit("a", t0));
        assert!(limiter.admit("a", t0));
        assert!(!limiter.admit("a", t0));
        // other clients have their own window
        assert!(limiter.admit("b", t0));
    }

    #[test]
    fn reports_remaining_and_retry_after() {
        let limiter = limiter(2, 60);
        let t0 = Instant::now();

        assert_eq!(
            limiter.check_at("a", t0),
            RateLimitResult::Allowed { remaining: 1 }
        );
        assert_eq!(
            limiter.check_at("a", t0 + Duration::from_secs(10)),
            RateLimitResult::Allowed { remaining: 0 }
        );
        assert_eq!(
            limiter.check_at("a", t0 + Duration::from_millis(20_500)),
            RateLimitResult::RateLimited { retry_after: 40 }
        );
    }

    #[test]
    fn window_slides_per_request() {
        let limiter = limiter(2, 60);
        let t0 = Instant::now();

        assert!(limiter.admit("a", t0));
        assert!(limiter.admit("a", t0 + Duration::from_secs(30)));
        assert!(!limiter.admit("a", t0 + Duration::from_secs(59)));
        // the first request is exactly one window old and no longer counts
        assert!(limiter.admit("a", t0 + Duration::from_secs(60)));
        assert!(!limiter.admit("a", t0 + Duration::from_secs(61)));
        assert!(limiter.admit("a", t0 + Duration::from_secs(90)));
    }

    #[test]
    fn rejected_requests_are_not_recorded() {
        let limiter = limiter(1, 60);
        let t0 = Instant::now();

        assert!(limiter.admit("a", t0));
        for s in 1..50 {
            assert!(!limiter.admit("a", t0 + Duration::from_secs(s)));
        }
        assert!(limiter.admit("a", t0 + Duration::from_secs(60)));
    }

    #[test]
    fn zero_limit_disables_limiting() {
        let limiter = limiter(0, 60);
        let t0 = Instant::now();

        for _ in 0..1000 {
            assert!(limiter.admit("a", t0));
        }
    }

    #[test]
    fn sweep_drops_idle_clients_only() {
        let limiter = limiter(5, 60);
        let t0 = Instant::now();

        limiter.admit("idle", t0);
        limiter.admit("busy", t0 + Duration::from_secs(50));

        assert_eq!(limiter.sweep_at(t0 + Duration::from_secs(70)), 1);
        let windows = limiter.windows.lock().unwrap();
        assert_eq!(windows.clients.len(), 1);
        assert!(windows.clients.contains_key("busy"));
        assert_eq!(windows.recency.len(), 1);
    }

    #[test]
    fn evicts_least_recently_active_client_at_capacity() {
        let limiter = MemoryRateLimitService::new(RateLimitConfig {
            max_requests_per_window: 5,
            window_seconds: 60,
            max_clients: 2,
        });
        let t0 = Instant::now();

        limiter.admit("first", t0);
        limiter.admit("second", t0 + Duration::from_secs(1));
        limiter.admit("first", t0 + Duration::from_secs(2));
        limiter.admit("third", t0 + Duration::from_secs(3));

        let windows = limiter.windows.lock().unwrap();
        assert_eq!(windows.clients.len(), 2);
        assert!(windows.clients.contains_key("first"));
        assert!(windows.clients.contains_key("third"));
        assert_eq!(windows.recency.len(), 2);
    }

    #[test]
    fn limited_clients_stay_tracked_while_they_keep_asking() {
        let limiter = MemoryRateLimitService::new(RateLimitConfig {
            max_requests_per_window: 1,
            window_seconds: 60,
            max_clients: 2,
        });
        let t0 = Instant::now();

        assert!(limiter.admit("noisy", t0));
        assert!(limiter.admit("quiet", t0 + Duration::from_secs(1)));
        assert!(!limiter.admit("noisy", t0 + Duration::from_secs(2)));
        assert!(limiter.admit("new", t0 + Duration::from_secs(3)));

        // quiet went, noisy is still inside its window
        assert!(!limiter.admit("noisy", t0 + Duration::from_secs(4)));
        let windows = limiter.windows.lock().unwrap();
        assert!(!windows.clients.contains_key("quiet"));
    }

    #[test]
    fn eviction_walks_clients_in_activity_order() {
        let limiter = MemoryRateLimitService::new(RateLimitConfig {
            max_requests_per_window: 5,
            window_seconds: 600,
            max_clients: 1000,
        });
        let t0 = Instant::now();

        for i in 0..1000u64 {
            limiter.admit(&format!("198.51.100.{}", i), t0 + Duration::from_millis(i));
        }
        // the oldest ten come back and become the most recent
        for i in 0..10u64 {
            limiter.admit(&format!("198.51.100.{}", i), t0 + Duration::from_secs(10 + i));
        }
        for i in 0..20u64 {
            limiter.admit(&format!("203.0.113.{}", i), t0 + Duration::from_secs(30 + i));
        }

        let windows = limiter.windows.lock().unwrap();
        assert_eq!(windows.clients.len(), 1000);
        assert_eq!(windows.recency.len(), 1000);
        for i in 0..10 {
            assert!(windows.clients.contains_key(&format!("198.51.100.{}", i)));
        }
        for i in 10..30 {
            assert!(!windows.clients.contains_key(&format!("198.51.100.{}", i)));
        }
        assert!(windows.clients.contains_key("198.51.100.30"));
        assert!(windows.clients.contains_key("203.0.113.19"));
    }

    #[test]
    fn manual_clock_moves_only_when_advanced() {
        let clock = ManualClock::new();
        let t0 = clock.now();
        assert_eq!(clock.now(), t0);

        clock.advance(Duration::from_secs(5));
        assert_eq!(clock.now() - t0, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn trait_methods_use_the_injected_clock() {
        let clock = Arc::new(ManualClock::new());
        let limiter = MemoryRateLimitService::with_clock(
            RateLimitConfig {
                max_requests_per_window: 1,
                window_seconds: 60,
                max_clients: 10,
            },
            clock.clone(),
        );

        assert!(matches!(
            limiter.check_rate_limit("a").await,
            RateLimitResult::Allowed { .. }
        ));
        assert_eq!(
            limiter.check_rate_limit("a").await,
            RateLimitResult::RateLimited { retry_after: 60 }
        );

        clock.advance(Duration::from_secs(60));
        assert_eq!(limiter.sweep().await, 1);
        assert_eq!(limiter.tracked_clients().await, 0);
    }
}
