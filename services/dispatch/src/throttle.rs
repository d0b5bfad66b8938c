//! Scan throttling to slow down code guessing

use common::cache::RedisPool;
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Windows kept by the in-process backend before stale ones are swept
const LOCAL_SWEEP_THRESHOLD: usize = 10_000;

/// Throttle configuration
#[derive(Debug, Clone)]
pub struct ThrottleConfig {
    /// Scan attempts allowed per client within one window; 0 disables throttling
    pub max_attempts: u32,
    /// Window length in seconds
    pub window_seconds: u64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            window_seconds: 60,
        }
    }
}

#[derive(Debug)]
struct Window {
    attempts: u32,
    started: Instant,
}

#[derive(Clone)]
enum Backend {
    /// Counters shared by every instance through Redis
    Redis(RedisPool),
    /// Counters local to this process
    Local(Arc<Mutex<HashMap<String, Window>>>),
}

/// Fixed-window counter of scan attempts per client
#[derive(Clone)]
pub struct ScanThrottle {
    config: ThrottleConfig,
    backend: Backend,
}

impl ScanThrottle {
    /// Throttle whose counters live in this process only
    pub fn local(config: ThrottleConfig) -> Self {
        Self {
            config,
            backend: Backend::Local(Arc::new(Mutex::new(HashMap::new()))),
        }
    }

    /// Throttle shared across instances through Redis
    pub fn redis(config: ThrottleConfig, pool: RedisPool) -> Self {
        Self {
            config,
            backend: Backend::Redis(pool),
        }
    }

    pub fn config(&self) -> &ThrottleConfig {
        &self.config
    }

    /// Count one attempt for `client` and report whether it may proceed.
    ///
    /// Redis failures let the attempt through.
    pub async fn check(&self, client: &str) -> bool {
        if self.config.max_attempts == 0 {
            return true;
        }

        let allowed = match &self.backend {
            Backend::Redis(pool) => {
                let key = format!("scan-throttle:{}", client);
                match pool.hit(&key, self.config.window_seconds).await {
                    Ok(count) => count <= u64::from(self.config.max_attempts),
                    Err(e) => {
                        warn!("Scan throttle unavailable, allowing request: {}", e);
                        true
                    }
                }
            }
            Backend::Local(windows) => {
                let mut windows = windows.lock().await;
                record(&mut windows, client, Instant::now(), &self.config)
            }
        };

        if !allowed {
            info!(client, "Scan attempt throttled");
        }
        allowed
    }
}

fn record(
    windows: &mut HashMap<String, Window>,
    client: &str,
    now: Instant,
    config: &ThrottleConfig,
) -> bool {
    let length = Duration::from_secs(config.window_seconds);

    if windows.len() >= LOCAL_SWEEP_THRESHOLD {
        windows.retain(|_, w| now.duration_since(w.started) < length);
    }

    let window = windows.entry(client.to_string()).or_insert(Window {
        attempts: 0,
        started: now,
    });

    if now.duration_since(window.started) >= length {
        window.attempts = 0;
        window.started = now;
    }

    window.attempts = window.attempts.saturating_add(1);
    window.attempts <= config.max_attempts
}
