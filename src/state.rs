//! Shared application state for Axum handlers.
//!
//! - **Pipeline**: rate limiter, authenticator, cache and upstream client
//! - **Trusted proxies**: parsed `TRUSTED_PROXIES` ranges for identity
//! - **Configuration**: runtime configuration access
//!
//! # Structured Concurrency
//!
//! Background sweeps are managed using `tokio_util::task::TaskTracker` and
//! `CancellationToken`. Call `shutdown()` to stop them before exit.
//!
//! | Task              | Period                    | Effect                          |
//! |-------------------|---------------------------|---------------------------------|
//! | cache sweep       | `CACHE_CHECK_PERIOD_SECS` | purge expired cache entries     |
//! | limiter eviction  | `RATE_LIMIT_WINDOW_MS`    | drop ended rate-limit windows   |
//!
//! Sweeps only reclaim memory: reads already treat expired entries as absent.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use crate::config::Config;
use crate::middleware::TrustedProxyConfig;
use crate::pipeline::ProxyPipeline;
use crate::upstream::UpstreamClient;

/// Shared application state for Axum handlers.
///
/// Cloned per request; everything inside is behind an `Arc`.
///
/// ```rust,ignore
/// let state = AppState::new(config, UpstreamClient::new()?);
/// // ... serve ...
/// state.shutdown().await;
/// ```
#[derive(Clone)]
pub struct AppState {
    /// The request pipeline and its stores
    pub pipeline: Arc<ProxyPipeline>,
    /// Networks whose forwarded headers are trusted
    pub trusted_proxies: Arc<TrustedProxyConfig>,
    /// Timestamp when the application started
    pub started_at: Instant,
    /// Application configuration
    pub config: Arc<Config>,
    /// Tracks spawned background tasks for graceful shutdown
    task_tracker: TaskTracker,
    /// Cancellation token for signaling background tasks to stop
    cancellation_token: CancellationToken,
}

impl AppState {
    /// Build state with fresh, empty stores and start the background sweeps.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn new(config: Config, upstream: UpstreamClient) -> Self {
        let pipeline = Arc::new(ProxyPipeline::new(&config, upstream));
        let trusted_proxies = Arc::new(TrustedProxyConfig::new(&config.trusted_proxies));

        let state = Self {
            pipeline,
            trusted_proxies,
            started_at: Instant::now(),
            config: Arc::new(config),
            task_tracker: TaskTracker::new(),
            cancellation_token: CancellationToken::new(),
        };

        if state.config.cache_sweep_enabled() {
            state.spawn_cache_sweep_task(state.config.cache_check_period);
        } else {
            info!("Background cache sweep disabled (CACHE_CHECK_PERIOD_SECS=0)");
        }
        let window = state.pipeline.rate_limit_window();
        if !window.is_zero() {
            state.spawn_limiter_eviction_task(window);
        }

        state
    }

    /// Spawn the periodic purge of expired cache entries.
    fn spawn_cache_sweep_task(&self, period: Duration) {
        let pipeline = self.pipeline.clone();
        let cancel = self.cancellation_token.clone();

        self.task_tracker.spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await; // Skip the first immediate tick

            loop {
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => {
                        debug!("Cache sweep task received cancellation signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        let purged = pipeline.purge_cache();
                        if purged > 0 {
                            debug!(purged, "Purged expired cache entries");
                        }
                    }
                }
            }

            debug!("Cache sweep task shutting down");
        });
    }

    /// Spawn the periodic eviction of ended rate-limit windows.
    fn spawn_limiter_eviction_task(&self, period: Duration) {
        let pipeline = self.pipeline.clone();
        let cancel = self.cancellation_token.clone();

        self.task_tracker.spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => {
                        debug!("Limiter eviction task received cancellation signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        let evicted = pipeline.evict_idle_clients();
                        if evicted > 0 {
                            debug!(evicted, "Evicted idle rate-limit windows");
                        }
                    }
                }
            }

            debug!("Limiter eviction task shutting down");
        });
    }

    /// Gracefully shutdown all background tasks.
    ///
    /// Signals cancellation, closes the tracker and waits for every task.
    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown of background tasks");

        self.cancellation_token.cancel();
        self.task_tracker.close();
        self.task_tracker.wait().await;

        info!("All background tasks have completed");
    }

    /// Get the application uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            api_key: Some("secret".to_string()),
            trusted_proxies: vec!["10.0.0.0/8".to_string()],
            cache_check_period: Duration::from_millis(20),
            rate_limit_window: Duration::from_millis(20),
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_new_state_is_empty() {
        let state = AppState::new(config(), UpstreamClient::new().unwrap());

        let stats = state.pipeline.stats(state.uptime_seconds());
        assert_eq!(stats.cache_entries, 0);
        assert_eq!(stats.tracked_clients, 0);
        assert!(state.trusted_proxies.is_enabled());

        state.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_stops_tasks() {
        let state = AppState::new(config(), UpstreamClient::new().unwrap());

        tokio::time::timeout(Duration::from_secs(2), state.shutdown())
            .await
            .expect("background tasks should stop promptly");
    }

    #[tokio::test]
    async fn test_shutdown_with_sweep_disabled() {
        let state = AppState::new(
            Config {
                cache_check_period: Duration::ZERO,
                ..config()
            },
            UpstreamClient::new().unwrap(),
        );

        state.shutdown().await;
    }
}
