//! Daemon assembly: builds the whole control plane from a [`FleetConfig`].
//!
//! Startup lays out the config directory, drops fragments left by a
//! previous run (registrations live in memory only), and writes an
//! effective config holding just the base template. The proxy is not
//! reloaded until the first registration.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{debug, info};

use fleet_autoscale::{
    render_prometheus, AutoScaleController, CycleReport, SignalCallback, SignalFuture,
};
use fleet_core::{FleetConfig, ScaleSignal};
use fleet_proxy::{
    initialize_layout, FragmentStore, ProxyControl, ReloadCoordinator, ServiceProxyControl,
};
use fleet_stats::{SocketStatsFeed, StatsFeed};

use crate::manager::{FleetManager, ManagerSettings};

pub struct Daemon {
    manager: Arc<FleetManager>,
    autoscaler: Arc<AutoScaleController>,
    poll_interval: Duration,
}

impl Daemon {
    /// Assemble against the proxy's stats socket and the system service manager.
    pub fn from_config(config: &FleetConfig) -> anyhow::Result<Self> {
        let feed = Arc::new(SocketStatsFeed::new(&config.proxy.stats_socket));
        let control = Arc::new(ServiceProxyControl::new(&config.proxy.service_name));
        Self::with_parts(config, feed, control, log_signal())
    }

    /// Assemble with an explicit feed, proxy control, and signal sink.
    pub fn with_parts(
        config: &FleetConfig,
        feed: Arc<dyn StatsFeed>,
        control: Arc<dyn ProxyControl>,
        on_signal: SignalCallback,
    ) -> anyhow::Result<Self> {
        config.validate().context("invalid fleet config")?;
        let proxy = &config.proxy;
        let poll_interval = config.autoscale.poll_interval()?;
        let feed_timeout = config.autoscale.feed_timeout()?;

        let sites_dir = proxy.sites_dir();
        let base_path = proxy.base_config_path();
        initialize_layout(&sites_dir, &base_path, &proxy.stats_socket, proxy.overwrite_base)
            .context("initializing proxy config layout")?;

        let store = FragmentStore::open(&sites_dir)?;
        let stale = store.clear()?;
        if stale > 0 {
            info!(stale, dir = %sites_dir.display(), "removed fragments from a previous run");
        }
        let coordinator =
            ReloadCoordinator::new(store, base_path, proxy.main_config_path(), control);
        coordinator
            .write_effective()
            .context("writing initial proxy config")?;

        let autoscaler = Arc::new(
            AutoScaleController::new(feed, feed_timeout)
                .with_proxy_prefix(proxy.app_prefix.clone())
                .with_signal_fn(on_signal),
        );
        let manager = Arc::new(FleetManager::new(
            coordinator,
            autoscaler.clone(),
            ManagerSettings::from_config(config),
        ));

        info!(
            config_dir = %proxy.config_dir.display(),
            poll_interval_ms = poll_interval.as_millis() as u64,
            feed_timeout_ms = feed_timeout.as_millis() as u64,
            "fleet daemon assembled"
        );
        Ok(Self {
            manager,
            autoscaler,
            poll_interval,
        })
    }

    pub fn manager(&self) -> &Arc<FleetManager> {
        &self.manager
    }

    pub fn autoscaler(&self) -> &Arc<AutoScaleController> {
        &self.autoscaler
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Most recent decision per application.
    pub async fn latest_reports(&self) -> Vec<CycleReport> {
        self.autoscaler.latest_reports().await
    }

    /// Latest decisions in Prometheus text format.
    pub async fn metrics_text(&self) -> String {
        render_prometheus(&self.autoscaler.latest_reports().await)
    }

    /// Poll and decide every `poll_interval` until `shutdown` changes.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) {
        info!("fleet daemon running");
        self.autoscaler.run(self.poll_interval, shutdown).await;
        info!("fleet daemon stopped");
    }
}

/// Signal sink that only logs; used when nothing provisions instances.
pub fn log_signal() -> SignalCallback {
    Arc::new(|app: String, signal: ScaleSignal| -> SignalFuture {
        Box::pin(async move {
            match signal {
                ScaleSignal::NoChange => debug!(%app, %signal, "scale signal"),
                _ => info!(%app, %signal, "scale signal"),
            }
            Ok(())
        })
    })
}
