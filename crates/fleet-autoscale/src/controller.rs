//! Autoscale controller: one decision cycle per application per tick.
//!
//! Each registered application owns a [`MetricWindow`] and its thresholds
//! behind its own mutex. A cycle holds that mutex from fetch to decision,
//! so cycles for the same application queue up behind each other while
//! different applications proceed in parallel.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinSet;
use tracing::{debug, error, info, trace, warn};

use fleet_core::{FleetError, FleetResult, ScaleSignal, ThresholdConfig};
use fleet_stats::{parse_record, proxy_name, ServiceRole, StatsFeed};

use crate::policy::decide;
use crate::window::{MetricWindow, WindowSlot, WindowSum};

/// Callback invoked with each decision, e.g. to notify a provisioner.
pub type SignalCallback = Arc<dyn Fn(String, ScaleSignal) -> SignalFuture + Send + Sync>;

/// Future returned by a [`SignalCallback`].
pub type SignalFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// Per-application controller state.
struct AppSlot {
    thresholds: ThresholdConfig,
    window: MetricWindow,
}

/// Outcome of one decision cycle for one application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub app: String,
    pub signal: ScaleSignal,
    pub sum: WindowSum,
    pub average: WindowSlot,
    /// Stats lines that parsed into a sample.
    pub records: usize,
    /// The feed returned nothing; the window was left untouched.
    pub skipped: bool,
}

/// Runs the observe → aggregate → decide loop for every managed application.
pub struct AutoScaleController {
    feed: Arc<dyn StatsFeed>,
    /// Per-application state: app name → slot.
    apps: Arc<RwLock<HashMap<String, Arc<Mutex<AppSlot>>>>>,
    /// Budget for a single application's stats query.
    feed_timeout: Duration,
    /// Prepended to an application name to get its listener's `pxname`.
    proxy_prefix: String,
    on_signal: Option<SignalCallback>,
    latest: Arc<RwLock<HashMap<String, CycleReport>>>,
}

impl AutoScaleController {
    pub fn new(feed: Arc<dyn StatsFeed>, feed_timeout: Duration) -> Self {
        Self {
            feed,
            apps: Arc::new(RwLock::new(HashMap::new())),
            feed_timeout,
            proxy_prefix: String::new(),
            on_signal: None,
            latest: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Set the prefix that maps an application to its listener name.
    pub fn with_proxy_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.proxy_prefix = prefix.into();
        self
    }

    /// Listener name whose stats rows belong to `app`.
    pub fn proxy_name(&self, app: &str) -> String {
        format!("{}{app}", self.proxy_prefix)
    }

    /// Set the callback that receives every decision.
    pub fn with_signal_fn(mut self, f: SignalCallback) -> Self {
        self.on_signal = Some(f);
        self
    }

    /// Start tracking an application with a zeroed window.
    pub async fn register(&self, app: &str, thresholds: ThresholdConfig) -> FleetResult<()> {
        let mut apps = self.apps.write().await;
        if apps.contains_key(app) {
            return Err(FleetError::DuplicateApplication(app.to_string()));
        }
        apps.insert(
            app.to_string(),
            Arc::new(Mutex::new(AppSlot {
                thresholds,
                window: MetricWindow::new(),
            })),
        );
        debug!(%app, ?thresholds, "registered for autoscaling");
        Ok(())
    }

    /// Stop tracking an application and drop its history.
    pub async fn unregister(&self, app: &str) -> FleetResult<()> {
        let removed = self.apps.write().await.remove(app);
        if removed.is_none() {
            return Err(FleetError::UnknownApplication(app.to_string()));
        }
        self.latest.write().await.remove(app);
        debug!(%app, "unregistered from autoscaling");
        Ok(())
    }

    pub async fn is_registered(&self, app: &str) -> bool {
        self.apps.read().await.contains_key(app)
    }

    /// Registered application names, sorted.
    pub async fn registered(&self) -> Vec<String> {
        let mut names: Vec<String> = self.apps.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Copy of an application's current window.
    pub async fn window(&self, app: &str) -> FleetResult<MetricWindow> {
        let slot = self.slot(app).await?;
        let guard = slot.lock().await;
        Ok(guard.window.clone())
    }

    pub async fn thresholds(&self, app: &str) -> FleetResult<ThresholdConfig> {
        let slot = self.slot(app).await?;
        let guard = slot.lock().await;
        Ok(guard.thresholds)
    }

    /// Run one decision cycle for a single application.
    ///
    /// Waits for any cycle already in flight for the same application.
    pub async fn run_cycle(&self, app: &str) -> FleetResult<CycleReport> {
        let slot = self.slot(app).await?;
        let report = run_app_cycle(
            self.feed.as_ref(),
            self.feed_timeout,
            app,
            &self.proxy_name(app),
            &slot,
        )
        .await;
        self.publish(&report).await;
        Ok(report)
    }

    /// Run one cycle for every registered application concurrently.
    ///
    /// Reports come back sorted by application name.
    pub async fn tick(&self) -> Vec<CycleReport> {
        let slots: Vec<(String, Arc<Mutex<AppSlot>>)> = self
            .apps
            .read()
            .await
            .iter()
            .map(|(name, slot)| (name.clone(), slot.clone()))
            .collect();

        let mut tasks = JoinSet::new();
        for (app, slot) in slots {
            let feed = self.feed.clone();
            let feed_timeout = self.feed_timeout;
            let proxy = self.proxy_name(&app);
            tasks.spawn(async move {
                run_app_cycle(feed.as_ref(), feed_timeout, &app, &proxy, &slot).await
            });
        }

        let mut reports = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(report) => reports.push(report),
                Err(e) => error!(error = %e, "decision cycle task failed"),
            }
        }
        reports.sort_by(|a, b| a.app.cmp(&b.app));

        for report in &reports {
            self.publish(report).await;
        }
        reports
    }

    /// Latest report per application, sorted by name.
    pub async fn latest_reports(&self) -> Vec<CycleReport> {
        let mut reports: Vec<CycleReport> = self.latest.read().await.values().cloned().collect();
        reports.sort_by(|a, b| a.app.cmp(&b.app));
        reports
    }

    /// Drive [`tick`](Self::tick) on a fixed interval until shutdown.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(interval_ms = interval.as_millis() as u64, "autoscale controller started");

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; wait a full period instead.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let reports = self.tick().await;
                    debug!(apps = reports.len(), "autoscale tick complete");
                }
                _ = shutdown.changed() => {
                    info!("autoscale controller shutting down");
                    break;
                }
            }
        }
    }

    async fn slot(&self, app: &str) -> FleetResult<Arc<Mutex<AppSlot>>> {
        self.apps
            .read()
            .await
            .get(app)
            .cloned()
            .ok_or_else(|| FleetError::UnknownApplication(app.to_string()))
    }

    /// Record the report and hand real decisions to the callback.
    async fn publish(&self, report: &CycleReport) {
        if report.skipped {
            return;
        }
        // An application removed mid-cycle has nothing left to report to.
        if !self.is_registered(&report.app).await {
            return;
        }
        self.latest
            .write()
            .await
            .insert(report.app.clone(), report.clone());

        if let Some(ref on_signal) = self.on_signal
            && let Err(e) = on_signal(report.app.clone(), report.signal).await
        {
            warn!(
                app = %report.app,
                signal = %report.signal,
                error = %e,
                "scale signal delivery failed"
            );
        }
    }
}

/// One observe → aggregate → decide pass while holding the app's slot.
///
/// The feed filters by substring, so rows of listeners whose names merely
/// contain `proxy` are dropped before anything is folded.
async fn run_app_cycle(
    feed: &dyn StatsFeed,
    feed_timeout: Duration,
    app: &str,
    proxy: &str,
    slot: &Mutex<AppSlot>,
) -> CycleReport {
    let mut state = slot.lock().await;

    let mut lines = match tokio::time::timeout(feed_timeout, feed.fetch(proxy)).await {
        Ok(lines) => lines,
        Err(_) => {
            warn!(%app, timeout_ms = feed_timeout.as_millis() as u64, "stats fetch timed out");
            Vec::new()
        }
    };

    lines.retain(|line| proxy_name(line) == proxy);

    if lines.is_empty() {
        debug!(%app, %proxy, "no stats this cycle, skipping");
        return CycleReport {
            app: app.to_string(),
            signal: ScaleSignal::NoChange,
            sum: state.window.sum(),
            average: state.window.average(),
            records: 0,
            skipped: true,
        };
    }

    let mut sample = WindowSlot::default();
    let mut records = 0;
    for line in &lines {
        match parse_record(line) {
            Ok(record) => {
                records += 1;
                match record.role {
                    ServiceRole::Frontend => sample.request_rate = record.request_rate,
                    ServiceRole::Backend => sample.queue_depth = record.queue_current,
                    ServiceRole::Other => {}
                }
            }
            Err(e) => trace!(%app, error = %e, "skipping stats record"),
        }
    }

    state.window.advance(sample);
    let sum = state.window.sum();
    let average = state.window.average();
    let signal = decide(
        average.request_rate,
        average.queue_depth,
        sum.queue_depth,
        &state.thresholds,
    );

    debug!(
        %app,
        request_rate = sample.request_rate,
        queue_depth = sample.queue_depth,
        avg_request_rate = average.request_rate,
        avg_queue_depth = average.queue_depth,
        sum_queue_depth = sum.queue_depth,
        %signal,
        "decision cycle"
    );

    CycleReport {
        app: app.to_string(),
        signal,
        sum,
        average,
        records,
        skipped: false,
    }
}
