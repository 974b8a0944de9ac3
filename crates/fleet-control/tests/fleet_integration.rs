//! End-to-end control plane tests.
//!
//! A daemon is assembled over a temp config directory with a scripted
//! stats feed and a fake proxy, then driven through registration, polling
//! ticks, and removal.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;

use fleet_autoscale::{SignalCallback, SignalFuture};
use fleet_control::Daemon;
use fleet_core::{Endpoint, FleetConfig, FleetError, FleetResult, ScaleSignal, ThresholdConfig};
use fleet_proxy::ProxyControl;
use fleet_proxy::control::BoxFuture;
use fleet_stats::StatsFeed;
use fleet_stats::feed::{filter_lines, BoxFuture as FeedFuture};

fn stats_line(owner: &str, svname: &str, qcur: u64, req_rate: u64) -> String {
    let mut fields = vec![String::new(); 50];
    fields[0] = owner.to_string();
    fields[1] = svname.to_string();
    fields[2] = qcur.to_string();
    fields[46] = req_rate.to_string();
    fields.join(",")
}

/// One `show stat` dump covering every listener, answered the way the
/// stats socket answers: substring filtered on the query key.
#[derive(Default)]
struct ScriptedFeed {
    rows: Mutex<BTreeMap<String, Vec<String>>>,
}

impl ScriptedFeed {
    fn traffic(&self, app: &str, req_rate: u64, qcur: u64) {
        let owner = format!("gae_{app}");
        self.rows.lock().unwrap().insert(
            owner.clone(),
            vec![
                stats_line(&owner, "FRONTEND", 0, req_rate),
                stats_line(&owner, &format!("{owner}-0"), 0, 0),
                stats_line(&owner, "BACKEND", qcur, 0),
            ],
        );
    }
}

impl StatsFeed for ScriptedFeed {
    fn fetch<'a>(&'a self, filter_key: &'a str) -> FeedFuture<'a, Vec<String>> {
        Box::pin(async move {
            let mut dump = String::from("# pxname,svname,qcur\n");
            for rows in self.rows.lock().unwrap().values() {
                for row in rows {
                    dump.push_str(row);
                    dump.push('\n');
                }
            }
            filter_lines(&dump, filter_key)
        })
    }
}

#[derive(Default)]
struct FakeProxy {
    reloads: AtomicUsize,
    reject: AtomicBool,
}

impl ProxyControl for FakeProxy {
    fn reload(&self) -> BoxFuture<'_, FleetResult<()>> {
        Box::pin(async move {
            if self.reject.load(Ordering::SeqCst) {
                return Err(FleetError::Reload("configuration check failed".to_string()));
            }
            self.reloads.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn restart(&self) -> BoxFuture<'_, FleetResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn stop(&self) -> BoxFuture<'_, FleetResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn is_running(&self) -> BoxFuture<'_, FleetResult<bool>> {
        Box::pin(async { Ok(true) })
    }
}

struct Harness {
    dir: tempfile::TempDir,
    feed: Arc<ScriptedFeed>,
    proxy: Arc<FakeProxy>,
    signals: Arc<Mutex<Vec<(String, ScaleSignal)>>>,
    daemon: Daemon,
}

impl Harness {
    fn new(poll_interval: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = FleetConfig::default();
        config.proxy.config_dir = dir.path().to_path_buf();
        config.proxy.stats_socket = dir.path().join("stats");
        config.autoscale.poll_interval = poll_interval.to_string();
        config.autoscale.feed_timeout = "500ms".to_string();

        let feed = Arc::new(ScriptedFeed::default());
        let proxy = Arc::new(FakeProxy::default());
        let signals = Arc::new(Mutex::new(Vec::new()));
        let sink: SignalCallback = {
            let signals = signals.clone();
            Arc::new(move |app: String, signal: ScaleSignal| -> SignalFuture {
                signals.lock().unwrap().push((app, signal));
                Box::pin(async { Ok(()) })
            })
        };

        let daemon = Daemon::with_parts(&config, feed.clone(), proxy.clone(), sink).unwrap();
        Self {
            dir,
            feed,
            proxy,
            signals,
            daemon,
        }
    }

    fn effective_path(&self) -> PathBuf {
        self.dir.path().join("haproxy.cfg")
    }

    fn effective(&self) -> String {
        fs::read_to_string(self.effective_path()).unwrap()
    }
}

#[tokio::test]
async fn idle_app_scales_down_then_up_under_load() {
    let h = Harness::new("20s");
    let manager = h.daemon.manager();
    manager.register("shop", 1, None).await.unwrap();
    manager
        .set_servers(
            "shop",
            vec![Endpoint::new("10.0.0.5", 20000), Endpoint::new("10.0.0.6", 20000)],
        )
        .await
        .unwrap();

    let text = h.effective();
    assert!(text.contains("listen gae_shop 0.0.0.0:10001\n"));
    assert!(text.contains("  server gae_shop-1 10.0.0.6:20000 maxconn 1"));

    h.feed.traffic("shop", 1, 0);
    let reports = h.daemon.autoscaler().tick().await;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].signal, ScaleSignal::ScaleDown);

    h.feed.traffic("shop", 100, 100);
    let mut cycles = 0;
    loop {
        cycles += 1;
        let reports = h.daemon.autoscaler().tick().await;
        if reports[0].signal == ScaleSignal::ScaleUp {
            break;
        }
        assert!(cycles < fleet_core::WINDOW_SIZE, "no scale up within the window");
    }

    let signals = h.signals.lock().unwrap().clone();
    assert_eq!(signals.first(), Some(&("shop".to_string(), ScaleSignal::ScaleDown)));
    assert_eq!(signals.last(), Some(&("shop".to_string(), ScaleSignal::ScaleUp)));

    let metrics = h.daemon.metrics_text().await;
    assert!(metrics.contains("fleet_scale_signal{app=\"shop\"} 1"));
}

#[tokio::test]
async fn custom_thresholds_reach_the_controller() {
    let h = Harness::new("20s");
    let strict = ThresholdConfig {
        scale_down_request_rate: 0,
        scale_up_request_rate: 50,
        scale_up_queue: 50,
    };
    h.daemon.manager().register("shop", 1, Some(strict)).await.unwrap();

    h.feed.traffic("shop", 100, 100);
    let report = h.daemon.autoscaler().run_cycle("shop").await.unwrap();
    // avg rate 10 and avg queue 10 stay under the strict thresholds.
    assert_eq!(report.signal, ScaleSignal::NoChange);
}

#[tokio::test]
async fn overlapping_app_names_decide_independently() {
    let h = Harness::new("20s");
    let manager = h.daemon.manager();
    manager.register("shop", 1, None).await.unwrap();
    manager.register("shopping", 2, None).await.unwrap();
    h.feed.traffic("shop", 0, 0);
    h.feed.traffic("shopping", 100, 80);

    let reports = h.daemon.autoscaler().tick().await;
    assert_eq!(reports.len(), 2);
    let shop = reports.iter().find(|r| r.app == "shop").unwrap();
    let shopping = reports.iter().find(|r| r.app == "shopping").unwrap();
    assert_eq!(shop.records, 3);
    assert_eq!(shop.signal, ScaleSignal::ScaleDown);
    assert_eq!(shopping.records, 3);
    assert_eq!(shopping.signal, ScaleSignal::ScaleUp);

    // Only the shopping listener reports; shop must not borrow its rows.
    h.feed.rows.lock().unwrap().remove("gae_shop");
    let report = h.daemon.autoscaler().run_cycle("shop").await.unwrap();
    assert!(report.skipped);
}

#[tokio::test]
async fn removed_app_leaves_config_and_loop() {
    let h = Harness::new("20s");
    let manager = h.daemon.manager();
    manager.register("shop", 1, None).await.unwrap();
    manager.register("blog", 2, None).await.unwrap();
    h.feed.traffic("shop", 1, 0);
    h.feed.traffic("blog", 1, 0);
    assert_eq!(h.daemon.autoscaler().tick().await.len(), 2);

    manager.remove("shop").await.unwrap();

    let text = h.effective();
    assert!(!text.contains("gae_shop"));
    assert!(text.contains("listen gae_blog"));
    let reports = h.daemon.autoscaler().tick().await;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].app, "blog");
    assert!(
        h.daemon
            .latest_reports()
            .await
            .iter()
            .all(|r| r.app != "shop")
    );
    assert!(matches!(
        h.daemon.autoscaler().run_cycle("shop").await,
        Err(FleetError::UnknownApplication(_))
    ));
}

#[tokio::test]
async fn rejected_reload_keeps_last_good_config() {
    let h = Harness::new("20s");
    let manager = h.daemon.manager();
    manager.register("shop", 1, None).await.unwrap();
    manager
        .set_servers("shop", vec![Endpoint::new("10.0.0.5", 20000)])
        .await
        .unwrap();
    let good = h.effective();
    let reloads = h.proxy.reloads.load(Ordering::SeqCst);

    h.proxy.reject.store(true, Ordering::SeqCst);
    assert!(matches!(
        manager
            .set_servers("shop", vec![Endpoint::new("10.0.0.99", 1)])
            .await,
        Err(FleetError::Reload(_))
    ));
    assert!(manager.register("blog", 2, None).await.is_err());
    assert_eq!(h.effective(), good);
    assert!(!h.daemon.autoscaler().is_registered("blog").await);

    h.proxy.reject.store(false, Ordering::SeqCst);
    manager.register("blog", 2, None).await.unwrap();
    assert!(h.effective().contains("listen gae_blog"));
    assert!(h.effective().contains("gae_shop-0 10.0.0.5:20000"));
    assert_eq!(h.proxy.reloads.load(Ordering::SeqCst), reloads + 1);
}

#[tokio::test]
async fn regeneration_is_stable_across_unchanged_updates() {
    let h = Harness::new("20s");
    let manager = h.daemon.manager();
    manager.register("shop", 1, None).await.unwrap();
    let servers = vec![Endpoint::new("10.0.0.5", 20000)];

    manager.set_servers("shop", servers.clone()).await.unwrap();
    let first = fs::read(h.effective_path()).unwrap();
    manager.set_servers("shop", servers).await.unwrap();
    assert_eq!(fs::read(h.effective_path()).unwrap(), first);
}

#[tokio::test]
async fn polling_loop_delivers_signals_until_shutdown() {
    let h = Harness::new("20ms");
    h.daemon.manager().register("shop", 1, None).await.unwrap();
    h.feed.traffic("shop", 0, 0);

    let daemon = Arc::new(h.daemon);
    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn({
        let daemon = daemon.clone();
        async move { daemon.run(rx).await }
    });

    tokio::time::sleep(Duration::from_millis(200)).await;
    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .unwrap()
        .unwrap();

    let signals = h.signals.lock().unwrap();
    assert!(!signals.is_empty());
    assert!(signals.iter().all(|(app, s)| app == "shop" && *s == ScaleSignal::ScaleDown));
}
