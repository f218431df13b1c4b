//! End-to-end supervision scenarios driven one tick at a time.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{TimeZone, Utc};
use warden::clock::{Clock, ManualClock};
use warden::config::WardenConfig;
use warden::domain::{Lifecycle, OverallStatus};
use warden::notification::{MessageKind, Notifier, NotifierConfig, Severity};
use warden::scheduler::{DigestConfig, DigestScheduler};
use warden::state::ComponentStore;
use warden::testing::{FnProbe, RecordingChannel, RecordingRestarter};
use warden::{Error, Warden};

/// A probe whose health is flipped from the test.
fn switchable(name: &str, healthy: Arc<AtomicBool>) -> FnProbe {
    FnProbe::new(name, move || {
        let healthy = healthy.load(Ordering::SeqCst);
        async move {
            if healthy {
                Ok(())
            } else {
                Err(Error::probe("connection refused"))
            }
        }
    })
}

struct Harness {
    warden: Warden,
    clock: ManualClock,
    restarter: Arc<RecordingRestarter>,
    channel: Arc<RecordingChannel>,
}

impl Harness {
    fn new(probes: Vec<FnProbe>) -> Self {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap());
        let restarter = Arc::new(RecordingRestarter::new());
        let channel = Arc::new(RecordingChannel::new());

        let mut builder = Warden::builder(WardenConfig::default())
            .restarter(restarter.clone())
            .channels(vec![channel.clone()])
            .clock(Arc::new(clock.clone()));
        for probe in probes {
            builder = builder.probe(Arc::new(probe));
        }

        Self {
            warden: builder.build().unwrap(),
            clock,
            restarter,
            channel,
        }
    }

    /// Advance the clock a minute, run every probe and wait for delivery.
    async fn tick(&mut self) {
        self.clock.advance(chrono::Duration::minutes(1));
        self.warden.run_once().await;
        self.warden.flush().await;
    }

    fn alerts(&self, component: &str) -> Vec<String> {
        self.channel
            .messages_for(component)
            .into_iter()
            .map(|m| m.subject)
            .collect()
    }
}

#[tokio::test]
async fn test_three_failures_restart_once_and_alert() {
    let healthy = Arc::new(AtomicBool::new(false));
    let mut h = Harness::new(vec![switchable("store", healthy.clone())]);

    h.tick().await;
    h.tick().await;
    assert!(h.restarter.calls().is_empty());
    assert_eq!(h.warden.store().get("store").unwrap().consecutive_failures, 2);

    h.tick().await;
    assert_eq!(h.restarter.calls(), vec!["store".to_string()]);
    assert_eq!(h.alerts("store"), vec!["[warden] store restarted".to_string()]);

    let store = h.warden.store().get("store").unwrap();
    assert_eq!(store.consecutive_failures, 0);
    assert_eq!(store.total_restarts, 1);
    assert_eq!(store.last_restart_at, Some(h.clock.now()));
    assert_eq!(h.channel.messages()[0].severity, Severity::Critical);

    h.warden.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_failures_inside_cooldown_do_not_restart() {
    let healthy = Arc::new(AtomicBool::new(false));
    let mut h = Harness::new(vec![switchable("store", healthy.clone())]);

    for _ in 0..3 {
        h.tick().await;
    }
    assert_eq!(h.restarter.calls_for("store"), 1);

    // Fourth failure, a minute after the restart.
    h.tick().await;
    let store = h.warden.store().get("store").unwrap();
    assert_eq!(store.lifecycle, Lifecycle::Cooldown);
    assert_eq!(h.restarter.calls_for("store"), 1);

    // Threshold reached again while still cooling down: no restart, and the
    // follow-up alert falls inside the rate-limit window.
    h.tick().await;
    h.tick().await;
    h.tick().await;
    assert_eq!(h.restarter.calls_for("store"), 1);
    assert_eq!(h.alerts("store").len(), 1);
    assert!(h.warden.notifier_stats().suppressed >= 1);

    // Cooldown over: the next failure restarts again.
    h.clock.advance(chrono::Duration::minutes(10));
    h.tick().await;
    assert_eq!(h.restarter.calls_for("store"), 2);

    h.warden.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_success_resets_failure_count() {
    let healthy = Arc::new(AtomicBool::new(false));
    let mut h = Harness::new(vec![switchable("broker", healthy.clone())]);

    h.tick().await;
    assert_eq!(h.warden.store().get("broker").unwrap().consecutive_failures, 1);

    healthy.store(true, Ordering::SeqCst);
    h.tick().await;
    let broker = h.warden.store().get("broker").unwrap();
    assert_eq!(broker.consecutive_failures, 0);
    assert_eq!(broker.lifecycle, Lifecycle::Healthy);
    assert_eq!(broker.last_probe_at, Some(h.clock.now()));
    assert_eq!(broker.last_success_at, broker.last_probe_at);

    healthy.store(false, Ordering::SeqCst);
    h.tick().await;
    h.tick().await;
    assert_eq!(h.warden.store().get("broker").unwrap().consecutive_failures, 2);
    assert!(h.restarter.calls().is_empty());
    assert!(h.channel.messages().is_empty());

    h.warden.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_timeout_counts_as_failure() {
    let slow = FnProbe::new("provider:primary", || async {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(())
    })
    .with_timeout(Duration::from_millis(50));
    let mut h = Harness::new(vec![slow]);

    for _ in 0..3 {
        h.tick().await;
    }

    let provider = h.warden.store().get("provider:primary").unwrap();
    assert_eq!(provider.last_detail.as_deref(), Some("timeout"));
    assert_eq!(h.restarter.calls_for("provider:primary"), 1);

    h.warden.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_advisory_probe_alerts_without_restart() {
    let healthy = Arc::new(AtomicBool::new(false));
    let egress = switchable("egress", healthy.clone()).advisory();
    let mut h = Harness::new(vec![egress]);

    for _ in 0..6 {
        h.tick().await;
    }

    assert!(h.restarter.calls().is_empty());
    assert_eq!(h.alerts("egress"), vec!["[warden] egress is failing".to_string()]);
    assert_eq!(h.channel.messages()[0].severity, Severity::Warning);
    assert_eq!(h.warden.status().overall, OverallStatus::Degraded);

    h.warden.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_failed_restart_alerts_and_retries() {
    let healthy = Arc::new(AtomicBool::new(false));
    let mut h = Harness::new(vec![switchable("store", healthy.clone())]);
    h.restarter.set_failing(true);

    for _ in 0..3 {
        h.tick().await;
    }
    assert_eq!(h.restarter.calls_for("store"), 1);
    assert_eq!(h.alerts("store"), vec!["[warden] restart of store failed".to_string()]);

    let store = h.warden.store().get("store").unwrap();
    assert_eq!(store.consecutive_failures, 3);
    assert!(store.last_restart_at.is_none());

    // Retried on the next failed check; the second alert is rate limited.
    h.restarter.set_failing(false);
    h.tick().await;
    assert_eq!(h.restarter.calls_for("store"), 2);
    assert_eq!(h.alerts("store").len(), 1);

    h.warden.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_components_are_independent() {
    let store_ok = Arc::new(AtomicBool::new(false));
    let web_ok = Arc::new(AtomicBool::new(true));
    let mut h = Harness::new(vec![
        switchable("store", store_ok.clone()),
        switchable("web", web_ok.clone()),
    ]);

    for _ in 0..3 {
        h.tick().await;
    }

    assert_eq!(h.restarter.calls(), vec!["store".to_string()]);
    assert!(h.alerts("web").is_empty());
    assert_eq!(h.warden.store().get("web").unwrap().lifecycle, Lifecycle::Healthy);

    let snapshot = h.warden.status();
    assert_eq!(snapshot.components.len(), 2);
    assert!(snapshot.component("web").is_some());

    h.warden.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_digest_sent_once_per_day_and_bypasses_rate_limit() {
    let store = ComponentStore::new();
    store.register("store", true);
    store.register("web", true);

    let channel = Arc::new(RecordingChannel::new());
    let (notifier, dispatch) = Notifier::new(NotifierConfig::default(), vec![channel.clone()]);
    let dispatch = tokio::spawn(dispatch.run());

    let start = Utc.with_ymd_and_hms(2026, 3, 2, 11, 0, 0).unwrap();
    let clock = Arc::new(ManualClock::new(start));

    // An alert just went out for the same component.
    assert!(notifier.notify("store", Severity::Critical, "store restarted", "", start));

    let mut digest = DigestScheduler::new(
        DigestConfig::default(),
        store,
        notifier.clone(),
        clock,
    );
    assert!(digest.send_if_due(start));
    assert!(!digest.send_if_due(start + chrono::Duration::minutes(1)));

    notifier.flush().await;
    let digests: Vec<_> = channel
        .messages()
        .into_iter()
        .filter(|m| m.kind == MessageKind::Digest)
        .collect();
    assert_eq!(digests.len(), 1);
    assert!(digests[0].subject.contains("Daily digest"));
    assert!(digests[0].body.contains("store"));

    drop(digest);
    drop(notifier);
    dispatch.await.unwrap();
}

#[tokio::test]
async fn test_status_file_written_after_tick() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("status.json");

    let mut config = WardenConfig::default();
    config.supervisor.status_file = Some(path.clone());

    let mut warden = Warden::builder(config)
        .restarter(Arc::new(RecordingRestarter::new()))
        .channels(Vec::new())
        .probe(Arc::new(FnProbe::new("web", || async { Ok(()) })))
        .build()
        .unwrap();

    let summary = warden.run_once().await;
    assert_eq!(summary.succeeded, 1);

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(json["overall"], "healthy");
    assert_eq!(json["components"][0]["name"], "web");

    warden.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_start_and_shutdown_announce_to_operator() {
    let channel = Arc::new(RecordingChannel::new());
    let mut warden = Warden::builder(WardenConfig::default())
        .restarter(Arc::new(RecordingRestarter::new()))
        .channels(vec![channel.clone()])
        .probe(Arc::new(FnProbe::new("web", || async { Ok(()) })))
        .build()
        .unwrap();

    warden.start();
    tokio::time::sleep(Duration::from_millis(100)).await;
    warden.shutdown().await.unwrap();

    let subjects: Vec<_> = channel.messages().into_iter().map(|m| m.subject).collect();
    assert_eq!(subjects.first().map(String::as_str), Some("[warden] supervisor started"));
    assert_eq!(subjects.last().map(String::as_str), Some("[warden] supervisor stopped"));
}

#[tokio::test]
async fn test_duplicate_probe_names_rejected() {
    let result = Warden::builder(WardenConfig::default())
        .restarter(Arc::new(RecordingRestarter::new()))
        .channels(Vec::new())
        .probe(Arc::new(FnProbe::new("web", || async { Ok(()) })))
        .probe(Arc::new(FnProbe::new("web", || async { Ok(()) })))
        .build();
    assert!(result.is_err());
}
