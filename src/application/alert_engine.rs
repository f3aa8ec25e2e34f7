// Geofence engine - Rule store, alert fan-out, and the scheduled evaluation loop
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::application::density_service::DensityService;
use crate::domain::alert::{AlertEvent, AlertLevel, GeofenceRule, RuleSpec};
use crate::domain::error::Result;

/// Concurrency-safe rule registry, shared between the alert engine (mutation
/// plus scheduled reads) and the route scorer (active-rule reads).
#[derive(Clone, Default)]
pub struct RuleStore {
    rules: Arc<RwLock<HashMap<String, GeofenceRule>>>,
}

impl RuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the spec under a freshly generated id. Every call creates a new
    /// rule; there is no idempotency key.
    pub fn add(&self, spec: RuleSpec) -> GeofenceRule {
        let rule = GeofenceRule {
            id: Uuid::new_v4().to_string(),
            name: spec.name,
            area: spec.area,
            threshold_devices: spec.threshold_devices,
            alert_channels: spec.alert_channels,
            webhook_url: spec.webhook_url,
            active: spec.active,
        };
        self.rules
            .write()
            .unwrap()
            .insert(rule.id.clone(), rule.clone());
        rule
    }

    pub fn list(&self) -> Vec<GeofenceRule> {
        self.rules.read().unwrap().values().cloned().collect()
    }

    /// Removes the rule if present; unknown ids are a success no-op.
    pub fn delete(&self, id: &str) {
        self.rules.write().unwrap().remove(id);
    }

    pub fn active(&self) -> Vec<GeofenceRule> {
        self.rules
            .read()
            .unwrap()
            .values()
            .filter(|r| r.active)
            .cloned()
            .collect()
    }
}

/// Receives every alert event produced by rule evaluation.
#[async_trait]
pub trait AlertSubscriber: Send + Sync {
    async fn deliver(&self, event: AlertEvent) -> anyhow::Result<()>;
}

/// Outbound alert delivery target. Implementations are best-effort: the
/// engine logs a returned error and moves on, never retrying.
#[async_trait]
pub trait WebhookSink: Send + Sync {
    async fn post_alert(&self, url: &str, event: &AlertEvent) -> Result<()>;
}

type SubscriberMap = Mutex<HashMap<u64, Arc<dyn AlertSubscriber>>>;

/// Registry handle returned by `subscribe`. Unsubscribing (explicitly or by
/// dropping, e.g. on stream disconnect) removes exactly this subscriber and
/// is idempotent.
pub struct AlertSubscription {
    id: u64,
    registry: Weak<SubscriberMap>,
}

impl AlertSubscription {
    pub fn unsubscribe(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.lock().unwrap().remove(&self.id);
        }
    }
}

impl Drop for AlertSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Evaluates geofence rules against density snapshots on a fixed cadence and
/// fans the resulting events out to subscribers and webhooks.
pub struct AlertEngine {
    rules: RuleStore,
    subscribers: Arc<SubscriberMap>,
    next_subscriber_id: AtomicU64,
    density: Arc<DensityService>,
    webhooks: Arc<dyn WebhookSink>,
    evaluation_interval: Duration,
    runner: Mutex<Option<JoinHandle<()>>>,
}

impl AlertEngine {
    pub fn new(
        rules: RuleStore,
        density: Arc<DensityService>,
        webhooks: Arc<dyn WebhookSink>,
        evaluation_interval: Duration,
    ) -> Self {
        Self {
            rules,
            subscribers: Arc::new(Mutex::new(HashMap::new())),
            next_subscriber_id: AtomicU64::new(1),
            density,
            webhooks,
            evaluation_interval,
            runner: Mutex::new(None),
        }
    }

    pub fn add_rule(&self, spec: RuleSpec) -> GeofenceRule {
        let rule = self.rules.add(spec);
        info!(rule_id = %rule.id, name = %rule.name, active = rule.active, "geofence rule added");
        rule
    }

    pub fn list_rules(&self) -> Vec<GeofenceRule> {
        self.rules.list()
    }

    pub fn delete_rule(&self, id: &str) {
        self.rules.delete(id);
        info!(rule_id = %id, "geofence rule deleted");
    }

    pub fn subscribe(&self, subscriber: Arc<dyn AlertSubscriber>) -> AlertSubscription {
        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        let total = {
            let mut subscribers = self.subscribers.lock().unwrap();
            subscribers.insert(id, subscriber);
            subscribers.len()
        };
        debug!(subscriber = id, total, "alert subscriber registered");
        AlertSubscription {
            id,
            registry: Arc::downgrade(&self.subscribers),
        }
    }

    /// Starts the repeating evaluation task. Owned by the process lifecycle;
    /// `stop` aborts it on shutdown.
    pub fn start(self: Arc<Self>) {
        let engine = Arc::clone(&self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(engine.evaluation_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; consume it so the loop
            // waits a full interval before the first evaluation.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                engine.evaluate_cycle().await;
            }
        });
        *self.runner.lock().unwrap() = Some(handle);
        info!(interval_secs = self.evaluation_interval.as_secs(), "geofence scheduler started");
    }

    pub fn stop(&self) {
        if let Some(handle) = self.runner.lock().unwrap().take() {
            handle.abort();
            info!("geofence scheduler stopped");
        }
    }

    /// One evaluation pass over all active rules. Public so callers and tests
    /// can drive evaluation without waiting on the wall-clock interval.
    /// Per-rule failures are logged and never stop the cycle.
    pub async fn evaluate_cycle(&self) {
        let active = self.rules.active();
        debug!(rules = active.len(), "running scheduled geofence evaluation");
        for rule in active {
            if let Err(e) = self.evaluate_rule(&rule).await {
                error!(rule_id = %rule.id, error = %e, "rule evaluation failed");
            }
        }
    }

    async fn evaluate_rule(&self, rule: &GeofenceRule) -> Result<()> {
        let snapshot = self.density.snapshot(&rule.id, &rule.area).await?;
        let event = AlertEvent::for_rule(&rule.id, snapshot.total_devices, rule.threshold_devices);
        info!(
            rule_id = %rule.id,
            total = event.total_devices,
            threshold = rule.threshold_devices,
            level = ?event.level,
            "geofence rule evaluated"
        );

        self.broadcast(&event).await;

        // UI subscribers see every level; webhooks only fire for warning and
        // critical, and only when the rule opted in with a target URL.
        if event.level != AlertLevel::Info && rule.wants_webhook() {
            if let Some(url) = rule.webhook_url.as_deref() {
                if let Err(e) = self.webhooks.post_alert(url, &event).await {
                    warn!(rule_id = %rule.id, error = %e, "webhook delivery failed");
                }
            }
        }

        Ok(())
    }

    /// Delivers to every current subscriber; a failing subscriber is logged
    /// and does not affect the others.
    async fn broadcast(&self, event: &AlertEvent) {
        let targets: Vec<(u64, Arc<dyn AlertSubscriber>)> = {
            let subscribers = self.subscribers.lock().unwrap();
            subscribers
                .iter()
                .map(|(id, s)| (*id, Arc::clone(s)))
                .collect()
        };
        for (id, subscriber) in targets {
            if let Err(e) = subscriber.deliver(event.clone()).await {
                warn!(subscriber = id, error = %e, "alert delivery failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::density_provider::{
        DensityCell, DensityInterval, DensityProvider, DENSITY_ESTIMATION,
    };
    use crate::domain::alert::AlertChannel;
    use crate::domain::error::ServiceError;
    use crate::domain::geometry::{Area, Point};
    use chrono::{DateTime, Utc};

    /// Reports a fixed total for every queried area; fails for areas whose
    /// first boundary latitude is negative.
    struct FixedTotalProvider {
        total: f64,
    }

    #[async_trait]
    impl DensityProvider for FixedTotalProvider {
        async fn query_density(
            &self,
            boundary: &[Point],
            start: DateTime<Utc>,
            end: DateTime<Utc>,
            _precision: u8,
        ) -> crate::domain::error::Result<Vec<DensityInterval>> {
            if boundary.first().is_some_and(|p| p.latitude < 0.0) {
                return Err(ServiceError::DataUnavailable("scripted outage".into()));
            }
            Ok(vec![DensityInterval {
                start,
                end,
                cells: vec![DensityCell {
                    location_code: geohash::encode(geohash::Coord { x: 26.10, y: 44.43 }, 7)
                        .unwrap(),
                    kind: DENSITY_ESTIMATION.to_string(),
                    estimate: Some(self.total),
                    max_estimate: None,
                    min_estimate: None,
                }],
            }])
        }
    }

    #[derive(Default)]
    struct RecordingSubscriber {
        events: Mutex<Vec<AlertEvent>>,
    }

    #[async_trait]
    impl AlertSubscriber for RecordingSubscriber {
        async fn deliver(&self, event: AlertEvent) -> anyhow::Result<()> {
            self.events.lock().unwrap().push(event);
            Ok(())
        }
    }

    struct FailingSubscriber;

    #[async_trait]
    impl AlertSubscriber for FailingSubscriber {
        async fn deliver(&self, _event: AlertEvent) -> anyhow::Result<()> {
            anyhow::bail!("subscriber gone")
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        posts: Mutex<Vec<(String, AlertLevel)>>,
    }

    #[async_trait]
    impl WebhookSink for RecordingSink {
        async fn post_alert(&self, url: &str, event: &AlertEvent) -> Result<()> {
            self.posts.lock().unwrap().push((url.to_string(), event.level));
            Ok(())
        }
    }

    fn engine_with(total: f64, sink: Arc<RecordingSink>) -> AlertEngine {
        let density = Arc::new(DensityService::live(
            Arc::new(FixedTotalProvider { total }),
            7,
            6,
            None,
        ));
        AlertEngine::new(RuleStore::new(), density, sink, Duration::from_secs(120))
    }

    fn rule_spec(threshold: u64, active: bool) -> RuleSpec {
        RuleSpec {
            name: "downtown".into(),
            area: Area::rectangle(44.41, 26.08, 44.44, 26.12),
            threshold_devices: threshold,
            alert_channels: vec![AlertChannel::Ui],
            webhook_url: None,
            active,
        }
    }

    #[tokio::test]
    async fn warning_and_critical_thresholds() {
        let sink = Arc::new(RecordingSink::default());
        let engine = engine_with(150.0, sink);
        engine.add_rule(rule_spec(100, true)); // 150 > 100, not > 150
        engine.add_rule(rule_spec(90, true)); // 150 > 135
        engine.add_rule(rule_spec(200, true)); // within range

        let recorder = Arc::new(RecordingSubscriber::default());
        let _subscription = engine.subscribe(recorder.clone());
        engine.evaluate_cycle().await;

        let mut levels: Vec<AlertLevel> = recorder
            .events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.level)
            .collect();
        levels.sort();
        assert_eq!(
            levels,
            vec![AlertLevel::Info, AlertLevel::Warning, AlertLevel::Critical]
        );
    }

    #[tokio::test]
    async fn inactive_rules_are_never_evaluated() {
        let sink = Arc::new(RecordingSink::default());
        let engine = engine_with(150.0, sink);
        engine.add_rule(rule_spec(10, false));

        let recorder = Arc::new(RecordingSubscriber::default());
        let _subscription = engine.subscribe(recorder.clone());
        engine.evaluate_cycle().await;

        assert!(recorder.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unsubscribe_is_effective_and_idempotent() {
        let sink = Arc::new(RecordingSink::default());
        let engine = engine_with(150.0, sink);
        engine.add_rule(rule_spec(100, true));

        let recorder = Arc::new(RecordingSubscriber::default());
        let subscription = engine.subscribe(recorder.clone());
        engine.evaluate_cycle().await;
        assert_eq!(recorder.events.lock().unwrap().len(), 1);

        subscription.unsubscribe();
        subscription.unsubscribe();
        engine.evaluate_cycle().await;
        assert_eq!(recorder.events.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failing_subscriber_does_not_block_others() {
        let sink = Arc::new(RecordingSink::default());
        let engine = engine_with(150.0, sink);
        engine.add_rule(rule_spec(100, true));

        let _failing = engine.subscribe(Arc::new(FailingSubscriber));
        let recorder = Arc::new(RecordingSubscriber::default());
        let _subscription = engine.subscribe(recorder.clone());
        engine.evaluate_cycle().await;

        assert_eq!(recorder.events.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn webhook_fires_only_for_non_info_levels() {
        let sink = Arc::new(RecordingSink::default());
        let engine = engine_with(150.0, sink.clone());

        let mut warning = rule_spec(100, true);
        warning.alert_channels = vec![AlertChannel::Ui, AlertChannel::Webhook];
        warning.webhook_url = Some("http://hooks.test/warn".into());
        engine.add_rule(warning);

        let mut info = rule_spec(500, true);
        info.alert_channels = vec![AlertChannel::Webhook];
        info.webhook_url = Some("http://hooks.test/info".into());
        engine.add_rule(info);

        // Warning level but no webhook channel configured.
        engine.add_rule(rule_spec(100, true));

        engine.evaluate_cycle().await;

        let posts = sink.posts.lock().unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].0, "http://hooks.test/warn");
        assert_eq!(posts[0].1, AlertLevel::Warning);
    }

    #[tokio::test]
    async fn failed_rule_does_not_stop_the_cycle() {
        let sink = Arc::new(RecordingSink::default());
        let engine = engine_with(150.0, sink);

        let mut broken = rule_spec(100, true);
        broken.area = Area::rectangle(-44.44, 26.08, -44.41, 26.12);
        engine.add_rule(broken);
        engine.add_rule(rule_spec(100, true));

        let recorder = Arc::new(RecordingSubscriber::default());
        let _subscription = engine.subscribe(recorder.clone());
        engine.evaluate_cycle().await;

        // The healthy rule still produced its event.
        assert_eq!(recorder.events.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn deleting_unknown_rule_is_a_no_op() {
        let sink = Arc::new(RecordingSink::default());
        let engine = engine_with(150.0, sink);
        engine.add_rule(rule_spec(100, true));

        engine.delete_rule("does-not-exist");
        assert_eq!(engine.list_rules().len(), 1);
    }
}
