//! # Pipeline Integration Tests
//!
//! Drive a real `Tracker` (all four workers) against scripted collaborators.
//!
//! ## Test Categories
//!
//! 1. **Ordering** - FIFO delivery, concurrent callers, drain on shutdown
//! 2. **Identity** - history clears on visitor change, logout
//! 3. **Flush failures** - timeouts and errors drop the batch without retry
//! 4. **Targeting** - presentation, visit data, gating rules
//! 5. **Persistence** - target parameter history, restore, absorbed failures
//! 6. **Storage ordering** - concurrent user saves, slow storage
//! 7. **Action forms** - mail subscriptions, spin-to-win, favorite attributes

use beacon_tracking::adapters::{
    InMemoryPersistence, JsonFilePersistence, MockNetworkSender, MockPresentation,
    MockRecommendationService, MockSendBehavior, MockTargetingService, MockTimeSource,
};
use beacon_tracking::domain::{
    decode_history, keys, FavoriteAttributes, FilterType, Product, ProductAttribute,
    RecommendationFilter, MAX_HISTORY_ENTRIES,
};
use beacon_tracking::ports::outbound::PersistenceGateway;
use beacon_tracking::{
    Collaborators, DeviceInfo, EventRecord, InAppNotification, NetworkError, PersistenceError,
    PresentationModel, ProfileConfig, Properties, RecommendationRequest, TargetParameterHistory,
    Tracker, TrackingApi, TrackingError, UserState, ValidationError,
};
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// TEST HELPERS
// =============================================================================

fn profile() -> ProfileConfig {
    ProfileConfig::new("org-1", "site-1", "shop")
}

fn props(pairs: &[(&str, &str)]) -> Properties {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

struct Harness {
    tracker: Tracker,
    persistence: Arc<InMemoryPersistence>,
    network: Arc<MockNetworkSender>,
    targeting: Arc<MockTargetingService>,
    presentation: Arc<MockPresentation>,
}

fn start_with(profile: ProfileConfig, targeting: MockTargetingService) -> Harness {
    let persistence = Arc::new(InMemoryPersistence::new());
    let network = Arc::new(MockNetworkSender::default());
    let targeting = Arc::new(targeting);
    let presentation = Arc::new(MockPresentation::new());

    let collaborators = Collaborators::default()
        .with_persistence(persistence.clone())
        .with_network(network.clone())
        .with_targeting(targeting.clone())
        .with_presentation(presentation.clone());
    let tracker = Tracker::start(profile, DeviceInfo::default(), collaborators).unwrap();

    Harness {
        tracker,
        persistence,
        network,
        targeting,
        presentation,
    }
}

fn start() -> Harness {
    start_with(profile(), MockTargetingService::new())
}

fn delivered(network: &MockNetworkSender) -> Vec<EventRecord> {
    network
        .batches()
        .into_iter()
        .flat_map(|batch| batch.events)
        .collect()
}

fn pages(records: &[EventRecord]) -> Vec<String> {
    records
        .iter()
        .filter_map(|r| r.get(keys::URI).cloned())
        .collect()
}

// =============================================================================
// 1. ORDERING
// =============================================================================

#[tokio::test]
async fn test_delivery_order_matches_call_order_across_flushes() {
    let h = start();

    for i in 0..5 {
        h.tracker.record(&format!("P{i}"), Properties::new()).unwrap();
    }
    h.tracker.wait_idle().await.unwrap();
    for i in 5..10 {
        h.tracker.record(&format!("P{i}"), Properties::new()).unwrap();
    }
    h.tracker.flush().unwrap();
    h.tracker.wait_idle().await.unwrap();

    let expected: Vec<String> = (0..10).map(|i| format!("P{i}")).collect();
    assert_eq!(pages(&delivered(&h.network)), expected);
    assert!(h.tracker.pending_events().is_empty());
    h.tracker.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_keep_their_own_order() {
    let h = start();
    let tracker = Arc::new(h.tracker);

    let callers: Vec<_> = (0..4)
        .map(|caller| {
            let tracker = Arc::clone(&tracker);
            tokio::spawn(async move {
                for i in 0..25 {
                    tracker
                        .record(&format!("C{caller}-{i:02}"), Properties::new())
                        .unwrap();
                }
            })
        })
        .collect();
    for caller in callers {
        caller.await.unwrap();
    }
    tracker.wait_idle().await.unwrap();

    let seen = pages(&delivered(&h.network));
    assert_eq!(seen.len(), 100);
    for caller in 0..4 {
        let prefix = format!("C{caller}-");
        let mine: Vec<_> = seen.iter().filter(|p| p.starts_with(&prefix)).collect();
        let mut sorted = mine.clone();
        sorted.sort();
        assert_eq!(mine, sorted);
        assert_eq!(mine.len(), 25);
    }
}

#[tokio::test]
async fn test_shutdown_drains_queued_work() {
    let h = start();
    for page in ["A", "B", "C"] {
        h.tracker.record(page, Properties::new()).unwrap();
    }
    h.tracker.shutdown().await;

    assert_eq!(pages(&delivered(&h.network)), vec!["A", "B", "C"]);
}

// =============================================================================
// 2. IDENTITY
// =============================================================================

#[tokio::test]
async fn test_visitor_change_clears_history_exactly_once() {
    let h = start();

    h.tracker.login("A", Properties::new()).unwrap();
    h.tracker.wait_idle().await.unwrap();
    assert_eq!(h.persistence.clear_count(), 0);

    h.tracker.login("A", Properties::new()).unwrap();
    h.tracker.wait_idle().await.unwrap();
    assert_eq!(h.persistence.clear_count(), 0);

    h.tracker.login("B", Properties::new()).unwrap();
    h.tracker.wait_idle().await.unwrap();
    assert_eq!(h.persistence.clear_count(), 1);

    h.tracker.record("Home", Properties::new()).unwrap();
    h.tracker.wait_idle().await.unwrap();
    assert_eq!(h.persistence.clear_count(), 1);
    h.tracker.shutdown().await;
}

#[tokio::test]
async fn test_history_written_after_clear_belongs_to_new_visitor() {
    let h = start();

    h.tracker.login("A", props(&[("OM.gn", "f")])).unwrap();
    h.tracker.login("B", props(&[("OM.bd", "1990")])).unwrap();
    h.tracker.wait_idle().await.unwrap();

    let history = h.persistence.load_target_parameters().unwrap();
    assert_eq!(history.get("OM.gn"), None);
    assert_eq!(history.get("OM.bd").map(String::as_str), Some("1990"));
    h.tracker.shutdown().await;
}

#[tokio::test]
async fn test_logout_issues_new_cookie_and_drops_identity() {
    let h = start();
    h.tracker.login("alice", props(&[("OM.gn", "f")])).unwrap();
    h.tracker.wait_idle().await.unwrap();
    let before = h.persistence.load_user().unwrap();
    assert_eq!(before.ex_visitor_id.as_deref(), Some("alice"));

    h.tracker.logout().unwrap();
    h.tracker.wait_idle().await.unwrap();

    let after = h.persistence.load_user().unwrap();
    assert!(after.cookie_id.is_some());
    assert_ne!(after.cookie_id, before.cookie_id);
    assert_eq!(after.ex_visitor_id, None);
    assert_eq!(after.sdk_version, before.sdk_version);
    assert!(h.persistence.load_target_parameters().unwrap().is_empty());
    assert_eq!(h.tracker.ex_visitor_id(), None);
    // Logout itself is not an event
    assert_eq!(pages(&delivered(&h.network)), vec![keys::LOGIN_PAGE]);
    h.tracker.shutdown().await;
}

#[tokio::test]
async fn test_blank_identifiers_are_rejected() {
    let h = start();

    assert_eq!(
        h.tracker.login("  ", Properties::new()),
        Err(TrackingError::Validation(ValidationError::EmptyExVisitorId))
    );
    assert_eq!(
        h.tracker.sign_up("", Properties::new()),
        Err(TrackingError::Validation(ValidationError::EmptyExVisitorId))
    );
    assert_eq!(
        h.tracker.record("", Properties::new()),
        Err(TrackingError::Validation(ValidationError::EmptyPageName))
    );
    h.tracker.wait_idle().await.unwrap();
    assert_eq!(h.network.call_count(), 0);
    h.tracker.shutdown().await;
}

#[tokio::test]
async fn test_sign_up_markers() {
    let h = start();
    h.tracker.sign_up("bob", Properties::new()).unwrap();
    h.tracker.wait_idle().await.unwrap();

    let record = &delivered(&h.network)[0];
    assert_eq!(record[keys::URI], keys::SIGN_UP_PAGE);
    assert_eq!(record[keys::SIGN_UP], "bob");
    assert_eq!(record[keys::SIGN_UP_FLAG], keys::SIGN_UP);
    h.tracker.shutdown().await;
}

// =============================================================================
// 3. FLUSH FAILURES
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_timed_out_flush_is_not_retried() {
    let h = start_with(profile().with_request_timeout(5), MockTargetingService::new());
    h.network.set_behavior(MockSendBehavior::Hang);

    h.tracker.record("Home", Properties::new()).unwrap();
    h.tracker.wait_idle().await.unwrap();

    assert!(h.tracker.pending_events().is_empty());
    assert_eq!(h.network.call_count(), 1);

    tokio::time::sleep(Duration::from_secs(120)).await;
    h.tracker.wait_idle().await.unwrap();
    assert_eq!(h.network.call_count(), 1);
    assert!(h.tracker.session_cookie().is_empty());
    h.tracker.shutdown().await;
}

#[tokio::test]
async fn test_failed_batch_is_dropped_and_next_batch_is_sent() {
    let h = start();
    h.network
        .set_behavior(MockSendBehavior::Fail(NetworkError::Rejected { status: 500 }));
    h.tracker.record("Lost", Properties::new()).unwrap();
    h.tracker.wait_idle().await.unwrap();

    h.network.set_behavior(MockSendBehavior::Accept);
    h.tracker.record("Kept", Properties::new()).unwrap();
    h.tracker.wait_idle().await.unwrap();

    let batches = h.network.batches();
    assert_eq!(batches.len(), 2);
    assert_eq!(pages(&batches[1].events), vec!["Kept"]);
    h.tracker.shutdown().await;
}

#[tokio::test]
async fn test_empty_queue_makes_no_call() {
    let h = start();
    h.tracker.flush().unwrap();
    h.tracker.flush().unwrap();
    h.tracker.wait_idle().await.unwrap();
    assert_eq!(h.network.call_count(), 0);
    h.tracker.shutdown().await;
}

// =============================================================================
// 4. TARGETING
// =============================================================================

#[tokio::test]
async fn test_notification_is_presented_and_updates_visit_data() {
    let notification = InAppNotification {
        id: 11,
        title: "Sale".into(),
        visit_data: Some("vd".into()),
        visitor_data: Some("vsd".into()),
        ..InAppNotification::default()
    };
    let h = start_with(
        profile(),
        MockTargetingService::new().with_notification(Ok(notification.clone())),
    );

    h.tracker.record("Home", props(&[("k", "v")])).unwrap();
    h.tracker.wait_idle().await.unwrap();

    assert_eq!(
        h.presentation.presented(),
        vec![PresentationModel::Notification(notification)]
    );
    assert_eq!(h.tracker.user().visit_data.as_deref(), Some("vd"));
    assert_eq!(
        h.persistence.load_user().unwrap().visitor_data.as_deref(),
        Some("vsd")
    );

    let calls = h.targeting.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].properties["k"], "v");
    assert_eq!(calls[0].properties[keys::URI], "Home");

    // Later events keep the visit data written by targeting
    h.tracker.record("Next", Properties::new()).unwrap();
    h.tracker.wait_idle().await.unwrap();
    assert_eq!(h.tracker.user().visit_data.as_deref(), Some("vd"));
    h.tracker.shutdown().await;
}

#[tokio::test]
async fn test_one_failing_check_does_not_hide_the_other() {
    let h = start_with(
        profile(),
        MockTargetingService::new()
            .with_notification(Err(NetworkError::Transport {
                reason: "refused".into(),
            }))
            .with_action(Ok(beacon_tracking::TargetingAction {
                action_id: 3,
                action_type: "carousel".into(),
                payload: serde_json::json!({"items": 2}),
            })),
    );

    h.tracker.record("Home", Properties::new()).unwrap();
    h.tracker.wait_idle().await.unwrap();

    let presented = h.presentation.presented();
    assert_eq!(presented.len(), 1);
    assert_eq!(presented[0].kind(), "action");
    assert_eq!(h.tracker.user().visit_data, None);
    h.tracker.shutdown().await;
}

#[tokio::test]
async fn test_no_targeting_when_in_app_disabled() {
    let h = start_with(
        profile().with_in_app_notifications(false),
        MockTargetingService::new(),
    );
    h.tracker.record("Home", Properties::new()).unwrap();
    h.tracker.wait_idle().await.unwrap();

    assert!(h.targeting.calls().is_empty());
    assert_eq!(h.network.call_count(), 1);
    h.tracker.shutdown().await;
}

#[tokio::test]
async fn test_pixel_and_campaign_events_skip_targeting() {
    let h = start();

    h.tracker
        .track_recommendation_click("OM.zn=rec&OM.zpc=2&OM.pv=SKU")
        .unwrap();
    h.tracker
        .track_notification_click(&InAppNotification {
            query_string: Some("OM.zn=banner&OM.zpc=7".into()),
            ..InAppNotification::default()
        })
        .unwrap();
    h.tracker
        .send_campaign_parameters(props(&[("OM.csource", "mail")]))
        .unwrap();
    h.tracker.wait_idle().await.unwrap();

    assert!(h.targeting.calls().is_empty());

    let records = delivered(&h.network);
    assert_eq!(records.len(), 3);
    assert_eq!(records[0][keys::URI], keys::TRACKING_PIXEL_PAGE);
    assert_eq!(records[0][keys::DOMAIN], "shop_RUST");
    assert_eq!(records[0]["OM.pv"], "SKU");
    assert_eq!(records[1][keys::ZONE_NAME], "banner");
    assert_eq!(records[1][keys::ZONE_POSITION], "7");
    assert!(!records[2].contains_key(keys::URI));
    // Neither pixels nor campaigns count as page views
    assert_eq!(records[2][keys::PVIV], "0");
    h.tracker.shutdown().await;
}

#[tokio::test]
async fn test_malformed_click_reports_are_rejected() {
    let h = start();
    assert!(matches!(
        h.tracker.track_recommendation_click("OM.zn=rec"),
        Err(TrackingError::Validation(
            ValidationError::MalformedQueryString { .. }
        ))
    ));
    assert!(h
        .tracker
        .track_notification_click(&InAppNotification::default())
        .is_err());
    h.tracker.wait_idle().await.unwrap();
    assert_eq!(h.network.call_count(), 0);
    h.tracker.shutdown().await;
}

#[tokio::test]
async fn test_recommendations_use_current_channel() {
    let service = Arc::new(MockRecommendationService::new(Ok(vec![Product {
        code: "P1".into(),
        price: 9.5,
        ..Product::default()
    }])));
    let tracker = Tracker::start(
        profile(),
        DeviceInfo::default(),
        Collaborators::default().with_recommendation(service.clone()),
    )
    .unwrap();

    tracker
        .record("Home", props(&[(keys::CHANNEL, "web")]))
        .unwrap();
    tracker.wait_idle().await.unwrap();

    let request = RecommendationRequest::for_zone("6")
        .with_product("P0")
        .with_filter(RecommendationFilter::new(
            ProductAttribute::Brand,
            FilterType::NotEquals,
            "Acme",
        ));
    let response = tracker.recommend(request.clone()).await.unwrap();

    assert_eq!(response.error, None);
    assert_eq!(response.products[0].code, "P1");
    assert_eq!(service.requests(), vec![(request, "web".to_string())]);
    tracker.shutdown().await;
}

#[tokio::test]
async fn test_failed_recommendation_resolves_with_error() {
    let service = Arc::new(MockRecommendationService::new(Err(NetworkError::Timeout {
        after_secs: 1,
    })));
    let tracker = Tracker::start(
        profile(),
        DeviceInfo::default(),
        Collaborators::default().with_recommendation(service),
    )
    .unwrap();

    let response = tracker
        .recommend(RecommendationRequest::for_zone("6"))
        .await
        .unwrap();
    assert!(response.products.is_empty());
    assert!(response.error.is_some());
    tracker.shutdown().await;
}

// =============================================================================
// 5. PERSISTENCE
// =============================================================================

#[tokio::test]
async fn test_single_value_parameter_stored_verbatim() {
    let h = start();
    h.tracker.record("Home", props(&[("OM.gn", "v")])).unwrap();
    h.tracker.wait_idle().await.unwrap();

    let history = h.persistence.load_target_parameters().unwrap();
    assert_eq!(history.get("OM.gn").map(String::as_str), Some("v"));
    h.tracker.shutdown().await;
}

#[tokio::test]
async fn test_keyword_history_keeps_latest_nine() {
    let start = Utc.with_ymd_and_hms(2024, 3, 9, 10, 0, 0).unwrap();
    let clock = Arc::new(MockTimeSource::new(start));
    let persistence = Arc::new(InMemoryPersistence::new());
    let tracker = Tracker::start(
        profile(),
        DeviceInfo::default(),
        Collaborators::default()
            .with_persistence(persistence.clone())
            .with_time(clock.clone()),
    )
    .unwrap();

    for i in 0..12 {
        tracker
            .record("Search", props(&[("OM.kw", &format!("kw{i}"))]))
            .unwrap();
        tracker.wait_idle().await.unwrap();
        clock.advance(ChronoDuration::seconds(1));
    }

    let history = persistence.load_target_parameters().unwrap();
    let entries = decode_history(&history["OM.lkwd"]);
    assert_eq!(entries.len(), MAX_HISTORY_ENTRIES);
    assert_eq!(entries[0].value, "kw11");
    assert_eq!(entries[0].timestamp, "2024-03-09 10:00:11");
    assert_eq!(entries[8].value, "kw3");
    tracker.shutdown().await;
}

#[tokio::test]
async fn test_visit_counters_follow_inactivity_timeout() {
    let start = Utc.with_ymd_and_hms(2024, 3, 9, 10, 0, 0).unwrap();
    let clock = Arc::new(MockTimeSource::new(start));
    let tracker = Tracker::start(
        profile(),
        DeviceInfo::default(),
        Collaborators::default().with_time(clock.clone()),
    )
    .unwrap();

    tracker.record("A", Properties::new()).unwrap();
    tracker.wait_idle().await.unwrap();
    clock.advance(ChronoDuration::minutes(10));
    tracker.record("B", Properties::new()).unwrap();
    tracker.wait_idle().await.unwrap();

    let user = tracker.user();
    assert_eq!((user.nrv, user.tvc, user.pviv), (1, 1, 2));

    clock.advance(ChronoDuration::minutes(31));
    tracker.record("C", Properties::new()).unwrap();
    tracker.wait_idle().await.unwrap();

    let user = tracker.user();
    assert_eq!((user.nrv, user.tvc, user.pviv), (0, 2, 1));
    assert_eq!(user.last_visit_time.as_deref(), Some("2024-03-09 10:41:00"));
    tracker.shutdown().await;
}

#[tokio::test]
async fn test_persistence_failures_do_not_stop_the_pipeline() {
    let h = start();
    h.persistence.set_fail_writes(true);

    h.tracker.login("alice", props(&[("OM.gn", "f")])).unwrap();
    h.tracker.wait_idle().await.unwrap();

    assert_eq!(h.tracker.ex_visitor_id().as_deref(), Some("alice"));
    assert_eq!(h.network.call_count(), 1);
    assert_eq!(h.persistence.load_user().unwrap().ex_visitor_id, None);
    h.tracker.shutdown().await;
}

#[tokio::test]
async fn test_restore_resumes_saved_profile_and_identity() {
    let dir = tempfile::TempDir::new().unwrap();

    {
        let persistence = Arc::new(JsonFilePersistence::open(dir.path()).unwrap());
        assert!(Tracker::restore(
            DeviceInfo::default(),
            Collaborators::default().with_persistence(persistence.clone())
        )
        .unwrap()
        .is_none());

        let tracker = Tracker::start(
            profile().with_channel("web"),
            DeviceInfo::default(),
            Collaborators::default().with_persistence(persistence),
        )
        .unwrap();
        tracker.login("alice", Properties::new()).unwrap();
        tracker.shutdown().await;
    }

    let persistence = Arc::new(JsonFilePersistence::open(dir.path()).unwrap());
    let tracker = Tracker::restore(
        DeviceInfo::default(),
        Collaborators::default().with_persistence(persistence),
    )
    .unwrap()
    .unwrap();

    assert_eq!(tracker.profile().organization_id, "org-1");
    assert_eq!(tracker.channel(), "web");
    assert_eq!(tracker.ex_visitor_id().as_deref(), Some("alice"));
    tracker.shutdown().await;
}

// =============================================================================
// 6. STORAGE ORDERING
// =============================================================================

/// Stalls `save_user` for records matching `slow`; everything else goes
/// straight to the in-memory store.
struct SlowUserSaves {
    inner: InMemoryPersistence,
    slow: fn(&UserState) -> bool,
    delay: Duration,
}

/// Holds `save_user` while the gate is closed, giving up after two seconds.
struct GatedUserSaves {
    inner: InMemoryPersistence,
    open: Mutex<bool>,
    opened: Condvar,
    gave_up: AtomicBool,
}

impl GatedUserSaves {
    fn new() -> Self {
        Self {
            inner: InMemoryPersistence::new(),
            open: Mutex::new(true),
            opened: Condvar::new(),
            gave_up: AtomicBool::new(false),
        }
    }

    fn close(&self) {
        *self.open.lock() = false;
    }

    fn open(&self) {
        *self.open.lock() = true;
        self.opened.notify_all();
    }
}

macro_rules! delegate_to_inner {
    () => {
        fn load_user(&self) -> Result<UserState, PersistenceError> {
            self.inner.load_user()
        }

        fn save_target_parameters(
            &self,
            history: &TargetParameterHistory,
        ) -> Result<(), PersistenceError> {
            self.inner.save_target_parameters(history)
        }

        fn load_target_parameters(&self) -> Result<TargetParameterHistory, PersistenceError> {
            self.inner.load_target_parameters()
        }

        fn clear_target_parameters(&self) -> Result<(), PersistenceError> {
            self.inner.clear_target_parameters()
        }

        fn save_profile(&self, profile: &ProfileConfig) -> Result<(), PersistenceError> {
            self.inner.save_profile(profile)
        }

        fn load_profile(&self) -> Result<Option<ProfileConfig>, PersistenceError> {
            self.inner.load_profile()
        }
    };
}

impl PersistenceGateway for SlowUserSaves {
    fn save_user(&self, user: &UserState) -> Result<(), PersistenceError> {
        if (self.slow)(user) {
            std::thread::sleep(self.delay);
        }
        self.inner.save_user(user)
    }

    delegate_to_inner!();
}

impl PersistenceGateway for GatedUserSaves {
    fn save_user(&self, user: &UserState) -> Result<(), PersistenceError> {
        {
            let mut open = self.open.lock();
            let waited =
                self.opened
                    .wait_while_for(&mut open, |open| !*open, Duration::from_secs(2));
            if waited.timed_out() {
                self.gave_up.store(true, Ordering::SeqCst);
            }
        }
        self.inner.save_user(user)
    }

    delegate_to_inner!();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_slow_visit_data_save_cannot_overwrite_newer_identity() {
    let persistence = Arc::new(SlowUserSaves {
        inner: InMemoryPersistence::new(),
        // The save made right after the notification, before the identity arrives
        slow: |user| user.visit_data.is_some() && user.ex_visitor_id.is_none(),
        delay: Duration::from_millis(300),
    });
    let notification = InAppNotification {
        id: 5,
        visit_data: Some("vd".into()),
        ..InAppNotification::default()
    };
    let tracker = Tracker::start(
        profile(),
        DeviceInfo::default(),
        Collaborators::default()
            .with_persistence(persistence.clone())
            .with_targeting(Arc::new(
                MockTargetingService::new().with_notification(Ok(notification)),
            )),
    )
    .unwrap();

    tracker.record("A", Properties::new()).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    tracker
        .send_campaign_parameters(props(&[(keys::EX_VISITOR_ID, "bob")]))
        .unwrap();
    tracker.wait_idle().await.unwrap();

    let stored = persistence.load_user().unwrap();
    assert_eq!(stored.ex_visitor_id.as_deref(), Some("bob"));
    assert_eq!(stored.visit_data.as_deref(), Some("vd"));
    assert_eq!(stored, tracker.user());
    tracker.shutdown().await;
}

#[tokio::test]
async fn test_slow_storage_does_not_stall_a_current_thread_runtime() {
    let persistence = Arc::new(GatedUserSaves::new());
    let tracker = Tracker::start(
        profile(),
        DeviceInfo::default(),
        Collaborators::default().with_persistence(persistence.clone()),
    )
    .unwrap();

    persistence.close();
    tracker.record("Home", Properties::new()).unwrap();
    // Workers share this thread; this task only runs again if the save yields it
    tokio::time::sleep(Duration::from_millis(50)).await;
    persistence.open();
    tracker.wait_idle().await.unwrap();

    assert!(!persistence.gave_up.load(Ordering::SeqCst));
    assert_eq!(persistence.load_user().unwrap().pviv, 1);
    tracker.shutdown().await;
}

// =============================================================================
// 7. ACTION FORMS
// =============================================================================

#[tokio::test]
async fn test_mail_subscription_records_pixel_then_submits_with_identity() {
    let h = start();

    h.tracker.login("alice", Properties::new()).unwrap();
    h.tracker
        .subscribe_mail("OM.zn=mailform&OM.zpc=3", "12", "tok", "a@b.c")
        .unwrap();
    h.tracker.wait_idle().await.unwrap();

    let records = delivered(&h.network);
    assert_eq!(records.len(), 2);
    assert_eq!(records[1][keys::URI], keys::TRACKING_PIXEL_PAGE);
    assert_eq!(records[1][keys::ZONE_NAME], "mailform");
    assert_eq!(records[1][keys::ZONE_POSITION], "3");
    assert_eq!(records[1][keys::DOMAIN], "shop_RUST");

    let subscriptions = h.targeting.subscriptions();
    assert_eq!(subscriptions.len(), 1);
    let submitted = &subscriptions[0];
    assert_eq!(submitted[keys::SUBSCRIPTION_TYPE], "subscription_email");
    assert_eq!(submitted[keys::EX_VISITOR_ID], "alice");
    assert_eq!(submitted[keys::ACTION_ID], "12");
    assert_eq!(submitted[keys::AUTHENTICATION], "tok");
    assert_eq!(submitted[keys::SUBSCRIBED_EMAIL], "a@b.c");
    assert_eq!(submitted[keys::ORGANIZATION_ID], "org-1");
    h.tracker.shutdown().await;
}

#[tokio::test]
async fn test_spin_to_win_click_and_mail() {
    let h = start();

    h.tracker
        .track_spin_to_win_click("OM.zpc=2&OM.zn=wheel")
        .unwrap();
    h.tracker
        .subscribe_spin_to_win_mail("44", "tok", "b@c.d")
        .unwrap();
    h.tracker.wait_idle().await.unwrap();

    let records = delivered(&h.network);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0][keys::ZONE_NAME], "wheel");
    assert_eq!(records[0][keys::ZONE_POSITION], "2");
    assert!(h.targeting.calls().is_empty());

    let subscriptions = h.targeting.subscriptions();
    assert_eq!(subscriptions[0][keys::SUBSCRIPTION_TYPE], "spin_to_win_email");
    assert_eq!(subscriptions[0][keys::ACTION_ID], "44");
    h.tracker.shutdown().await;
}

#[tokio::test]
async fn test_failed_subscription_is_absorbed() {
    let h = start_with(
        profile(),
        MockTargetingService::new().with_subscribe_error(NetworkError::Rejected { status: 503 }),
    );

    h.tracker
        .subscribe_spin_to_win_mail("44", "tok", "b@c.d")
        .unwrap();
    h.tracker.record("Home", Properties::new()).unwrap();
    h.tracker.wait_idle().await.unwrap();

    assert_eq!(h.targeting.subscriptions().len(), 1);
    assert_eq!(pages(&delivered(&h.network)), vec!["Home"]);
    h.tracker.shutdown().await;
}

#[tokio::test]
async fn test_action_forms_reject_bad_input() {
    let h = start();

    assert!(matches!(
        h.tracker.subscribe_mail("", "12", "tok", "a@b.c"),
        Err(TrackingError::Validation(
            ValidationError::MalformedQueryString { .. }
        ))
    ));
    assert_eq!(
        h.tracker
            .subscribe_mail("OM.zn=a&OM.zpc=1", "12", "tok", " "),
        Err(TrackingError::Validation(ValidationError::EmptyEmail))
    );
    assert_eq!(
        h.tracker.subscribe_spin_to_win_mail("44", "tok", ""),
        Err(TrackingError::Validation(ValidationError::EmptyEmail))
    );
    assert!(h.tracker.track_spin_to_win_click("OM.zn=a").is_err());
    h.tracker.wait_idle().await.unwrap();

    assert_eq!(h.network.call_count(), 0);
    assert!(h.targeting.subscriptions().is_empty());
    h.tracker.shutdown().await;
}

#[tokio::test]
async fn test_favorite_attributes_use_current_identity() {
    let favorites: FavoriteAttributes = [(
        "brand".to_string(),
        vec!["acme".to_string(), "zeta".to_string()],
    )]
    .into_iter()
    .collect();
    let h = start_with(
        profile().with_in_app_notifications(false),
        MockTargetingService::new().with_favorites(Ok(favorites.clone())),
    );

    h.tracker.login("alice", Properties::new()).unwrap();
    let response = h.tracker.favorite_attributes(Some(5)).await.unwrap();

    assert_eq!(response.favorites, favorites);
    assert_eq!(response.error, None);
    let calls = h.targeting.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].kind, "favorites");
    assert_eq!(calls[0].user.ex_visitor_id.as_deref(), Some("alice"));
    h.tracker.shutdown().await;
}

#[tokio::test]
async fn test_failed_favorite_lookup_resolves_with_error() {
    let h = start_with(
        profile(),
        MockTargetingService::new().with_favorites(Err(NetworkError::Transport {
            reason: "refused".into(),
        })),
    );

    let response = h.tracker.favorite_attributes(None).await.unwrap();
    assert!(response.favorites.is_empty());
    assert!(response.error.is_some());
    h.tracker.shutdown().await;
}
