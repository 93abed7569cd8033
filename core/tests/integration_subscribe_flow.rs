use async_trait::async_trait;
use homedash_core::dashboard::{
    FAILED_ALERT, MISSING_KEY_ALERT, SAVE_FAILED_ALERT, SIGN_IN_PROMPT, SUBSCRIBED_ALERT,
};
use homedash_core::push::reconciler::{RegistrationInfo, CLEANUP_PROMPT};
use homedash_core::{
    DashConfig, DashError, Dashboard, Identity, MemoryIdentityProvider, MemoryStore, PushService,
    RealtimeStore, RegistrationPlatform, SubscribeOutcome, SubscriptionSource, UserPrompt,
};
use serde_json::{json, Value};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

const ORIGIN: &str = "https://home.example.com";

#[derive(Default)]
struct RecordingPrompt {
    answers: RefCell<VecDeque<bool>>,
    confirms: RefCell<Vec<String>>,
    alerts: RefCell<Vec<String>>,
}

impl RecordingPrompt {
    fn answering(answers: &[bool]) -> Rc<Self> {
        let prompt = Self::default();
        prompt.answers.borrow_mut().extend(answers.iter().copied());
        Rc::new(prompt)
    }
}

impl UserPrompt for RecordingPrompt {
    fn confirm(&self, message: &str) -> bool {
        self.confirms.borrow_mut().push(message.to_string());
        self.answers.borrow_mut().pop_front().unwrap_or(false)
    }

    fn alert(&self, message: &str) {
        self.alerts.borrow_mut().push(message.to_string());
    }
}

#[derive(Default)]
struct FakePush {
    fail: bool,
    keys_seen: RefCell<Vec<Vec<u8>>>,
}

#[async_trait(?Send)]
impl PushService for FakePush {
    async fn subscribe(
        &self,
        application_server_key: &[u8],
    ) -> homedash_core::Result<Box<dyn SubscriptionSource>> {
        self.keys_seen
            .borrow_mut()
            .push(application_server_key.to_vec());
        if self.fail {
            return Err(DashError::Platform("permission denied".to_string()));
        }
        Ok(Box::new(json!({
            "endpoint": "https://push.example.com/send/abc",
            "keys": {"p256dh": "pk", "auth": "au"}
        })))
    }
}

#[derive(Default)]
struct StaticRegistrations {
    installed: RefCell<Vec<RegistrationInfo>>,
    registered: RefCell<Vec<String>>,
}

#[async_trait(?Send)]
impl RegistrationPlatform for StaticRegistrations {
    type Registration = RegistrationInfo;

    fn resolve_script_url(&self, script: &str) -> homedash_core::Result<String> {
        Ok(format!("{}/{}", ORIGIN, script))
    }

    async fn registrations(&self) -> homedash_core::Result<Vec<RegistrationInfo>> {
        Ok(self.installed.borrow().clone())
    }

    fn describe(&self, registration: &RegistrationInfo) -> RegistrationInfo {
        registration.clone()
    }

    async fn unregister(&self, registration: &RegistrationInfo) -> homedash_core::Result<bool> {
        self.installed
            .borrow_mut()
            .retain(|r| r.scope != registration.scope);
        Ok(true)
    }

    async fn register(&self, script_url: &str) -> homedash_core::Result<()> {
        self.registered.borrow_mut().push(script_url.to_string());
        Ok(())
    }
}

struct Harness {
    store: MemoryStore,
    identity: MemoryIdentityProvider,
    prompt: Rc<RecordingPrompt>,
    push: Rc<FakePush>,
    dashboard: Dashboard<StaticRegistrations>,
}

fn harness(
    config: DashConfig,
    identity: MemoryIdentityProvider,
    prompt: Rc<RecordingPrompt>,
    push: FakePush,
    registrations: StaticRegistrations,
) -> Harness {
    let store = MemoryStore::new();
    let push = Rc::new(push);
    let dashboard = Dashboard::new(
        config,
        Rc::new(store.clone()),
        Rc::new(identity.clone()),
        prompt.clone(),
        push.clone(),
        registrations,
    );
    Harness {
        store,
        identity,
        prompt,
        push,
        dashboard,
    }
}

fn config_with_key() -> DashConfig {
    DashConfig {
        vapid_public_key: Some("BBBB".to_string()),
        ..Default::default()
    }
}

fn alice() -> Identity {
    Identity::new("alice-uid", Some("alice@example.com".to_string()))
}

#[tokio::test]
async fn test_signed_in_user_subscribes() {
    let h = harness(
        config_with_key(),
        MemoryIdentityProvider::signed_in(alice()),
        RecordingPrompt::answering(&[]),
        FakePush::default(),
        StaticRegistrations::default(),
    );

    let outcome = h.dashboard.subscribe_to_push().await;

    assert_eq!(
        outcome,
        SubscribeOutcome::Subscribed {
            path: "subscriptions/alice-uid".to_string()
        }
    );
    assert!(h.prompt.confirms.borrow().is_empty());
    assert_eq!(*h.prompt.alerts.borrow(), vec![SUBSCRIBED_ALERT]);
    assert_eq!(*h.push.keys_seen.borrow(), vec![vec![0x04, 0x10, 0x41]]);

    let record = h.store.get("subscriptions/alice-uid").unwrap();
    assert_eq!(record["uid"], "alice-uid");
    assert_eq!(record["email"], "alice@example.com");
    assert_eq!(
        record["subscription"]["endpoint"],
        "https://push.example.com/send/abc"
    );
}

#[tokio::test]
async fn test_anonymous_user_declines_sign_in() {
    let h = harness(
        config_with_key(),
        MemoryIdentityProvider::with_account(alice()),
        RecordingPrompt::answering(&[false]),
        FakePush::default(),
        StaticRegistrations::default(),
    );

    let outcome = h.dashboard.subscribe_to_push().await;

    assert_eq!(outcome, SubscribeOutcome::SignInDeclined);
    assert_eq!(*h.prompt.confirms.borrow(), vec![SIGN_IN_PROMPT]);
    assert!(h.prompt.alerts.borrow().is_empty());
    assert!(h.push.keys_seen.borrow().is_empty());
    assert_eq!(h.identity.sign_in_attempts(), 0);
    assert_eq!(h.store.write_count(), 0);
}

#[tokio::test]
async fn test_anonymous_user_signs_in_then_subscribes() {
    let h = harness(
        config_with_key(),
        MemoryIdentityProvider::with_account(alice()),
        RecordingPrompt::answering(&[true]),
        FakePush::default(),
        StaticRegistrations::default(),
    );

    let outcome = h.dashboard.subscribe_to_push().await;

    assert!(matches!(outcome, SubscribeOutcome::Subscribed { .. }));
    assert_eq!(h.identity.sign_in_attempts(), 1);
    assert_eq!(h.dashboard.current_identity(), Some(alice()));
    assert_eq!(
        h.store.get("subscriptions/alice-uid").unwrap()["uid"],
        "alice-uid"
    );
}

#[tokio::test]
async fn test_cancelled_sign_in_fails_with_alert() {
    let h = harness(
        config_with_key(),
        MemoryIdentityProvider::new(),
        RecordingPrompt::answering(&[true]),
        FakePush::default(),
        StaticRegistrations::default(),
    );

    let outcome = h.dashboard.subscribe_to_push().await;

    assert!(matches!(outcome, SubscribeOutcome::Failed(_)));
    assert_eq!(*h.prompt.alerts.borrow(), vec![FAILED_ALERT]);
    assert!(h.push.keys_seen.borrow().is_empty());
}

#[tokio::test]
async fn test_missing_key_is_reported() {
    let h = harness(
        DashConfig::default(),
        MemoryIdentityProvider::signed_in(alice()),
        RecordingPrompt::answering(&[]),
        FakePush::default(),
        StaticRegistrations::default(),
    );

    let outcome = h.dashboard.subscribe_to_push().await;

    assert_eq!(outcome, SubscribeOutcome::MissingApplicationServerKey);
    assert_eq!(*h.prompt.alerts.borrow(), vec![MISSING_KEY_ALERT]);
    assert!(h.push.keys_seen.borrow().is_empty());
}

#[tokio::test]
async fn test_undecodable_key_fails_before_subscribing() {
    let config = DashConfig {
        vapid_public_key: Some("not a key!".to_string()),
        ..Default::default()
    };
    let h = harness(
        config,
        MemoryIdentityProvider::signed_in(alice()),
        RecordingPrompt::answering(&[]),
        FakePush::default(),
        StaticRegistrations::default(),
    );

    let outcome = h.dashboard.subscribe_to_push().await;

    assert!(matches!(outcome, SubscribeOutcome::Failed(_)));
    assert!(h.push.keys_seen.borrow().is_empty());
}

#[tokio::test]
async fn test_platform_refusal_fails_with_alert() {
    let h = harness(
        config_with_key(),
        MemoryIdentityProvider::signed_in(alice()),
        RecordingPrompt::answering(&[]),
        FakePush {
            fail: true,
            ..Default::default()
        },
        StaticRegistrations::default(),
    );

    let outcome = h.dashboard.subscribe_to_push().await;

    assert!(matches!(outcome, SubscribeOutcome::Failed(ref m) if m.contains("permission denied")));
    assert_eq!(*h.prompt.alerts.borrow(), vec![FAILED_ALERT]);
    assert_eq!(h.store.write_count(), 0);
}

#[tokio::test]
async fn test_store_rejection_reports_save_failure() {
    let h = harness(
        config_with_key(),
        MemoryIdentityProvider::signed_in(alice()),
        RecordingPrompt::answering(&[]),
        FakePush::default(),
        StaticRegistrations::default(),
    );
    h.store.set_reject_writes(true);

    let outcome = h.dashboard.subscribe_to_push().await;

    assert_eq!(outcome, SubscribeOutcome::SaveFailed);
    assert_eq!(*h.prompt.alerts.borrow(), vec![SAVE_FAILED_ALERT]);
}

#[tokio::test]
async fn test_mount_wires_feed_auth_and_worker() {
    let registrations = StaticRegistrations::default();
    registrations.installed.borrow_mut().extend([
        RegistrationInfo {
            scope: format!("{}/", ORIGIN),
            active: Some(format!("{}/sw.js", ORIGIN)),
            ..Default::default()
        },
        RegistrationInfo {
            scope: format!("{}/old/", ORIGIN),
            active: Some(format!("{}/old/service-worker.js", ORIGIN)),
            ..Default::default()
        },
    ]);
    let h = harness(
        config_with_key(),
        MemoryIdentityProvider::with_account(alice()),
        RecordingPrompt::answering(&[true]),
        FakePush::default(),
        registrations,
    );

    let users = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&users);
    let guard = h
        .dashboard
        .mount(
            None,
            Some(Box::new(move |user: Option<&Identity>| {
                sink.borrow_mut().push(user.map(|u| u.uid.clone()))
            })),
        )
        .await
        .unwrap();

    assert_eq!(*h.prompt.confirms.borrow(), vec![CLEANUP_PROMPT]);
    assert_eq!(guard.worker.unregistered, 1);
    assert!(guard.worker.registered);
    assert_eq!(
        *h.dashboard.reconciler().platform().registered.borrow(),
        vec![format!("{}/sw.js", ORIGIN)]
    );

    h.store
        .write("devices/thermostat", json!({"icon": "thermo", "temp": 21.5}))
        .await
        .unwrap();
    assert_eq!(guard.devices().len(), 1);
    assert_eq!(
        guard.devices().get("thermostat").unwrap().avatar_letter(),
        "T"
    );

    h.dashboard.sign_in().await.unwrap();
    assert_eq!(guard.user(), Some(alice()));
    h.dashboard.sign_out().await.unwrap();
    assert_eq!(guard.user(), None);
    assert_eq!(
        *users.borrow(),
        vec![None, Some("alice-uid".to_string()), None]
    );

    assert_eq!(h.store.listener_count(), 1);
    drop(guard);
    assert_eq!(h.store.listener_count(), 0);
}

#[tokio::test]
async fn test_repeat_subscribe_overwrites_single_record() {
    let h = harness(
        config_with_key(),
        MemoryIdentityProvider::signed_in(alice()),
        RecordingPrompt::answering(&[]),
        FakePush::default(),
        StaticRegistrations::default(),
    );

    h.dashboard.subscribe_to_push().await;
    h.dashboard.subscribe_to_push().await;

    let all = h.store.get("subscriptions").unwrap();
    let records: Vec<&Value> = all.as_object().unwrap().values().collect();
    assert_eq!(records.len(), 1);
    assert_eq!(h.store.write_count(), 2);
}
