// Dashboard controller: the page's control flow
//
// Adapters are constructed once at startup and injected here; nothing in the
// core holds a process-wide handle. `mount` wires the live listeners and makes
// sure the right worker is registered; `subscribe_to_push` runs the whole
// subscribe flow including the user-facing prompts.

use std::cell::RefCell;
use std::rc::Rc;
use uuid::Uuid;

use crate::config::DashConfig;
use crate::device::{DeviceFeed, DeviceSnapshot, SnapshotObserver};
use crate::identity::{AuthSubscription, Identity, IdentityProvider};
use crate::prompt::UserPrompt;
use crate::push::persistence::SubscriptionPersistence;
use crate::push::reconciler::{ReconcileReport, RegistrationPlatform, WorkerReconciler};
use crate::push::subscription::{PushService, SubscriptionSource};
use crate::push::vapid::decode_application_server_key;
use crate::store::RealtimeStore;
use crate::{DashError, Result};

pub const SIGN_IN_PROMPT: &str = "You must sign in to subscribe. Sign in now?";
pub const SUBSCRIBED_ALERT: &str = "Subscribed to push notifications";
pub const SAVE_FAILED_ALERT: &str = "Saving the subscription failed; check the console for errors";
pub const MISSING_KEY_ALERT: &str = "Set the VAPID public key to subscribe to push";
pub const FAILED_ALERT: &str = "Subscription failed";

/// How a subscribe attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscribeOutcome {
    /// Stored at `path`
    Subscribed { path: String },
    /// The platform issued a subscription but the store write failed
    SaveFailed,
    /// The user declined to sign in
    SignInDeclined,
    MissingApplicationServerKey,
    Failed(String),
}

/// Live listeners started by `Dashboard::mount`. Dropping it releases them.
pub struct MountGuard {
    feed: DeviceFeed,
    user: Rc<RefCell<Option<Identity>>>,
    _auth: AuthSubscription,
    pub worker: ReconcileReport,
}

impl MountGuard {
    pub fn devices(&self) -> DeviceSnapshot {
        self.feed.snapshot()
    }

    /// Identity as last reported by the auth listener.
    pub fn user(&self) -> Option<Identity> {
        self.user.borrow().clone()
    }
}

pub struct Dashboard<R: RegistrationPlatform> {
    config: DashConfig,
    store: Rc<dyn RealtimeStore>,
    identity: Rc<dyn IdentityProvider>,
    prompt: Rc<dyn UserPrompt>,
    push: Rc<dyn PushService>,
    reconciler: WorkerReconciler<R>,
    persistence: SubscriptionPersistence,
}

impl<R: RegistrationPlatform> Dashboard<R> {
    pub fn new(
        config: DashConfig,
        store: Rc<dyn RealtimeStore>,
        identity: Rc<dyn IdentityProvider>,
        prompt: Rc<dyn UserPrompt>,
        push: Rc<dyn PushService>,
        registrations: R,
    ) -> Self {
        let reconciler =
            WorkerReconciler::new(registrations, Rc::clone(&prompt), config.worker_script.clone());
        let persistence = SubscriptionPersistence::new(Rc::clone(&store), Rc::clone(&identity));
        Self {
            config,
            store,
            identity,
            prompt,
            push,
            reconciler,
            persistence,
        }
    }

    pub fn config(&self) -> &DashConfig {
        &self.config
    }

    pub fn reconciler(&self) -> &WorkerReconciler<R> {
        &self.reconciler
    }

    /// Start the device feed and auth listener, then reconcile the worker
    /// registration. Reconciliation problems end up in `MountGuard::worker`.
    pub async fn mount(
        &self,
        on_devices: Option<SnapshotObserver>,
        mut on_user: Option<Box<dyn FnMut(Option<&Identity>)>>,
    ) -> Result<MountGuard> {
        let feed = DeviceFeed::listen(self.store.as_ref(), on_devices)?;

        let user = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&user);
        let auth = self.identity.on_change(Box::new(move |identity| {
            tracing::debug!(
                "auth state: {}",
                identity.as_ref().map(|i| i.uid.as_str()).unwrap_or("signed out")
            );
            if let Some(cb) = on_user.as_mut() {
                cb(identity.as_ref());
            }
            *sink.borrow_mut() = identity;
        }));

        let worker = self.reconciler.run().await;

        Ok(MountGuard {
            feed,
            user,
            _auth: auth,
            worker,
        })
    }

    pub fn current_identity(&self) -> Option<Identity> {
        self.identity.current()
    }

    pub async fn sign_in(&self) -> Result<Identity> {
        self.identity.sign_in_interactive().await
    }

    pub async fn sign_out(&self) -> Result<()> {
        self.identity.sign_out().await
    }

    /// Subscribe this browser to push and store the subscription. Every
    /// outcome is reported to the user; nothing is returned as an error.
    pub async fn subscribe_to_push(&self) -> SubscribeOutcome {
        if self.identity.current().is_none() {
            if !self.prompt.confirm(SIGN_IN_PROMPT) {
                tracing::info!("Subscribe cancelled: sign-in declined");
                return SubscribeOutcome::SignInDeclined;
            }
            if let Err(e) = self.identity.sign_in_interactive().await {
                return self.fail(e);
            }
        }

        let Some(key) = self.config.application_server_key() else {
            tracing::warn!("No VAPID public key configured");
            self.prompt.alert(MISSING_KEY_ALERT);
            return SubscribeOutcome::MissingApplicationServerKey;
        };

        let subscription = match self.obtain_subscription(key).await {
            Ok(subscription) => subscription,
            Err(e) => return self.fail(e),
        };

        let client_id = Uuid::new_v4().to_string();
        match self
            .persistence
            .try_persist(&client_id, subscription.as_ref())
            .await
        {
            Ok(path) => {
                self.prompt.alert(SUBSCRIBED_ALERT);
                SubscribeOutcome::Subscribed { path }
            }
            Err(e) => {
                tracing::error!("Saving subscription failed: {}", e);
                self.prompt.alert(SAVE_FAILED_ALERT);
                SubscribeOutcome::SaveFailed
            }
        }
    }

    async fn obtain_subscription(&self, key: &str) -> Result<Box<dyn SubscriptionSource>> {
        let key_bytes = decode_application_server_key(key)?;
        self.push.subscribe(&key_bytes).await
    }

    fn fail(&self, error: DashError) -> SubscribeOutcome {
        tracing::error!("Subscription failed: {}", error);
        self.prompt.alert(FAILED_ALERT);
        SubscribeOutcome::Failed(error.to_string())
    }
}
