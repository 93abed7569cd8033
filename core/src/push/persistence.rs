// Subscription persistence
//
// One record per storage key under `subscriptions/<key>`. The key is the
// signed-in user's uid, or the caller's client id for anonymous subscribers.
// Every write replaces the whole record; nothing here reads before writing, so
// concurrent writes to the same key resolve last-write-wins in the store.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::rc::Rc;

use super::subscription::{normalize, StoredSubscription, SubscriptionSource};
use crate::identity::{Identity, IdentityProvider};
use crate::store::{subscription_path, RealtimeStore};
use crate::Result;

/// Owner fields attached when the subscriber is signed in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordOwner {
    pub uid: String,
    /// Written even when `null`, mirroring what the identity service reports
    pub email: Option<String>,
}

impl From<Identity> for RecordOwner {
    fn from(identity: Identity) -> Self {
        Self {
            uid: identity.uid,
            email: identity.email,
        }
    }
}

/// The value stored at `subscriptions/<key>`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushSubscriptionRecord {
    pub subscription: StoredSubscription,
    /// ISO-8601 UTC, millisecond precision
    pub created_at: String,
    #[serde(flatten)]
    pub owner: Option<RecordOwner>,
}

impl PushSubscriptionRecord {
    pub fn new(subscription: StoredSubscription, owner: Option<RecordOwner>) -> Self {
        Self {
            subscription,
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            owner,
        }
    }
}

/// Writes push subscriptions keyed by identity.
pub struct SubscriptionPersistence {
    store: Rc<dyn RealtimeStore>,
    identity: Rc<dyn IdentityProvider>,
}

impl SubscriptionPersistence {
    pub fn new(store: Rc<dyn RealtimeStore>, identity: Rc<dyn IdentityProvider>) -> Self {
        Self { store, identity }
    }

    /// Storage key and record for `subscription` as of now.
    pub fn prepare(
        &self,
        client_id: &str,
        subscription: &dyn SubscriptionSource,
    ) -> (String, PushSubscriptionRecord) {
        let user = self.identity.current();
        let key = user
            .as_ref()
            .map(|u| u.uid.clone())
            .unwrap_or_else(|| client_id.to_string());
        let record = PushSubscriptionRecord::new(normalize(subscription), user.map(RecordOwner::from));
        (key, record)
    }

    /// Write the subscription and return the path it was stored at.
    pub async fn try_persist(
        &self,
        client_id: &str,
        subscription: &dyn SubscriptionSource,
    ) -> Result<String> {
        let (key, record) = self.prepare(client_id, subscription);
        let path = subscription_path(&key)?;
        let value = serde_json::to_value(&record)?;
        self.store.write(&path, value).await?;
        tracing::info!("Saved subscription to {}", path);
        Ok(path)
    }

    /// Write the subscription; `false` on any failure. Reporting to the user is
    /// left to the caller.
    pub async fn persist(&self, client_id: &str, subscription: &dyn SubscriptionSource) -> bool {
        match self.try_persist(client_id, subscription).await {
            Ok(_) => true,
            Err(e) => {
                tracing::error!("Saving subscription failed: {}", e);
                false
            }
        }
    }
}
