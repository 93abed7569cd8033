//! Reading stored subscriptions back.
//!
//! Records under `subscriptions/` come in two shapes: the record envelope this
//! crate writes (`{ subscription: {...}, createdAt, uid?, email? }`) and bare
//! subscriptions written by older clients (`{ endpoint, keys }`). A record is
//! deliverable only when it yields an endpoint plus both encryption keys.

use serde::Deserialize;
use serde_json::Value;
use std::fmt;

/// A stored subscription that a push sender could deliver to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliverableSubscription {
    pub key: String,
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
    pub uid: Option<String>,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordProblem {
    NotAnObject,
    MissingEndpoint,
    MissingP256dh,
    MissingAuth,
}

impl fmt::Display for RecordProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordProblem::NotAnObject => write!(f, "record is not an object"),
            RecordProblem::MissingEndpoint => write!(f, "missing endpoint"),
            RecordProblem::MissingP256dh => write!(f, "missing p256dh key"),
            RecordProblem::MissingAuth => write!(f, "missing auth key"),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct LooseKeys {
    #[serde(default)]
    p256dh: Option<String>,
    #[serde(default)]
    auth: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LooseSubscription {
    #[serde(default)]
    endpoint: Option<String>,
    #[serde(default)]
    keys: Option<LooseKeys>,
}

impl LooseSubscription {
    fn parse(value: &Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or_default()
    }

    fn is_complete(&self) -> bool {
        let filled = |s: &Option<String>| s.as_deref().is_some_and(|s| !s.is_empty());
        filled(&self.endpoint)
            && self
                .keys
                .as_ref()
                .is_some_and(|k| filled(&k.p256dh) && filled(&k.auth))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

/// Decode one record stored at `subscriptions/<key>`.
pub fn inspect_record(key: &str, raw: &Value) -> Result<DeliverableSubscription, RecordProblem> {
    if !raw.is_object() {
        return Err(RecordProblem::NotAnObject);
    }

    let mut sub = LooseSubscription::parse(raw);
    if !sub.is_complete() {
        if let Some(inner) = raw.get("subscription").filter(|v| v.is_object()) {
            sub = LooseSubscription::parse(inner);
        }
    }

    let endpoint = non_empty(sub.endpoint).ok_or(RecordProblem::MissingEndpoint)?;
    let keys = sub.keys.unwrap_or_default();
    let p256dh = non_empty(keys.p256dh).ok_or(RecordProblem::MissingP256dh)?;
    let auth = non_empty(keys.auth).ok_or(RecordProblem::MissingAuth)?;

    let text = |field: &str| raw.get(field).and_then(Value::as_str).map(str::to_string);
    Ok(DeliverableSubscription {
        key: key.to_string(),
        endpoint,
        p256dh,
        auth,
        uid: text("uid"),
        created_at: text("createdAt"),
    })
}

/// Inspect every record of the `subscriptions` node, ordered by key.
pub fn audit_subscriptions(root: &Value) -> Vec<(String, Result<DeliverableSubscription, RecordProblem>)> {
    let Some(map) = root.as_object() else {
        return Vec::new();
    };
    let mut results: Vec<_> = map
        .iter()
        .map(|(key, raw)| (key.clone(), inspect_record(key, raw)))
        .collect();
    results.sort_by(|a, b| a.0.cmp(&b.0));
    results
}
