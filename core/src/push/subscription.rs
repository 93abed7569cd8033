//! Subscription normalizer.
//!
//! The platform hands back an opaque subscription object. Before it can be
//! stored it has to become plain JSON. Three shapes are recognised, checked in
//! order:
//!
//! 1. the value can serialize itself (`toJSON` on browser subscriptions), and
//!    that output is stored as is;
//! 2. the value has an `endpoint`, so `{ endpoint, keys }` is built from its
//!    `keys` field or, failing that, from the raw key accessors;
//! 3. anything else is stored unchanged.
//!
//! Normalization never fails. If shaping errors part way, the raw value is
//! stored instead.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Failure while inspecting a subscription value.
pub type ShapeResult<T> = std::result::Result<T, String>;

/// Encryption keys attached to a push subscription, base64url text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionKeys {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p256dh: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<String>,
}

impl SubscriptionKeys {
    pub fn is_empty(&self) -> bool {
        self.p256dh.is_none() && self.auth.is_none()
    }
}

/// `{ endpoint, keys? }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedSubscription {
    pub endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keys: Option<SubscriptionKeys>,
}

/// What actually gets written into the subscription record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StoredSubscription {
    /// Output of the value's own JSON conversion
    Canonical(Value),
    /// Built from `endpoint` and keys
    Shaped(NormalizedSubscription),
    /// Passed through unchanged
    Raw(Value),
}

impl StoredSubscription {
    pub fn to_value(&self) -> Value {
        match self {
            Self::Canonical(v) | Self::Raw(v) => v.clone(),
            Self::Shaped(s) => serde_json::to_value(s).unwrap_or(Value::Null),
        }
    }

    pub fn endpoint(&self) -> Option<&str> {
        match self {
            Self::Canonical(v) | Self::Raw(v) => v.get("endpoint").and_then(Value::as_str),
            Self::Shaped(s) => Some(s.endpoint.as_str()),
        }
    }
}

/// Raw key accessor names (`getKey(name)` on browser subscriptions).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyName {
    P256dh,
    Auth,
}

impl KeyName {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyName::P256dh => "p256dh",
            KeyName::Auth => "auth",
        }
    }
}

/// Capabilities a subscription value may expose.
pub trait SubscriptionSource {
    /// Canonical JSON conversion. `None` when the value has no such capability.
    fn to_json(&self) -> Option<ShapeResult<Value>>;

    fn endpoint(&self) -> Option<String>;

    /// Existing `keys` field, if any.
    fn keys(&self) -> ShapeResult<Option<SubscriptionKeys>>;

    /// Raw key bytes from the key accessor, if the value has one.
    fn raw_key(&self, name: KeyName) -> ShapeResult<Option<Vec<u8>>>;

    /// The value as-is, used for passthrough.
    fn raw(&self) -> Value;
}

/// Which branch a subscription value falls into.
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionShape {
    Convertible(Value),
    Endpoint {
        endpoint: String,
        keys: Option<SubscriptionKeys>,
    },
    Opaque,
}

/// Work out the shape of `source`, checking each branch's precondition in order.
pub fn classify(source: &dyn SubscriptionSource) -> ShapeResult<SubscriptionShape> {
    if let Some(json) = source.to_json() {
        return json.map(SubscriptionShape::Convertible);
    }

    if let Some(endpoint) = source.endpoint() {
        let keys = match source.keys()? {
            Some(keys) => Some(keys),
            None => keys_from_accessor(source)?,
        };
        return Ok(SubscriptionShape::Endpoint { endpoint, keys });
    }

    Ok(SubscriptionShape::Opaque)
}

fn keys_from_accessor(source: &dyn SubscriptionSource) -> ShapeResult<Option<SubscriptionKeys>> {
    let encode = |bytes: Vec<u8>| URL_SAFE_NO_PAD.encode(bytes);
    let keys = SubscriptionKeys {
        p256dh: source.raw_key(KeyName::P256dh)?.map(encode),
        auth: source.raw_key(KeyName::Auth)?.map(encode),
    };
    Ok((!keys.is_empty()).then_some(keys))
}

/// Turn a subscription value into its stored shape. Never fails.
pub fn normalize(source: &dyn SubscriptionSource) -> StoredSubscription {
    match classify(source) {
        Ok(SubscriptionShape::Convertible(json)) => StoredSubscription::Canonical(json),
        Ok(SubscriptionShape::Endpoint { endpoint, keys }) => {
            StoredSubscription::Shaped(NormalizedSubscription { endpoint, keys })
        }
        Ok(SubscriptionShape::Opaque) => {
            tracing::debug!("subscription has no endpoint, storing it unchanged");
            StoredSubscription::Raw(source.raw())
        }
        Err(e) => {
            tracing::warn!("Failed to normalize subscription, storing raw value: {}", e);
            StoredSubscription::Raw(source.raw())
        }
    }
}

/// Issues push subscriptions (the platform's push manager).
#[async_trait(?Send)]
pub trait PushService {
    /// Wait for an active worker registration, then subscribe with
    /// user-visible notifications and the given application-server key.
    async fn subscribe(
        &self,
        application_server_key: &[u8],
    ) -> crate::Result<Box<dyn SubscriptionSource>>;
}

/// A plain JSON value: no conversion capability and no key accessor.
impl SubscriptionSource for Value {
    fn to_json(&self) -> Option<ShapeResult<Value>> {
        None
    }

    fn endpoint(&self) -> Option<String> {
        self.get("endpoint")
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    fn keys(&self) -> ShapeResult<Option<SubscriptionKeys>> {
        match self.get("keys") {
            None | Some(Value::Null) => Ok(None),
            Some(keys) => serde_json::from_value(keys.clone())
                .map(Some)
                .map_err(|e| format!("malformed keys field: {}", e)),
        }
    }

    fn raw_key(&self, _name: KeyName) -> ShapeResult<Option<Vec<u8>>> {
        Ok(None)
    }

    fn raw(&self) -> Value {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Subscription object with a configurable set of capabilities.
    #[derive(Default)]
    struct FakeSubscription {
        json: Option<ShapeResult<Value>>,
        endpoint: Option<String>,
        p256dh: Option<Vec<u8>>,
        auth: Option<Vec<u8>>,
        key_error: bool,
    }

    impl SubscriptionSource for FakeSubscription {
        fn to_json(&self) -> Option<ShapeResult<Value>> {
            self.json.clone()
        }

        fn endpoint(&self) -> Option<String> {
            self.endpoint.clone()
        }

        fn keys(&self) -> ShapeResult<Option<SubscriptionKeys>> {
            Ok(None)
        }

        fn raw_key(&self, name: KeyName) -> ShapeResult<Option<Vec<u8>>> {
            if self.key_error {
                return Err("getKey threw".to_string());
            }
            Ok(match name {
                KeyName::P256dh => self.p256dh.clone(),
                KeyName::Auth => self.auth.clone(),
            })
        }

        fn raw(&self) -> Value {
            json!({"fake": true, "endpoint": self.endpoint})
        }
    }

    #[test]
    fn test_conversion_output_is_used_verbatim() {
        let canonical = json!({
            "endpoint": "https://push.example.com/abc",
            "expirationTime": null,
            "keys": {"p256dh": "BPk", "auth": "c2VjcmV0"}
        });
        let sub = FakeSubscription {
            json: Some(Ok(canonical.clone())),
            endpoint: Some("https://ignored.example.com".to_string()),
            ..Default::default()
        };
        assert_eq!(normalize(&sub), StoredSubscription::Canonical(canonical.clone()));
        assert_eq!(normalize(&sub).to_value(), canonical);
    }

    #[test]
    fn test_endpoint_with_raw_key_accessor() {
        let sub = FakeSubscription {
            endpoint: Some("https://push.example.com/abc".to_string()),
            p256dh: Some(vec![0x04, 0x10, 0x41]),
            auth: Some(vec![0xfb, 0xff]),
            ..Default::default()
        };
        let stored = normalize(&sub);
        assert_eq!(
            stored.to_value(),
            json!({
                "endpoint": "https://push.example.com/abc",
                "keys": {"p256dh": "BBBB", "auth": "-_8"}
            })
        );
    }

    #[test]
    fn test_endpoint_without_any_keys() {
        let sub = FakeSubscription {
            endpoint: Some("https://push.example.com/abc".to_string()),
            ..Default::default()
        };
        assert_eq!(
            normalize(&sub).to_value(),
            json!({"endpoint": "https://push.example.com/abc"})
        );
    }

    #[test]
    fn test_existing_keys_field_wins() {
        let value = json!({
            "endpoint": "https://push.example.com/abc",
            "keys": {"p256dh": "pk", "auth": "au"},
            "extra": 1
        });
        let stored = normalize(&value);
        assert_eq!(
            stored,
            StoredSubscription::Shaped(NormalizedSubscription {
                endpoint: "https://push.example.com/abc".to_string(),
                keys: Some(SubscriptionKeys {
                    p256dh: Some("pk".to_string()),
                    auth: Some("au".to_string()),
                }),
            })
        );
    }

    #[test]
    fn test_no_endpoint_passes_through() {
        let value = json!({"token": "opaque"});
        assert_eq!(normalize(&value), StoredSubscription::Raw(value.clone()));
    }

    #[test]
    fn test_failures_fall_back_to_raw() {
        let throwing = FakeSubscription {
            json: Some(Err("toJSON threw".to_string())),
            ..Default::default()
        };
        assert_eq!(normalize(&throwing), StoredSubscription::Raw(throwing.raw()));

        let bad_key = FakeSubscription {
            endpoint: Some("https://push.example.com/abc".to_string()),
            key_error: true,
            ..Default::default()
        };
        assert_eq!(normalize(&bad_key), StoredSubscription::Raw(bad_key.raw()));

        let malformed = json!({"endpoint": "https://push.example.com", "keys": 7});
        assert_eq!(normalize(&malformed), StoredSubscription::Raw(malformed.clone()));
    }
}
