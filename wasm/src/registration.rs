// Service worker registrations and push subscriptions on the page

use async_trait::async_trait;
use homedash_core::push::reconciler::RegistrationInfo;
use homedash_core::push::subscription::{KeyName, ShapeResult, SubscriptionKeys};
use homedash_core::{DashError, PushService, RegistrationPlatform, Result, SubscriptionSource};
use serde_json::Value;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;
use web_sys::{PushSubscriptionOptionsInit, ServiceWorkerContainer, ServiceWorkerRegistration};

use crate::convert::{from_js, js_error, method, property};

fn platform_err(e: JsValue) -> DashError {
    DashError::Platform(js_error(&e))
}

/// `navigator.serviceWorker`, with script URLs resolved against the page.
pub struct BrowserRegistrations {
    container: ServiceWorkerContainer,
    base_url: String,
}

impl BrowserRegistrations {
    pub fn new(container: ServiceWorkerContainer, base_url: impl Into<String>) -> Self {
        Self {
            container,
            base_url: base_url.into(),
        }
    }
}

#[async_trait(?Send)]
impl RegistrationPlatform for BrowserRegistrations {
    type Registration = ServiceWorkerRegistration;

    fn resolve_script_url(&self, script: &str) -> Result<String> {
        web_sys::Url::new_with_base(script, &self.base_url)
            .map(|url| url.href())
            .map_err(platform_err)
    }

    async fn registrations(&self) -> Result<Vec<ServiceWorkerRegistration>> {
        let list = JsFuture::from(self.container.get_registrations())
            .await
            .map_err(platform_err)?;
        let list: js_sys::Array = list.dyn_into().map_err(platform_err)?;
        Ok(list
            .iter()
            .filter_map(|r| r.dyn_into::<ServiceWorkerRegistration>().ok())
            .collect())
    }

    fn describe(&self, registration: &ServiceWorkerRegistration) -> RegistrationInfo {
        RegistrationInfo {
            scope: registration.scope(),
            active: registration.active().map(|w| w.script_url()),
            waiting: registration.waiting().map(|w| w.script_url()),
            installing: registration.installing().map(|w| w.script_url()),
        }
    }

    async fn unregister(&self, registration: &ServiceWorkerRegistration) -> Result<bool> {
        let done = JsFuture::from(registration.unregister().map_err(platform_err)?)
            .await
            .map_err(platform_err)?;
        Ok(done.as_bool().unwrap_or(false))
    }

    async fn register(&self, script_url: &str) -> Result<()> {
        let registration = JsFuture::from(self.container.register(script_url))
            .await
            .map_err(platform_err)?;
        let scope = property(&registration, "scope").as_string();
        tracing::info!("Service worker registered: {}", scope.unwrap_or_default());
        Ok(())
    }
}

/// Push manager of the ready registration.
pub struct BrowserPushService {
    container: ServiceWorkerContainer,
}

impl BrowserPushService {
    pub fn new(container: ServiceWorkerContainer) -> Self {
        Self { container }
    }
}

#[async_trait(?Send)]
impl PushService for BrowserPushService {
    async fn subscribe(
        &self,
        application_server_key: &[u8],
    ) -> Result<Box<dyn SubscriptionSource>> {
        let ready = JsFuture::from(self.container.ready().map_err(platform_err)?)
            .await
            .map_err(platform_err)?;
        let registration: ServiceWorkerRegistration = ready.dyn_into().map_err(platform_err)?;
        let manager = registration.push_manager().map_err(platform_err)?;

        let options = PushSubscriptionOptionsInit::new();
        options.set_user_visible_only(true);
        let key = js_sys::Uint8Array::from(application_server_key);
        options.set_application_server_key(&key);

        let pending = manager
            .subscribe_with_options(&options)
            .map_err(platform_err)?;
        let subscription = JsFuture::from(pending).await.map_err(platform_err)?;
        tracing::debug!("push subscription issued");
        Ok(Box::new(JsSubscription(subscription)))
    }
}

/// Subscription object handed back by the push manager. Its capabilities are
/// probed by property lookup since the page may also pass polyfilled objects.
pub struct JsSubscription(pub JsValue);

impl SubscriptionSource for JsSubscription {
    fn to_json(&self) -> Option<ShapeResult<Value>> {
        let to_json = method(&self.0, "toJSON")?;
        Some(
            to_json
                .call0(&self.0)
                .map_err(|e| js_error(&e))
                .and_then(|json| from_js(&json)),
        )
    }

    fn endpoint(&self) -> Option<String> {
        property(&self.0, "endpoint").as_string()
    }

    fn keys(&self) -> ShapeResult<Option<SubscriptionKeys>> {
        let keys = property(&self.0, "keys");
        if keys.is_undefined() || keys.is_null() {
            return Ok(None);
        }
        serde_wasm_bindgen::from_value(keys)
            .map(Some)
            .map_err(|e| format!("malformed keys field: {}", e))
    }

    fn raw_key(&self, name: KeyName) -> ShapeResult<Option<Vec<u8>>> {
        let Some(get_key) = method(&self.0, "getKey") else {
            return Ok(None);
        };
        let raw = get_key
            .call1(&self.0, &JsValue::from_str(name.as_str()))
            .map_err(|e| js_error(&e))?;
        if raw.is_null() || raw.is_undefined() {
            return Ok(None);
        }
        Ok(Some(js_sys::Uint8Array::new(&raw).to_vec()))
    }

    fn raw(&self) -> Value {
        from_js(&self.0).unwrap_or_else(|e| {
            tracing::warn!("subscription is not representable as JSON: {}", e);
            Value::Null
        })
    }
}

#[cfg(all(test, target_arch = "wasm32"))]
mod tests {
    use super::*;
    use homedash_core::{normalize, StoredSubscription};
    use serde_json::json;
    use wasm_bindgen_test::*;

    fn object(pairs: &[(&str, JsValue)]) -> JsValue {
        let obj = js_sys::Object::new();
        for (k, v) in pairs {
            js_sys::Reflect::set(&obj, &JsValue::from_str(k), v).unwrap();
        }
        obj.into()
    }

    #[wasm_bindgen_test]
    fn test_plain_object_with_endpoint_is_shaped() {
        let sub = JsSubscription(object(&[(
            "endpoint",
            JsValue::from_str("https://push.example.com/abc"),
        )]));
        assert_eq!(
            normalize(&sub).to_value(),
            json!({"endpoint": "https://push.example.com/abc"})
        );
    }

    #[wasm_bindgen_test]
    fn test_to_json_capability_wins() {
        let to_json =
            js_sys::Function::new_no_args("return {endpoint: 'https://e', keys: {auth: 'a'}};");
        let sub = JsSubscription(object(&[
            ("endpoint", JsValue::from_str("https://ignored")),
            ("toJSON", to_json.into()),
        ]));
        assert!(matches!(normalize(&sub), StoredSubscription::Canonical(_)));
        assert_eq!(normalize(&sub).endpoint(), Some("https://e"));
    }
}
