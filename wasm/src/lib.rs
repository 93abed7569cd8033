// homedash-wasm: WebAssembly bindings for the dashboard page and its worker
//
// Two independent entry points: `HomeDash` for the page, `installWorker` for
// the service worker. They share no state.

pub mod adapters;
pub mod convert;
pub mod registration;
pub mod worker;

use crate::adapters::{BrowserPrompt, JsAuth, JsIdentityProvider, JsRealtimeStore, JsStore};
use crate::convert::{js_error, to_js};
use crate::registration::{BrowserPushService, BrowserRegistrations};
use homedash_core::device::SnapshotObserver;
use homedash_core::{
    DashConfig, Dashboard, DeviceSnapshot, Identity, MountGuard, ReconcileReport, SubscribeOutcome,
};
use serde_json::Value;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Once;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;

static LOGGING: Once = Once::new();

#[wasm_bindgen]
pub fn init_logging() {
    LOGGING.call_once(|| {
        console_error_panic_hook::set_once();
        tracing_wasm::set_as_global_default();
    });
}

fn parse_config(config: JsValue) -> Result<DashConfig, JsValue> {
    let config: DashConfig = if config.is_undefined() || config.is_null() {
        DashConfig::default()
    } else {
        serde_wasm_bindgen::from_value(config)?
    };
    config
        .validate()
        .map_err(|e| JsValue::from_str(&format!("{}", e)))?;
    Ok(config)
}

#[wasm_bindgen]
pub struct HomeDash {
    dashboard: Rc<Dashboard<BrowserRegistrations>>,
    /// Listeners started by `mount`, released by `unmount`
    mounted: Rc<RefCell<Option<MountGuard>>>,
}

#[wasm_bindgen]
impl HomeDash {
    /// `store` and `auth` are the page's realtime-store and identity objects.
    #[wasm_bindgen(constructor)]
    pub fn new(config: JsValue, store: JsStore, auth: JsAuth) -> Result<HomeDash, JsValue> {
        init_logging();
        let config = parse_config(config)?;

        let window = web_sys::window().ok_or_else(|| JsValue::from_str("no window"))?;
        let container = window.navigator().service_worker();
        let base_url = window.location().href()?;

        let dashboard = Dashboard::new(
            config,
            Rc::new(JsRealtimeStore::new(store)),
            Rc::new(JsIdentityProvider::new(auth)),
            Rc::new(BrowserPrompt::new(window)),
            Rc::new(BrowserPushService::new(container.clone())),
            BrowserRegistrations::new(container, base_url),
        );
        Ok(Self {
            dashboard: Rc::new(dashboard),
            mounted: Rc::new(RefCell::new(None)),
        })
    }

    /// Start the device feed and auth listener and reconcile the worker
    /// registration. `onDevices` receives an array of device cards, `onUser`
    /// a `{ uid, email }` object or `null`. Resolves to the worker report.
    pub fn mount(
        &self,
        on_devices: Option<js_sys::Function>,
        on_user: Option<js_sys::Function>,
    ) -> js_sys::Promise {
        let dashboard = Rc::clone(&self.dashboard);
        let mounted = Rc::clone(&self.mounted);

        future_to_promise(async move {
            let devices = on_devices.map(|f| {
                Box::new(move |snapshot: &DeviceSnapshot| {
                    call_with(&f, &device_cards(snapshot));
                }) as SnapshotObserver
            });
            let user = on_user.map(|f| {
                Box::new(move |identity: Option<&Identity>| call_with(&f, &identity))
                    as Box<dyn FnMut(Option<&Identity>)>
            });

            let guard = dashboard
                .mount(devices, user)
                .await
                .map_err(|e| JsValue::from_str(&format!("{}", e)))?;
            let report = to_js(&WasmWorkerReport::from(&guard.worker))?;
            if let Some(previous) = mounted.borrow_mut().replace(guard) {
                tracing::debug!("replacing earlier mount");
                drop(previous);
            }
            Ok(report)
        })
    }

    /// Release the listeners started by `mount`.
    pub fn unmount(&self) {
        self.mounted.borrow_mut().take();
    }

    /// Run the subscribe flow. Resolves to `{ status, path?, error? }`.
    #[wasm_bindgen(js_name = subscribeToPush)]
    pub fn subscribe_to_push(&self) -> js_sys::Promise {
        let dashboard = Rc::clone(&self.dashboard);
        future_to_promise(async move {
            let outcome = dashboard.subscribe_to_push().await;
            to_js(&WasmSubscribeOutcome::from(outcome))
        })
    }

    #[wasm_bindgen(js_name = signIn)]
    pub fn sign_in(&self) -> js_sys::Promise {
        let dashboard = Rc::clone(&self.dashboard);
        future_to_promise(async move {
            let identity = dashboard
                .sign_in()
                .await
                .map_err(|e| JsValue::from_str(&format!("{}", e)))?;
            to_js(&identity)
        })
    }

    #[wasm_bindgen(js_name = signOut)]
    pub fn sign_out(&self) -> js_sys::Promise {
        let dashboard = Rc::clone(&self.dashboard);
        future_to_promise(async move {
            dashboard
                .sign_out()
                .await
                .map_err(|e| JsValue::from_str(&format!("{}", e)))?;
            Ok(JsValue::UNDEFINED)
        })
    }

    #[wasm_bindgen(js_name = currentUser)]
    pub fn current_user(&self) -> Result<JsValue, JsValue> {
        to_js(&self.dashboard.current_identity())
    }
}

fn call_with<T: serde::Serialize + ?Sized>(callback: &js_sys::Function, arg: &T) {
    let result = to_js(arg).and_then(|value| callback.call1(&JsValue::NULL, &value));
    if let Err(e) = result {
        tracing::warn!("page callback failed: {}", js_error(&e));
    }
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct WasmDeviceCard {
    name: String,
    icon: Option<String>,
    avatar: String,
    details: String,
    data: Value,
}

fn device_cards(snapshot: &DeviceSnapshot) -> Vec<WasmDeviceCard> {
    snapshot
        .devices()
        .map(|device| WasmDeviceCard {
            icon: device.icon().map(str::to_string),
            avatar: device.avatar_letter(),
            details: device.details(),
            name: device.name,
            data: device.data,
        })
        .collect()
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct WasmWorkerReport {
    desired_url: Option<String>,
    registrations_seen: usize,
    stale_found: usize,
    unregistered: usize,
    consent_declined: bool,
    failures: Vec<String>,
    registered: bool,
    error: Option<String>,
}

impl From<&ReconcileReport> for WasmWorkerReport {
    fn from(report: &ReconcileReport) -> Self {
        Self {
            desired_url: report.desired_url.clone(),
            registrations_seen: report.registrations_seen,
            stale_found: report.stale_found,
            unregistered: report.unregistered,
            consent_declined: report.consent_declined,
            failures: report.failures.clone(),
            registered: report.registered,
            error: report.error.clone(),
        }
    }
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct WasmSubscribeOutcome {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl From<SubscribeOutcome> for WasmSubscribeOutcome {
    fn from(outcome: SubscribeOutcome) -> Self {
        let (status, path, error) = match outcome {
            SubscribeOutcome::Subscribed { path } => ("subscribed", Some(path), None),
            SubscribeOutcome::SaveFailed => ("saveFailed", None, None),
            SubscribeOutcome::SignInDeclined => ("signInDeclined", None, None),
            SubscribeOutcome::MissingApplicationServerKey => ("missingKey", None, None),
            SubscribeOutcome::Failed(e) => ("failed", None, Some(e)),
        };
        Self {
            status,
            path,
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_device_cards_carry_avatar_and_details() {
        let snapshot = DeviceSnapshot::from_value(json!({
            "lamp": {"icon": "bulb", "on": true},
            "sensor": {"temp": 19}
        }));
        let cards = device_cards(&snapshot);
        assert_eq!(cards.len(), 2);
        assert_eq!(cards[0].name, "lamp");
        assert_eq!(cards[0].avatar, "B");
        assert_eq!(cards[1].avatar, "?");
        assert_eq!(cards[1].icon, None);
        assert!(cards[1].details.contains("\"temp\": 19"));
    }

    #[test]
    fn test_outcome_shapes() {
        let subscribed = serde_json::to_value(WasmSubscribeOutcome::from(
            SubscribeOutcome::Subscribed {
                path: "subscriptions/u1".to_string(),
            },
        ))
        .unwrap();
        assert_eq!(
            subscribed,
            json!({"status": "subscribed", "path": "subscriptions/u1"})
        );

        let failed =
            serde_json::to_value(WasmSubscribeOutcome::from(SubscribeOutcome::Failed("x".into())))
                .unwrap();
        assert_eq!(failed, json!({"status": "failed", "error": "x"}));
    }

    #[test]
    fn test_worker_report_is_camel_case() {
        let report = ReconcileReport {
            registrations_seen: 2,
            stale_found: 1,
            registered: true,
            ..Default::default()
        };
        let value = serde_json::to_value(WasmWorkerReport::from(&report)).unwrap();
        assert_eq!(value["registrationsSeen"], 2);
        assert_eq!(value["staleFound"], 1);
        assert_eq!(value["registered"], true);
        assert_eq!(value["desiredUrl"], Value::Null);
    }
}

#[cfg(all(test, target_arch = "wasm32"))]
mod browser_tests {
    use super::*;
    use wasm_bindgen_test::*;

    wasm_bindgen_test_configure!(run_in_browser);

    #[wasm_bindgen_test]
    fn test_logging_init_is_idempotent() {
        init_logging();
        init_logging();
    }

    #[wasm_bindgen_test]
    fn test_config_parsing_applies_defaults() {
        let config = parse_config(JsValue::UNDEFINED).unwrap();
        assert_eq!(config.worker_script, "sw.js");

        let bad = to_js(&serde_json::json!({"openPath": "no-slash"})).unwrap();
        assert!(parse_config(bad).is_err());
    }
}
