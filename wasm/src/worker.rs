// Service worker entry point: push and notification-click handlers
//
// Runs in the worker global scope. Nothing here is shared with the page
// bundle; the worker keeps its own config and platform handle.

use async_trait::async_trait;
use homedash_core::push::worker::{ClickedNotification, WorkFuture};
use homedash_core::{
    DashConfig, DashError, ExtendableEvent, NotificationContent, PushWorker, Result, WorkerConfig,
    WorkerPlatform,
};
use serde_json::Value;
use std::rc::Rc;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::{future_to_promise, JsFuture};
use web_sys::{
    Client, ClientQueryOptions, ClientType, NotificationEvent, NotificationOptions, PushEvent,
    ServiceWorkerGlobalScope, WindowClient,
};

use crate::convert::{from_js, js_error, method, to_js};

fn platform_err(e: JsValue) -> DashError {
    DashError::Platform(js_error(&e))
}

/// Notification and client APIs of `self` in the worker.
pub struct BrowserWorkerPlatform {
    scope: ServiceWorkerGlobalScope,
}

impl BrowserWorkerPlatform {
    pub fn new(scope: ServiceWorkerGlobalScope) -> Self {
        Self { scope }
    }
}

#[async_trait(?Send)]
impl WorkerPlatform for BrowserWorkerPlatform {
    type Client = Client;

    async fn show_notification(&self, notification: &NotificationContent) -> Result<()> {
        let options = NotificationOptions::new();
        options.set_body(&notification.body);
        options.set_icon(&notification.icon);
        options.set_data(&to_js(&notification.data).map_err(platform_err)?);

        let shown = self
            .scope
            .registration()
            .show_notification_with_options(&notification.title, &options)
            .map_err(platform_err)?;
        JsFuture::from(shown).await.map_err(platform_err)?;
        Ok(())
    }

    async fn window_clients(&self) -> Result<Vec<Client>> {
        let query = ClientQueryOptions::new();
        query.set_type(ClientType::Window);
        let list = JsFuture::from(self.scope.clients().match_all_with_options(&query))
            .await
            .map_err(platform_err)?;
        let list: js_sys::Array = list.dyn_into().map_err(platform_err)?;
        Ok(list
            .iter()
            .filter_map(|c| c.dyn_into::<Client>().ok())
            .collect())
    }

    fn client_url(&self, client: &Client) -> Option<String> {
        Some(client.url()).filter(|url| !url.is_empty())
    }

    fn can_focus(&self, client: &Client) -> bool {
        method(client.as_ref(), "focus").is_some()
    }

    async fn focus(&self, client: &Client) -> Result<()> {
        let window: &WindowClient = client.unchecked_ref();
        JsFuture::from(window.focus().map_err(platform_err)?)
            .await
            .map_err(platform_err)?;
        Ok(())
    }

    fn can_open_window(&self) -> bool {
        method(self.scope.clients().as_ref(), "openWindow").is_some()
    }

    async fn open_window(&self, url: &str) -> Result<()> {
        JsFuture::from(self.scope.clients().open_window(url))
            .await
            .map_err(platform_err)?;
        Ok(())
    }
}

/// Wait-until hook of a worker event.
struct EventLifetime<'a>(&'a web_sys::ExtendableEvent);

impl ExtendableEvent for EventLifetime<'_> {
    fn wait_until(&self, work: WorkFuture) {
        let promise = future_to_promise(async move {
            work.await
                .map(|_| JsValue::UNDEFINED)
                .map_err(|e| JsValue::from_str(&e.to_string()))
        });
        if let Err(e) = self.0.wait_until(&promise) {
            tracing::error!("waitUntil rejected: {}", js_error(&e));
        }
    }
}

struct ClickedBrowserNotification(web_sys::Notification);

impl ClickedNotification for ClickedBrowserNotification {
    fn close(&self) {
        self.0.close();
    }

    fn data(&self) -> Value {
        from_js(&self.0.data()).unwrap_or(Value::Null)
    }
}

/// Install `push` and `notificationclick` handlers on the worker global scope.
/// `config` is the same JSON config the page uses; missing or undefined
/// means defaults.
#[wasm_bindgen(js_name = installWorker)]
pub fn install_worker(config: JsValue) -> std::result::Result<(), JsValue> {
    crate::init_logging();

    let config: DashConfig = if config.is_undefined() || config.is_null() {
        DashConfig::default()
    } else {
        serde_wasm_bindgen::from_value(config)?
    };
    config
        .validate()
        .map_err(|e| JsValue::from_str(&format!("{}", e)))?;

    let scope: ServiceWorkerGlobalScope = js_sys::global().dyn_into()?;
    let platform = Rc::new(BrowserWorkerPlatform::new(scope.clone()));
    let worker = Rc::new(PushWorker::new(platform, WorkerConfig::from(&config)));

    let push_worker = Rc::clone(&worker);
    let onpush = Closure::wrap(Box::new(move |event: PushEvent| {
        let text = event.data().map(|data| data.text());
        push_worker.on_push(text.as_deref(), &EventLifetime(&event));
    }) as Box<dyn FnMut(PushEvent)>);
    scope.set_onpush(Some(onpush.as_ref().unchecked_ref()));

    let click_worker = Rc::clone(&worker);
    let onclick = Closure::wrap(Box::new(move |event: NotificationEvent| {
        let notification = ClickedBrowserNotification(event.notification());
        click_worker.on_notification_click(&notification, &EventLifetime(&event));
    }) as Box<dyn FnMut(NotificationEvent)>);
    scope.set_onnotificationclick(Some(onclick.as_ref().unchecked_ref()));

    // Handlers live as long as the worker global scope.
    onpush.forget();
    onclick.forget();

    tracing::info!("worker handlers installed");
    Ok(())
}
