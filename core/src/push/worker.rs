// Push event handler: background worker logic
//
// The worker keeps no state between events. Each push becomes one system
// notification; each notification click focuses an open window or opens a new
// one. Anything asynchronous is handed to the event's wait-until hook so the
// platform keeps the worker alive until it has finished.

use async_trait::async_trait;
use futures::future::LocalBoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::rc::Rc;

use crate::config::DashConfig;
use crate::Result;

/// Deferred work handed to the platform's lifetime extension.
pub type WorkFuture = LocalBoxFuture<'static, Result<()>>;

/// A worker event whose lifetime can be extended ("wait until").
pub trait ExtendableEvent {
    /// The platform must not consider the event handled until `work` settles.
    fn wait_until(&self, work: WorkFuture);
}

/// The notification a click event refers to.
pub trait ClickedNotification {
    fn close(&self);
    fn data(&self) -> Value;
}

/// Notification and client APIs of the worker's platform.
#[async_trait(?Send)]
pub trait WorkerPlatform {
    type Client;

    async fn show_notification(&self, notification: &NotificationContent) -> Result<()>;

    /// Open window clients, in platform enumeration order.
    async fn window_clients(&self) -> Result<Vec<Self::Client>>;

    fn client_url(&self, client: &Self::Client) -> Option<String>;

    fn can_focus(&self, client: &Self::Client) -> bool;

    async fn focus(&self, client: &Self::Client) -> Result<()>;

    fn can_open_window(&self) -> bool;

    async fn open_window(&self, url: &str) -> Result<()>;
}

/// Everything needed to display one notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationContent {
    pub title: String,
    pub body: String,
    pub icon: String,
    /// Full parsed (or defaulted) payload, available again at click time
    pub data: Value,
}

/// Fallbacks applied when a payload leaves fields out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    pub default_title: String,
    pub default_icon: String,
    pub open_path: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        WorkerConfig::from(&DashConfig::default())
    }
}

impl From<&DashConfig> for WorkerConfig {
    fn from(config: &DashConfig) -> Self {
        Self {
            default_title: config.default_title.clone(),
            default_icon: config.default_icon.clone(),
            open_path: config.open_path.clone(),
        }
    }
}

/// Payload value for a push. Anything that parses as JSON is used as sent;
/// text that does not parse becomes the body of a default-titled
/// notification. A JSON `null` is treated like a push without data.
pub fn parse_payload(payload: Option<&str>, default_title: &str) -> Value {
    let no_data = || json!({ "title": default_title, "body": "" });
    let Some(text) = payload else {
        tracing::debug!("push event had no data");
        return no_data();
    };

    match serde_json::from_str::<Value>(text) {
        Ok(Value::Null) => no_data(),
        Ok(data) => data,
        Err(_) => {
            tracing::debug!("push data is not JSON, using it as text");
            json!({ "title": default_title, "body": text })
        }
    }
}

/// Field of an object payload, if it holds a usable value. Empty strings,
/// zero and `false` count as absent; scalar payloads have no fields.
fn text_field(data: &Value, field: &str) -> Option<String> {
    match data.as_object()?.get(field)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) if n.as_f64().map_or(true, |v| v != 0.0) => Some(n.to_string()),
        Value::Bool(true) => Some("true".to_string()),
        _ => None,
    }
}

/// Build the notification for a push with the given payload text.
pub fn notification_for(payload: Option<&str>, config: &WorkerConfig) -> NotificationContent {
    let data = parse_payload(payload, &config.default_title);
    NotificationContent {
        title: text_field(&data, "title").unwrap_or_else(|| config.default_title.clone()),
        body: text_field(&data, "body").unwrap_or_default(),
        icon: text_field(&data, "icon").unwrap_or_else(|| config.default_icon.clone()),
        data,
    }
}

/// What a notification click ended up doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    Focused(String),
    Opened(String),
    Nothing,
}

pub struct PushWorker<P: WorkerPlatform> {
    platform: Rc<P>,
    config: WorkerConfig,
}

impl<P: WorkerPlatform + 'static> PushWorker<P> {
    pub fn new(platform: Rc<P>, config: WorkerConfig) -> Self {
        Self { platform, config }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Handle a push event. Showing the notification is deferred through
    /// `event.wait_until`.
    pub fn on_push(&self, payload: Option<&str>, event: &dyn ExtendableEvent) {
        let notification = notification_for(payload, &self.config);
        let platform = Rc::clone(&self.platform);

        event.wait_until(
            async move {
                tracing::debug!("showing notification '{}'", notification.title);
                platform.show_notification(&notification).await.map_err(|e| {
                    tracing::error!("showNotification failed: {}", e);
                    e
                })
            }
            .boxed_local(),
        );
    }

    /// Handle a notification click: close it right away, then focus or open a
    /// window under `event.wait_until`.
    pub fn on_notification_click(
        &self,
        notification: &dyn ClickedNotification,
        event: &dyn ExtendableEvent,
    ) {
        tracing::debug!("notification click: {}", notification.data());
        notification.close();

        let platform = Rc::clone(&self.platform);
        let open_path = self.config.open_path.clone();
        event.wait_until(
            async move {
                let outcome = route_click(platform.as_ref(), &open_path).await?;
                tracing::debug!("click routed: {:?}", outcome);
                Ok(())
            }
            .boxed_local(),
        );
    }
}

/// Focus the first window client that has a URL and can be focused; otherwise
/// open `open_path` when the platform allows it. With several windows open the
/// choice follows the platform's enumeration order.
pub async fn route_click<P: WorkerPlatform + ?Sized>(
    platform: &P,
    open_path: &str,
) -> Result<ClickOutcome> {
    let clients = platform.window_clients().await?;
    for client in &clients {
        let Some(url) = platform.client_url(client) else {
            continue;
        };
        if platform.can_focus(client) {
            platform.focus(client).await?;
            return Ok(ClickOutcome::Focused(url));
        }
    }

    if platform.can_open_window() {
        platform.open_window(open_path).await?;
        return Ok(ClickOutcome::Opened(open_path.to_string()));
    }
    Ok(ClickOutcome::Nothing)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> WorkerConfig {
        WorkerConfig::default()
    }

    #[test]
    fn test_json_fields_are_used() {
        let n = notification_for(
            Some(r#"{"title": "Door", "body": "Front door opened", "icon": "/door.png"}"#),
            &defaults(),
        );
        assert_eq!(n.title, "Door");
        assert_eq!(n.body, "Front door opened");
        assert_eq!(n.icon, "/door.png");
        assert_eq!(n.data["icon"], "/door.png");
    }

    #[test]
    fn test_json_missing_fields_use_defaults() {
        let n = notification_for(Some(r#"{"device": "thermostat"}"#), &defaults());
        assert_eq!(n.title, "Notification");
        assert_eq!(n.body, "");
        assert_eq!(n.icon, "/icon.png");
        assert_eq!(n.data, json!({"device": "thermostat"}));
    }

    #[test]
    fn test_text_payload_becomes_body() {
        let n = notification_for(Some("Test push from home server"), &defaults());
        assert_eq!(n.title, "Notification");
        assert_eq!(n.body, "Test push from home server");
        assert_eq!(n.icon, "/icon.png");
    }

    #[test]
    fn test_json_scalars_keep_default_fields() {
        let n = notification_for(Some("42"), &defaults());
        assert_eq!(n.title, "Notification");
        assert_eq!(n.body, "");
        assert_eq!(n.data, json!(42));

        let n = notification_for(Some(r#""hello""#), &defaults());
        assert_eq!(n.title, "Notification");
        assert_eq!(n.body, "");
        assert_eq!(n.data, json!("hello"));
    }

    #[test]
    fn test_json_null_is_treated_as_no_data() {
        let n = notification_for(Some("null"), &defaults());
        assert_eq!(n.title, "Notification");
        assert_eq!(n.body, "");
        assert_eq!(n.data, json!({"title": "Notification", "body": ""}));
    }

    #[test]
    fn test_zero_fields_fall_back() {
        let n = notification_for(Some(r#"{"title": 0, "body": 7}"#), &defaults());
        assert_eq!(n.title, "Notification");
        assert_eq!(n.body, "7");
    }

    #[test]
    fn test_no_data_defaults() {
        let n = notification_for(None, &defaults());
        assert_eq!(n.title, "Notification");
        assert_eq!(n.body, "");
        assert_eq!(n.data, json!({"title": "Notification", "body": ""}));
    }

    #[test]
    fn test_empty_title_falls_back() {
        let n = notification_for(Some(r#"{"title": "", "body": "b"}"#), &defaults());
        assert_eq!(n.title, "Notification");
        assert_eq!(n.body, "b");
    }

    #[test]
    fn test_configured_defaults() {
        let config = WorkerConfig {
            default_title: "Home".to_string(),
            default_icon: "/house.png".to_string(),
            open_path: "/dash/".to_string(),
        };
        let n = notification_for(Some("hi"), &config);
        assert_eq!(n.title, "Home");
        assert_eq!(n.icon, "/house.png");
    }
}
