// HomeDash Core: device dashboard and push subscription lifecycle
//
// Everything in this crate is platform-agnostic. Browser APIs, the realtime
// store and the identity provider are reached through the traits below, so the
// same logic runs inside the wasm bundle and in host unit tests.

pub mod config;
pub mod dashboard;
pub mod device;
pub mod identity;
pub mod prompt;
pub mod push;
pub mod store;

use thiserror::Error;

pub use config::{DashConfig, StoreConfig};
pub use dashboard::{Dashboard, MountGuard, SubscribeOutcome};
pub use device::{Device, DeviceFeed, DeviceSnapshot};
pub use identity::{AuthSubscription, Identity, IdentityProvider, MemoryIdentityProvider};
pub use prompt::UserPrompt;
pub use push::persistence::{PushSubscriptionRecord, SubscriptionPersistence};
pub use push::reconciler::{ReconcileReport, RegistrationPlatform, WorkerReconciler};
pub use push::subscription::{
    normalize, NormalizedSubscription, PushService, StoredSubscription, SubscriptionSource,
};
pub use push::vapid::decode_application_server_key;
pub use push::worker::{
    ClickOutcome, ExtendableEvent, NotificationContent, PushWorker, WorkerConfig,
    WorkerPlatform,
};
pub use store::{MemoryStore, RealtimeStore, StoreSubscription};

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Debug, Error)]
pub enum DashError {
    #[error("Realtime store error: {0}")]
    Store(String),
    #[error("Identity provider error: {0}")]
    Identity(String),
    #[error("Platform error: {0}")]
    Platform(String),
    #[error("Invalid application-server key: {0}")]
    InvalidKey(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("No application-server key configured")]
    MissingApplicationServerKey,
    #[error("Invalid store path: {0}")]
    InvalidPath(String),
    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, DashError>;
