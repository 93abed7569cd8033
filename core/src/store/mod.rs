// Store module: realtime store adapter and path conventions

pub mod backend;
pub mod paths;

pub use backend::{ListenerHandle, MemoryStore, RealtimeStore, SnapshotCallback};
pub use paths::{device_path, subscription_path, DEVICES_ROOT, SUBSCRIPTIONS_ROOT};

/// Handle for a live `subscribe(path, ..)` listener.
pub type StoreSubscription = ListenerHandle;
