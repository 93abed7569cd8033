// Push notifications: subscription lifecycle and background worker logic
//
// Page side: `reconciler` keeps the right worker registered, `vapid` decodes
// the application-server key, `subscription` shapes what the platform hands
// back and `persistence` stores it under the caller's identity.
// Worker side: `worker` turns push events into notifications and routes clicks.

pub mod persistence;
pub mod reconciler;
pub mod record;
pub mod subscription;
pub mod vapid;
pub mod worker;
