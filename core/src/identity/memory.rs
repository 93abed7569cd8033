// In-process identity provider for tests and tooling

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::{AuthCallback, AuthSubscription, Identity, IdentityProvider};
use crate::{DashError, Result};

/// Identity provider backed by process memory.
///
/// `sign_in_interactive` succeeds with the configured account, or fails when
/// no account is configured (the equivalent of the user closing the popup).
#[derive(Clone, Default)]
pub struct MemoryIdentityProvider {
    current: Arc<RwLock<Option<Identity>>>,
    account: Arc<RwLock<Option<Identity>>>,
    listeners: Arc<RwLock<HashMap<u64, Arc<Mutex<AuthCallback>>>>>,
    next_listener: Arc<AtomicU64>,
    sign_ins: Arc<AtomicU64>,
}

impl MemoryIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider whose interactive sign-in returns `account`.
    pub fn with_account(account: Identity) -> Self {
        let provider = Self::new();
        *provider.account.write() = Some(account);
        provider
    }

    /// Provider that starts out signed in as `identity`.
    pub fn signed_in(identity: Identity) -> Self {
        let provider = Self::with_account(identity.clone());
        *provider.current.write() = Some(identity);
        provider
    }

    /// Number of interactive sign-ins attempted.
    pub fn sign_in_attempts(&self) -> u64 {
        self.sign_ins.load(Ordering::SeqCst)
    }

    fn set_current(&self, identity: Option<Identity>) {
        *self.current.write() = identity.clone();
        let callbacks: Vec<_> = self.listeners.read().values().cloned().collect();
        for callback in callbacks {
            (*callback.lock())(identity.clone());
        }
    }
}

#[async_trait(?Send)]
impl IdentityProvider for MemoryIdentityProvider {
    fn current(&self) -> Option<Identity> {
        self.current.read().clone()
    }

    async fn sign_in_interactive(&self) -> Result<Identity> {
        self.sign_ins.fetch_add(1, Ordering::SeqCst);
        let account = self
            .account
            .read()
            .clone()
            .ok_or_else(|| DashError::Identity("sign-in was cancelled".to_string()))?;
        tracing::info!("Signed in as {}", account.uid);
        self.set_current(Some(account.clone()));
        Ok(account)
    }

    async fn sign_out(&self) -> Result<()> {
        self.set_current(None);
        Ok(())
    }

    fn on_change(&self, callback: AuthCallback) -> AuthSubscription {
        let id = self.next_listener.fetch_add(1, Ordering::SeqCst);
        let callback = Arc::new(Mutex::new(callback));
        self.listeners.write().insert(id, Arc::clone(&callback));
        (*callback.lock())(self.current());

        let listeners = Arc::clone(&self.listeners);
        AuthSubscription::new(move || {
            listeners.write().remove(&id);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[tokio::test]
    async fn test_sign_in_and_out_notify_listeners() {
        let provider = MemoryIdentityProvider::with_account(Identity::new(
            "u1",
            Some("u1@example.com".to_string()),
        ));
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let _sub = provider.on_change(Box::new(move |id| sink.borrow_mut().push(id)));

        provider.sign_in_interactive().await.unwrap();
        provider.sign_out().await.unwrap();

        let seen = seen.borrow();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0], None);
        assert_eq!(seen[1].as_ref().map(|i| i.uid.as_str()), Some("u1"));
        assert_eq!(seen[2], None);
    }

    #[tokio::test]
    async fn test_sign_in_without_account_fails() {
        let provider = MemoryIdentityProvider::new();
        assert!(provider.sign_in_interactive().await.is_err());
        assert_eq!(provider.current(), None);
        assert_eq!(provider.sign_in_attempts(), 1);
    }

    #[test]
    fn test_dropped_listener_is_removed() {
        let provider = MemoryIdentityProvider::signed_in(Identity::new("u1", None));
        let sub = provider.on_change(Box::new(|_| {}));
        assert_eq!(provider.listeners.read().len(), 1);
        drop(sub);
        assert!(provider.listeners.read().is_empty());
    }
}
