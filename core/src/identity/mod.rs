// Identity provider adapter
//
// The identity service (popup sign-in, session tracking) lives outside this
// crate. The core reads the current user, asks for interactive sign-in when a
// flow needs one, and reacts to auth-state transitions. It never mutates the
// identity itself.

mod memory;

pub use memory::MemoryIdentityProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::store::ListenerHandle;
use crate::Result;

/// A signed-in user as reported by the identity service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub uid: String,
    pub email: Option<String>,
}

impl Identity {
    pub fn new(uid: impl Into<String>, email: Option<String>) -> Self {
        Self {
            uid: uid.into(),
            email,
        }
    }
}

/// Receives the new identity (or `None` after sign-out) on every transition.
pub type AuthCallback = Box<dyn FnMut(Option<Identity>)>;

/// Handle for an `on_change` listener; dropping it stops notifications.
pub type AuthSubscription = ListenerHandle;

#[async_trait(?Send)]
pub trait IdentityProvider {
    /// The user signed in right now, if any.
    fn current(&self) -> Option<Identity>;

    /// Run the provider's interactive sign-in (popup or redirect).
    async fn sign_in_interactive(&self) -> Result<Identity>;

    async fn sign_out(&self) -> Result<()>;

    /// Register for auth-state transitions. The callback also receives the
    /// state at registration time.
    fn on_change(&self, callback: AuthCallback) -> AuthSubscription;
}
