// Page-side adapters: realtime store, identity service and dialogs
//
// The store and identity SDKs are loaded by the page and handed to
// `HomeDash` as plain objects. The extern blocks below describe the small
// surface the core needs from them.

use async_trait::async_trait;
use homedash_core::identity::AuthCallback;
use homedash_core::store::{ListenerHandle, SnapshotCallback};
use homedash_core::{
    AuthSubscription, DashError, Identity, IdentityProvider, RealtimeStore, Result, UserPrompt,
};
use serde_json::Value;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;

use crate::convert::{from_js, js_error, property, to_js};

#[wasm_bindgen]
extern "C" {
    /// `{ subscribe(path, cb) -> unsubscribeFn, write(path, value) -> Promise }`
    pub type JsStore;

    #[wasm_bindgen(method, catch)]
    fn subscribe(
        this: &JsStore,
        path: &str,
        callback: &js_sys::Function,
    ) -> std::result::Result<JsValue, JsValue>;

    #[wasm_bindgen(method, catch)]
    fn write(
        this: &JsStore,
        path: &str,
        value: &JsValue,
    ) -> std::result::Result<js_sys::Promise, JsValue>;

    /// `{ currentUser, signIn() -> Promise, signOut() -> Promise, onAuthStateChanged(cb) -> unsubscribeFn }`
    pub type JsAuth;

    #[wasm_bindgen(method, getter, js_name = currentUser)]
    fn current_user(this: &JsAuth) -> JsValue;

    #[wasm_bindgen(method, catch, js_name = signIn)]
    fn sign_in(this: &JsAuth) -> std::result::Result<js_sys::Promise, JsValue>;

    #[wasm_bindgen(method, catch, js_name = signOut)]
    fn sign_out(this: &JsAuth) -> std::result::Result<js_sys::Promise, JsValue>;

    #[wasm_bindgen(method, js_name = onAuthStateChanged)]
    fn on_auth_state_changed(this: &JsAuth, callback: &js_sys::Function) -> JsValue;
}

/// Call the unsubscribe function an SDK returned, if it returned one.
fn release_with(unsubscribe: JsValue) -> impl FnOnce() {
    move || {
        if let Some(f) = unsubscribe.dyn_ref::<js_sys::Function>() {
            if let Err(e) = f.call0(&JsValue::NULL) {
                tracing::warn!("unsubscribe threw: {}", js_error(&e));
            }
        }
    }
}

pub struct JsRealtimeStore {
    inner: JsStore,
}

impl JsRealtimeStore {
    pub fn new(inner: JsStore) -> Self {
        Self { inner }
    }
}

#[async_trait(?Send)]
impl RealtimeStore for JsRealtimeStore {
    fn subscribe(&self, path: &str, mut callback: SnapshotCallback) -> Result<ListenerHandle> {
        let path_owned = path.to_string();
        let closure = Closure::wrap(Box::new(move |snapshot: JsValue| {
            let value = from_js(&snapshot).unwrap_or_else(|e| {
                tracing::warn!("undecodable snapshot at {}: {}", path_owned, e);
                Value::Null
            });
            callback(value);
        }) as Box<dyn FnMut(JsValue)>);

        let unsubscribe = self
            .inner
            .subscribe(path, closure.as_ref().unchecked_ref())
            .map_err(|e| DashError::Store(js_error(&e)))?;

        let release = release_with(unsubscribe);
        Ok(ListenerHandle::new(move || {
            release();
            drop(closure);
        }))
    }

    async fn write(&self, path: &str, value: Value) -> Result<()> {
        let js_value = to_js(&value).map_err(|e| DashError::Store(js_error(&e)))?;
        let promise = self
            .inner
            .write(path, &js_value)
            .map_err(|e| DashError::Store(js_error(&e)))?;
        JsFuture::from(promise)
            .await
            .map_err(|e| DashError::Store(js_error(&e)))?;
        Ok(())
    }
}

/// `{ uid, email }` user object, or a credential wrapping one in `user`.
pub fn identity_from_js(value: &JsValue) -> Option<Identity> {
    let user = match property(value, "user") {
        u if u.is_object() => u,
        _ => value.clone(),
    };
    let uid = property(&user, "uid").as_string()?;
    Some(Identity::new(uid, property(&user, "email").as_string()))
}

pub struct JsIdentityProvider {
    inner: JsAuth,
}

impl JsIdentityProvider {
    pub fn new(inner: JsAuth) -> Self {
        Self { inner }
    }
}

#[async_trait(?Send)]
impl IdentityProvider for JsIdentityProvider {
    fn current(&self) -> Option<Identity> {
        identity_from_js(&self.inner.current_user())
    }

    async fn sign_in_interactive(&self) -> Result<Identity> {
        let promise = self
            .inner
            .sign_in()
            .map_err(|e| DashError::Identity(js_error(&e)))?;
        let credential = JsFuture::from(promise)
            .await
            .map_err(|e| DashError::Identity(js_error(&e)))?;
        identity_from_js(&credential)
            .or_else(|| self.current())
            .ok_or_else(|| DashError::Identity("sign-in returned no user".to_string()))
    }

    async fn sign_out(&self) -> Result<()> {
        let promise = self
            .inner
            .sign_out()
            .map_err(|e| DashError::Identity(js_error(&e)))?;
        JsFuture::from(promise)
            .await
            .map_err(|e| DashError::Identity(js_error(&e)))?;
        Ok(())
    }

    fn on_change(&self, mut callback: AuthCallback) -> AuthSubscription {
        let closure = Closure::wrap(Box::new(move |user: JsValue| {
            callback(identity_from_js(&user));
        }) as Box<dyn FnMut(JsValue)>);

        let unsubscribe = self
            .inner
            .on_auth_state_changed(closure.as_ref().unchecked_ref());
        let release = release_with(unsubscribe);
        ListenerHandle::new(move || {
            release();
            drop(closure);
        })
    }
}

/// `window.confirm` / `window.alert`.
pub struct BrowserPrompt {
    window: web_sys::Window,
}

impl BrowserPrompt {
    pub fn new(window: web_sys::Window) -> Self {
        Self { window }
    }
}

impl UserPrompt for BrowserPrompt {
    fn confirm(&self, message: &str) -> bool {
        self.window.confirm_with_message(message).unwrap_or(false)
    }

    fn alert(&self, message: &str) {
        if let Err(e) = self.window.alert_with_message(message) {
            tracing::warn!("alert failed: {}", js_error(&e));
        }
    }
}
