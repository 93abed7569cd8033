// JSON <-> JsValue conversion at the bindgen boundary

use serde::Serialize;
use serde_json::Value;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;

/// Plain JS objects (not `Map`s) so the page and the store see ordinary JSON.
pub fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, JsValue> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| JsValue::from_str(&format!("{}", e)))
}

pub fn from_js(value: &JsValue) -> Result<Value, String> {
    if value.is_undefined() {
        return Ok(Value::Null);
    }
    serde_wasm_bindgen::from_value(value.clone()).map_err(|e| format!("{}", e))
}

/// Best-effort message for a thrown JS value.
pub fn js_error(err: &JsValue) -> String {
    if let Some(s) = err.as_string() {
        return s;
    }
    if let Some(e) = err.dyn_ref::<js_sys::Error>() {
        return String::from(e.message());
    }
    format!("{:?}", err)
}

/// Read `obj[name]`, treating a throwing getter as absent.
pub fn property(obj: &JsValue, name: &str) -> JsValue {
    js_sys::Reflect::get(obj, &JsValue::from_str(name)).unwrap_or(JsValue::UNDEFINED)
}

/// `obj[name]` when it is callable.
pub fn method(obj: &JsValue, name: &str) -> Option<js_sys::Function> {
    property(obj, name).dyn_into::<js_sys::Function>().ok()
}
