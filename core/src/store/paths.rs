//! Key-path conventions for the realtime store.
//!
//! Paths are `/`-separated segments. Segments follow the realtime database key
//! rules: non-empty, and none of `.`, `#`, `$`, `[`, `]`.

use crate::{DashError, Result};

pub const SUBSCRIPTIONS_ROOT: &str = "subscriptions";
pub const DEVICES_ROOT: &str = "devices";

const FORBIDDEN: &[char] = &['.', '#', '$', '[', ']'];

/// Validate a single key segment.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(DashError::InvalidPath("empty key".to_string()));
    }
    if key.contains('/') {
        return Err(DashError::InvalidPath(format!("key '{}' contains '/'", key)));
    }
    if let Some(c) = key.chars().find(|c| FORBIDDEN.contains(c) || c.is_control()) {
        return Err(DashError::InvalidPath(format!(
            "key '{}' contains forbidden character {:?}",
            key, c
        )));
    }
    Ok(())
}

/// Split a path into validated segments. Leading/trailing slashes are ignored;
/// the empty path addresses the root.
pub fn segments(path: &str) -> Result<Vec<&str>> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    trimmed
        .split('/')
        .map(|seg| validate_key(seg).map(|_| seg))
        .collect()
}

/// `subscriptions/<key>`
pub fn subscription_path(key: &str) -> Result<String> {
    validate_key(key)?;
    Ok(format!("{}/{}", SUBSCRIPTIONS_ROOT, key))
}

/// `devices/<name>`
pub fn device_path(name: &str) -> Result<String> {
    validate_key(name)?;
    Ok(format!("{}/{}", DEVICES_ROOT, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscription_path() {
        assert_eq!(subscription_path("u1").unwrap(), "subscriptions/u1");
        assert_eq!(
            subscription_path("0b6c1b9e-4f1e-4a57-9b07-7ad2c3f0e1aa").unwrap(),
            "subscriptions/0b6c1b9e-4f1e-4a57-9b07-7ad2c3f0e1aa"
        );
    }

    #[test]
    fn test_device_path_rejects_bad_keys() {
        assert!(device_path("").is_err());
        assert!(device_path("a/b").is_err());
        assert!(device_path("kitchen.lamp").is_err());
        assert!(device_path("lamp[1]").is_err());
        assert_eq!(device_path("thermostat").unwrap(), "devices/thermostat");
    }

    #[test]
    fn test_segments() {
        assert!(segments("").unwrap().is_empty());
        assert!(segments("/").unwrap().is_empty());
        assert_eq!(segments("/devices/lamp/").unwrap(), vec!["devices", "lamp"]);
        assert!(segments("devices//lamp").is_err());
    }
}
