// Device feed: live view of `devices/` in the realtime store
//
// Devices are written by external producers. The dashboard only observes the
// whole `devices` node and replaces its snapshot on every change.

use serde_json::Value;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::store::{device_path, RealtimeStore, StoreSubscription, DEVICES_ROOT};
use crate::Result;

/// One device as stored under `devices/<name>`.
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    pub name: String,
    pub data: Value,
}

impl Device {
    pub fn icon(&self) -> Option<&str> {
        self.data
            .get("icon")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Letter shown on the device card: first character of the icon name,
    /// uppercased, or `?` when the device has no icon.
    pub fn avatar_letter(&self) -> String {
        self.icon()
            .and_then(|icon| icon.chars().next())
            .map(|c| c.to_uppercase().collect())
            .unwrap_or_else(|| "?".to_string())
    }

    /// Pretty-printed payload for the details dialog.
    pub fn details(&self) -> String {
        serde_json::to_string_pretty(&self.data).unwrap_or_else(|_| self.data.to_string())
    }
}

/// Full `devices` node keyed by device name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceSnapshot {
    devices: BTreeMap<String, Value>,
}

impl DeviceSnapshot {
    /// Build from the raw node value. An absent node is an empty snapshot.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self {
                devices: map.into_iter().collect(),
            },
            Value::Null => Self::default(),
            other => {
                tracing::warn!("devices node is not an object, ignoring: {}", other);
                Self::default()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<Device> {
        self.devices.get(name).map(|data| Device {
            name: name.to_string(),
            data: data.clone(),
        })
    }

    pub fn devices(&self) -> impl Iterator<Item = Device> + '_ {
        self.devices.iter().map(|(name, data)| Device {
            name: name.clone(),
            data: data.clone(),
        })
    }
}

/// Observer invoked with each new snapshot.
pub type SnapshotObserver = Box<dyn FnMut(&DeviceSnapshot)>;

/// Live subscription to the `devices` node.
pub struct DeviceFeed {
    latest: Rc<RefCell<DeviceSnapshot>>,
    _subscription: StoreSubscription,
}

impl DeviceFeed {
    pub fn listen(store: &dyn RealtimeStore, mut observer: Option<SnapshotObserver>) -> Result<Self> {
        let latest = Rc::new(RefCell::new(DeviceSnapshot::default()));
        let sink = Rc::clone(&latest);

        let subscription = store.subscribe(
            DEVICES_ROOT,
            Box::new(move |value| {
                let snapshot = DeviceSnapshot::from_value(value);
                tracing::debug!("device snapshot: {} devices", snapshot.len());
                if let Some(observer) = observer.as_mut() {
                    observer(&snapshot);
                }
                *sink.borrow_mut() = snapshot;
            }),
        )?;

        Ok(Self {
            latest,
            _subscription: subscription,
        })
    }

    pub fn snapshot(&self) -> DeviceSnapshot {
        self.latest.borrow().clone()
    }
}

/// Overwrite `devices/<name>` with `data`.
pub async fn set_device(store: &dyn RealtimeStore, name: &str, data: Value) -> Result<()> {
    let path = device_path(name)?;
    store.write(&path, data).await?;
    tracing::info!("Updated {}", path);
    Ok(())
}
