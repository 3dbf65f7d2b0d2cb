//! Composite device identity

use codec::RoutingTag;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Who a device is: the pieces its lease key and routing tag derive from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub device_type: String,
    pub model: String,
    pub part: String,
    #[serde(default)]
    pub sub_part: String,
}

impl DeviceIdentity {
    pub fn new(
        device_type: impl Into<String>,
        model: impl Into<String>,
        part: impl Into<String>,
    ) -> Self {
        Self {
            device_type: device_type.into(),
            model: model.into(),
            part: part.into(),
            sub_part: String::new(),
        }
    }

    pub fn with_sub_part(mut self, sub_part: impl Into<String>) -> Self {
        self.sub_part = sub_part.into();
        self
    }

    /// Lease key: plain concatenation of device type, model, part and sub-part.
    ///
    /// Two identities whose pieces concatenate to the same string share a key.
    pub fn key(&self) -> String {
        let mut key = String::with_capacity(
            self.device_type.len() + self.model.len() + self.part.len() + self.sub_part.len(),
        );
        key.push_str(&self.device_type);
        key.push_str(&self.model);
        key.push_str(&self.part);
        key.push_str(&self.sub_part);
        key
    }

    /// Full-width routing tag hashed from the lease key
    pub fn tag(&self) -> RoutingTag {
        RoutingTag::for_identity(&self.key())
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_flat_concatenation() {
        let identity = DeviceIdentity::new("LASER", "robot1", "front_scan");
        assert_eq!(identity.key(), "LASERrobot1front_scan");
        assert_eq!(identity.to_string(), "LASERrobot1front_scan");

        let identity = identity.with_sub_part("_points");
        assert_eq!(identity.key(), "LASERrobot1front_scan_points");
    }

    #[test]
    fn test_different_splits_collide() {
        let a = DeviceIdentity::new("CAM", "era", "x");
        let b = DeviceIdentity::new("CAMera", "", "x");
        assert_ne!(a, b);
        assert_eq!(a.key(), b.key());
        assert_eq!(a.tag(), b.tag());
    }
}
