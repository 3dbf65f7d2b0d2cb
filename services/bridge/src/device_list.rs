//! JSON device-list service
//!
//! ```text
//! -> {"command":"device_list","filter":"LASER"}
//! <- {"command":"device_list","result":{"LASERrobot1front_scan":49152}}
//!
//! -> {"command":"device_map","filter":"robot1"}
//! <- {"command":"device_map","result":{"robot1":{"LASER":{"front_scan":{"":49152}}}}}
//! ```
//!
//! Any other command (or a request that is not JSON) is answered with
//! `{"command":"Invalid Command"}`.

use crate::error::Result;
use crate::registry::PortRegistry;
use crate::service::BridgeService;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};
use transport::IoContext;

pub const DEVICE_LIST: &str = "device_list";
pub const DEVICE_MAP: &str = "device_map";
pub const INVALID_COMMAND: &str = "Invalid Command";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRequest {
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    /// Pretty-print the reply
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub indent: bool,
}

impl ServiceRequest {
    pub fn new(command: impl Into<String>, filter: Option<String>) -> Self {
        Self {
            command: command.into(),
            filter,
            indent: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceResponse {
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl ServiceResponse {
    fn invalid() -> Self {
        Self {
            command: INVALID_COMMAND.to_string(),
            result: None,
        }
    }
}

/// Answer one parsed request
pub fn handle_request(registry: &PortRegistry, request: &ServiceRequest) -> ServiceResponse {
    let filter = request.filter.as_deref();
    let result = match request.command.as_str() {
        DEVICE_LIST => serde_json::to_value(registry.list_assignments(filter)),
        DEVICE_MAP => serde_json::to_value(registry.device_map(filter)),
        other => {
            debug!(command = other, "Unknown device-list command");
            return ServiceResponse::invalid();
        }
    };

    match result {
        Ok(result) => ServiceResponse {
            command: request.command.clone(),
            result: Some(result),
        },
        Err(e) => {
            warn!(error = %e, command = %request.command, "Failed to encode device list");
            ServiceResponse::invalid()
        }
    }
}

/// Answer one raw request payload
pub fn handle_payload(registry: &PortRegistry, payload: &[u8]) -> Vec<u8> {
    let (response, indent) = match serde_json::from_slice::<ServiceRequest>(payload) {
        Ok(request) => (handle_request(registry, &request), request.indent),
        Err(e) => {
            warn!(error = %e, "Device-list request is not valid JSON");
            (ServiceResponse::invalid(), false)
        }
    };

    let encoded = if indent {
        serde_json::to_vec_pretty(&response)
    } else {
        serde_json::to_vec(&response)
    };
    // A response made of strings and integers always serializes
    encoded.unwrap_or_default()
}

/// Serve the device list for `registry` on `port`
pub fn start_device_list_service(
    context: Arc<IoContext>,
    registry: Arc<PortRegistry>,
    port: u16,
) -> Result<BridgeService> {
    BridgeService::start("device-list", context, port, move |request| {
        handle_payload(&registry, request)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::DeviceIdentity;
    use serde_json::json;

    fn registry() -> PortRegistry {
        let registry = PortRegistry::with_range(49152..=49160, Arc::new(|_: u16| true));
        registry
            .allocate_device(&DeviceIdentity::new("LASER", "robot1", "front_scan"))
            .unwrap();
        registry
            .allocate_device(&DeviceIdentity::new("CAMERA", "robot2", "head"))
            .unwrap();
        registry
    }

    #[test]
    fn test_device_list_filters_by_key_prefix() {
        let registry = registry();
        let request = ServiceRequest::new(DEVICE_LIST, Some("LASER".into()));
        let response = handle_request(&registry, &request);

        assert_eq!(response.command, DEVICE_LIST);
        assert_eq!(response.result, Some(json!({"LASERrobot1front_scan": 49152})));
    }

    #[test]
    fn test_device_map_nests_by_model() {
        let registry = registry();
        let request = ServiceRequest::new(DEVICE_MAP, None);
        let response = handle_request(&registry, &request);

        assert_eq!(
            response.result,
            Some(json!({
                "robot1": {"LASER": {"front_scan": {"": 49152}}},
                "robot2": {"CAMERA": {"head": {"": 49153}}},
            }))
        );
    }

    #[test]
    fn test_unknown_and_malformed_requests() {
        let registry = registry();
        let reply = handle_payload(&registry, br#"{"command":"reset"}"#);
        assert_eq!(reply, br#"{"command":"Invalid Command"}"#.to_vec());

        let reply = handle_payload(&registry, b"not json");
        assert_eq!(reply, br#"{"command":"Invalid Command"}"#.to_vec());
    }
}
