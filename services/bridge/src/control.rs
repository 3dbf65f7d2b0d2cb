//! Registry lookup channel
//!
//! Request payload is the raw identity key; the reply is the decimal port the
//! key holds, or `"0"` when it holds none.

use crate::error::Result;
use crate::registry::PortRegistry;
use crate::service::BridgeService;
use std::sync::Arc;
use tracing::debug;
use transport::IoContext;

/// Reply to one lookup request
pub fn lookup_reply(registry: &PortRegistry, request: &[u8]) -> Vec<u8> {
    let key = String::from_utf8_lossy(request);
    let port = registry.lookup(&key).unwrap_or(0);
    debug!(key = %key, port, "Lookup");
    port.to_string().into_bytes()
}

/// Serve lookups for `registry` on `port`
pub fn start_control_channel(
    context: Arc<IoContext>,
    registry: Arc<PortRegistry>,
    port: u16,
) -> Result<BridgeService> {
    BridgeService::start("control", context, port, move |request| {
        lookup_reply(&registry, request)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_reply_is_decimal_or_zero() {
        let registry = PortRegistry::with_range(49152..=49160, Arc::new(|_: u16| true));
        let port = registry.allocate("LASERrobot1front_scan").unwrap();

        assert_eq!(
            lookup_reply(&registry, b"LASERrobot1front_scan"),
            port.to_string().into_bytes()
        );
        assert_eq!(lookup_reply(&registry, b"unknown"), b"0".to_vec());
        assert_eq!(lookup_reply(&registry, b""), b"0".to_vec());
    }
}
