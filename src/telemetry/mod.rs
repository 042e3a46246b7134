//! Usage analytics
//!
//! Events are named after what the user did ("Export Opened",
//! "Export Completed") and carry a flat JSON property map.

use serde_json::{Map, Value};
use tracing::info;

/// Sink for analytics events
pub trait Telemetry: Send + Sync {
    fn track(&self, event: &str, properties: Map<String, Value>);
}

/// Logs events through `tracing` under the `telemetry` target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTelemetry;

impl Telemetry for TracingTelemetry {
    fn track(&self, event: &str, properties: Map<String, Value>) {
        let properties = Value::Object(properties);
        info!(
            target: "telemetry",
            event,
            properties = %properties,
            "track"
        );
    }
}
