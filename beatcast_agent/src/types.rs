//! Frames sent to push subscribers. Viewers parse these by event tag,
//! so tag names and field names do not change.

use serde_json::{json, Value};

/// Event tag for a regular metrics delivery.
pub const DATA_EVENT: &str = "MetricbeatData";
/// Event tag sent once when the backend starts failing.
pub const STALE_EVENT: &str = "MetricbeatStale";

#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    /// Ordered payload array for one tick.
    Data(Value),
    /// Backend unavailable; carries the error text.
    Stale(String),
}

impl Delivery {
    pub fn to_frame(&self) -> String {
        let frame = match self {
            Delivery::Data(data) => json!({ "event": DATA_EVENT, "data": data }),
            Delivery::Stale(error) => json!({ "event": STALE_EVENT, "error": error }),
        };
        frame.to_string()
    }
}
