//! External request/response pairing for human-in-the-loop input.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A request raised by an executor that must be answered from outside the
/// workflow before the graph can converge.
///
/// While at least one request is unserviced, a halted run reports
/// `PendingRequests` rather than `Idle`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalRequest {
    /// Stable identifier correlating this request with its response.
    pub request_id: String,
    /// The input port the request was raised on.
    pub port_id: String,
    /// Request payload, opaque to the run layer.
    pub data: Value,
}

impl ExternalRequest {
    /// Create a request on the given port with a generated id.
    pub fn new(port_id: impl Into<String>, data: Value) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            port_id: port_id.into(),
            data,
        }
    }

    /// Build the response answering this request.
    pub fn respond(&self, data: Value) -> ExternalResponse {
        ExternalResponse {
            request_id: self.request_id.clone(),
            port_id: self.port_id.clone(),
            data,
        }
    }
}

/// The answer to an [`ExternalRequest`], delivered when resuming a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalResponse {
    /// Identifier of the request being answered.
    pub request_id: String,
    /// The input port the original request was raised on.
    pub port_id: String,
    /// Response payload, routed to the requesting executor.
    pub data: Value,
}
