//! The request/response envelope exchanged between nodes and the hub.
//!
//! Every message in the network is one `Packet`. A request carries `sender`,
//! `receiver`, `apiCall`, a caller-unique `returnCode`, and `args`; the
//! receiver answers by mutating the same envelope (`result` on success,
//! `status=false` plus `errorMessage` on failure) and emitting it back.
//! Routing never inspects `args`/`result` — those belong to the endpoints.
//!
//! Wire shape is JSON with camelCase field names. All fields are optional on
//! receipt; defaults are filled per the table below. `errorMessage` is the
//! one oddity of the wire format: it is the literal `false` when no error is
//! set, and a string otherwise.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The single envelope used for every request and reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Packet {
    /// Node name that originated the request. The hub never rewrites it.
    pub sender: String,

    /// Node name that must handle the request. Equals the hub's own name
    /// for built-in APIs.
    pub receiver: String,

    /// Name of the operation requested on the receiver.
    #[serde(rename = "apiCall")]
    pub api_call: String,

    /// Caller-unique correlation id; `None` only for fire-and-forget
    /// messages.
    #[serde(rename = "returnCode")]
    pub return_code: Option<i64>,

    /// Inputs to the call; shape defined per `apiCall`.
    pub args: Value,

    /// Response payload, filled by the receiver on success.
    pub result: Value,

    /// True on success, false on error.
    pub status: bool,

    /// Human-readable error text when `status` is false.
    ///
    /// Serialized as the literal `false` when unset.
    #[serde(rename = "errorMessage", with = "error_message_wire")]
    pub error_message: Option<String>,

    /// Debug-only backup of the original `args`; never interpreted by
    /// routing. Omitted from the wire when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bdata: Option<Value>,
}

impl Default for Packet {
    fn default() -> Self {
        Self {
            sender: String::new(),
            receiver: String::new(),
            api_call: String::new(),
            return_code: None,
            args: Value::Object(Map::new()),
            result: Value::Null,
            status: true,
            error_message: None,
            bdata: None,
        }
    }
}

impl Packet {
    /// Create a fresh request packet with defaults for the response fields.
    pub fn new(
        sender: impl Into<String>,
        receiver: impl Into<String>,
        api_call: impl Into<String>,
        args: Value,
    ) -> Self {
        Self {
            sender: sender.into(),
            receiver: receiver.into(),
            api_call: api_call.into(),
            args,
            ..Self::default()
        }
    }

    /// Attach a correlation code (builder step).
    pub fn with_return_code(mut self, code: i64) -> Self {
        self.return_code = Some(code);
        self
    }

    /// Check that every name in `names` is present in `args`.
    ///
    /// On the first missing field, records
    /// `errorMessage = "<name> argument not included!"` and returns false.
    /// Does not touch `status`; callers pair this with
    /// [`crate::client::NodeClient::send_error`] or the hub's error reply.
    pub fn check_args(&mut self, names: &[&str]) -> bool {
        for name in names {
            let present = self
                .args
                .as_object()
                .is_some_and(|map| map.contains_key(*name));
            if !present {
                self.error_message = Some(format!("{name} argument not included!"));
                return false;
            }
        }
        true
    }

    /// Flip this packet into an error reply.
    ///
    /// Sets `status=false`; fills `errorMessage` with `message` only when no
    /// earlier error (e.g. from [`Packet::check_args`]) is recorded.
    pub fn set_error(&mut self, message: impl Into<String>) {
        self.status = false;
        if self.error_message.is_none() {
            self.error_message = Some(message.into());
        }
    }
}

/// `errorMessage` wire convention: `false` when unset, a string otherwise.
mod error_message_wire {
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    pub fn serialize<S>(value: &Option<String>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(message) => serializer.serialize_str(message),
            None => serializer.serialize_bool(false),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        // Anything that is not a string (false, null, absent) means "no error".
        match Value::deserialize(deserializer)? {
            Value::String(message) => Ok(Some(message)),
            _ => Ok(None),
        }
    }
}
