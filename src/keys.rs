//! Routing-key formatting and parsing.
//!
//! The transport addresses every frame with a string key. These strings are
//! a compatibility contract — any node implementation must emit and accept
//! the exact same shapes:
//!
//! ```text
//! <hubName>.<apiCall>                                      hub built-in
//! <hubName>.send                                           forward request
//! <hubName>.return                                         deliver reply
//! <receiverName>.<apiCall>                                 custom API invoke
//! <receiver>.<apiCall>.return.<sender>.<returnCode>        reply delivery
//! <nodeName>.message                                       debug channel
//! <nodeName>.wellnessCheck                                 liveness probe
//! ```
//!
//! Internally nothing dispatches on raw strings: inbound keys are parsed
//! into [`HubRoute`] / [`ClientRoute`] and matched. Node names must not
//! contain `.` — the hub rejects such names at registration.

use crate::constants::{
    API_GREEN_LIGHT, API_MESSAGE, API_NODE_INIT, API_RETURN, API_SEND, API_WELLNESS_CHECK,
};
use crate::packet::Packet;

/// `<node>.<apiCall>` — invoke an API on a node (or a hub built-in).
pub fn api_key(node: &str, api_call: &str) -> String {
    format!("{node}.{api_call}")
}

/// `<hubName>.send` — ask the hub to forward a packet to its receiver.
pub fn send_key(hub_name: &str) -> String {
    format!("{hub_name}.{API_SEND}")
}

/// `<hubName>.return` — hand a finished reply back to the hub for delivery.
pub fn return_key(hub_name: &str) -> String {
    format!("{hub_name}.{API_RETURN}")
}

/// `<receiver>.<apiCall>.return.<sender>.<returnCode>` — the key a reply is
/// delivered under on the original caller's connection. The embedded sender
/// and code isolate concurrent in-flight calls.
pub fn reply_key(receiver: &str, api_call: &str, sender: &str, return_code: i64) -> String {
    format!("{receiver}.{api_call}.return.{sender}.{return_code}")
}

/// Reply key derived from a packet's own routing fields.
///
/// Returns `None` for fire-and-forget packets (no `returnCode`), which by
/// definition have no reply destination.
pub fn reply_key_for(packet: &Packet) -> Option<String> {
    packet
        .return_code
        .map(|code| reply_key(&packet.receiver, &packet.api_call, &packet.sender, code))
}

/// `<nodeName>.message` — debug channel for human-readable logging.
pub fn message_key(node: &str) -> String {
    format!("{node}.{API_MESSAGE}")
}

/// `<nodeName>.wellnessCheck` — harmless probe used by registry sweeps.
pub fn wellness_key(node: &str) -> String {
    format!("{node}.{API_WELLNESS_CHECK}")
}

/// True iff `name` is usable as a node name in routing keys.
pub fn valid_node_name(name: &str) -> bool {
    !name.is_empty() && !name.contains('.')
}

/// Classification of an inbound key from the hub's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubRoute<'a> {
    /// `<hub>.nodeInit` — registration handshake.
    NodeInit,
    /// `<hub>.greenLight` — readiness-gate query.
    GreenLight,
    /// `<hub>.send` — forward to `packet.receiver`.
    Send,
    /// `<hub>.return` — deliver a reply to `packet.sender`.
    Return,
    /// `<hub>.<apiCall>` — some other hub-addressed call.
    Builtin(&'a str),
    /// Not addressed to this hub at all.
    Foreign,
}

/// Parse an inbound key relative to the hub's own name.
pub fn parse_hub_key<'a>(hub_name: &str, key: &'a str) -> HubRoute<'a> {
    let Some(rest) = key
        .strip_prefix(hub_name)
        .and_then(|rest| rest.strip_prefix('.'))
    else {
        return HubRoute::Foreign;
    };
    // A hub-addressed key has exactly one verb segment.
    if rest.is_empty() || rest.contains('.') {
        return HubRoute::Foreign;
    }
    match rest {
        API_NODE_INIT => HubRoute::NodeInit,
        API_GREEN_LIGHT => HubRoute::GreenLight,
        API_SEND => HubRoute::Send,
        API_RETURN => HubRoute::Return,
        api_call => HubRoute::Builtin(api_call),
    }
}

/// Classification of an inbound key from a node client's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientRoute<'a> {
    /// `<receiver>.<apiCall>.return.<us>.<code>` — a reply to one of our
    /// pending calls.
    Reply { return_code: i64 },
    /// `<us>.message` — debug channel.
    Message,
    /// `<us>.wellnessCheck` — hub liveness probe; ignorable.
    WellnessCheck,
    /// `<us>.<apiCall>` — a request for one of our registered APIs.
    Api(&'a str),
    /// Anything else (a hook key, or noise).
    Other,
}

/// Parse an inbound key relative to this node's own name.
pub fn parse_client_key<'a>(node_name: &str, key: &'a str) -> ClientRoute<'a> {
    // Reply keys are five segments with "return" third and our name fourth.
    let parts: Vec<&str> = key.split('.').collect();
    if parts.len() == 5 && parts[2] == API_RETURN && parts[3] == node_name {
        if let Ok(return_code) = parts[4].parse::<i64>() {
            return ClientRoute::Reply { return_code };
        }
    }

    let Some(rest) = key
        .strip_prefix(node_name)
        .and_then(|rest| rest.strip_prefix('.'))
    else {
        return ClientRoute::Other;
    };
    if rest.is_empty() || rest.contains('.') {
        return ClientRoute::Other;
    }
    match rest {
        API_MESSAGE => ClientRoute::Message,
        API_WELLNESS_CHECK => ClientRoute::WellnessCheck,
        api_call => ClientRoute::Api(api_call),
    }
}
