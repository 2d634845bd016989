//! Inbound packet dispatch and the built-in API surface.
//!
//! For each frame the hub selects exactly one branch: registration,
//! green-light query, a built-in handler, `send` forwarding, `return`
//! delivery, or the warn-and-drop path for unrecognized keys. Forwarding
//! only ever touches transport keys — `args`, `result`, `status`, and
//! `errorMessage` pass through untouched.

use serde_json::json;

use crate::constants::API_WELLNESS_CHECK;
use crate::keys::{self, HubRoute};
use crate::packet::Packet;
use crate::socket::Frame;

use super::events::HubEvent;
use super::Hub;

impl Hub {
    /// Apply one event from the unified channel.
    pub(crate) fn handle_event(&mut self, event: HubEvent) {
        match event {
            HubEvent::Connected { conn_id, conn } => {
                self.conns.insert(conn_id, conn);
            }
            HubEvent::Frame { conn_id, frame } => self.handle_frame(&conn_id, frame),
            HubEvent::Disconnected { conn_id } => self.handle_disconnect(&conn_id),
        }
    }

    fn handle_frame(&mut self, conn_id: &str, frame: Frame) {
        let Frame { key, packet } = frame;
        match keys::parse_hub_key(&self.config.hub_name, &key) {
            HubRoute::NodeInit => self.handle_node_init(conn_id, packet),
            HubRoute::GreenLight => {
                let mut packet = packet;
                packet.result = json!(self.green_light);
                self.reply(conn_id, packet);
            }
            HubRoute::Send => self.handle_send(conn_id, packet),
            HubRoute::Return => self.handle_return(conn_id, packet),
            HubRoute::Builtin(api_call) => self.handle_builtin(conn_id, api_call, packet),
            HubRoute::Foreign => {
                log::warn!("[Hub] Unrecognized key \"{key}\" from {conn_id}; ignoring");
            }
        }
    }

    /// `nodeInit` — bind the node name to this connection.
    ///
    /// Re-registering a name replaces the prior handle. Registration also
    /// ensures a default package record exists, so every known node has a
    /// settings sub-tree to call its own.
    fn handle_node_init(&mut self, conn_id: &str, mut packet: Packet) {
        if !packet.check_args(&["name"]) {
            return self.reply_error(conn_id, packet, "nodeInit failed!");
        }
        let name = packet.args["name"].as_str().unwrap_or_default().to_string();
        if !keys::valid_node_name(&name) {
            packet.set_error(format!("Invalid node name \"{name}\"!"));
            return self.reply(conn_id, packet);
        }

        if let Some(old) = self.registry.register(&name, conn_id) {
            if old != conn_id {
                log::info!("[Hub] Node \"{name}\" re-registered; replacing {old}");
            }
        } else {
            log::info!("[Hub] Node \"{name}\" registered on {conn_id}");
        }

        if let Err(e) = self
            .settings
            .ensure_package(&name, crate::settings::PackageRecord::default())
        {
            packet.set_error(e.to_string());
            return self.reply(conn_id, packet);
        }

        packet.result = json!(true);
        self.reply(conn_id, packet);
    }

    /// `send` — forward a request packet to its addressed receiver.
    fn handle_send(&mut self, conn_id: &str, mut packet: Packet) {
        if self.registry.name_for_conn(conn_id).is_none() {
            packet.set_error("Node is not registered; call nodeInit first!");
            return self.reply(conn_id, packet);
        }

        let receiver = packet.receiver.clone();
        match self.registry.conn_id_of(&receiver).map(str::to_string) {
            Some(receiver_conn) => {
                let key = keys::api_key(&receiver, &packet.api_call);
                self.forward(&receiver_conn, key, packet);
            }
            None => {
                packet.set_error(format!("Node \"{receiver}\" does not exist!"));
                self.reply(conn_id, packet);
            }
        }
    }

    /// `return` — deliver a finished reply to the original caller.
    fn handle_return(&mut self, conn_id: &str, mut packet: Packet) {
        if self.registry.name_for_conn(conn_id).is_none() {
            packet.set_error("Node is not registered; call nodeInit first!");
            return self.reply(conn_id, packet);
        }

        let Some(key) = keys::reply_key_for(&packet) else {
            log::warn!("[Hub] Dropping return with no returnCode from {conn_id}");
            return;
        };
        match self.registry.conn_id_of(&packet.sender).map(str::to_string) {
            Some(caller_conn) => self.forward(&caller_conn, key, packet),
            None => {
                // Caller vanished; undelivered replies are lost by design.
                log::warn!(
                    "[Hub] Dropping reply for absent caller \"{}\" ({key})",
                    packet.sender
                );
            }
        }
    }

    /// Hub-addressed built-in APIs.
    fn handle_builtin(&mut self, conn_id: &str, api_call: &str, mut packet: Packet) {
        match api_call {
            "helloWorld" => {
                if !packet.check_args(&["text"]) {
                    return self.reply_error(conn_id, packet, "helloWorld failed!");
                }
                let text = render_text(&packet.args["text"]);
                packet.result = json!(format!("helloWorld! {text}"));
                self.reply(conn_id, packet);
            }

            "doesNodeExist" => {
                if !packet.check_args(&["name"]) {
                    return self.reply_error(conn_id, packet, "doesNodeExist failed!");
                }
                let name = packet.args["name"].as_str().unwrap_or_default();
                packet.result = json!(self.registry.contains(name));
                self.reply(conn_id, packet);
            }

            "getUsername" => {
                match self.settings.get("username") {
                    Some(username) => packet.result = username.clone(),
                    None => packet.set_error("Username not set!"),
                }
                self.reply(conn_id, packet);
            }

            "setUsername" => {
                if !packet.check_args(&["name"]) {
                    return self.reply_error(conn_id, packet, "setUsername failed!");
                }
                let name = packet.args["name"].clone();
                if let Err(e) = self.settings.set("username", name) {
                    packet.set_error(e.to_string());
                } else {
                    packet.result = json!(true);
                }
                self.reply(conn_id, packet);
            }

            "getSettings" => {
                if !self.sender_is_authorized(conn_id, &packet) {
                    packet.set_error(format!(
                        "Settings access denied for node \"{}\"!",
                        packet.sender
                    ));
                    return self.reply(conn_id, packet);
                }
                match self
                    .settings
                    .get_at(&["packages", packet.sender.as_str(), "settings"])
                {
                    Some(node_settings) => packet.result = node_settings.clone(),
                    None => packet.set_error(format!(
                        "Node \"{}\" has no package entry!",
                        packet.sender
                    )),
                }
                self.reply(conn_id, packet);
            }

            "setSettings" => {
                if !packet.check_args(&["settings"]) {
                    return self.reply_error(conn_id, packet, "setSettings failed!");
                }
                if !self.sender_is_authorized(conn_id, &packet) {
                    packet.set_error(format!(
                        "Settings access denied for node \"{}\"!",
                        packet.sender
                    ));
                    return self.reply(conn_id, packet);
                }
                let sender = packet.sender.clone();
                if self.settings.get_at(&["packages", sender.as_str()]).is_none() {
                    packet.set_error(format!("Node \"{sender}\" has no package entry!"));
                    return self.reply(conn_id, packet);
                }
                let value = packet.args["settings"].clone();
                if let Err(e) = self
                    .settings
                    .set_at(&["packages", sender.as_str(), "settings"], value)
                {
                    packet.set_error(e.to_string());
                } else {
                    packet.result = json!(true);
                }
                self.reply(conn_id, packet);
            }

            "message" => {
                let text = render_text(&packet.args["message"]);
                log::info!("[Hub] Message from {}: {text}", packet.sender);
                // Resolve correlated callers; stay silent for fire-and-forget.
                self.reply(conn_id, packet);
            }

            other => {
                log::warn!("[Hub] Unrecognized built-in \"{other}\" from {conn_id}; ignoring");
            }
        }
    }

    /// Settings calls authorize on the caller's registered name: the
    /// declared `sender` must be the name bound to this connection.
    fn sender_is_authorized(&self, conn_id: &str, packet: &Packet) -> bool {
        self.registry.name_for_conn(conn_id) == Some(packet.sender.as_str())
    }

    /// Emit a reply on `conn_id` under the reply key derived from the
    /// packet's own routing fields. Fire-and-forget packets (no
    /// `returnCode`) get no reply.
    fn reply(&mut self, conn_id: &str, packet: Packet) {
        let Some(key) = keys::reply_key_for(&packet) else {
            return;
        };
        self.forward(conn_id, key, packet);
    }

    fn reply_error(&mut self, conn_id: &str, mut packet: Packet, default_message: &str) {
        packet.set_error(default_message);
        self.reply(conn_id, packet);
    }

    /// Write a frame to a connection; routing keys only, payload untouched.
    fn forward(&mut self, conn_id: &str, key: String, packet: Packet) {
        let delivered = self
            .conns
            .get(conn_id)
            .map(|conn| conn.send_frame(&Frame::new(key.clone(), packet)))
            .unwrap_or(false);
        if !delivered {
            log::warn!("[Hub] Failed to deliver \"{key}\" to {conn_id}");
        }
    }

    /// Remove a vanished connection, then sweep the registry for other
    /// casualties by probing each stored connection with a harmless
    /// wellness check.
    fn handle_disconnect(&mut self, conn_id: &str) {
        self.conns.remove(conn_id);
        if let Some(name) = self.registry.remove_conn(conn_id) {
            log::info!("[Hub] Node \"{name}\" removed from registry");
        }
        self.sweep_registry();
    }

    /// Probe every registered connection; evict the ones whose write fails.
    pub(crate) fn sweep_registry(&mut self) {
        let mut dead: Vec<String> = Vec::new();
        for (name, entry) in self.registry.iter() {
            let probe = Frame::new(
                keys::wellness_key(name),
                Packet::new(self.config.hub_name.clone(), name, API_WELLNESS_CHECK, json!({})),
            );
            let alive = self
                .conns
                .get(&entry.conn_id)
                .map(|conn| conn.send_frame(&probe))
                .unwrap_or(false);
            if !alive {
                dead.push(name.to_string());
            }
        }
        for name in dead {
            if let Some(entry) = self.registry.remove(&name) {
                self.conns.remove(&entry.conn_id);
                log::info!("[Hub] Swept stale node \"{name}\"");
            }
        }
    }
}

/// Human-readable rendering of a packet argument for messages.
fn render_text(value: &serde_json::Value) -> String {
    match value.as_str() {
        Some(text) => text.to_string(),
        None => value.to_string(),
    }
}
