//! The node client library.
//!
//! Every node embeds a [`NodeClient`] to speak to the hub: it establishes
//! the connection, registers the node's name, waits on the readiness gate,
//! and dispatches inbound requests to registered handlers. Application code
//! talks to the rest of the network through [`NodeClient::call_api`] and
//! answers requests with [`NodeClient::send_return`] /
//! [`NodeClient::send_error`].
//!
//! # Startup
//!
//! [`NodeClient::run`] is a strict barrier sequence: connect (retrying
//! until the hub appears) → `nodeInit` handshake → poll `greenLight` until
//! the hub opens the network → `on_init` hook → activate staged handlers →
//! `on_connect` hook. Handlers registered before `run()` never fire before
//! the green light.
//!
//! The client is cheaply cloneable; handlers receive a clone and may issue
//! their own calls from inside a request.

mod connection;
mod pending;

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde_json::{json, Value};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::sync::watch;

use crate::constants::{
    socket_dir, socket_path_in, API_GREEN_LIGHT, API_NODE_INIT, CONNECT_RETRY_MS,
    DEFAULT_HUB_NAME, GREEN_LIGHT_POLL_MS, TIMEOUT_ERROR,
};
use crate::keys::{self, ClientRoute};
use crate::packet::Packet;
use crate::socket::Frame;

use connection::{ClientEvent, Connection};
use pending::PendingCalls;

/// Boxed future returned by handlers and hooks.
pub type HandlerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// A registered API handler. Receives the full request packet and a client
/// clone for issuing calls and emitting the reply.
pub type ApiHandler = Arc<dyn Fn(Packet, NodeClient) -> HandlerFuture + Send + Sync>;

/// One-shot lifecycle hook (`on_init`, `on_connect`).
pub type LifecycleHook = Box<dyn FnOnce(NodeClient) -> HandlerFuture + Send>;

/// Node client configuration.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// This node's unique name in the network.
    pub node_name: String,
    /// The hub's name; also names the socket to connect to.
    pub hub_name: String,
    /// Directory holding the hub socket.
    pub socket_dir: PathBuf,
    /// Suppress debug-channel message printing.
    pub silent: bool,
    /// Optional deadline for `call_api`; `None` waits forever.
    pub call_timeout: Option<Duration>,
}

impl NodeConfig {
    /// Configuration with network defaults for a node name.
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
            hub_name: DEFAULT_HUB_NAME.to_string(),
            socket_dir: socket_dir(),
            silent: false,
            call_timeout: None,
        }
    }
}

struct ClientInner {
    config: NodeConfig,
    conn: OnceLock<Connection>,
    pending: Mutex<PendingCalls>,
    /// Active handlers, keyed by full routing key.
    handlers: Mutex<HashMap<String, ApiHandler>>,
    /// Handlers registered before `run()`, activated after the gate.
    staged: Mutex<Vec<(String, ApiHandler)>>,
    /// Per-key worker queues: one packet at a time per key.
    workers: Mutex<HashMap<String, UnboundedSender<Packet>>>,
    shutdown_tx: watch::Sender<bool>,
    on_init: Mutex<Option<LifecycleHook>>,
    on_connect: Mutex<Option<LifecycleHook>>,
}

/// The embeddable hub client used by every node.
#[derive(Clone)]
pub struct NodeClient {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for NodeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeClient")
            .field("node_name", &self.inner.config.node_name)
            .field("hub_name", &self.inner.config.hub_name)
            .finish_non_exhaustive()
    }
}

impl NodeClient {
    pub fn new(config: NodeConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(ClientInner {
                config,
                conn: OnceLock::new(),
                pending: Mutex::new(PendingCalls::new()),
                handlers: Mutex::new(HashMap::new()),
                staged: Mutex::new(Vec::new()),
                workers: Mutex::new(HashMap::new()),
                shutdown_tx,
                on_init: Mutex::new(None),
                on_connect: Mutex::new(None),
            }),
        }
    }

    /// This node's name.
    pub fn node_name(&self) -> &str {
        &self.inner.config.node_name
    }

    /// The hub's name.
    pub fn hub_name(&self) -> &str {
        &self.inner.config.hub_name
    }

    /// Register a handler for `<nodeName>.<apiCall>`.
    ///
    /// Handlers are staged until `run()` passes the readiness gate. A
    /// handler must emit exactly one reply per correlated request, via
    /// [`NodeClient::send_return`] or [`NodeClient::send_error`].
    pub fn add_api_call<F, Fut>(&self, api_call: &str, handler: F)
    where
        F: Fn(Packet, NodeClient) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let key = keys::api_key(&self.inner.config.node_name, api_call);
        self.stage_handler(key, handler);
    }

    /// Register a handler on an arbitrary full key (e.g. to observe another
    /// node's traffic).
    pub fn add_hook<F, Fut>(&self, key: &str, handler: F)
    where
        F: Fn(Packet, NodeClient) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.stage_handler(key.to_string(), handler);
    }

    fn stage_handler<F, Fut>(&self, key: String, handler: F)
    where
        F: Fn(Packet, NodeClient) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler: ApiHandler = Arc::new(move |packet, client| Box::pin(handler(packet, client)));
        self.inner.staged.lock().unwrap().push((key, handler));
    }

    /// Node-local initialization hook, run after the green light and before
    /// handlers activate (e.g. fetching settings).
    pub fn on_init<F, Fut>(&self, hook: F)
    where
        F: FnOnce(NodeClient) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        *self.inner.on_init.lock().unwrap() =
            Some(Box::new(move |client| Box::pin(hook(client))));
    }

    /// The node's "main", run last in the startup sequence.
    pub fn on_connect<F, Fut>(&self, hook: F)
    where
        F: FnOnce(NodeClient) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        *self.inner.on_connect.lock().unwrap() =
            Some(Box::new(move |client| Box::pin(hook(client))));
    }

    /// Connect, register, pass the readiness gate, and start serving.
    ///
    /// Returns after the `on_connect` hook completes; the connection and
    /// handlers keep running until the hub goes away (see
    /// [`NodeClient::wait_for_shutdown`]).
    ///
    /// # Errors
    ///
    /// Fails when called twice, when registration is rejected, or when the
    /// connection dies mid-startup.
    pub async fn run(&self) -> Result<()> {
        let config = &self.inner.config;
        let socket_path = socket_path_in(&config.socket_dir, &config.hub_name);

        log::info!(
            "[{}] Connecting to hub \"{}\" at {}",
            config.node_name,
            config.hub_name,
            socket_path.display()
        );
        let stream = connection::connect_with_retry(
            &socket_path,
            Duration::from_millis(CONNECT_RETRY_MS),
        )
        .await;

        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let conn = Connection::new(stream, event_tx);
        self.inner
            .conn
            .set(conn)
            .map_err(|_| anyhow!("run() may only be called once"))?;

        // Dispatcher: replies, debug messages, API invocations. Runs until
        // the hub disconnects, which triggers local shutdown.
        let dispatcher = self.clone();
        tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                match event {
                    ClientEvent::Frame(frame) => dispatcher.dispatch_frame(frame),
                    ClientEvent::Disconnected => {
                        log::warn!(
                            "[{}] Hub connection lost; shutting down",
                            dispatcher.node_name()
                        );
                        let _ = dispatcher.inner.shutdown_tx.send(true);
                        break;
                    }
                }
            }
        });

        // Register; the hub must index this connection before anything else.
        let reply = self
            .call_api(
                &config.hub_name,
                API_NODE_INIT,
                json!({"name": config.node_name}),
            )
            .await?;
        if !reply.status {
            bail!(
                "Registration rejected: {}",
                reply.error_message.as_deref().unwrap_or("unknown error")
            );
        }
        log::info!("[{}] Registered with hub", config.node_name);

        // Readiness gate: no domain traffic until the hub says go.
        self.await_green_light().await?;
        log::info!("[{}] Green light received", config.node_name);

        let on_init = self.inner.on_init.lock().unwrap().take();
        if let Some(hook) = on_init {
            hook(self.clone()).await;
        }

        // Activate staged handlers; domain APIs serve from here on.
        {
            let staged: Vec<_> = self.inner.staged.lock().unwrap().drain(..).collect();
            let mut handlers = self.inner.handlers.lock().unwrap();
            for (key, handler) in staged {
                handlers.insert(key, handler);
            }
        }

        let on_connect = self.inner.on_connect.lock().unwrap().take();
        if let Some(hook) = on_connect {
            hook(self.clone()).await;
        }
        Ok(())
    }

    /// Poll `greenLight` until the hub reports the network operational.
    async fn await_green_light(&self) -> Result<()> {
        let hub_name = self.inner.config.hub_name.clone();
        loop {
            let reply = self.call_api(&hub_name, API_GREEN_LIGHT, json!({})).await?;
            if reply.status && reply.result == json!(true) {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(GREEN_LIGHT_POLL_MS)).await;
        }
    }

    /// Issue a correlated request and await its reply.
    ///
    /// Resolves exactly once, always with a packet whose `status` reflects
    /// the outcome. With a configured `call_timeout`, deadline expiry
    /// resolves with the synthetic `"API Timeout!"` packet and the pending
    /// entry is torn down; a reply arriving later is silently dropped.
    ///
    /// # Errors
    ///
    /// Only transport-level failures (not connected, connection closed,
    /// client shut down) surface as `Err`.
    pub async fn call_api(&self, receiver: &str, api_call: &str, args: Value) -> Result<Packet> {
        let config = &self.inner.config;
        let (code, reply_rx) = {
            let mut pending = self.inner.pending.lock().unwrap();
            let code = pending.next_code();
            (code, pending.register(code))
        };

        let mut packet = Packet::new(
            config.node_name.clone(),
            receiver,
            api_call,
            args.clone(),
        )
        .with_return_code(code);
        packet.bdata = Some(args);

        // Hub built-ins are addressed directly; everything else goes
        // through the hub's send verb.
        let key = if receiver == config.hub_name {
            keys::api_key(&config.hub_name, api_call)
        } else {
            keys::send_key(&config.hub_name)
        };

        if let Err(e) = self.emit(&key, &packet) {
            self.inner.pending.lock().unwrap().cancel(code);
            return Err(e);
        }

        match config.call_timeout {
            None => reply_rx
                .await
                .context("client shut down while awaiting reply"),
            Some(deadline) => match tokio::time::timeout(deadline, reply_rx).await {
                Ok(Ok(reply)) => Ok(reply),
                Ok(Err(_)) => bail!("client shut down while awaiting reply"),
                Err(_) => {
                    self.inner.pending.lock().unwrap().cancel(code);
                    let mut timed_out = packet;
                    timed_out.status = false;
                    timed_out.error_message = Some(TIMEOUT_ERROR.to_string());
                    timed_out.result = Value::Null;
                    Ok(timed_out)
                }
            },
        }
    }

    /// Emit a finished reply for a request this node handled.
    ///
    /// The packet's routing fields must be preserved from the request so
    /// the caller's correlator fires.
    pub fn send_return(&self, packet: Packet) -> Result<()> {
        self.emit(&keys::return_key(&self.inner.config.hub_name), &packet)
    }

    /// Emit an error reply: sets `status=false` and fills `errorMessage`
    /// with `message` only when no earlier error is recorded.
    pub fn send_error(&self, mut packet: Packet, message: Option<&str>) -> Result<()> {
        packet.status = false;
        if packet.error_message.is_none() {
            packet.error_message = Some(message.unwrap_or("Unknown error!").to_string());
        }
        self.emit(&keys::return_key(&self.inner.config.hub_name), &packet)
    }

    /// Trigger local shutdown.
    pub fn shutdown(&self) {
        let _ = self.inner.shutdown_tx.send(true);
    }

    /// A receiver that flips true on disconnect or [`NodeClient::shutdown`].
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.inner.shutdown_tx.subscribe()
    }

    /// Suspend until the client shuts down.
    pub async fn wait_for_shutdown(&self) {
        let mut rx = self.inner.shutdown_tx.subscribe();
        if *rx.borrow() {
            return;
        }
        while rx.changed().await.is_ok() {
            if *rx.borrow() {
                return;
            }
        }
    }

    fn emit(&self, key: &str, packet: &Packet) -> Result<()> {
        let conn = self
            .inner
            .conn
            .get()
            .context("not connected; call run() first")?;
        if !conn.send(&Frame::new(key, packet.clone())) {
            bail!("hub connection closed");
        }
        Ok(())
    }

    /// Route one inbound frame: reply correlation, debug channel, or a
    /// handler invocation.
    fn dispatch_frame(&self, frame: Frame) {
        let node_name = &self.inner.config.node_name;
        let Frame { key, packet } = frame;
        match keys::parse_client_key(node_name, &key) {
            ClientRoute::Reply { return_code } => {
                let resolved = self
                    .inner
                    .pending
                    .lock()
                    .unwrap()
                    .resolve(return_code, packet);
                if !resolved {
                    // Cancelled or unknown call; late replies are dropped.
                    log::debug!("[{node_name}] Dropping late reply \"{key}\"");
                }
            }
            ClientRoute::Message => {
                if !self.inner.config.silent {
                    let text = packet.args.get("message").cloned().unwrap_or(Value::Null);
                    let text = text.as_str().map(str::to_string).unwrap_or_else(|| text.to_string());
                    log::info!("[{node_name}] Message from {}: {text}", packet.sender);
                }
            }
            ClientRoute::WellnessCheck => {
                // Hub liveness probe; receiving it is the whole point.
            }
            ClientRoute::Api(_) | ClientRoute::Other => self.dispatch_to_handler(key, packet),
        }
    }

    /// Queue a packet for the key's worker; one packet at a time per key,
    /// so a sender's calls are observed in send order.
    fn dispatch_to_handler(&self, key: String, packet: Packet) {
        if !self.inner.handlers.lock().unwrap().contains_key(&key) {
            log::debug!(
                "[{}] No handler for \"{key}\"; ignoring",
                self.inner.config.node_name
            );
            return;
        }
        let worker_tx = {
            let mut workers = self.inner.workers.lock().unwrap();
            workers
                .entry(key.clone())
                .or_insert_with(|| self.spawn_worker(key.clone()))
                .clone()
        };
        if worker_tx.send(packet).is_err() {
            log::warn!(
                "[{}] Worker for \"{key}\" is gone; dropping packet",
                self.inner.config.node_name
            );
        }
    }

    fn spawn_worker(&self, key: String) -> UnboundedSender<Packet> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Packet>();
        let client = self.clone();
        tokio::spawn(async move {
            while let Some(packet) = rx.recv().await {
                // Looked up per packet so re-registration takes effect.
                let handler = client.inner.handlers.lock().unwrap().get(&key).cloned();
                if let Some(handler) = handler {
                    handler(packet, client.clone()).await;
                }
            }
        });
        tx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = NodeConfig::new("alice");
        assert_eq!(config.node_name, "alice");
        assert_eq!(config.hub_name, "samcore");
        assert!(!config.silent);
        assert!(config.call_timeout.is_none());
    }

    #[test]
    fn test_handlers_are_staged_until_run() {
        let client = NodeClient::new(NodeConfig::new("alice"));
        client.add_api_call("echo", |_packet, _client| async {});
        client.add_hook("bob.echo", |_packet, _client| async {});

        assert_eq!(client.inner.staged.lock().unwrap().len(), 2);
        assert!(
            client.inner.handlers.lock().unwrap().is_empty(),
            "handlers must not be active before the readiness gate"
        );
    }

    #[tokio::test]
    async fn test_call_api_before_run_is_transport_error() {
        let client = NodeClient::new(NodeConfig::new("alice"));
        let err = client
            .call_api("samcore", "helloWorld", json!({"text": "hi"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not connected"));
        assert_eq!(
            client.inner.pending.lock().unwrap().in_flight(),
            0,
            "failed emit must not leak a pending entry"
        );
    }
}
