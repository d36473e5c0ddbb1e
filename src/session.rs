// src/session.rs
// One NETCONF session: hello exchange, state machine, message-id counter,
// per-session exclusion and the advisory lock tracker.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::connector::{ConnectParams, Connector};
use crate::datastore::Datastore;
use crate::errors::{NetconfError, Result};
use crate::lock_tracker::LockTracker;
use crate::transport::{Framing, Transport};
use crate::xml::{self, Element};

pub const NETCONF_BASE_NS: &str = "urn:ietf:params:xml:ns:netconf:base:1.0";
pub const CAPABILITY_BASE_1_0: &str = "urn:ietf:params:netconf:base:1.0";
pub const CAPABILITY_BASE_1_1: &str = "urn:ietf:params:netconf:base:1.1";

const FIRST_MESSAGE_ID: u64 = 101;

/// A `Session` value only exists once the hello exchange has succeeded, so
/// `state()` reports `Connected` or `Closed`. `Disconnected` names the
/// pre-hello phase for logs and serialized status.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected,
    Closed, // Terminal; build a new Session to reconnect
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FramingMode {
    /// Chunked when both sides advertise base:1.1.
    #[default]
    Auto,
    Eom,
    Chunked,
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub reply_timeout: Duration,
    pub connect_timeout: Duration,
    pub framing: FramingMode,
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions {
            reply_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            framing: FramingMode::Auto,
        }
    }
}

struct Channel {
    transport: Box<dyn Transport>,
    state: SessionState,
    next_message_id: u64,
    locks: LockTracker,
    transport_open: bool,
}

pub struct Session {
    channel: Mutex<Channel>,
    session_id: u32,
    capabilities: Vec<String>,
    options: SessionOptions,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("session_id", &self.session_id)
            .field("capabilities", &self.capabilities.len())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Open a transport through `connector` and complete the hello exchange,
    /// both bounded by the connect timeout.
    pub async fn connect(
        connector: &dyn Connector,
        params: &ConnectParams,
        options: SessionOptions,
    ) -> Result<Session> {
        let deadline = options.connect_timeout;
        let attempt = async {
            let transport = connector.connect(params).await?;
            Session::establish(transport, options).await
        };
        match tokio::time::timeout(deadline, attempt).await {
            Ok(result) => result,
            Err(_) => Err(NetconfError::transport(format!(
                "connecting to {}:{} timed out after {:?}",
                params.host, params.port, deadline
            ))),
        }
    }

    /// Run the hello exchange over an already-open transport.
    pub async fn establish(mut transport: Box<dyn Transport>, options: SessionOptions) -> Result<Session> {
        debug!("Session state {:?}: sending client hello", SessionState::Disconnected);
        transport.send(&client_hello()).await?;

        let raw = match tokio::time::timeout(options.reply_timeout, transport.recv()).await {
            Ok(received) => received?,
            Err(_) => {
                let _ = transport.close().await;
                return Err(NetconfError::transport("no server hello before the reply timeout"));
            }
        };
        let (session_id, capabilities) = match parse_server_hello(&raw) {
            Ok(hello) => hello,
            Err(e) => {
                let _ = transport.close().await;
                return Err(e);
            }
        };

        let chunked_possible = capabilities.iter().any(|c| c == CAPABILITY_BASE_1_1);
        let framing = match options.framing {
            FramingMode::Eom => Framing::EndOfMessage,
            FramingMode::Chunked => Framing::Chunked,
            FramingMode::Auto if chunked_possible => Framing::Chunked,
            FramingMode::Auto => Framing::EndOfMessage,
        };
        transport.set_framing(framing);
        info!(
            "NETCONF session {} established ({} capabilities, {:?} framing)",
            session_id,
            capabilities.len(),
            framing
        );

        Ok(Session {
            channel: Mutex::new(Channel {
                transport,
                state: SessionState::Connected,
                next_message_id: FIRST_MESSAGE_ID,
                locks: LockTracker::new(),
                transport_open: true,
            }),
            session_id,
            capabilities,
            options,
        })
    }

    pub fn session_id(&self) -> u32 {
        self.session_id
    }

    pub fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    /// True if any advertised capability starts with `uri` (capabilities may
    /// carry query parameters).
    pub fn supports(&self, uri: &str) -> bool {
        self.capabilities.iter().any(|c| c.starts_with(uri))
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Waits for any in-flight exchange to finish.
    pub async fn state(&self) -> SessionState {
        self.channel.lock().await.state
    }

    pub async fn is_locked(&self, target: &Datastore) -> bool {
        self.channel.lock().await.locks.is_locked(target)
    }

    pub async fn locked_datastores(&self) -> Vec<String> {
        self.channel.lock().await.locks.held()
    }

    /// Local close without a close-session exchange. Also releases the
    /// transport of a session that was closed by an abandoned call.
    pub async fn close(&self) {
        let mut channel = self.channel.lock().await;
        if channel.transport_open {
            close_channel(&mut channel).await;
        }
    }

    /// Take the per-session exclusion for one request/reply exchange. Fails
    /// without touching the transport unless the session is connected.
    pub(crate) async fn begin(&self) -> Result<Exchange<'_>> {
        let channel = self.channel.lock().await;
        if channel.state != SessionState::Connected {
            return Err(NetconfError::transport(format!(
                "session {} is {:?}; open a new session",
                self.session_id, channel.state
            )));
        }
        Ok(Exchange {
            channel,
            session_id: self.session_id,
            reply_timeout: self.options.reply_timeout,
            in_flight: false,
        })
    }
}

/// Holds the session exclusively for the duration of one call.
///
/// Dropped while a request is awaiting its reply (the caller cancelled the
/// future), the session is marked closed: the message-id is spent and a late
/// reply would desynchronize the next call.
pub(crate) struct Exchange<'a> {
    channel: MutexGuard<'a, Channel>,
    session_id: u32,
    reply_timeout: Duration,
    in_flight: bool,
}

impl Drop for Exchange<'_> {
    fn drop(&mut self) {
        if self.in_flight {
            warn!(
                "Session {}: call abandoned before its reply arrived; closing session",
                self.session_id
            );
            // Transport teardown needs an await: Session::close or drop releases it.
            self.channel.state = SessionState::Closed;
            self.channel.locks.clear();
        }
    }
}

impl Exchange<'_> {
    /// Send `body` inside a fresh `<rpc>` and wait for the matching reply.
    /// Any transport fault, timeout or uncorrelated reply closes the session.
    pub(crate) async fn rpc(&mut self, body: Element) -> Result<Element> {
        let message_id = self.channel.next_message_id;
        self.channel.next_message_id += 1;

        let request = Element::new("rpc")
            .with_attr("message-id", message_id.to_string())
            .with_attr("xmlns", NETCONF_BASE_NS)
            .with_child(body)
            .to_xml();
        debug!("Session {} sending: {}", self.session_id, request);

        self.in_flight = true;
        if let Err(e) = self.channel.transport.send(&request).await {
            return Err(self.fail(format!("send failed: {}", e)).await);
        }

        let raw = match tokio::time::timeout(self.reply_timeout, self.channel.transport.recv()).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => return Err(self.fail(format!("receive failed: {}", e)).await),
            Err(_) => {
                let msg = format!("no reply to message-id {} within {:?}", message_id, self.reply_timeout);
                return Err(self.fail(msg).await);
            }
        };
        debug!("Session {} received: {}", self.session_id, raw);

        let reply = match xml::parse(&raw) {
            Ok(reply) => reply,
            Err(e) => return Err(self.fail(format!("unparseable reply: {}", e)).await),
        };
        if reply.local_name() != "rpc-reply" {
            let msg = format!("expected <rpc-reply>, got <{}>", reply.name);
            return Err(self.fail(msg).await);
        }
        let expected = message_id.to_string();
        if reply.attr("message-id") != Some(expected.as_str()) {
            let msg = format!(
                "reply message-id {:?} does not match request {}",
                reply.attr("message-id"),
                message_id
            );
            return Err(self.fail(msg).await);
        }
        self.in_flight = false;
        Ok(reply)
    }

    pub(crate) fn locks(&mut self) -> &mut LockTracker {
        &mut self.channel.locks
    }

    pub(crate) async fn mark_closed(&mut self) {
        close_channel(&mut self.channel).await;
        info!("NETCONF session {} closed", self.session_id);
    }

    async fn fail(&mut self, message: String) -> NetconfError {
        warn!("Session {}: {}; closing session", self.session_id, message);
        close_channel(&mut self.channel).await;
        self.in_flight = false;
        NetconfError::transport(message)
    }
}

async fn close_channel(channel: &mut Channel) {
    channel.state = SessionState::Closed;
    channel.locks.clear();
    channel.transport_open = false;
    if let Err(e) = channel.transport.close().await {
        debug!("Transport close reported: {}", e);
    }
}

fn client_hello() -> String {
    Element::new("hello")
        .with_attr("xmlns", NETCONF_BASE_NS)
        .with_child(
            Element::new("capabilities")
                .with_child(Element::new("capability").with_text(CAPABILITY_BASE_1_0))
                .with_child(Element::new("capability").with_text(CAPABILITY_BASE_1_1)),
        )
        .to_xml()
}

fn parse_server_hello(raw: &str) -> Result<(u32, Vec<String>)> {
    let hello = xml::parse(raw).map_err(|e| NetconfError::transport(format!("bad server hello: {}", e)))?;
    if hello.local_name() != "hello" {
        return Err(NetconfError::transport(format!(
            "expected <hello> from server, got <{}>",
            hello.name
        )));
    }
    let capabilities: Vec<String> = hello
        .child("capabilities")
        .map(|caps| {
            caps.children_named("capability")
                .map(Element::text)
                .filter(|c| !c.is_empty())
                .collect()
        })
        .unwrap_or_default();
    if !capabilities.iter().any(|c| c.starts_with("urn:ietf:params:netconf:base:")) {
        return Err(NetconfError::transport("server hello advertises no base capability"));
    }
    let session_id = hello
        .child_text("session-id")
        .and_then(|raw| raw.parse::<u32>().ok())
        .filter(|id| *id > 0)
        .ok_or_else(|| NetconfError::transport("server hello carries no valid session-id"))?;
    Ok((session_id, capabilities))
}
