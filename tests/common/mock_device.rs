//! In-memory NETCONF device for integration tests.
//!
//! Answers the hello, keeps candidate/running/startup datastores, enforces
//! datastore locks and records every request so tests can assert on what
//! actually crossed the wire.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use netconf_exec::connector::{ConnectParams, Connector};
use netconf_exec::transport::{Framing, Transport, TransportError};
use netconf_exec::xml::{self, Element, Node};

pub const DEVICE_SESSION_ID: u32 = 4711;

// ── Behaviour switches ───────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Normal,
    /// Accept requests but never reply.
    Hang,
    /// Drop the connection when the next reply is awaited.
    Drop,
    /// Reply with a message-id that matches no request.
    WrongMessageId,
}

#[derive(Debug)]
pub struct DeviceState {
    pub datastores: HashMap<String, Element>,
    pub lock_owner: HashMap<String, u32>,
    pub behavior: Behavior,
    pub writes: usize,
    pub requests: Vec<String>,
    pub message_ids: Vec<String>,
    pub closed: bool,
    pub chunked: bool,
}

// ── MockDevice ───────────────────────────────────────────────

#[derive(Clone)]
pub struct MockDevice {
    state: Arc<Mutex<DeviceState>>,
}

#[allow(dead_code)]
impl MockDevice {
    pub fn new() -> Self {
        let datastores = ["candidate", "running", "startup"]
            .iter()
            .map(|name| (name.to_string(), Element::new("data")))
            .collect();
        MockDevice {
            state: Arc::new(Mutex::new(DeviceState {
                datastores,
                lock_owner: HashMap::new(),
                behavior: Behavior::Normal,
                writes: 0,
                requests: Vec::new(),
                message_ids: Vec::new(),
                closed: false,
                chunked: false,
            })),
        }
    }

    /// Advertise base:1.1 so the session switches to chunked framing.
    pub fn with_chunked_framing(self) -> Self {
        self.state().chunked = true;
        self
    }

    pub fn transport(&self) -> Box<dyn Transport> {
        Box::new(MockTransport {
            device: self.clone(),
            outbox: VecDeque::new(),
            hello_sent: false,
        })
    }

    pub fn set_behavior(&self, behavior: Behavior) {
        self.state().behavior = behavior;
    }

    /// Number of messages the client has written, hello included.
    pub fn writes(&self) -> usize {
        self.state().writes
    }

    /// Operation names of every rpc received, in order.
    pub fn requests(&self) -> Vec<String> {
        self.state().requests.clone()
    }

    pub fn message_ids(&self) -> Vec<String> {
        self.state().message_ids.clone()
    }

    pub fn datastore(&self, name: &str) -> Element {
        self.state().datastores.get(name).cloned().unwrap_or_default()
    }

    pub fn lock_held(&self, name: &str) -> bool {
        self.state().lock_owner.contains_key(name)
    }

    /// Simulates another session holding a lock.
    pub fn lock_by_other_session(&self, name: &str) {
        self.state().lock_owner.insert(name.to_string(), DEVICE_SESSION_ID + 1);
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    fn state(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap()
    }
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

/// Connector that hands out transports to a `MockDevice`.
pub struct MockConnector(pub MockDevice);

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, _params: &ConnectParams) -> Result<Box<dyn Transport>, TransportError> {
        Ok(self.0.transport())
    }
}

// ── Transport side ───────────────────────────────────────────

struct MockTransport {
    device: MockDevice,
    outbox: VecDeque<String>,
    hello_sent: bool,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, message: &str) -> Result<(), TransportError> {
        let mut state = self.device.state();
        if state.closed {
            return Err(TransportError::Closed);
        }
        state.writes += 1;
        let request = xml::parse(message).map_err(|e| TransportError::Framing(e.to_string()))?;
        if request.local_name() == "rpc" {
            let reply = handle_rpc(&mut state, &request);
            self.outbox.push_back(reply);
        }
        Ok(())
    }

    async fn recv(&mut self) -> Result<String, TransportError> {
        if !self.hello_sent {
            self.hello_sent = true;
            return Ok(server_hello(self.device.state().chunked));
        }
        let behavior = self.device.state().behavior;
        match behavior {
            Behavior::Hang => std::future::pending().await,
            Behavior::Drop => {
                self.device.state().closed = true;
                Err(TransportError::Closed)
            }
            Behavior::Normal | Behavior::WrongMessageId => {
                self.outbox.pop_front().ok_or(TransportError::Closed)
            }
        }
    }

    fn set_framing(&mut self, _framing: Framing) {}

    async fn close(&mut self) -> Result<(), TransportError> {
        self.device.state().closed = true;
        Ok(())
    }
}

fn server_hello(chunked: bool) -> String {
    let mut capabilities = Element::new("capabilities")
        .with_child(Element::new("capability").with_text("urn:ietf:params:netconf:base:1.0"))
        .with_child(
            Element::new("capability").with_text("urn:ietf:params:netconf:capability:candidate:1.0"),
        )
        .with_child(
            Element::new("capability").with_text("urn:ietf:params:netconf:capability:validate:1.1"),
        );
    if chunked {
        capabilities.push_child(Element::new("capability").with_text("urn:ietf:params:netconf:base:1.1"));
    }
    Element::new("hello")
        .with_attr("xmlns", "urn:ietf:params:xml:ns:netconf:base:1.0")
        .with_child(capabilities)
        .with_child(Element::new("session-id").with_text(DEVICE_SESSION_ID.to_string()))
        .to_xml()
}

// ── RPC handling ─────────────────────────────────────────────

type Outcome = Result<Option<Element>, Element>;

fn handle_rpc(state: &mut DeviceState, rpc: &Element) -> String {
    let message_id = rpc.attr("message-id").unwrap_or("").to_string();
    state.message_ids.push(message_id.clone());

    let outcome = match rpc.elements().next() {
        Some(operation) => {
            state.requests.push(operation.local_name().to_string());
            dispatch(state, operation)
        }
        None => Err(rpc_error("missing-element", "rpc has no operation")),
    };

    let reply_id = if state.behavior == Behavior::WrongMessageId {
        format!("{}0", message_id)
    } else {
        message_id
    };
    let mut reply = Element::new("rpc-reply")
        .with_attr("message-id", reply_id)
        .with_attr("xmlns", "urn:ietf:params:xml:ns:netconf:base:1.0");
    match outcome {
        Ok(Some(data)) => reply.push_child(data),
        Ok(None) => reply.push_child(Element::new("ok")),
        Err(error) => reply.push_child(error),
    }
    reply.to_xml()
}

fn dispatch(state: &mut DeviceState, operation: &Element) -> Outcome {
    match operation.local_name() {
        "lock" => {
            let target = datastore_name(operation, "target")?;
            if state.lock_owner.contains_key(&target) {
                return Err(rpc_error("lock-denied", "Lock failed, lock is already held"));
            }
            state.lock_owner.insert(target, DEVICE_SESSION_ID);
            Ok(None)
        }
        "unlock" => {
            let target = datastore_name(operation, "target")?;
            if state.lock_owner.get(&target) == Some(&DEVICE_SESSION_ID) {
                state.lock_owner.remove(&target);
                Ok(None)
            } else {
                Err(rpc_error("operation-failed", "Unlock failed, session does not own lock"))
            }
        }
        "edit-config" => {
            let target = datastore_name(operation, "target")?;
            check_not_locked_by_other(state, &target)?;
            let config = operation
                .child("config")
                .ok_or_else(|| rpc_error("missing-element", "edit-config has no config"))?;
            let store = state.datastores.entry(target).or_insert_with(|| Element::new("data"));
            for item in config.elements() {
                merge(store, item);
            }
            Ok(None)
        }
        "commit" => {
            check_not_locked_by_other(state, "running")?;
            let candidate = state.datastores.get("candidate").cloned().unwrap_or_default();
            state.datastores.insert("running".to_string(), candidate);
            Ok(None)
        }
        "cancel-commit" => Err(rpc_error("operation-failed", "No confirmed commit pending")),
        "discard-changes" => {
            let running = state.datastores.get("running").cloned().unwrap_or_default();
            state.datastores.insert("candidate".to_string(), running);
            Ok(None)
        }
        "get-config" => {
            let source = datastore_name(operation, "source")?;
            if let Some(url) = source.strip_prefix("url:") {
                return Err(rpc_error("invalid-value", &format!("cannot fetch {}", url)));
            }
            let store = state.datastores.get(&source).cloned().unwrap_or_default();
            Ok(Some(filtered(&store, operation.child("filter"))))
        }
        "get" => {
            let store = state.datastores.get("running").cloned().unwrap_or_default();
            Ok(Some(filtered(&store, operation.child("filter"))))
        }
        "validate" => {
            let source = operation
                .child("source")
                .ok_or_else(|| rpc_error("missing-element", "validate has no source"))?;
            match source.child("config") {
                Some(config) if config.child("invalid").is_some() => {
                    Err(rpc_error("invalid-value", "configuration failed validation"))
                }
                _ => Ok(None),
            }
        }
        "copy-config" => {
            let target = datastore_name(operation, "target")?;
            check_not_locked_by_other(state, &target)?;
            let source = operation
                .child("source")
                .ok_or_else(|| rpc_error("missing-element", "copy-config has no source"))?;
            let mut content = Element::new("data");
            match source.child("config") {
                Some(config) => content.children = config.children.clone(),
                None => {
                    let name = datastore_name(operation, "source")?;
                    content = state.datastores.get(&name).cloned().unwrap_or_default();
                }
            }
            state.datastores.insert(target, content);
            Ok(None)
        }
        "delete-config" => {
            let target = datastore_name(operation, "target")?;
            state.datastores.insert(target, Element::new("data"));
            Ok(None)
        }
        "kill-session" => {
            let id = operation.child_text("session-id").unwrap_or_default();
            if id == DEVICE_SESSION_ID.to_string() {
                Err(rpc_error("invalid-value", "cannot kill own session"))
            } else {
                Ok(None)
            }
        }
        "close-session" => {
            state.lock_owner.retain(|_, owner| *owner != DEVICE_SESSION_ID);
            Ok(None)
        }
        other => Err(rpc_error(
            "operation-not-supported",
            &format!("operation '{}' is not supported", other),
        )),
    }
}

fn datastore_name(operation: &Element, container: &str) -> Result<String, Element> {
    let Some(wrapper) = operation.child(container) else {
        return Err(rpc_error("missing-element", &format!("no <{}>", container)));
    };
    let Some(store) = wrapper.elements().next() else {
        return Err(rpc_error("missing-element", &format!("empty <{}>", container)));
    };
    if store.local_name() == "url" {
        return Ok(format!("url:{}", store.text()));
    }
    Ok(store.local_name().to_string())
}

fn check_not_locked_by_other(state: &DeviceState, target: &str) -> Result<(), Element> {
    match state.lock_owner.get(target) {
        Some(owner) if *owner != DEVICE_SESSION_ID => {
            Err(rpc_error("in-use", &format!("{} is locked by session {}", target, owner)))
        }
        _ => Ok(()),
    }
}

// Top-level subtree selection only: keep datastore children whose name
// matches a filter child.
fn filtered(store: &Element, filter: Option<&Element>) -> Element {
    let mut data = Element::new("data");
    for item in store.elements() {
        let selected = match filter {
            Some(filter) if filter.has_elements() => {
                filter.elements().any(|f| f.local_name() == item.local_name())
            }
            _ => true,
        };
        if selected {
            data.push_child(item.clone());
        }
    }
    data
}

// Merge `item` into `parent`: containers merge recursively, leaves replace.
fn merge(parent: &mut Element, item: &Element) {
    let position = parent.children.iter().position(|node| {
        matches!(node, Node::Element(element) if element.local_name() == item.local_name())
    });
    let Some(index) = position else {
        parent.push_child(item.clone());
        return;
    };
    if let Node::Element(element) = &mut parent.children[index] {
        if item.has_elements() {
            for child in item.elements() {
                merge(element, child);
            }
        } else {
            *element = item.clone();
        }
    }
}

fn rpc_error(tag: &str, message: &str) -> Element {
    Element::new("rpc-error")
        .with_child(Element::new("error-type").with_text("protocol"))
        .with_child(Element::new("error-tag").with_text(tag))
        .with_child(Element::new("error-severity").with_text("error"))
        .with_child(Element::new("error-message").with_text(message))
}
