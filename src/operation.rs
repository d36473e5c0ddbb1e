// src/operation.rs
// Operation descriptors: one closed variant per NETCONF RPC, each carrying only
// the fields that are legal for it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::codec::{Codec, Entity};
use crate::datastore::Datastore;
use crate::errors::{NetconfError, Result};
use crate::xml::{self, Element};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    CloseSession,
    Commit,
    CancelCommit,
    CopyConfig,
    DeleteConfig,
    DiscardChanges,
    EditConfig,
    Get,
    GetConfig,
    KillSession,
    Lock,
    Unlock,
    Validate,
    Custom,
    Raw,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::CloseSession => "close-session",
            OperationKind::Commit => "commit",
            OperationKind::CancelCommit => "cancel-commit",
            OperationKind::CopyConfig => "copy-config",
            OperationKind::DeleteConfig => "delete-config",
            OperationKind::DiscardChanges => "discard-changes",
            OperationKind::EditConfig => "edit-config",
            OperationKind::Get => "get",
            OperationKind::GetConfig => "get-config",
            OperationKind::KillSession => "kill-session",
            OperationKind::Lock => "lock",
            OperationKind::Unlock => "unlock",
            OperationKind::Validate => "validate",
            OperationKind::Custom => "custom-rpc",
            OperationKind::Raw => "raw-rpc",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a successful reply is expected to carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyShape {
    /// Acknowledgement only (`<ok/>`).
    None,
    /// Data decoded against a caller-supplied template.
    Typed,
    /// Data handed back as a raw element tree.
    Passthrough,
}

/// Configuration or filter content: either already encoded, or a typed
/// object the codec will encode at execution time.
#[derive(Debug, Clone)]
pub enum Payload {
    Encoded(String),
    Entity(Arc<dyn Entity>),
}

impl Payload {
    pub fn encoded(xml: impl Into<String>) -> Self {
        Payload::Encoded(xml.into())
    }

    pub fn entity<E: Entity + 'static>(entity: E) -> Self {
        Payload::Entity(Arc::new(entity))
    }

    fn check(&self, field: &str) -> Result<()> {
        match self {
            Payload::Encoded(raw) if raw.trim().is_empty() => {
                Err(NetconfError::invalid_rpc(format!("{} payload is empty", field)))
            }
            _ => Ok(()),
        }
    }

    // Renders the payload as the children of `<container>`. A payload that
    // already carries its own `<container>` wrapper is unwrapped first.
    fn render(&self, container: &str, codec: &dyn Codec) -> Result<Element> {
        let text = match self {
            Payload::Encoded(raw) => raw.clone(),
            Payload::Entity(entity) => codec.encode(entity.as_ref())?,
        };
        let wrapped = xml::parse(&format!("<{0}>{1}</{0}>", container, text))?;
        let single = {
            let mut inner = wrapped.elements();
            match (inner.next(), inner.next()) {
                (Some(only), None) if only.local_name() == container && wrapped.text().is_empty() => {
                    Some(only.clone())
                }
                _ => None,
            }
        };
        match single {
            Some(mut unwrapped) => {
                unwrapped.name = container.to_string();
                Ok(unwrapped)
            }
            None => Ok(wrapped),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Filter {
    Subtree(Payload),
    XPath(String),
}

impl Filter {
    fn check(&self) -> Result<()> {
        match self {
            Filter::Subtree(payload) => payload.check("filter"),
            Filter::XPath(select) if select.trim().is_empty() => {
                Err(NetconfError::invalid_rpc("xpath filter select expression is empty"))
            }
            Filter::XPath(_) => Ok(()),
        }
    }

    fn render(&self, codec: &dyn Codec) -> Result<Element> {
        match self {
            Filter::Subtree(payload) => {
                let mut element = payload.render("filter", codec)?;
                element.attributes.retain(|(key, _)| key != "type");
                element.attributes.insert(0, ("type".to_string(), "subtree".to_string()));
                Ok(element)
            }
            Filter::XPath(select) => Ok(Element::new("filter")
                .with_attr("type", "xpath")
                .with_attr("select", select.clone())),
        }
    }
}

/// Source of a validate or copy-config: a datastore or inline configuration.
#[derive(Debug, Clone)]
pub enum ConfigSource {
    Datastore(Datastore),
    Config(Payload),
}

impl From<Datastore> for ConfigSource {
    fn from(datastore: Datastore) -> Self {
        ConfigSource::Datastore(datastore)
    }
}

impl From<Payload> for ConfigSource {
    fn from(payload: Payload) -> Self {
        ConfigSource::Config(payload)
    }
}

impl ConfigSource {
    fn render(&self, codec: &dyn Codec) -> Result<Element> {
        match self {
            ConfigSource::Datastore(datastore) => Ok(datastore.wrapped("source")),
            ConfigSource::Config(payload) => {
                Ok(Element::new("source").with_child(payload.render("config", codec)?))
            }
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DefaultOperation {
    Merge,
    Replace,
    None,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum TestOption {
    TestThenSet,
    Set,
    TestOnly,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorOption {
    StopOnError,
    ContinueOnError,
    RollbackOnError,
}

#[derive(Debug, Clone)]
pub struct EditConfig {
    pub target: Datastore,
    pub config: Payload,
    pub default_operation: Option<DefaultOperation>,
    pub test_option: Option<TestOption>,
    pub error_option: Option<ErrorOption>,
}

impl EditConfig {
    pub fn new(target: Datastore, config: Payload) -> Self {
        EditConfig {
            target,
            config,
            default_operation: None,
            test_option: None,
            error_option: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Commit {
    pub confirmed: bool,
    pub confirm_timeout: Option<u32>, // Seconds
    pub persist: Option<String>,
}

#[derive(Debug, Clone)]
pub enum Operation {
    CloseSession,
    Commit(Commit),
    CancelCommit { persist_id: Option<String> },
    CopyConfig { target: Datastore, source: ConfigSource },
    DeleteConfig { target: Datastore },
    DiscardChanges,
    EditConfig(EditConfig),
    Get { filter: Option<Filter> },
    GetConfig { source: Datastore, filter: Option<Filter> },
    KillSession { session_id: u32 },
    Lock { target: Datastore },
    Unlock { target: Datastore },
    Validate { source: ConfigSource },
    /// Any other typed object. Only sendable when it reports `is_rpc`.
    Custom(Arc<dyn Entity>),
    /// A pre-built RPC body with no model behind it (`<get-schema>`, vendor
    /// RPCs). May be given bare or inside its own `<rpc>` envelope.
    Raw(Payload),
}

impl Operation {
    pub fn commit() -> Self {
        Operation::Commit(Commit::default())
    }

    pub fn edit_config(target: Datastore, config: Payload) -> Self {
        Operation::EditConfig(EditConfig::new(target, config))
    }

    pub fn get_config(source: Datastore, filter: Option<Filter>) -> Self {
        Operation::GetConfig { source, filter }
    }

    pub fn lock(target: Datastore) -> Self {
        Operation::Lock { target }
    }

    pub fn unlock(target: Datastore) -> Self {
        Operation::Unlock { target }
    }

    pub fn validate(source: impl Into<ConfigSource>) -> Self {
        Operation::Validate {
            source: source.into(),
        }
    }

    pub fn custom<E: Entity + 'static>(entity: E) -> Self {
        Operation::Custom(Arc::new(entity))
    }

    pub fn raw(payload: impl Into<String>) -> Self {
        Operation::Raw(Payload::encoded(payload))
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::CloseSession => OperationKind::CloseSession,
            Operation::Commit(_) => OperationKind::Commit,
            Operation::CancelCommit { .. } => OperationKind::CancelCommit,
            Operation::CopyConfig { .. } => OperationKind::CopyConfig,
            Operation::DeleteConfig { .. } => OperationKind::DeleteConfig,
            Operation::DiscardChanges => OperationKind::DiscardChanges,
            Operation::EditConfig(_) => OperationKind::EditConfig,
            Operation::Get { .. } => OperationKind::Get,
            Operation::GetConfig { .. } => OperationKind::GetConfig,
            Operation::KillSession { .. } => OperationKind::KillSession,
            Operation::Lock { .. } => OperationKind::Lock,
            Operation::Unlock { .. } => OperationKind::Unlock,
            Operation::Validate { .. } => OperationKind::Validate,
            Operation::Custom(_) => OperationKind::Custom,
            Operation::Raw(_) => OperationKind::Raw,
        }
    }

    /// Declared reply shape when no template is supplied.
    pub fn reply_shape(&self) -> ReplyShape {
        match self {
            Operation::Get { .. }
            | Operation::GetConfig { .. }
            | Operation::Custom(_)
            | Operation::Raw(_) => ReplyShape::Passthrough,
            _ => ReplyShape::None,
        }
    }

    /// Datastore whose local lock state this operation changes on success.
    pub fn lock_target(&self) -> Option<&Datastore> {
        match self {
            Operation::Lock { target } | Operation::Unlock { target } => Some(target),
            _ => None,
        }
    }

    /// Pure field validation; never touches a session.
    pub fn validate_fields(&self) -> Result<()> {
        match self {
            Operation::Custom(entity) => {
                if !entity.is_rpc() {
                    return Err(NetconfError::invalid_rpc(format!(
                        "'{}' is not an RPC and cannot be executed",
                        entity.yang_name()
                    )));
                }
            }
            Operation::Commit(commit) => {
                if !commit.confirmed && (commit.confirm_timeout.is_some() || commit.persist.is_some()) {
                    return Err(NetconfError::invalid_rpc(
                        "confirm-timeout and persist require a confirmed commit",
                    ));
                }
                if commit.confirm_timeout == Some(0) {
                    return Err(NetconfError::invalid_rpc("confirm-timeout must be positive"));
                }
            }
            Operation::CancelCommit { persist_id } => {
                if matches!(persist_id, Some(id) if id.trim().is_empty()) {
                    return Err(NetconfError::invalid_rpc("persist-id is empty"));
                }
            }
            Operation::CopyConfig { target, source } => {
                check_url(target)?;
                match source {
                    ConfigSource::Datastore(source) => {
                        check_url(source)?;
                        if source == target {
                            return Err(NetconfError::invalid_rpc(format!(
                                "copy-config source and target are both {}",
                                target
                            )));
                        }
                    }
                    ConfigSource::Config(payload) => payload.check("config")?,
                }
            }
            Operation::DeleteConfig { target } => {
                check_url(target)?;
                if *target == Datastore::Running {
                    return Err(NetconfError::invalid_rpc("the running datastore cannot be deleted"));
                }
            }
            Operation::EditConfig(edit) => {
                check_url(&edit.target)?;
                edit.config.check("config")?;
            }
            Operation::Get { filter } | Operation::GetConfig { filter, .. } => {
                if let Operation::GetConfig { source, .. } = self {
                    check_url(source)?;
                }
                if let Some(filter) = filter {
                    filter.check()?;
                }
            }
            Operation::KillSession { session_id } => {
                if *session_id == 0 {
                    return Err(NetconfError::invalid_rpc("kill-session requires a non-zero session-id"));
                }
            }
            Operation::Lock { target } | Operation::Unlock { target } => {
                if target.is_url() {
                    return Err(NetconfError::invalid_rpc(format!(
                        "{} target must be a named datastore, not {}",
                        self.kind(),
                        target
                    )));
                }
            }
            Operation::Validate { source } => match source {
                ConfigSource::Datastore(datastore) => check_url(datastore)?,
                ConfigSource::Config(payload) => payload.check("config")?,
            },
            Operation::Raw(payload) => payload.check("rpc")?,
            Operation::CloseSession | Operation::DiscardChanges => {}
        }
        Ok(())
    }

    /// Builds the element that goes inside `<rpc>`, encoding any embedded
    /// typed payloads through `codec`.
    pub fn render(&self, codec: &dyn Codec) -> Result<Element> {
        let element = match self {
            Operation::CloseSession => Element::new("close-session"),
            Operation::Commit(commit) => {
                let mut element = Element::new("commit");
                if commit.confirmed {
                    element.push_child(Element::new("confirmed"));
                }
                if let Some(timeout) = commit.confirm_timeout {
                    element.push_child(Element::new("confirm-timeout").with_text(timeout.to_string()));
                }
                if let Some(persist) = &commit.persist {
                    element.push_child(Element::new("persist").with_text(persist.clone()));
                }
                element
            }
            Operation::CancelCommit { persist_id } => {
                let mut element = Element::new("cancel-commit");
                if let Some(id) = persist_id {
                    element.push_child(Element::new("persist-id").with_text(id.clone()));
                }
                element
            }
            Operation::CopyConfig { target, source } => Element::new("copy-config")
                .with_child(target.wrapped("target"))
                .with_child(source.render(codec)?),
            Operation::DeleteConfig { target } => {
                Element::new("delete-config").with_child(target.wrapped("target"))
            }
            Operation::DiscardChanges => Element::new("discard-changes"),
            Operation::EditConfig(edit) => {
                let mut element = Element::new("edit-config").with_child(edit.target.wrapped("target"));
                if let Some(op) = edit.default_operation {
                    element.push_child(Element::new("default-operation").with_text(enum_text(&op)));
                }
                if let Some(option) = edit.test_option {
                    element.push_child(Element::new("test-option").with_text(enum_text(&option)));
                }
                if let Some(option) = edit.error_option {
                    element.push_child(Element::new("error-option").with_text(enum_text(&option)));
                }
                element.push_child(edit.config.render("config", codec)?);
                element
            }
            Operation::Get { filter } => {
                let mut element = Element::new("get");
                if let Some(filter) = filter {
                    element.push_child(filter.render(codec)?);
                }
                element
            }
            Operation::GetConfig { source, filter } => {
                let mut element = Element::new("get-config").with_child(source.wrapped("source"));
                if let Some(filter) = filter {
                    element.push_child(filter.render(codec)?);
                }
                element
            }
            Operation::KillSession { session_id } => Element::new("kill-session")
                .with_child(Element::new("session-id").with_text(session_id.to_string())),
            Operation::Lock { target } => Element::new("lock").with_child(target.wrapped("target")),
            Operation::Unlock { target } => Element::new("unlock").with_child(target.wrapped("target")),
            Operation::Validate { source } => Element::new("validate").with_child(source.render(codec)?),
            Operation::Custom(entity) => xml::parse(&codec.encode(entity.as_ref())?)?,
            Operation::Raw(payload) => raw_body(payload, codec)?,
        };
        Ok(element)
    }
}

// The operation element of a raw payload. An `<rpc>` envelope is dropped
// since the session writes its own with a fresh message-id.
fn raw_body(payload: &Payload, codec: &dyn Codec) -> Result<Element> {
    let text = match payload {
        Payload::Encoded(raw) => raw.clone(),
        Payload::Entity(entity) => codec.encode(entity.as_ref())?,
    };
    let root = xml::parse(&text)?;
    if root.local_name() != "rpc" {
        return Ok(root);
    }
    let mut operations = root.elements();
    match (operations.next(), operations.next()) {
        (Some(only), None) => Ok(only.clone()),
        _ => Err(NetconfError::model(
            "rpc envelope must contain exactly one operation element",
        )),
    }
}

fn check_url(datastore: &Datastore) -> Result<()> {
    match datastore {
        Datastore::Url(url) if url.trim().is_empty() => {
            Err(NetconfError::invalid_rpc("url datastore has an empty location"))
        }
        _ => Ok(()),
    }
}

// Wire spelling of the serde-renamed option enums.
fn enum_text<T: Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(text)) => text,
        _ => String::new(),
    }
}
