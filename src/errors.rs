// src/errors.rs
// Error taxonomy for the execution core: every failure surfaced by `execute`
// is one of four kinds, each carrying the ErrorInfo records behind it.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::operation::OperationKind;

/// Fieldless view of a `NetconfError` for callers that branch on category.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    InvalidRpc,
    ModelError,
    ProtocolError,
    TransportFailure,
    Config,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::InvalidRpc => "invalid-rpc",
            ErrorKind::ModelError => "model-error",
            ErrorKind::ProtocolError => "protocol-error",
            ErrorKind::TransportFailure => "transport-failure",
            ErrorKind::Config => "config",
        };
        f.write_str(name)
    }
}

// RFC 6241 Appendix A error-tags, plus the tags this client assigns to
// locally detected failures.
// Serialized as the bare wire tag, so unknown vendor tags look like known ones.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(into = "String", from = "String")]
pub enum ErrorTag {
    InUse,
    InvalidValue,
    TooBig,
    MissingAttribute,
    BadAttribute,
    UnknownAttribute,
    MissingElement,
    BadElement,
    UnknownElement,
    UnknownNamespace,
    AccessDenied,
    LockDenied,
    ResourceDenied,
    RollbackFailed,
    DataExists,
    DataMissing,
    OperationNotSupported,
    OperationFailed,
    PartialOperation,
    MalformedMessage,
    InvalidTarget,
    // Local tags
    InvalidRpc,
    TransportFailure,
    ModelError,
    UnexpectedReply,
    Other(String),
}

impl ErrorTag {
    pub fn parse(tag: &str) -> Self {
        match tag.trim() {
            "in-use" => ErrorTag::InUse,
            "invalid-value" => ErrorTag::InvalidValue,
            "too-big" => ErrorTag::TooBig,
            "missing-attribute" => ErrorTag::MissingAttribute,
            "bad-attribute" => ErrorTag::BadAttribute,
            "unknown-attribute" => ErrorTag::UnknownAttribute,
            "missing-element" => ErrorTag::MissingElement,
            "bad-element" => ErrorTag::BadElement,
            "unknown-element" => ErrorTag::UnknownElement,
            "unknown-namespace" => ErrorTag::UnknownNamespace,
            "access-denied" => ErrorTag::AccessDenied,
            "lock-denied" => ErrorTag::LockDenied,
            "resource-denied" => ErrorTag::ResourceDenied,
            "rollback-failed" => ErrorTag::RollbackFailed,
            "data-exists" => ErrorTag::DataExists,
            "data-missing" => ErrorTag::DataMissing,
            "operation-not-supported" => ErrorTag::OperationNotSupported,
            "operation-failed" => ErrorTag::OperationFailed,
            "partial-operation" => ErrorTag::PartialOperation,
            "malformed-message" => ErrorTag::MalformedMessage,
            "invalid-target" => ErrorTag::InvalidTarget,
            "invalid-rpc" => ErrorTag::InvalidRpc,
            "transport-failure" => ErrorTag::TransportFailure,
            "model-error" => ErrorTag::ModelError,
            "unexpected-reply" => ErrorTag::UnexpectedReply,
            other => ErrorTag::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ErrorTag::InUse => "in-use",
            ErrorTag::InvalidValue => "invalid-value",
            ErrorTag::TooBig => "too-big",
            ErrorTag::MissingAttribute => "missing-attribute",
            ErrorTag::BadAttribute => "bad-attribute",
            ErrorTag::UnknownAttribute => "unknown-attribute",
            ErrorTag::MissingElement => "missing-element",
            ErrorTag::BadElement => "bad-element",
            ErrorTag::UnknownElement => "unknown-element",
            ErrorTag::UnknownNamespace => "unknown-namespace",
            ErrorTag::AccessDenied => "access-denied",
            ErrorTag::LockDenied => "lock-denied",
            ErrorTag::ResourceDenied => "resource-denied",
            ErrorTag::RollbackFailed => "rollback-failed",
            ErrorTag::DataExists => "data-exists",
            ErrorTag::DataMissing => "data-missing",
            ErrorTag::OperationNotSupported => "operation-not-supported",
            ErrorTag::OperationFailed => "operation-failed",
            ErrorTag::PartialOperation => "partial-operation",
            ErrorTag::MalformedMessage => "malformed-message",
            ErrorTag::InvalidTarget => "invalid-target",
            ErrorTag::InvalidRpc => "invalid-rpc",
            ErrorTag::TransportFailure => "transport-failure",
            ErrorTag::ModelError => "model-error",
            ErrorTag::UnexpectedReply => "unexpected-reply",
            ErrorTag::Other(tag) => tag,
        }
    }
}

impl From<String> for ErrorTag {
    fn from(raw: String) -> Self {
        ErrorTag::parse(&raw)
    }
}

impl From<ErrorTag> for String {
    fn from(tag: ErrorTag) -> Self {
        match tag {
            ErrorTag::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for ErrorTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ErrorType {
    Transport,
    Rpc,
    Protocol,
    #[default]
    Application,
}

impl ErrorType {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "transport" => ErrorType::Transport,
            "rpc" => ErrorType::Rpc,
            "protocol" => ErrorType::Protocol,
            _ => ErrorType::Application,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Error,
    Warning,
}

/// One device-reported or locally detected failure record.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub tag: ErrorTag,
    #[serde(default)]
    pub error_type: ErrorType,
    #[serde(default)]
    pub severity: Severity,
    pub message: String,
    pub path: Option<String>,
    pub target: Option<String>, // Datastore or element the failure refers to
    pub bad_element: Option<String>,
}

impl ErrorInfo {
    pub fn new(tag: ErrorTag, message: impl Into<String>) -> Self {
        ErrorInfo {
            tag,
            error_type: ErrorType::Application,
            severity: Severity::Error,
            message: message.into(),
            path: None,
            target: None,
            bad_element: None,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.tag, self.message)?;
        if let Some(target) = &self.target {
            write!(f, " (target: {})", target)?;
        }
        if let Some(path) = &self.path {
            write!(f, " (path: {})", path)?;
        }
        Ok(())
    }
}

/// Class of a device-side rejection, used to tell lock conflicts apart from
/// other refusals without matching on message text.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ProtocolFault {
    LockDenied,
    InUse,
    AccessDenied,
    InvalidTarget,
    OperationFailed,
    UnexpectedReply,
    Other,
}

impl ProtocolFault {
    pub fn from_tag(tag: &ErrorTag) -> Self {
        match tag {
            ErrorTag::LockDenied => ProtocolFault::LockDenied,
            ErrorTag::InUse => ProtocolFault::InUse,
            ErrorTag::AccessDenied => ProtocolFault::AccessDenied,
            ErrorTag::InvalidTarget => ProtocolFault::InvalidTarget,
            ErrorTag::OperationFailed => ProtocolFault::OperationFailed,
            ErrorTag::UnexpectedReply => ProtocolFault::UnexpectedReply,
            _ => ProtocolFault::Other,
        }
    }
}

fn join_infos(errors: &[ErrorInfo]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Error, Debug)]
pub enum NetconfError {
    #[error("invalid rpc: {}", join_infos(.errors))]
    InvalidRpc { errors: Vec<ErrorInfo> },

    #[error("model error: {}", join_infos(.errors))]
    Model { errors: Vec<ErrorInfo> },

    #[error("{operation} rejected by device ({fault:?}): {}", join_infos(.errors))]
    Protocol {
        operation: OperationKind,
        fault: ProtocolFault,
        errors: Vec<ErrorInfo>,
        diagnosis: Option<String>, // Local lock-tracker view, when relevant
    },

    #[error("transport failure: {}", join_infos(.errors))]
    Transport { errors: Vec<ErrorInfo> },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl NetconfError {
    pub fn invalid_rpc(message: impl Into<String>) -> Self {
        NetconfError::InvalidRpc {
            errors: vec![ErrorInfo::new(ErrorTag::InvalidRpc, message)],
        }
    }

    pub fn model(message: impl Into<String>) -> Self {
        NetconfError::Model {
            errors: vec![ErrorInfo::new(ErrorTag::ModelError, message)],
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        let mut info = ErrorInfo::new(ErrorTag::TransportFailure, message);
        info.error_type = ErrorType::Transport;
        NetconfError::Transport { errors: vec![info] }
    }

    /// A device reply that violates the exchange contract, e.g. data where
    /// only an acknowledgement was expected.
    pub fn unexpected_reply(operation: OperationKind, message: impl Into<String>) -> Self {
        let mut info = ErrorInfo::new(ErrorTag::UnexpectedReply, message);
        info.error_type = ErrorType::Protocol;
        NetconfError::Protocol {
            operation,
            fault: ProtocolFault::UnexpectedReply,
            errors: vec![info],
            diagnosis: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            NetconfError::InvalidRpc { .. } => ErrorKind::InvalidRpc,
            NetconfError::Model { .. } => ErrorKind::ModelError,
            NetconfError::Protocol { .. } => ErrorKind::ProtocolError,
            NetconfError::Transport { .. } => ErrorKind::TransportFailure,
            NetconfError::Config(_) => ErrorKind::Config,
        }
    }

    pub fn errors(&self) -> &[ErrorInfo] {
        match self {
            NetconfError::InvalidRpc { errors }
            | NetconfError::Model { errors }
            | NetconfError::Protocol { errors, .. }
            | NetconfError::Transport { errors } => errors,
            NetconfError::Config(_) => &[],
        }
    }

    pub fn fault(&self) -> Option<ProtocolFault> {
        match self {
            NetconfError::Protocol { fault, .. } => Some(*fault),
            _ => None,
        }
    }

    pub fn is_lock_denied(&self) -> bool {
        self.fault() == Some(ProtocolFault::LockDenied)
    }

    /// Only a lost or stuck transport is worth retrying, and then only on a
    /// fresh session.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::TransportFailure
    }
}

impl From<crate::xml::XmlError> for NetconfError {
    fn from(err: crate::xml::XmlError) -> Self {
        NetconfError::model(format!("malformed XML payload: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, NetconfError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_round_trip_through_their_wire_names() {
        for raw in ["lock-denied", "operation-failed", "invalid-target", "access-denied"] {
            assert_eq!(ErrorTag::parse(raw).as_str(), raw);
        }
        assert_eq!(
            ErrorTag::parse("vendor-specific"),
            ErrorTag::Other("vendor-specific".to_string())
        );
    }

    #[test]
    fn kinds_are_distinguishable_without_message_text() {
        assert_eq!(NetconfError::invalid_rpc("x").kind(), ErrorKind::InvalidRpc);
        assert_eq!(NetconfError::model("x").kind(), ErrorKind::ModelError);
        assert_eq!(NetconfError::transport("x").kind(), ErrorKind::TransportFailure);
        assert!(NetconfError::transport("x").is_retryable());
        assert!(!NetconfError::invalid_rpc("x").is_retryable());
    }

    #[test]
    fn display_includes_every_record() {
        let err = NetconfError::Protocol {
            operation: OperationKind::Unlock,
            fault: ProtocolFault::LockDenied,
            errors: vec![
                ErrorInfo::new(ErrorTag::OperationFailed, "not locked").with_target("running"),
                ErrorInfo::new(ErrorTag::LockDenied, "held elsewhere"),
            ],
            diagnosis: None,
        };
        let text = err.to_string();
        assert!(text.contains("unlock"));
        assert!(text.contains("not locked (target: running)"));
        assert!(text.contains("held elsewhere"));
        assert!(err.is_lock_denied());
    }

    #[test]
    fn error_info_serializes_with_kebab_case_tags() {
        let info = ErrorInfo::new(ErrorTag::LockDenied, "busy");
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["tag"], "lock-denied");
        assert_eq!(json["severity"], "error");
    }

    #[test]
    fn vendor_tags_serialize_as_bare_strings() {
        let info = ErrorInfo::new(ErrorTag::parse("vendor-busy"), "later");
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["tag"], "vendor-busy");

        let back: ErrorInfo = serde_json::from_value(json).unwrap();
        assert_eq!(back.tag, ErrorTag::Other("vendor-busy".to_string()));
        let known: ErrorTag = serde_json::from_str("\"in-use\"").unwrap();
        assert_eq!(known, ErrorTag::InUse);
    }
}
