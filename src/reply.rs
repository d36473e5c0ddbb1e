// src/reply.rs
// Classification of `<rpc-reply>` bodies into ack, data or device errors.

use crate::errors::{ErrorInfo, ErrorTag, ErrorType, Severity};
use crate::xml::Element;

/// Exactly one outcome per reply. Any `<rpc-error>` wins over `<ok/>` or
/// `<data>` present in the same reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcReply {
    Ack,
    Data(String),
    ProtocolError(Vec<ErrorInfo>),
}

pub fn classify(reply: &Element) -> RpcReply {
    let errors: Vec<ErrorInfo> = reply.children_named("rpc-error").map(parse_rpc_error).collect();
    if !errors.is_empty() {
        return RpcReply::ProtocolError(errors);
    }

    if reply.child("ok").is_some() {
        return RpcReply::Ack;
    }

    if let Some(data) = reply.child("data") {
        // An empty <data/> means nothing matched: no data, not an error.
        return if data.is_empty() {
            RpcReply::Ack
        } else {
            RpcReply::Data(data.to_xml())
        };
    }

    if reply.is_empty() {
        return RpcReply::Ack;
    }

    // RPC output placed directly under rpc-reply (model-defined RPCs).
    let mut data = Element::new("data");
    data.children = reply.children.clone();
    RpcReply::Data(data.to_xml())
}

fn parse_rpc_error(error: &Element) -> ErrorInfo {
    let tag = error
        .child_text("error-tag")
        .map(|raw| ErrorTag::parse(&raw))
        .unwrap_or(ErrorTag::OperationFailed);
    let message = error
        .child_text("error-message")
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| tag.to_string());
    let severity = match error.child_text("error-severity").as_deref() {
        Some("warning") => Severity::Warning,
        _ => Severity::Error,
    };

    ErrorInfo {
        error_type: error
            .child_text("error-type")
            .map(|raw| ErrorType::parse(&raw))
            .unwrap_or_default(),
        severity,
        message,
        path: error.child_text("error-path").filter(|p| !p.is_empty()),
        target: None,
        bad_element: error
            .child("error-info")
            .and_then(|info| info.child_text("bad-element")),
        tag,
    }
}
