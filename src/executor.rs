// src/executor.rs
// RPC executor: validate, encode, exchange, classify, map to the caller contract.

use tracing::{debug, info, warn};

use crate::codec::{Codec, Entity, XmlCodec};
use crate::errors::{NetconfError, ProtocolFault, Result};
use crate::operation::{Operation, OperationKind, ReplyShape};
use crate::reply::{classify, RpcReply};
use crate::session::{Exchange, Session};
use crate::xml::{self, Element};

/// Runs operation descriptors against a session. Holds no session state of its
/// own, so one executor can serve any number of sessions.
#[derive(Debug, Clone, Default)]
pub struct Executor<C: Codec = XmlCodec> {
    codec: C,
}

impl Executor<XmlCodec> {
    pub fn new() -> Self {
        Executor { codec: XmlCodec::new() }
    }
}

impl<C: Codec> Executor<C> {
    pub fn with_codec(codec: C) -> Self {
        Executor { codec }
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Execute `operation` and hand back any reply data as an element tree.
    ///
    /// `Ok(None)` is an acknowledgement, or a data query that matched nothing.
    pub async fn execute(&self, session: &Session, operation: &Operation) -> Result<Option<Element>> {
        match self.run(session, operation).await? {
            Some(payload) => Ok(Some(xml::parse(&payload)?)),
            None => Ok(None),
        }
    }

    /// Execute `operation` and decode its reply data into a copy of `template`.
    ///
    /// `Ok(None)` means the device holds no data for the template's root.
    pub async fn execute_into<T>(&self, session: &Session, operation: &Operation, template: &T) -> Result<Option<T>>
    where
        T: Entity + Clone,
    {
        operation.validate_fields()?;
        if operation.reply_shape() == ReplyShape::None {
            return Err(NetconfError::invalid_rpc(format!(
                "{} returns no data to decode into '{}'",
                operation.kind(),
                template.yang_name()
            )));
        }
        let Some(payload) = self.run(session, operation).await? else {
            return Ok(None);
        };
        let mut decoded = template.clone();
        if self.codec.decode_into(&payload, &mut decoded)? {
            Ok(Some(decoded))
        } else {
            Ok(None)
        }
    }

    async fn run(&self, session: &Session, operation: &Operation) -> Result<Option<String>> {
        let kind = operation.kind();
        operation.validate_fields()?;
        let body = operation.render(&self.codec)?;

        let mut exchange = session.begin().await?;
        debug!("Executing {} on session {}", kind, session.session_id());
        let reply = exchange.rpc(body).await?;

        match classify(&reply) {
            RpcReply::ProtocolError(errors) => Err(reject(&mut exchange, operation, errors)),
            RpcReply::Ack => {
                settle(&mut exchange, operation).await;
                Ok(None)
            }
            RpcReply::Data(payload) => {
                if operation.reply_shape() == ReplyShape::None {
                    warn!("{} reply carried data where only <ok/> was expected", kind);
                    return Err(NetconfError::unexpected_reply(
                        kind,
                        format!("{} returned data but acknowledges only", kind),
                    ));
                }
                settle(&mut exchange, operation).await;
                Ok(Some(payload))
            }
        }
    }
}

fn reject(exchange: &mut Exchange<'_>, operation: &Operation, mut errors: Vec<crate::errors::ErrorInfo>) -> NetconfError {
    let kind = operation.kind();
    let (fault, diagnosis) = match operation.lock_target() {
        Some(target) => {
            for info in errors.iter_mut().filter(|info| info.target.is_none()) {
                info.target = Some(target.name());
            }
            (ProtocolFault::LockDenied, Some(exchange.locks().diagnose(kind, target)))
        }
        None => (
            errors
                .first()
                .map(|info| ProtocolFault::from_tag(&info.tag))
                .unwrap_or(ProtocolFault::OperationFailed),
            None,
        ),
    };
    warn!(
        "{} rejected by device with {} error(s){}",
        kind,
        errors.len(),
        diagnosis.as_deref().map(|d| format!(": {}", d)).unwrap_or_default()
    );
    NetconfError::Protocol {
        operation: kind,
        fault,
        errors,
        diagnosis,
    }
}

// Local bookkeeping after a successful exchange.
async fn settle(exchange: &mut Exchange<'_>, operation: &Operation) {
    match (operation.kind(), operation.lock_target()) {
        (OperationKind::Lock, Some(target)) => {
            exchange.locks().record_lock(target);
            info!("Locked {}", target);
        }
        (OperationKind::Unlock, Some(target)) => {
            exchange.locks().record_unlock(target);
            info!("Unlocked {}", target);
        }
        (OperationKind::CloseSession, _) => exchange.mark_closed().await,
        _ => {}
    }
}
