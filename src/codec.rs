// src/codec.rs
// Codec adapter seam: typed model objects in, wire payloads out (and back).
//
// The schema layer owns the models; this crate only sees them through the
// `Entity` trait. `XmlCodec` is the reference adapter used by the binary and
// the tests.

use std::fmt;
use tracing::debug;

use crate::errors::{NetconfError, Result};
use crate::xml::{self, Element};

/// A typed, schema-derived object (configuration container or RPC).
pub trait Entity: fmt::Debug + Send + Sync {
    /// Top-level element name, e.g. "runner".
    fn yang_name(&self) -> &str;

    /// Whether this object models an RPC that can be sent as-is.
    fn is_rpc(&self) -> bool {
        false
    }

    fn to_element(&self) -> Element;

    /// Populate `self` from a decoded element. The receiver starts out as a
    /// clone of the caller's template.
    fn load_element(&mut self, element: &Element) -> std::result::Result<(), String>;
}

pub trait Codec: Send + Sync {
    fn encode(&self, entity: &dyn Entity) -> Result<String>;

    /// Decode `payload` into `target`. Returns `Ok(false)` when the payload
    /// holds no data for the target's root element.
    fn decode_into(&self, payload: &str, target: &mut dyn Entity) -> Result<bool>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct XmlCodec;

impl XmlCodec {
    pub fn new() -> Self {
        XmlCodec
    }
}

impl Codec for XmlCodec {
    fn encode(&self, entity: &dyn Entity) -> Result<String> {
        let element = entity.to_element();
        if element.local_name() != entity.yang_name() {
            return Err(NetconfError::model(format!(
                "entity '{}' encoded to mismatched root <{}>",
                entity.yang_name(),
                element.name
            )));
        }
        Ok(element.to_xml())
    }

    fn decode_into(&self, payload: &str, target: &mut dyn Entity) -> Result<bool> {
        let root = xml::parse(payload)?;
        let name = target.yang_name().to_string();
        let found = if root.local_name() == name {
            Some(&root)
        } else {
            root.child(&name)
        };
        match found {
            Some(element) => {
                target
                    .load_element(element)
                    .map_err(|e| NetconfError::model(format!("cannot decode <{}>: {}", name, e)))?;
                Ok(true)
            }
            None => {
                debug!("Payload carries no <{}> element; treating as absent", name);
                Ok(false)
            }
        }
    }
}
