// src/lib.rs
// NETCONF client execution core: operation descriptors, a serialized session
// transport, reply classification and a fixed error taxonomy.

pub mod codec;
pub mod config;
pub mod connector;
pub mod datastore;
pub mod devices;
pub mod errors;
pub mod executor;
pub mod lock_tracker;
pub mod operation;
pub mod reply;
pub mod session;
pub mod transport;
pub mod xml;

pub use codec::{Codec, Entity, XmlCodec};
pub use datastore::Datastore;
pub use errors::{ErrorInfo, ErrorKind, ErrorTag, NetconfError, ProtocolFault, Result};
pub use executor::Executor;
pub use operation::{ConfigSource, Filter, Operation, OperationKind, Payload};
pub use session::{Session, SessionOptions, SessionState};
