//! A synchronous client driver core for document databases that speak the
//! BDOC wire format: length-prefixed, type-tagged binary documents over TCP.
//!
//! The two central pieces are
//!
//! * the [`Connector`], a thread-affinity-aware connection coordinator that
//!   targets the current primary of a replicated cluster, discovers the
//!   primary on demand, fails over on "not master" responses, and pins one
//!   wire connection per thread for the duration of a *request* so that
//!   causally dependent operations stay ordered, and
//!
//! * the BDOC [`Decoder`], a streaming parser with a windowed read-ahead
//!   buffer that turns one wire document into a sequence of typed [`Event`]s,
//!   plus the convenience builder that assembles a [`Document`] tree from it.
//!
//! ```rust,no_run
//! use bdocconnect::{BdocResult, Connector, Document, Message, ServerAddress, WriteConcern};
//!
//! fn main() -> BdocResult<()> {
//!     let connector = Connector::new("localhost:27017".parse()?)?;
//!
//!     let mut doc = Document::new();
//!     doc.push("name", "green bottle");
//!     doc.push("count", 9_i32);
//!     let insert = Message::insert("inventory.items", &[doc])?;
//!     connector.say("inventory", &insert, &WriteConcern::ACKNOWLEDGED)?;
//!
//!     let mut filter = Document::new();
//!     filter.push("count", 9_i32);
//!     let query = Message::query("inventory.items", 0, 0, 10, &filter)?;
//!     let response = connector.call("inventory", "items", &query)?;
//!     println!("{:?}", response.documents());
//!     connector.close();
//!     Ok(())
//! }
//! ```

#![deny(missing_debug_implementations)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]

#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate log;
#[macro_use]
extern crate serde;

mod bdoc_error;
mod conn;
mod protocol;
mod types_impl;

pub use crate::bdoc_error::{BdocError, BdocResult, DecodeError};
pub use crate::conn::{
    Authenticator, Connector, Node, PoolOptions, PoolRegistry, Port, PortFactory, PortPool,
    PooledPort, ReplicaSetStatus, ServerAddress, WireFactory, WirePort, DEFAULT_PORT,
};
pub use crate::protocol::{
    BdocValue, BufferedInput, Decoder, Document, Event, Message, Response, ServerError, TypeId,
    WriteConcern, WriteResult, CMD_COLLECTION,
};

/// Value types that occur inside [`BdocValue`]s.
pub mod types {
    pub use crate::types_impl::{
        binary::{Binary, BinarySubtype},
        date_time::DateTime,
        object_id::ObjectId,
    };
}

/// Upper bound for the length field of string-like elements (String, Code,
/// Symbol). Longer length declarations are rejected by the decoder as corrupt.
pub const MAX_STRING_LENGTH: i32 = 3 * 1024 * 1024;

/// Number of redispatch attempts [`Connector::call`](crate::Connector::call)
/// makes after an I/O failure or a "not master" response.
pub const DEFAULT_RETRIES: u32 = 2;
