//! Wire protocol for the arena relay.
//!
//! Every websocket frame carries exactly one JSON document. Clients send
//! `join`, `update` and `leave` requests; the server answers with join
//! results, state broadcasts, warnings and error frames. This crate holds the
//! wire types and the strict validation entry point ([`verify`]) shared by the
//! server and test clients.
//!
//! Validation is deliberately stricter than a derived `Deserialize`: exact
//! field counts, exact JSON number kinds, no defaulting of missing fields. A
//! frame that fails validation is never coerced into a usable message - the
//! caller gets a [`VerifyError`] describing the error frame to send back.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod errors;
mod message;
mod player;

pub use errors::VerifyError;
pub use message::{
    join_full, join_success, update_broadcast, verify, warning_unidentified, ClientMessage,
};
pub use player::{Player, Snapshot, DEFAULT_HEALTH};
