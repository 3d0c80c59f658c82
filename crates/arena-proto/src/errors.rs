//! Frame validation errors.

use serde_json::json;

/// Why an incoming frame failed validation.
///
/// Every variant maps onto the error frame the server sends back before
/// tearing the connection down. `closed` is always `true` for these: they
/// are unrecoverable for the connection. Warnings with `closed = false`
/// (wrong frame for the session's current phase) are produced by the
/// dispatcher, not by the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    /// The frame was not a valid JSON document.
    #[error("One of the packages didn't contain a valid JSON.")]
    InvalidJson,

    /// The frame had no string `type` field.
    #[error("One of the packages didn't have a \"type\" field.")]
    TypeNotFound,

    /// The `type` value matches no known message.
    #[error("Cannot identify a package.")]
    UnknownType,

    /// A `join` frame violated the join schema.
    #[error("A \"JOIN\" was ill-formed.")]
    MalformedJoin,

    /// An `update` frame violated the update schema.
    #[error("A \"UPDATE\" was ill-formed.")]
    MalformedUpdate,

    /// A `leave` frame violated the leave schema.
    #[error("A \"LEAVE\" was ill-formed.")]
    MalformedLeave,
}

impl VerifyError {
    /// The error frame sent to the offending client.
    ///
    /// `closed: true` tells the peer the server closes the connection right
    /// after this frame.
    pub fn to_frame(self) -> String {
        json!({
            "type": "error",
            "closed": true,
            "message": self.to_string(),
        })
        .to_string()
    }
}
