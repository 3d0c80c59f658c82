//! Property-based tests for the frame codec.
//!
//! Verifies that serialization and strict validation are inverses for all
//! schema-valid messages, and that the strict checks never accept a frame
//! with a broken shape.

use arena_proto::{verify, ClientMessage, VerifyError};
use proptest::prelude::*;

/// Strategy for floats that survive a JSON round trip unchanged.
fn arbitrary_coordinate() -> impl Strategy<Value = f64> {
    -1.0e12..1.0e12f64
}

fn arbitrary_client_message() -> impl Strategy<Value = ClientMessage> {
    prop_oneof![
        (any::<u64>(), ".*", ".*").prop_map(|(id, nick, game)| ClientMessage::Join {
            id,
            nick,
            game,
        }),
        (any::<u64>(), arbitrary_coordinate(), arbitrary_coordinate(), arbitrary_coordinate())
            .prop_map(|(team_id, x, y, angle)| ClientMessage::Update {
                team_id,
                position: [x, y],
                angle,
            }),
        Just(ClientMessage::Leave),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Property: every schema-valid message survives serialize → verify.
    #[test]
    fn prop_serialize_verify_roundtrip(message in arbitrary_client_message()) {
        let raw = serde_json::to_string(&message).unwrap();
        let parsed = verify(&raw).unwrap();

        prop_assert_eq!(parsed, message);
    }

    /// Property: dropping any field from a serialized `join` fails validation.
    #[test]
    fn prop_join_missing_field_rejected(
        id in any::<u64>(),
        nick in ".*",
        game in ".*",
        dropped in prop::sample::select(vec!["id", "nick", "game"]),
    ) {
        let raw = serde_json::to_string(&ClientMessage::Join { id, nick, game }).unwrap();
        let mut value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        value.as_object_mut().unwrap().remove(dropped);

        prop_assert_eq!(
            verify(&value.to_string()),
            Err(VerifyError::MalformedJoin)
        );
    }

    /// Property: an extra field on any message fails validation.
    #[test]
    fn prop_extra_field_rejected(message in arbitrary_client_message()) {
        let raw = serde_json::to_string(&message).unwrap();
        let mut value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        value
            .as_object_mut()
            .unwrap()
            .insert("extra".to_owned(), serde_json::Value::Bool(true));

        let expected = match message {
            ClientMessage::Join { .. } => VerifyError::MalformedJoin,
            ClientMessage::Update { .. } => VerifyError::MalformedUpdate,
            ClientMessage::Leave => VerifyError::MalformedLeave,
        };
        prop_assert_eq!(verify(&value.to_string()), Err(expected));
    }

    /// Property: arbitrary text never panics the validator.
    #[test]
    fn prop_verify_never_panics(raw in ".*") {
        let _ = verify(&raw);
    }

    /// Property: an unknown `type` is always rejected as unidentifiable.
    #[test]
    fn prop_unknown_type_rejected(kind in "[a-z]{1,12}") {
        prop_assume!(kind != "join" && kind != "update" && kind != "leave");

        let raw = serde_json::json!({ "type": kind }).to_string();
        prop_assert_eq!(verify(&raw), Err(VerifyError::UnknownType));
    }
}
