//! Fuzz target for frame validation
//!
//! This fuzzer feeds arbitrary text into the strict frame validator to find:
//! - Parser crashes or panics
//! - Schema checks that accept malformed frames
//! - Pathological inputs that hang validation
//!
//! The fuzzer should NEVER panic. All invalid inputs should return an error.

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Validation must never panic, only return Err for invalid frames
    let _ = arena_proto::verify(data);
});
