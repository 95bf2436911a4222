//! Core primitives shared by the `beach-surf` frame streaming service.
//!
//! The server and any browser/CLI harness agree on message shapes through
//! this crate, so it stays free of runtime dependencies.

pub mod buttons;
pub mod message;

pub use buttons::{button_code, button_codes};
pub use message::{ClientMessage, ControlMessage, ServerMessage, StatusCode};
