//! Control channel message types.
//!
//! Defines the JSON frame format exchanged with the relay server:
//! - [`ControlMessage`] - closed set of control directives and reports
//! - [`ClientInfo`] - identity sent once per session in the report
//!
//! Payloads travel base64 encoded inside `{"type", "data"}` frames.

mod messages;

pub use messages::*;
