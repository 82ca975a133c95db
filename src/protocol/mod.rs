//! WebSocket protocol core (RFC 6455).

pub mod frame;
pub mod handshake;
pub mod mask;
pub mod opcode;
pub mod utf8;

pub use frame::Frame;
pub use handshake::{compute_accept_key, UpgradeRequest, UpgradeResponse, WS_GUID};
pub use mask::{apply_mask, random_mask};
pub use opcode::OpCode;
pub use utf8::Utf8Validator;
