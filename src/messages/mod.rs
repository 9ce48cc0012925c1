pub mod types;
pub mod wire;

pub use types::{Authorisation, Credentials};
pub use wire::{
    // Line framing
    LineCodec,
    WireConfig,
    WireProtocolError,

    // Wire protocol constants
    DEFAULT_MAX_LINE_LENGTH,
    LINE_TERMINATOR,
    MESSAGE_TERMINATOR,
};
