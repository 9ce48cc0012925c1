pub mod listen;
pub mod send;

pub use listen::ListenFlow;
pub use send::{authorise, register, submit_message, Login, SendFlow, SendReport, SendRequest};
