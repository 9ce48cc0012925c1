pub mod connection;
pub mod session;

pub use connection::{Connector, LineStream, TcpConnector};
pub use session::{
    ResilientSession, RetryPolicy, RetryState, ScopeFuture, SessionEvent, SessionState,
    ATTEMPTS_BEFORE_DELAY, ATTEMPT_DELAY_SECS,
};
