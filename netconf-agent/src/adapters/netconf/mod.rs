//! NETCONF protocol adapter: hello exchange, framing and the session the
//! event loop drives.

pub mod acceptor;
pub mod framing;
pub mod hello;
pub mod message;
pub mod session;
pub mod xml;

pub use acceptor::TransportAcceptor;
pub use framing::Framing;
pub use session::{FramedSession, SessionParams};
