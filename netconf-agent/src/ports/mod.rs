pub mod backend;
pub mod events;
pub mod registry;
pub mod session;

pub use backend::{BackendConnection, BackendConnector, BackendError, SessionInfo};
pub use events::{EventRecord, EventSource, EventSourceError, EventStream};
pub use registry::SessionRegistry;
pub use session::{ProtocolSession, Readiness, Received, SessionAcceptor, SessionError};
