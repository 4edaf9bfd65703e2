pub mod unix;
pub mod wire;

pub use unix::{UnixBackendConnection, UnixBackendConnector};
pub use wire::{BackendRequest, BackendResponse};
