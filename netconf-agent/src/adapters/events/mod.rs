pub mod idle;
pub mod unix;

pub use idle::IdleEventSource;
pub use unix::UnixEventSource;
