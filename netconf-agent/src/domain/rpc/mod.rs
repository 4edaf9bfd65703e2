pub mod element;
pub mod operation;
pub mod reply;
pub mod subscription;

pub use element::{XmlAttribute, XmlElement};
pub use operation::{RpcOperation, RpcUnit};
pub use reply::{ErrorInfo, ErrorSeverity, ErrorTag, ErrorType, Reply, RpcError};
pub use subscription::{SubscriptionRequest, DEFAULT_STREAM};
