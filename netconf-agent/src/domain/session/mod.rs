pub mod aggregate;
pub mod events;
pub mod subscription;
pub mod value_object;

pub use aggregate::{AgentSession, SessionCounters, SessionSnapshot, SessionStatus};
pub use events::{SessionDomainEvent, SessionEventEnvelope};
pub use subscription::{SubscriptionGuard, SubscriptionSlot};
pub use value_object::{
    Capability, CapabilitySet, SessionId, BASE_1_0, BASE_1_1, INTERLEAVE_1_0, NOTIFICATION_1_0,
};
