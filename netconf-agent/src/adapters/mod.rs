pub mod backend;
pub mod events;
pub mod netconf;
pub mod registry;
