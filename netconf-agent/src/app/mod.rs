pub mod bootstrap;
pub mod dispatcher;
pub mod event_loop;
pub mod identity;
pub mod journal;
pub mod notification;
pub mod privilege;
pub mod shutdown;

#[cfg(test)]
pub(crate) mod test_support;
