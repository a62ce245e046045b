pub mod shareable;
pub mod event;
pub mod poller;
