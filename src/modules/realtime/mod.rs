pub mod events;
pub mod hub;
pub mod listener;
pub mod store;
