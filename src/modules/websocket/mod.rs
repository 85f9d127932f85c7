pub mod handler;
pub mod inflight;
pub mod message;
pub mod session;
