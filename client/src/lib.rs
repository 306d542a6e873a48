//! A participant of a live session, speaking to the relay over a websocket.

pub mod error;
pub mod participant;
#[cfg(test)]
mod tests;

pub use error::ClientError;
pub use participant::{Notice, Participant};
