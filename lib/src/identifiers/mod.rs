//! Identifiers used to address participants and their connections.
pub mod member;

pub use member::MemberId;
