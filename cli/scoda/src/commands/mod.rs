//! CLI command implementations.

pub mod hub;
pub mod inspect;
pub mod list;
pub mod pack;
pub mod resolve;
pub mod verify;
