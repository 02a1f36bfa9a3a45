//! Core types for weft.

pub mod message;
pub mod stream;

pub use message::*;
pub use stream::*;
