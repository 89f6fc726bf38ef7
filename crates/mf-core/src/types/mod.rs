//! Core data types for the market feed.
//!
//! Everything here is plain owned data: instruments are rebuilt from scratch
//! on every inbound batch and handed to listeners by reference.

pub mod enums;
pub mod instrument;

pub use enums::*;
pub use instrument::*;
