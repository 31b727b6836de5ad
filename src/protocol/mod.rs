//! Wire formats for the sensor feed
//!
//! Reading payload decoding and topic filter matching.

pub mod reading;
pub mod topics;

pub use reading::*;
pub use topics::*;
