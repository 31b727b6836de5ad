//! Testing utilities
//!
//! Mock transport implementations for exercising the session without a broker.

pub mod mocks;

pub use mocks::*;
