//! Shared helpers
//!
//! Path-based access to dynamic value trees and argv handling for
//! environment-driven invocation.

pub mod argv;
pub mod maputil;

pub use argv::*;
pub use maputil::*;
