//! Database models split into domain-specific modules.

pub mod availability;
pub mod booking;
pub mod common;
pub mod credit;
pub mod directory;
pub mod review;

pub use availability::*;
pub use booking::*;
pub use common::*;
pub use credit::*;
pub use directory::*;
pub use review::*;
