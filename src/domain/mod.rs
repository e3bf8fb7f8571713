//! Domain Layer
//!
//! Core business entity definitions

pub mod invitation_code;
pub mod provisioning;
pub mod user;

pub use invitation_code::*;
pub use provisioning::*;
pub use user::*;
