//! Core domain types and errors for the lead router.

pub mod customer;
pub mod distribution;
pub mod error;
pub mod lead;
pub mod region;
pub mod status;

pub use customer::*;
pub use distribution::*;
pub use error::{CollaboratorErrorCode, DbErrorCode, Error, Result};
pub use lead::*;
pub use region::*;
pub use status::*;
