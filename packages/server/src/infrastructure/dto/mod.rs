//! Data Transfer Objects for the control boundary.
//!
//! - `http`: JSON bodies of the control API
//! - `conversion`: domain -> DTO conversions

pub mod conversion;
pub mod http;
