//! Local broadcast server library.
//!
//! A server is started with a password, admits peers that present it, fans
//! messages out to every admitted peer and stops on request. The lifecycle is
//! driven through [`ui::ControlFacade`], which the HTTP control API and the
//! server binary sit on top of.

// layers
pub mod domain;
pub mod infrastructure;
pub mod ui;
pub mod usecase;

pub mod config;
