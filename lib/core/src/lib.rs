//! Core types shared across the gigdesk workspace.
//!
//! This crate holds the identifiers that cross crate boundaries and the
//! `Result` alias used with rootcause reports.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{ParseIdError, SessionId, UserId};
