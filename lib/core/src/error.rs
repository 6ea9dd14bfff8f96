//! Error handling foundation for gigdesk.
//!
//! Only the `Result` alias lives here. Each crate defines its own error enums
//! and returns them wrapped in a rootcause `Report` at layer boundaries.

use rootcause::Report;

/// A Result type alias using rootcause's Report for error handling.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;
