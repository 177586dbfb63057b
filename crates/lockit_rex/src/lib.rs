//! `lockit_rex` v1:
//! Named-group regex capture kernel.
//!
//! - `capture` : capture helpers and compiled pattern handle
//! - `spec`    : error types

pub mod capture;
pub mod spec;

pub use capture::{RexPattern, capture_all, derive_first_captures, is_format};
pub use spec::RexError;
