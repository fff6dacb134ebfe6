//! Core types for Tierline.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod id;
pub mod price;
pub mod status;

pub use id::*;
pub use price::{CurrencyCode, MONEY_SCALE, Price, round_money};
pub use status::*;
