//! Tierline Core - Shared types and B2B pricing math.
//!
//! This crate provides the types used across all Tierline components:
//! - `api` - B2B pricing, cart and checkout service
//! - `cli` - Command-line tools for migrations and maintenance jobs
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no
//! database access, no HTTP clients. Rule selection and price computation
//! live here so they can be tested without a database.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, money and statuses
//! - [`pricing`] - Pricing rules, the resolver, and checkout reconciliation

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod pricing;
pub mod types;

pub use types::*;
