//! Tierline API library.
//!
//! B2B pricing, cart and checkout service sitting in front of Shopify. One
//! deployment serves many merchants; every request names its merchant via
//! the `X-Merchant-Id` header.
//!
//! # Layers
//!
//! - [`routes`] - axum handlers (JSON in, JSON out)
//! - [`services`] - pricing resolution, checkout reconciliation, carts,
//!   catalog sync and background jobs
//! - [`db`] - `PostgreSQL` repositories (schema `b2b`)
//! - [`shopify`] - Admin REST and Storefront GraphQL clients
//!
//! Rule evaluation itself lives in `tierline_core::pricing` and never touches
//! I/O.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod shopify;
pub mod state;
