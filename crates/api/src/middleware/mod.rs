//! HTTP middleware and extractors.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layers (capture errors, transactions)
//! 2. `TraceLayer` (request span with method, uri, status, latency)
//! 3. Request ID (propagate or generate `x-request-id`)
//!
//! Tenant resolution is an extractor rather than a layer so that health
//! checks and Shopify webhooks stay outside it.

pub mod request_id;
pub mod tenant;

pub use request_id::{REQUEST_ID_HEADER, request_id_middleware};
pub use tenant::{COMPANY_HEADER, MERCHANT_HEADER, Tenant};
