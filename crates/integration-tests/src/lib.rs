//! Integration tests for Tierline.
//!
//! # Running Tests
//!
//! ```bash
//! # Pure cross-crate tests (no services needed)
//! cargo test -p tierline-integration-tests
//!
//! # Against a running API (database migrated and seeded)
//! TIERLINE_BASE_URL=http://127.0.0.1:3100 \
//! TIERLINE_TEST_MERCHANT_ID=<uuid> \
//! SHOPIFY_WEBHOOK_SECRET=<secret> \
//!     cargo test -p tierline-integration-tests -- --ignored
//! ```
//!
//! # Test Categories
//!
//! - `pricing_flow` - rule drafts through the resolver and reconciliation
//! - `catalog_assembly` - Shopify REST payloads into catalog rows
//! - `api_server` - HTTP surface of a running API (ignored by default)

use std::time::Duration;

/// Base URL of the API under test.
#[must_use]
pub fn base_url() -> String {
    std::env::var("TIERLINE_BASE_URL").unwrap_or_else(|_| "http://127.0.0.1:3100".to_string())
}

/// Merchant id seeded in the test database, if configured.
#[must_use]
pub fn merchant_id() -> Option<String> {
    std::env::var("TIERLINE_TEST_MERCHANT_ID").ok()
}

/// HTTP client with short timeouts for test runs.
///
/// # Panics
///
/// Panics if the TLS backend cannot be initialised.
#[must_use]
#[allow(clippy::expect_used)]
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .expect("Failed to build HTTP client")
}
