//! Domain models for the API.

pub mod cart;
pub mod catalog;
pub mod company;
pub mod discount_code;
pub mod merchant;

pub use cart::{Cart, CartItem, CartWithItems};
pub use catalog::{CatalogVariant, VariantUpsert};
pub use company::{Company, CompanyUser};
pub use discount_code::{DiscountCode, NewDiscountCode};
pub use merchant::Merchant;
