//! B2B pricing: rule model, effective-rule resolution and checkout
//! reconciliation arithmetic.

pub mod reconcile;
pub mod resolver;
pub mod rule;

pub use reconcile::{ReconciledLine, Reconciliation, reconcile};
pub use resolver::{
    CompanyContext, LineRequest, PriceResult, PricingContext, PricingResolver, VariantFacts,
};
pub use rule::{
    DiscountType, PricingRule, QtyBreak, RuleDiscount, RuleDraft, RuleScope, RuleTarget,
    RuleValidationError, ScopeType, TargetType,
};
