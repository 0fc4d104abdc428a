//! The policy decision engine: data model, glob matching, the condition
//! sub-language, and the deny-overrides policy evaluator. This crate has no
//! I/O — everything here is pure, synchronous, and non-suspending: parsing,
//! condition evaluation, and glob matching are all CPU-only work.

pub mod condition;
pub mod context;
pub mod glob;
pub mod model;
pub mod policy;

pub use condition::evaluate as evaluate_condition;
pub use context::RequestContext;
pub use model::{ActionResourceSet, Condition, ConditionParams, Effect, Policy, Role, Statement};
pub use policy::evaluate_roles;
