//! # verdict-core
//!
//! Attribute-based access-control policy engine: the evaluation core of
//! the verdict decision service.
//!
//! The crate provides:
//!
//! - **Typed values and expressions**: a compact tagged value model and
//!   pure expression trees with build-time operand checking.
//! - **The policy tree**: rules, policies and policy sets combined by
//!   first-applicable-effect, deny-overrides and mapper algorithms,
//!   evaluated against an immutable request [`Context`].
//! - **Transactional storage**: tagged snapshots edited by
//!   copy-on-write transactions; committed snapshots never change.
//! - **The wire codec**: the little-endian request/response format and
//!   the length-prefixed stream framing shared by the daemon and the
//!   client.
//!
//! Evaluation is purely functional: contexts are immutable and policy
//! trees are read-only at evaluation time, so any number of evaluations
//! may run concurrently against one snapshot.
//!
//! ## Example
//!
//! ```rust
//! use verdict_core::prelude::*;
//!
//! let rule = Rule::new("allow-all", RuleEffect::Permit);
//! let policy = Policy::new("default", vec![rule], Combiner::FirstApplicableEffect);
//! let root = PolicySet::new("root", vec![policy.into()], Combiner::FirstApplicableEffect);
//!
//! let response = root.calculate(&Context::empty());
//! assert_eq!(response.effect, Effect::Permit);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod attr;
pub mod combiners;
pub mod content;
pub mod context;
pub mod domain;
pub mod errors;
pub mod expr;
pub mod frame;
pub mod network;
pub mod policy;
pub mod policy_set;
pub mod response;
pub mod rule;
pub mod sets;
pub mod storage;
pub mod target;
pub mod types;
pub mod value;
pub mod wire;

/// Prelude for building and evaluating policies.
pub mod prelude {
    pub use crate::attr::{Attribute, AttributeAssignment, ObligationExpr};
    pub use crate::combiners::{Combiner, MapperParams};
    pub use crate::content::{ContentItem, ContentNode, ContentStore, Selector, SelectorCache};
    pub use crate::context::Context;
    pub use crate::domain::{DomainName, DomainSet};
    pub use crate::expr::Expression;
    pub use crate::network::{Network, NetworkSet};
    pub use crate::policy::Policy;
    pub use crate::policy_set::{Evaluable, PolicyItem, PolicySet};
    pub use crate::response::{Effect, Response, RuleEffect};
    pub use crate::rule::Rule;
    pub use crate::sets::StringSet;
    pub use crate::storage::{PolicyStorage, PolicyUpdate, UpdateOp};
    pub use crate::target::{AllOf, AnyOf, Match, Target};
    pub use crate::types::Type;
    pub use crate::value::AttributeValue;
}

pub use attr::{Attribute, AttributeAssignment};
pub use context::Context;
pub use policy_set::Evaluable;
pub use response::{Effect, Response};
pub use storage::PolicyStorage;
