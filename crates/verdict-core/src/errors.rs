//! Evaluation error kinds.
//!
//! Evaluation errors never escape `calculate`: combining algorithms fold
//! them into indeterminate responses, binding the id of each enclosing
//! rule, policy and policy set on the way up. The rendered chain reads
//! outer to inner, e.g. `policy set "root">policy "p">rule "r">missing
//! attribute "x" of type "String"`.

use std::fmt;

use thiserror::Error;

use crate::types::Type;

/// Error produced while evaluating an expression against a context.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum EvaluationError {
    /// The context has no attribute with the requested id and type.
    #[error("missing attribute \"{id}\" of type \"{t}\"")]
    MissingAttribute {
        /// Requested attribute id.
        id: String,
        /// Requested attribute type.
        t: Type,
    },

    /// A value of one type was used where another type was required.
    #[error("expected {expected} value but got {actual}")]
    AttributeValueType {
        /// The type the operation required.
        expected: Type,
        /// The type actually supplied.
        actual: Type,
    },

    /// A content lookup found no entry for the computed key.
    ///
    /// This is the missing-value class: mapper combining algorithms route
    /// it to their default entry when one is bound.
    #[error("missing value for key \"{key}\" in content \"{content}\"")]
    MissingContentValue {
        /// Content bundle id.
        content: String,
        /// The key that was not found.
        key: String,
    },

    /// The context carries no content bundle with the given id.
    #[error("missing content \"{id}\"")]
    MissingContent {
        /// Content bundle id.
        id: String,
    },

    /// A content node had the wrong shape or leaf type for the selector.
    #[error("invalid content item in \"{content}\": expected {expected}")]
    InvalidContentItem {
        /// Content bundle id.
        content: String,
        /// Description of what the selector expected at this level.
        expected: String,
    },

    /// Division by zero in an arithmetic expression.
    #[error("division by zero")]
    DivideByZero,

    /// A mapper argument evaluated to a type that cannot name children.
    #[error("mapper argument must be a String, Set of Strings or List of Strings but got {t}")]
    MapperArgumentType {
        /// The offending argument type.
        t: Type,
    },

    /// An error bound with the id of an enclosing evaluable or argument.
    #[error("{id}>{source}")]
    Bound {
        /// Description of the binding scope.
        id: String,
        /// The underlying error.
        source: Box<EvaluationError>,
    },

    /// Several child errors accumulated by a combining algorithm.
    #[error("multiple errors: {0}")]
    Multi(MultiError),
}

impl EvaluationError {
    /// Wraps the error with the description of an enclosing scope.
    #[must_use]
    pub fn bind(self, id: impl Into<String>) -> Self {
        Self::Bound {
            id: id.into(),
            source: Box::new(self),
        }
    }

    /// Whether this is a missing-value class error, unwrapping bindings.
    ///
    /// Mapper combining algorithms evaluate their default entry instead of
    /// failing when the argument fails with a missing-value error.
    #[must_use]
    pub fn is_missing_value(&self) -> bool {
        match self {
            Self::MissingContentValue { .. } => true,
            Self::Bound { source, .. } => source.is_missing_value(),
            _ => false,
        }
    }

    /// Folds a list of errors into one, preserving declaration order.
    ///
    /// Returns `None` for an empty list and the sole error unchanged for a
    /// single-element list.
    #[must_use]
    pub fn from_list(mut errs: Vec<EvaluationError>) -> Option<Self> {
        match errs.len() {
            0 => None,
            1 => errs.pop(),
            _ => Some(Self::Multi(MultiError(errs))),
        }
    }
}

/// Ordered collection of evaluation errors rendered as one status.
#[derive(Debug, Clone)]
pub struct MultiError(
    /// Child errors in declaration order.
    pub Vec<EvaluationError>,
);

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{err}")?;
        }
        f.write_str("]")
    }
}

/// Error raised while building an expression tree.
///
/// Operand types are checked when expressions are constructed so that
/// evaluation never dispatches on an unsupported type combination.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum ExprBuildError {
    /// No overload of the operation exists for the operand type pair.
    #[error("\"{op}\" is not defined for {first} and {second}")]
    InvalidCombination {
        /// Operation name.
        op: &'static str,
        /// Result type of the first operand.
        first: Type,
        /// Result type of the second operand.
        second: Type,
    },

    /// A single operand has an unsupported result type.
    #[error("\"{op}\" expects {expected} argument but got {actual}")]
    InvalidArgument {
        /// Operation name.
        op: &'static str,
        /// Description of the accepted types.
        expected: &'static str,
        /// Result type of the offending operand.
        actual: Type,
    },
}
