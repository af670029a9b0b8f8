//! Immutable evaluation context.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use crate::attr::Attribute;
use crate::content::ContentStore;
use crate::domain::{DomainName, DomainSet};
use crate::errors::EvaluationError;
use crate::expr::Expression;
use crate::network::{Network, NetworkSet};
use crate::sets::StringSet;
use crate::types::Type;
use crate::value::AttributeValue;

/// Attribute bag a single request is evaluated against.
///
/// A context is immutable for the duration of an evaluation; any number of
/// evaluations may share one concurrently. Attributes are keyed by id and
/// type, so a request may carry the same id with two different types.
#[derive(Debug, Clone, Default)]
pub struct Context {
    attrs: HashMap<(String, Type), AttributeValue>,
    content: Option<Arc<ContentStore>>,
}

impl Context {
    /// Builds a context from named values.
    ///
    /// A later value for the same (id, type) pair replaces an earlier one.
    #[must_use]
    pub fn new<I, S>(attrs: I) -> Self
    where
        I: IntoIterator<Item = (S, AttributeValue)>,
        S: Into<String>,
    {
        let attrs = attrs
            .into_iter()
            .map(|(id, v)| ((id.into(), v.value_type()), v))
            .collect();

        Self {
            attrs,
            content: None,
        }
    }

    /// Builds a context with no attributes.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Attaches a named content store for selector lookups.
    #[must_use]
    pub fn with_content(mut self, content: Arc<ContentStore>) -> Self {
        self.content = Some(content);
        self
    }

    /// Number of attributes in the context.
    #[must_use]
    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    /// Whether the context has no attributes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    /// Looks up an attribute value.
    ///
    /// # Errors
    ///
    /// Returns [`EvaluationError::MissingAttribute`] when no value with
    /// the requested id and type is present.
    pub fn attribute(&self, attr: &Attribute) -> Result<&AttributeValue, EvaluationError> {
        self.attrs
            .get(&(attr.id().to_string(), attr.attr_type()))
            .ok_or_else(|| attr.missing_error())
    }

    pub(crate) fn content_store(&self) -> Option<&ContentStore> {
        self.content.as_deref()
    }

    /// Evaluates an expression and coerces the result to boolean.
    ///
    /// # Errors
    ///
    /// Propagates evaluation errors and type mismatches; the other typed
    /// helpers behave the same way for their types.
    pub fn calculate_boolean_expression(&self, e: &Expression) -> Result<bool, EvaluationError> {
        self.calculate(e, AttributeValue::boolean)
    }

    /// Evaluates an expression expecting a string result.
    pub fn calculate_string_expression(&self, e: &Expression) -> Result<String, EvaluationError> {
        self.calculate(e, |v| v.string().map(str::to_string))
    }

    /// Evaluates an expression expecting an integer result.
    pub fn calculate_integer_expression(&self, e: &Expression) -> Result<i64, EvaluationError> {
        self.calculate(e, AttributeValue::integer)
    }

    /// Evaluates an expression expecting a numeric result promoted to float.
    pub fn calculate_number_expression(&self, e: &Expression) -> Result<f64, EvaluationError> {
        self.calculate(e, AttributeValue::number)
    }

    /// Evaluates an expression expecting an address result.
    pub fn calculate_address_expression(&self, e: &Expression) -> Result<IpAddr, EvaluationError> {
        self.calculate(e, AttributeValue::address)
    }

    /// Evaluates an expression expecting a domain result.
    pub fn calculate_domain_expression(
        &self,
        e: &Expression,
    ) -> Result<DomainName, EvaluationError> {
        self.calculate(e, |v| v.domain().cloned())
    }

    /// Evaluates an expression expecting a network result.
    pub fn calculate_network_expression(&self, e: &Expression) -> Result<Network, EvaluationError> {
        self.calculate(e, |v| v.network().copied())
    }

    /// Evaluates an expression expecting a set-of-strings result.
    pub fn calculate_set_of_strings_expression(
        &self,
        e: &Expression,
    ) -> Result<StringSet, EvaluationError> {
        self.calculate(e, |v| v.set_of_strings().cloned())
    }

    /// Evaluates an expression expecting a set-of-domains result.
    pub fn calculate_set_of_domains_expression(
        &self,
        e: &Expression,
    ) -> Result<DomainSet, EvaluationError> {
        self.calculate(e, |v| v.set_of_domains().cloned())
    }

    /// Evaluates an expression expecting a set-of-networks result.
    pub fn calculate_set_of_networks_expression(
        &self,
        e: &Expression,
    ) -> Result<NetworkSet, EvaluationError> {
        self.calculate(e, |v| v.set_of_networks().cloned())
    }

    fn calculate<T>(
        &self,
        e: &Expression,
        coerce: impl FnOnce(&AttributeValue) -> Result<T, EvaluationError>,
    ) -> Result<T, EvaluationError> {
        let v = e.calculate(self)?;
        coerce(&v)
    }
}
