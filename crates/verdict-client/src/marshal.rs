//! Typed request building and response mapping.

use bytes::Bytes;
use verdict_core::attr::AttributeAssignment;
use verdict_core::value::AttributeValue;
use verdict_core::wire;

use crate::errors::ClientError;

/// Builder for a decision request.
///
/// Attributes are sent in the order they were added; the server keys
/// them by id and type, so order only matters for duplicate slots where
/// the last value wins.
#[derive(Debug, Clone, Default)]
pub struct DecisionRequest {
    attrs: Vec<AttributeAssignment>,
}

impl DecisionRequest {
    /// Creates an empty request.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an attribute.
    #[must_use]
    pub fn attribute(mut self, id: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attrs.push(AttributeAssignment {
            id: id.into(),
            value: value.into(),
        });
        self
    }

    /// Builds a request from pre-made assignments.
    #[must_use]
    pub fn from_assignments(attrs: Vec<AttributeAssignment>) -> Self {
        Self { attrs }
    }

    /// The request's assignments.
    #[must_use]
    pub fn assignments(&self) -> &[AttributeAssignment] {
        &self.attrs
    }

    /// Marshals the request body.
    ///
    /// # Errors
    ///
    /// Propagates the codec's limit errors.
    pub fn marshal(&self) -> Result<Bytes, ClientError> {
        let body = wire::marshal_request(&self.attrs)?;
        Ok(Bytes::from(body))
    }
}

pub(crate) fn decode_response(payload: &Bytes) -> Result<wire::Decision, ClientError> {
    wire::unmarshal_response(payload).map_err(|err| ClientError::ResponseServerError {
        status: err.to_string(),
    })
}
