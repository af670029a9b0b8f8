//! Decision effects and responses.

use std::fmt;

use crate::attr::AttributeAssignment;
use crate::errors::EvaluationError;

/// Outcome of evaluating a rule, policy or policy set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Effect {
    /// Access is denied.
    Deny = 0,
    /// Access is permitted.
    Permit = 1,
    /// The request is outside the evaluable's scope.
    NotApplicable = 2,
    /// Evaluation failed without a known direction.
    Indeterminate = 3,
    /// Evaluation failed while heading towards Deny.
    IndeterminateD = 4,
    /// Evaluation failed while heading towards Permit.
    IndeterminateP = 5,
    /// Evaluation failed with both directions possible.
    IndeterminateDP = 6,
}

impl Effect {
    /// Display name of the effect.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Deny => "Deny",
            Self::Permit => "Permit",
            Self::NotApplicable => "NotApplicable",
            Self::Indeterminate => "Indeterminate",
            Self::IndeterminateD => "Indeterminate{D}",
            Self::IndeterminateP => "Indeterminate{P}",
            Self::IndeterminateDP => "Indeterminate{DP}",
        }
    }

    /// Whether this is one of the indeterminate effects.
    #[must_use]
    pub const fn is_indeterminate(self) -> bool {
        matches!(
            self,
            Self::Indeterminate | Self::IndeterminateD | Self::IndeterminateP | Self::IndeterminateDP
        )
    }

    /// The effect's wire byte.
    #[must_use]
    pub const fn wire_byte(self) -> u8 {
        self as u8
    }

    /// Decodes an effect from its wire byte.
    #[must_use]
    pub const fn from_wire_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::Deny),
            1 => Some(Self::Permit),
            2 => Some(Self::NotApplicable),
            3 => Some(Self::Indeterminate),
            4 => Some(Self::IndeterminateD),
            5 => Some(Self::IndeterminateP),
            6 => Some(Self::IndeterminateDP),
            _ => None,
        }
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Effect a rule may produce: the two terminal decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleEffect {
    /// The rule denies matching requests.
    Deny,
    /// The rule permits matching requests.
    Permit,
}

impl RuleEffect {
    /// Lookup by the lower-case identifier used by policy front-ends.
    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "deny" => Some(Self::Deny),
            "permit" => Some(Self::Permit),
            _ => None,
        }
    }

    /// The indeterminate effect a failing rule with this effect yields.
    #[must_use]
    pub const fn indeterminate(self) -> Effect {
        match self {
            Self::Deny => Effect::IndeterminateD,
            Self::Permit => Effect::IndeterminateP,
        }
    }
}

impl From<RuleEffect> for Effect {
    fn from(e: RuleEffect) -> Self {
        match e {
            RuleEffect::Deny => Self::Deny,
            RuleEffect::Permit => Self::Permit,
        }
    }
}

impl fmt::Display for RuleEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(Effect::from(*self).name())
    }
}

/// Result of one evaluation: effect, optional status, obligations.
///
/// Obligations are ordered: contributions of the applicable child come
/// first, then the obligations of each enclosing policy and policy set on
/// Permit and Deny decisions.
#[derive(Debug, Clone)]
pub struct Response {
    /// The decision effect.
    pub effect: Effect,
    /// The bound error chain behind an indeterminate effect.
    pub status: Option<EvaluationError>,
    /// Ordered attribute assignments for the enforcement point.
    pub obligations: Vec<AttributeAssignment>,
}

impl Response {
    /// A decision response with obligations and no status.
    #[must_use]
    pub fn with_obligations(effect: Effect, obligations: Vec<AttributeAssignment>) -> Self {
        Self {
            effect,
            status: None,
            obligations,
        }
    }

    /// The NotApplicable response.
    #[must_use]
    pub fn not_applicable() -> Self {
        Self {
            effect: Effect::NotApplicable,
            status: None,
            obligations: Vec::new(),
        }
    }

    /// An indeterminate response with the given direction and status.
    #[must_use]
    pub fn indeterminate(effect: Effect, err: EvaluationError) -> Self {
        Self {
            effect,
            status: Some(err),
            obligations: Vec::new(),
        }
    }

    /// Renders the status chain, or an empty string when there is none.
    #[must_use]
    pub fn status_text(&self) -> String {
        self.status
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effect_wire_bytes_round_trip() {
        for b in 0..7u8 {
            let e = Effect::from_wire_byte(b).unwrap();
            assert_eq!(e.wire_byte(), b);
        }
        assert_eq!(Effect::from_wire_byte(7), None);
    }

    #[test]
    fn indeterminate_classification() {
        assert!(!Effect::Deny.is_indeterminate());
        assert!(!Effect::NotApplicable.is_indeterminate());
        assert!(Effect::IndeterminateDP.is_indeterminate());
        assert_eq!(Effect::IndeterminateD.name(), "Indeterminate{D}");
    }

    #[test]
    fn rule_effect_directions() {
        assert_eq!(RuleEffect::Deny.indeterminate(), Effect::IndeterminateD);
        assert_eq!(RuleEffect::Permit.indeterminate(), Effect::IndeterminateP);
        assert_eq!(RuleEffect::from_key("permit"), Some(RuleEffect::Permit));
        assert_eq!(RuleEffect::from_key("Permit"), None);
    }
}
