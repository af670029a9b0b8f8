//! Pure expression trees.
//!
//! Expressions are built once at policy-load time and evaluated any number
//! of times against request contexts. Operand types are resolved when the
//! tree is built: every constructor checks its argument result types and
//! stores the selected overload, so evaluation never re-dispatches and an
//! unsupported type combination is rejected before the policy is
//! installed.

use std::sync::Arc;

use crate::attr::Attribute;
use crate::content::Selector;
use crate::context::Context;
use crate::errors::{EvaluationError, ExprBuildError};
use crate::types::Type;
use crate::value::AttributeValue;

/// Overload of an equality comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EqualKind {
    Boolean,
    String,
    Integer,
    Float,
    Address,
    Domain,
}

/// Overload of a strict-order comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GreaterKind {
    Integer,
    Float,
    String,
}

/// Arithmetic operation selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArithOp {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl ArithOp {
    const fn name(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Subtract => "subtract",
            Self::Multiply => "multiply",
            Self::Divide => "divide",
        }
    }
}

/// Numeric overload: integer stays integer, anything mixed promotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NumericKind {
    Integer,
    Float,
}

/// Overload of a containment test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContainsKind {
    StringString,
    SetOfStringsString,
    NetworkAddress,
    SetOfNetworksAddress,
    SetOfDomainsDomain,
}

/// Pure expression over the evaluation context.
#[derive(Debug, Clone)]
pub struct Expression {
    node: Node,
}

#[derive(Debug, Clone)]
enum Node {
    Value(AttributeValue),
    Designator(Attribute),
    Selector(Arc<Selector>),
    Equal(EqualKind, Box<[Expression; 2]>),
    Greater(GreaterKind, Box<[Expression; 2]>),
    Arithmetic(ArithOp, NumericKind, Box<[Expression; 2]>),
    Contains(ContainsKind, Box<[Expression; 2]>),
    And(Box<[Expression; 2]>),
    Or(Box<[Expression; 2]>),
    Not(Box<Expression>),
    Range(NumericKind, Box<[Expression; 3]>),
}

fn numeric_kind(first: Type, second: Type) -> Option<NumericKind> {
    match (first, second) {
        (Type::Integer, Type::Integer) => Some(NumericKind::Integer),
        (Type::Integer | Type::Float, Type::Integer | Type::Float) => Some(NumericKind::Float),
        _ => None,
    }
}

impl Expression {
    /// Constant expression.
    #[must_use]
    pub fn value(v: impl Into<AttributeValue>) -> Self {
        Self {
            node: Node::Value(v.into()),
        }
    }

    /// Attribute lookup expression.
    #[must_use]
    pub fn designator(attr: Attribute) -> Self {
        Self {
            node: Node::Designator(attr),
        }
    }

    /// Content lookup expression.
    #[must_use]
    pub fn selector(selector: Arc<Selector>) -> Self {
        Self {
            node: Node::Selector(selector),
        }
    }

    /// Equality comparison.
    ///
    /// Defined for Boolean, String, Integer, Float, Address and Domain
    /// operands of the same type; Integer and Float may mix and compare
    /// as floats.
    ///
    /// # Errors
    ///
    /// Returns [`ExprBuildError::InvalidCombination`] for any other
    /// operand type pair; the other binary constructors behave the same
    /// way for their tables.
    pub fn equal(first: Self, second: Self) -> Result<Self, ExprBuildError> {
        let kind = match (first.result_type(), second.result_type()) {
            (Type::Boolean, Type::Boolean) => EqualKind::Boolean,
            (Type::String, Type::String) => EqualKind::String,
            (Type::Integer, Type::Integer) => EqualKind::Integer,
            (Type::Integer | Type::Float, Type::Integer | Type::Float) => EqualKind::Float,
            (Type::Address, Type::Address) => EqualKind::Address,
            (Type::Domain, Type::Domain) => EqualKind::Domain,
            (f, s) => {
                return Err(ExprBuildError::InvalidCombination {
                    op: "equal",
                    first: f,
                    second: s,
                });
            }
        };

        Ok(Self {
            node: Node::Equal(kind, Box::new([first, second])),
        })
    }

    /// Strict-order comparison, true when the first operand is greater.
    pub fn greater(first: Self, second: Self) -> Result<Self, ExprBuildError> {
        let kind = match (first.result_type(), second.result_type()) {
            (Type::Integer, Type::Integer) => GreaterKind::Integer,
            (Type::Integer | Type::Float, Type::Integer | Type::Float) => GreaterKind::Float,
            (Type::String, Type::String) => GreaterKind::String,
            (f, s) => {
                return Err(ExprBuildError::InvalidCombination {
                    op: "greater",
                    first: f,
                    second: s,
                });
            }
        };

        Ok(Self {
            node: Node::Greater(kind, Box::new([first, second])),
        })
    }

    /// Addition over Integer or Float operands.
    pub fn add(first: Self, second: Self) -> Result<Self, ExprBuildError> {
        Self::arithmetic(ArithOp::Add, first, second)
    }

    /// Subtraction over Integer or Float operands.
    pub fn subtract(first: Self, second: Self) -> Result<Self, ExprBuildError> {
        Self::arithmetic(ArithOp::Subtract, first, second)
    }

    /// Multiplication over Integer or Float operands.
    pub fn multiply(first: Self, second: Self) -> Result<Self, ExprBuildError> {
        Self::arithmetic(ArithOp::Multiply, first, second)
    }

    /// Division over Integer or Float operands.
    ///
    /// Division by zero fails at evaluation time with
    /// [`EvaluationError::DivideByZero`] for both overloads.
    pub fn divide(first: Self, second: Self) -> Result<Self, ExprBuildError> {
        Self::arithmetic(ArithOp::Divide, first, second)
    }

    fn arithmetic(op: ArithOp, first: Self, second: Self) -> Result<Self, ExprBuildError> {
        let Some(kind) = numeric_kind(first.result_type(), second.result_type()) else {
            return Err(ExprBuildError::InvalidCombination {
                op: op.name(),
                first: first.result_type(),
                second: second.result_type(),
            });
        };

        Ok(Self {
            node: Node::Arithmetic(op, kind, Box::new([first, second])),
        })
    }

    /// Containment test.
    ///
    /// Dispatch follows a static table over the operand types: string
    /// contains substring, set of strings contains string, network
    /// contains address, set of networks contains address, set of
    /// domains contains domain.
    pub fn contains(first: Self, second: Self) -> Result<Self, ExprBuildError> {
        let kind = match (first.result_type(), second.result_type()) {
            (Type::String, Type::String) => ContainsKind::StringString,
            (Type::SetOfStrings, Type::String) => ContainsKind::SetOfStringsString,
            (Type::Network, Type::Address) => ContainsKind::NetworkAddress,
            (Type::SetOfNetworks, Type::Address) => ContainsKind::SetOfNetworksAddress,
            (Type::SetOfDomains, Type::Domain) => ContainsKind::SetOfDomainsDomain,
            (f, s) => {
                return Err(ExprBuildError::InvalidCombination {
                    op: "contains",
                    first: f,
                    second: s,
                });
            }
        };

        Ok(Self {
            node: Node::Contains(kind, Box::new([first, second])),
        })
    }

    /// Short-circuit conjunction of exactly two boolean operands.
    pub fn and(first: Self, second: Self) -> Result<Self, ExprBuildError> {
        Self::boolean_pair("and", first, second).map(|args| Self {
            node: Node::And(args),
        })
    }

    /// Short-circuit disjunction of exactly two boolean operands.
    pub fn or(first: Self, second: Self) -> Result<Self, ExprBuildError> {
        Self::boolean_pair("or", first, second).map(|args| Self {
            node: Node::Or(args),
        })
    }

    fn boolean_pair(
        op: &'static str,
        first: Self,
        second: Self,
    ) -> Result<Box<[Expression; 2]>, ExprBuildError> {
        for e in [&first, &second] {
            if e.result_type() != Type::Boolean {
                return Err(ExprBuildError::InvalidArgument {
                    op,
                    expected: "Boolean",
                    actual: e.result_type(),
                });
            }
        }

        Ok(Box::new([first, second]))
    }

    /// Boolean negation.
    pub fn not(arg: Self) -> Result<Self, ExprBuildError> {
        if arg.result_type() != Type::Boolean {
            return Err(ExprBuildError::InvalidArgument {
                op: "not",
                expected: "Boolean",
                actual: arg.result_type(),
            });
        }

        Ok(Self {
            node: Node::Not(Box::new(arg)),
        })
    }

    /// Three-way range classification.
    ///
    /// Yields the string `"Below"` when the value is under the minimum,
    /// `"Above"` when over the maximum and `"Within"` otherwise; the
    /// result is typically consumed as a mapper argument.
    pub fn range(min: Self, max: Self, val: Self) -> Result<Self, ExprBuildError> {
        let mut kind = NumericKind::Integer;
        for e in [&min, &max, &val] {
            match e.result_type() {
                Type::Integer => {}
                Type::Float => kind = NumericKind::Float,
                actual => {
                    return Err(ExprBuildError::InvalidArgument {
                        op: "range",
                        expected: "Integer or Float",
                        actual,
                    });
                }
            }
        }

        Ok(Self {
            node: Node::Range(kind, Box::new([min, max, val])),
        })
    }

    /// The statically known result type of this expression.
    #[must_use]
    pub fn result_type(&self) -> Type {
        match &self.node {
            Node::Value(v) => v.value_type(),
            Node::Designator(attr) => attr.attr_type(),
            Node::Selector(sel) => sel.result_type(),
            Node::Equal(..) | Node::Greater(..) | Node::Contains(..) => Type::Boolean,
            Node::And(_) | Node::Or(_) | Node::Not(_) => Type::Boolean,
            Node::Arithmetic(_, NumericKind::Integer, _) => Type::Integer,
            Node::Arithmetic(_, NumericKind::Float, _) => Type::Float,
            Node::Range(..) => Type::String,
        }
    }

    /// Short description used in statuses and selector fingerprints.
    #[must_use]
    pub fn describe(&self) -> String {
        match &self.node {
            Node::Value(v) => v.to_string(),
            Node::Designator(attr) => attr.to_string(),
            Node::Selector(sel) => format!("selector({})", sel.content_id()),
            Node::Equal(..) => "equal".to_string(),
            Node::Greater(..) => "greater".to_string(),
            Node::Arithmetic(op, ..) => op.name().to_string(),
            Node::Contains(..) => "contains".to_string(),
            Node::And(_) => "and".to_string(),
            Node::Or(_) => "or".to_string(),
            Node::Not(_) => "not".to_string(),
            Node::Range(..) => "range".to_string(),
        }
    }

    /// Evaluates the expression against a context.
    ///
    /// Expressions are pure: evaluation has no side effects and repeated
    /// calls with the same context return equal values.
    ///
    /// # Errors
    ///
    /// Returns an [`EvaluationError`] when an attribute or content lookup
    /// fails, a value has the wrong type at evaluation time, or an
    /// arithmetic error occurs. Argument errors are bound with the
    /// argument position and operation name.
    pub fn calculate(&self, ctx: &Context) -> Result<AttributeValue, EvaluationError> {
        match &self.node {
            Node::Value(v) => Ok(v.clone()),
            Node::Designator(attr) => ctx.attribute(attr).cloned(),
            Node::Selector(sel) => sel.calculate(ctx),
            Node::Equal(kind, args) => Self::calculate_equal(*kind, args, ctx),
            Node::Greater(kind, args) => Self::calculate_greater(*kind, args, ctx),
            Node::Arithmetic(op, kind, args) => Self::calculate_arithmetic(*op, *kind, args, ctx),
            Node::Contains(kind, args) => Self::calculate_contains(*kind, args, ctx),
            Node::And(args) => {
                if !bound_bool(&args[0], ctx, "first argument", "and")? {
                    return Ok(AttributeValue::Boolean(false));
                }
                let second = bound_bool(&args[1], ctx, "second argument", "and")?;
                Ok(AttributeValue::Boolean(second))
            }
            Node::Or(args) => {
                if bound_bool(&args[0], ctx, "first argument", "or")? {
                    return Ok(AttributeValue::Boolean(true));
                }
                let second = bound_bool(&args[1], ctx, "second argument", "or")?;
                Ok(AttributeValue::Boolean(second))
            }
            Node::Not(arg) => {
                let v = bound_bool(arg, ctx, "argument", "not")?;
                Ok(AttributeValue::Boolean(!v))
            }
            Node::Range(kind, args) => Self::calculate_range(*kind, args, ctx),
        }
    }

    fn calculate_equal(
        kind: EqualKind,
        args: &[Expression; 2],
        ctx: &Context,
    ) -> Result<AttributeValue, EvaluationError> {
        let first = bound(args[0].calculate(ctx), "first argument", "equal")?;
        let second = bound(args[1].calculate(ctx), "second argument", "equal")?;

        let eq = match kind {
            EqualKind::Boolean => first.boolean()? == second.boolean()?,
            EqualKind::String => first.string()? == second.string()?,
            EqualKind::Integer => first.integer()? == second.integer()?,
            EqualKind::Float => {
                #[allow(clippy::float_cmp)] // exact comparison intended
                {
                    first.number()? == second.number()?
                }
            }
            EqualKind::Address => first.address()? == second.address()?,
            EqualKind::Domain => first.domain()? == second.domain()?,
        };

        Ok(AttributeValue::Boolean(eq))
    }

    fn calculate_greater(
        kind: GreaterKind,
        args: &[Expression; 2],
        ctx: &Context,
    ) -> Result<AttributeValue, EvaluationError> {
        let first = bound(args[0].calculate(ctx), "first argument", "greater")?;
        let second = bound(args[1].calculate(ctx), "second argument", "greater")?;

        let gt = match kind {
            GreaterKind::Integer => first.integer()? > second.integer()?,
            GreaterKind::Float => first.number()? > second.number()?,
            GreaterKind::String => first.string()? > second.string()?,
        };

        Ok(AttributeValue::Boolean(gt))
    }

    fn calculate_arithmetic(
        op: ArithOp,
        kind: NumericKind,
        args: &[Expression; 2],
        ctx: &Context,
    ) -> Result<AttributeValue, EvaluationError> {
        let name = op.name();
        let first = bound(args[0].calculate(ctx), "first argument", name)?;
        let second = bound(args[1].calculate(ctx), "second argument", name)?;

        match kind {
            NumericKind::Integer => {
                let a = first.integer()?;
                let b = second.integer()?;
                let v = match op {
                    ArithOp::Add => a.wrapping_add(b),
                    ArithOp::Subtract => a.wrapping_sub(b),
                    ArithOp::Multiply => a.wrapping_mul(b),
                    ArithOp::Divide => {
                        if b == 0 {
                            return Err(EvaluationError::DivideByZero.bind(name));
                        }
                        a.wrapping_div(b)
                    }
                };
                Ok(AttributeValue::Integer(v))
            }
            NumericKind::Float => {
                let a = first.number()?;
                let b = second.number()?;
                let v = match op {
                    ArithOp::Add => a + b,
                    ArithOp::Subtract => a - b,
                    ArithOp::Multiply => a * b,
                    ArithOp::Divide => {
                        if b == 0.0 {
                            return Err(EvaluationError::DivideByZero.bind(name));
                        }
                        a / b
                    }
                };
                Ok(AttributeValue::Float(v))
            }
        }
    }

    fn calculate_contains(
        kind: ContainsKind,
        args: &[Expression; 2],
        ctx: &Context,
    ) -> Result<AttributeValue, EvaluationError> {
        let first = bound(args[0].calculate(ctx), "first argument", "contains")?;
        let second = bound(args[1].calculate(ctx), "second argument", "contains")?;

        let found = match kind {
            ContainsKind::StringString => first.string()?.contains(second.string()?),
            ContainsKind::SetOfStringsString => first.set_of_strings()?.contains(second.string()?),
            ContainsKind::NetworkAddress => first.network()?.contains(second.address()?),
            ContainsKind::SetOfNetworksAddress => {
                first.set_of_networks()?.contains(second.address()?)
            }
            ContainsKind::SetOfDomainsDomain => first.set_of_domains()?.contains(second.domain()?),
        };

        Ok(AttributeValue::Boolean(found))
    }

    fn calculate_range(
        kind: NumericKind,
        args: &[Expression; 3],
        ctx: &Context,
    ) -> Result<AttributeValue, EvaluationError> {
        let min = bound(args[0].calculate(ctx), "minimum", "range")?;
        let max = bound(args[1].calculate(ctx), "maximum", "range")?;
        let val = bound(args[2].calculate(ctx), "value", "range")?;

        let pos = match kind {
            NumericKind::Integer => {
                let (min, max, val) = (min.integer()?, max.integer()?, val.integer()?);
                range_position(val < min, val > max)
            }
            NumericKind::Float => {
                let (min, max, val) = (min.number()?, max.number()?, val.number()?);
                range_position(val < min, val > max)
            }
        };

        Ok(AttributeValue::String(pos.to_string()))
    }
}

fn range_position(below: bool, above: bool) -> &'static str {
    if below {
        "Below"
    } else if above {
        "Above"
    } else {
        "Within"
    }
}

fn bound(
    r: Result<AttributeValue, EvaluationError>,
    arg: &str,
    op: &str,
) -> Result<AttributeValue, EvaluationError> {
    r.map_err(|err| err.bind(arg).bind(op))
}

fn bound_bool(
    e: &Expression,
    ctx: &Context,
    arg: &str,
    op: &str,
) -> Result<bool, EvaluationError> {
    bound(e.calculate(ctx), arg, op)?.boolean()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> Context {
        Context::new([
            ("n", AttributeValue::Integer(6)),
            ("f", AttributeValue::Float(1.5)),
            ("s", AttributeValue::String("example".to_string())),
        ])
    }

    fn int_designator(id: &str) -> Expression {
        Expression::designator(Attribute::new(id, Type::Integer))
    }

    #[test]
    fn arithmetic_keeps_integers_integral() {
        let e = Expression::add(int_designator("n"), Expression::value(2i64)).unwrap();
        assert_eq!(e.result_type(), Type::Integer);
        assert_eq!(e.calculate(&ctx()).unwrap().integer().unwrap(), 8);
    }

    #[test]
    fn arithmetic_promotes_to_float() {
        let e = Expression::multiply(
            int_designator("n"),
            Expression::designator(Attribute::new("f", Type::Float)),
        )
        .unwrap();
        assert_eq!(e.result_type(), Type::Float);
        assert_eq!(e.calculate(&ctx()).unwrap().float().unwrap(), 9.0);
    }

    #[test]
    fn divide_by_zero_fails_for_both_overloads() {
        let e = Expression::divide(int_designator("n"), Expression::value(0i64)).unwrap();
        let err = e.calculate(&ctx()).unwrap_err();
        assert_eq!(err.to_string(), "divide>division by zero");

        let e = Expression::divide(Expression::value(1.0f64), Expression::value(0.0f64)).unwrap();
        assert!(e.calculate(&ctx()).is_err());
    }

    #[test]
    fn equal_overloads() {
        let e = Expression::equal(
            Expression::designator(Attribute::new("s", Type::String)),
            Expression::value("example"),
        )
        .unwrap();
        assert!(e.calculate(&ctx()).unwrap().boolean().unwrap());

        let e = Expression::equal(Expression::value(2i64), Expression::value(2.0f64)).unwrap();
        assert!(e.calculate(&ctx()).unwrap().boolean().unwrap());

        let err =
            Expression::equal(Expression::value(true), Expression::value("x")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "\"equal\" is not defined for Boolean and String"
        );
    }

    #[test]
    fn greater_is_strict() {
        let e = Expression::greater(int_designator("n"), Expression::value(6i64)).unwrap();
        assert!(!e.calculate(&ctx()).unwrap().boolean().unwrap());

        let e = Expression::greater(Expression::value("b"), Expression::value("a")).unwrap();
        assert!(e.calculate(&ctx()).unwrap().boolean().unwrap());
    }

    #[test]
    fn contains_dispatch_table() {
        let set: crate::sets::StringSet = ["a", "b"].into_iter().collect();
        let e = Expression::contains(
            Expression::value(AttributeValue::SetOfStrings(set)),
            Expression::value("b"),
        )
        .unwrap();
        assert!(e.calculate(&ctx()).unwrap().boolean().unwrap());

        let net = crate::network::Network::parse("192.0.2.0/24").unwrap();
        let e = Expression::contains(
            Expression::value(AttributeValue::Network(net)),
            Expression::value(AttributeValue::Address("192.0.2.7".parse().unwrap())),
        )
        .unwrap();
        assert!(e.calculate(&ctx()).unwrap().boolean().unwrap());

        let err = Expression::contains(Expression::value(1i64), Expression::value("x"))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "\"contains\" is not defined for Integer and String"
        );
    }

    #[test]
    fn logical_operations_short_circuit() {
        // The second operand would fail with a missing attribute; the
        // short-circuit must keep it unevaluated.
        let missing = Expression::designator(Attribute::new("absent", Type::Boolean));

        let e = Expression::and(Expression::value(false), missing.clone()).unwrap();
        assert!(!e.calculate(&ctx()).unwrap().boolean().unwrap());

        let e = Expression::or(Expression::value(true), missing).unwrap();
        assert!(e.calculate(&ctx()).unwrap().boolean().unwrap());

        let e = Expression::not(Expression::value(false)).unwrap();
        assert!(e.calculate(&ctx()).unwrap().boolean().unwrap());
    }

    #[test]
    fn logical_error_is_bound_with_position() {
        let missing = Expression::designator(Attribute::new("absent", Type::Boolean));
        let e = Expression::and(Expression::value(true), missing).unwrap();
        let err = e.calculate(&ctx()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "and>second argument>missing attribute \"absent\" of type \"Boolean\""
        );
    }

    #[test]
    fn range_classifies() {
        let range = |v: i64| {
            Expression::range(
                Expression::value(2i64),
                Expression::value(4i64),
                Expression::value(v),
            )
            .unwrap()
            .calculate(&ctx())
            .unwrap()
            .string()
            .unwrap()
            .to_string()
        };

        assert_eq!(range(1), "Below");
        assert_eq!(range(3), "Within");
        assert_eq!(range(2), "Within");
        assert_eq!(range(4), "Within");
        assert_eq!(range(5), "Above");
    }

    #[test]
    fn purity_repeated_evaluation() {
        let e = Expression::add(int_designator("n"), Expression::value(1i64)).unwrap();
        let c = ctx();
        let first = e.calculate(&c).unwrap();
        let second = e.calculate(&c).unwrap();
        assert_eq!(first, second);
    }
}
