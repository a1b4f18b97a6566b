//! Constraint and segment evaluation.
use std::borrow::Cow;

use chrono::{DateTime, Utc};
use semver::Version;

use crate::{
    models::{Constraint, Operator, Segment},
    Context,
};

impl Constraint {
    /// Evaluate the constraint against `context`.
    ///
    /// The operator's result is negated afterwards if `inverted` is set. An unknown operator is
    /// `false` regardless of `inverted`, and so is any operand that cannot be coerced to the
    /// operator's type.
    pub fn eval(&self, context: &Context) -> bool {
        if self.operator == Operator::Unknown {
            return false;
        }

        let result = self.operator.eval(self, context);
        if self.inverted {
            !result
        } else {
            result
        }
    }
}

impl Segment {
    /// Returns `true` if every constraint of the segment holds.
    pub fn eval(&self, context: &Context) -> bool {
        all_constraints_hold(&self.constraints, context)
    }
}

/// Returns `true` if all `constraints` hold (vacuously `true` for an empty list).
pub fn all_constraints_hold(constraints: &[Constraint], context: &Context) -> bool {
    constraints
        .iter()
        .all(|constraint| constraint.eval(context))
}

impl Operator {
    /// Apply the operator, without inversion. Returns `false` if the operator cannot be applied.
    fn eval(self, constraint: &Constraint, context: &Context) -> bool {
        self.try_eval(constraint, context).unwrap_or(false)
    }

    /// Try applying the operator, returning `None` if operands cannot be coerced.
    fn try_eval(self, constraint: &Constraint, context: &Context) -> Option<bool> {
        match self {
            Self::In | Self::NotIn => {
                let field = context.get_field(&constraint.context_name);
                let is_in = match field {
                    Some(field) => cleaned_values(&constraint.values).any(|v| v == &*field),
                    None => false,
                };
                Some(is_in == (self == Self::In))
            }

            Self::StrStartsWith | Self::StrEndsWith | Self::StrContains => {
                let field = context.get_field(&constraint.context_name)?;
                let field = fold_case(field, constraint.case_insensitive);
                let matches = cleaned_values(&constraint.values).any(|value| {
                    let value = fold_case(Cow::Borrowed(value), constraint.case_insensitive);
                    match self {
                        Self::StrStartsWith => field.starts_with(&*value),
                        Self::StrEndsWith => field.ends_with(&*value),
                        _ => field.contains(&*value),
                    }
                });
                Some(matches)
            }

            Self::NumEq | Self::NumGt | Self::NumGte | Self::NumLt | Self::NumLte => {
                let expected = parse_number(constraint.value.as_deref()?)?;
                let actual = parse_number(&context.get_field(&constraint.context_name)?)?;
                Some(match self {
                    Self::NumEq => actual == expected,
                    Self::NumGt => actual > expected,
                    Self::NumGte => actual >= expected,
                    Self::NumLt => actual < expected,
                    _ => actual <= expected,
                })
            }

            Self::DateBefore | Self::DateAfter => {
                let expected = parse_date(constraint.value.as_deref()?)?;
                let actual = if constraint.context_name == "currentTime" {
                    context.current_time.unwrap_or_else(Utc::now)
                } else {
                    parse_date(&context.get_field(&constraint.context_name)?)?
                };
                Some(if self == Self::DateBefore {
                    actual < expected
                } else {
                    actual > expected
                })
            }

            Self::SemverEq | Self::SemverGt | Self::SemverLt => {
                let expected = Version::parse(constraint.value.as_deref()?.trim()).ok()?;
                let actual =
                    Version::parse(context.get_field(&constraint.context_name)?.trim()).ok()?;
                let ordering = actual.cmp_precedence(&expected);
                Some(match self {
                    Self::SemverEq => ordering.is_eq(),
                    Self::SemverGt => ordering.is_gt(),
                    _ => ordering.is_lt(),
                })
            }

            Self::Unknown => None,
        }
    }
}

/// Operand values with empty entries discarded and whitespace trimmed.
fn cleaned_values(values: &[String]) -> impl Iterator<Item = &str> {
    values
        .iter()
        .filter(|value| !value.is_empty())
        .map(|value| value.trim())
}

fn fold_case(value: Cow<'_, str>, case_insensitive: bool) -> Cow<'_, str> {
    if case_insensitive {
        Cow::Owned(value.to_lowercase())
    } else {
        value
    }
}

fn parse_number(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|n| !n.is_nan())
}

fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|date| date.with_timezone(&Utc))
}
