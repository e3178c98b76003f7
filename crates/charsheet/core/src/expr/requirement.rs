//! Boolean requirement trees over property expressions.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::{ParseError, PropExpression};
use crate::decision::Decision;

/// Read-only view of a character that requirements are evaluated against.
pub trait PropertySurface {
    /// Whether the property exists on the character at all.
    fn has_prop(&self, expr: &PropExpression) -> bool;

    /// Current value of the property. When `expr.single` is set this is the
    /// best value held by any single instance instead of the aggregate.
    fn get_prop(&self, expr: &PropExpression) -> i32;
}

/// Requirement AST.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RequirementSpec", into = "RequirementSpec")]
pub enum Requirement {
    Prop(PropExpression),
    AnyOf(Vec<Requirement>),
    AllOf(Vec<Requirement>),
    NoneOf(Vec<Requirement>),
}

impl Requirement {
    pub fn evaluate<S: PropertySurface + ?Sized>(&self, surface: &S) -> Decision {
        match self {
            Self::Prop(expr) => evaluate_prop(expr, surface),
            Self::AnyOf(requirements) => {
                let mut reasons = Vec::with_capacity(requirements.len());
                for requirement in requirements {
                    let decision = requirement.evaluate(surface);
                    if decision.success {
                        return decision;
                    }
                    reasons.push(decision.reason.unwrap_or_default());
                }
                Decision::fail(format!("AnyOf({})", reasons.join("; ")))
            }
            Self::AllOf(requirements) => {
                for requirement in requirements {
                    let decision = requirement.evaluate(surface);
                    if !decision.success {
                        return decision;
                    }
                }
                Decision::OK
            }
            Self::NoneOf(requirements) => {
                for requirement in requirements {
                    if requirement.evaluate(surface).success {
                        return Decision::fail(format!("Not({requirement})"));
                    }
                }
                Decision::OK
            }
        }
    }

    /// Property ids referenced anywhere in the tree.
    pub fn identifiers(&self) -> BTreeSet<String> {
        let mut ids = BTreeSet::new();
        self.collect_identifiers(&mut ids);
        ids
    }

    fn collect_identifiers(&self, ids: &mut BTreeSet<String>) {
        match self {
            Self::Prop(expr) => {
                ids.insert(expr.prop.clone());
            }
            Self::AnyOf(children) | Self::AllOf(children) | Self::NoneOf(children) => {
                for child in children {
                    child.collect_identifiers(ids);
                }
            }
        }
    }
}

fn evaluate_prop<S: PropertySurface + ?Sized>(expr: &PropExpression, surface: &S) -> Decision {
    // Every comparison, `less_than` included, needs the property present.
    if !surface.has_prop(expr) {
        return Decision::fail(format!("[{expr} not present]"));
    }

    if let Some(limit) = expr.less_than {
        let ranks = surface.get_prop(expr);
        return if ranks < limit {
            Decision::OK
        } else {
            Decision::fail(format!(
                "Must have less than {limit} of {} (have {ranks})",
                expr.full_id()
            ))
        };
    }

    if let Some(minimum) = expr.single {
        let best = surface.get_prop(expr);
        if best < minimum {
            return Decision::fail(format!(
                "Need {minimum} in a single {} (best is {best})",
                expr.full_id()
            ));
        }
    } else if let Some(minimum) = expr.value {
        let ranks = surface.get_prop(expr);
        if ranks < minimum {
            return Decision::fail(format!(
                "Need {minimum} of {} (have {ranks})",
                expr.full_id()
            ));
        }
    } else if surface.get_prop(expr) < 1 {
        return Decision::fail(format!("[{expr} not present]"));
    }
    Decision::OK
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (name, children) = match self {
            Self::Prop(expr) => return write!(f, "{expr}"),
            Self::AnyOf(children) => ("any", children),
            Self::AllOf(children) => ("all", children),
            Self::NoneOf(children) => ("none", children),
        };
        write!(f, "{name}(")?;
        for (idx, child) in children.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{child}")?;
        }
        f.write_str(")")
    }
}

// ============================================================================
// Serialized form
// ============================================================================

/// Data-file shape of a requirement.
///
/// A string is a single expression (a leading `-` negates it), a list means
/// "all of", and a single-key map selects `any`, `all` or `none`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequirementSpec {
    Expr(String),
    AllOf(Vec<RequirementSpec>),
    Group(RequirementGroup),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequirementGroup {
    Any(Vec<RequirementSpec>),
    All(Vec<RequirementSpec>),
    None(Vec<RequirementSpec>),
}

impl RequirementSpec {
    pub fn parse(&self) -> Result<Requirement, ParseError> {
        match self {
            Self::Expr(raw) => match raw.strip_prefix('-') {
                Some(negated) => Ok(Requirement::NoneOf(vec![Requirement::Prop(
                    negated.parse()?,
                )])),
                None => Ok(Requirement::Prop(raw.parse()?)),
            },
            Self::AllOf(list) | Self::Group(RequirementGroup::All(list)) => {
                Ok(Requirement::AllOf(parse_all(list)?))
            }
            Self::Group(RequirementGroup::Any(list)) => Ok(Requirement::AnyOf(parse_all(list)?)),
            Self::Group(RequirementGroup::None(list)) => {
                Ok(Requirement::NoneOf(parse_all(list)?))
            }
        }
    }
}

fn parse_all(list: &[RequirementSpec]) -> Result<Vec<Requirement>, ParseError> {
    list.iter().map(RequirementSpec::parse).collect()
}

impl TryFrom<RequirementSpec> for Requirement {
    type Error = ParseError;

    fn try_from(raw: RequirementSpec) -> Result<Self, Self::Error> {
        raw.parse()
    }
}

impl From<Requirement> for RequirementSpec {
    fn from(requirement: Requirement) -> Self {
        fn all(children: Vec<Requirement>) -> Vec<RequirementSpec> {
            children.into_iter().map(RequirementSpec::from).collect()
        }
        match requirement {
            Requirement::Prop(expr) => Self::Expr(expr.to_string()),
            Requirement::AllOf(children) => Self::AllOf(all(children)),
            Requirement::AnyOf(children) => Self::Group(RequirementGroup::Any(all(children))),
            Requirement::NoneOf(children) => {
                if let [Requirement::Prop(expr)] = children.as_slice() {
                    return Self::Expr(format!("-{expr}"));
                }
                Self::Group(RequirementGroup::None(all(children)))
            }
        }
    }
}

impl std::str::FromStr for Requirement {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RequirementSpec::Expr(s.to_owned()).parse()
    }
}
