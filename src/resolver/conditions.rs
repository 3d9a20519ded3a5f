use crate::resolver::{PathError, PathExpr};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    Unknown(String),
}

impl ConditionOperator {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "==" => Self::Equals,
            "!=" => Self::NotEquals,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Compare the stringified left side against the literal right side.
    /// A missing right side never equals anything; unknown operators are false.
    pub fn compare(&self, lvalue: &str, rvalue: Option<&str>) -> bool {
        match self {
            Self::Equals => rvalue == Some(lvalue),
            Self::NotEquals => rvalue != Some(lvalue),
            Self::Unknown(_) => false,
        }
    }
}

impl fmt::Display for ConditionOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equals => f.write_str("=="),
            Self::NotEquals => f.write_str("!="),
            Self::Unknown(op) => f.write_str(op),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comparison {
    pub path: PathExpr,
    pub operator: ConditionOperator,
    pub value: Option<String>,
}

/// A `when` guard of the form `<path> <operator> <value>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    raw: String,
    comparison: Result<Comparison, PathError>,
}

impl Condition {
    pub fn parse(raw: &str) -> Self {
        Self {
            raw: raw.to_string(),
            comparison: Self::parse_comparison(raw),
        }
    }

    fn parse_comparison(raw: &str) -> Result<Comparison, PathError> {
        let malformed = || PathError::MalformedCondition {
            condition: raw.to_string(),
        };

        let mut parts = raw.split_whitespace();
        let path = parts.next().ok_or_else(malformed)?;
        let operator = parts.next().ok_or_else(malformed)?;

        Ok(Comparison {
            path: PathExpr::parse(path),
            operator: ConditionOperator::parse(operator),
            value: parts.next().map(str::to_string),
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn comparison(&self) -> Result<&Comparison, &PathError> {
        self.comparison.as_ref()
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
