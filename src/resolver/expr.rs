//! Parsed forms of data paths and `eval:` function expressions.

use crate::resolver::PathError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use tracing::warn;

pub const EVAL_PREFIX: &str = "eval:";

static FUNCTION_CALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_]*)\(([^()]*)\)(?:\.(.+))?$")
        .expect("function call pattern is valid")
});

static INDEXED_SEGMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([^\[\]]+)\[([^\[\]]*)\]$").expect("segment pattern is valid"));

/// One `/`-separated step of a data path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    /// `name[i]`: element `i` of the array under `name`
    Index { key: String, index: usize },
}

impl Segment {
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        if !raw.contains(|c: char| c == '[' || c == ']') {
            return Ok(Self::Key(raw.to_string()));
        }

        let captures = INDEXED_SEGMENT
            .captures(raw)
            .ok_or_else(|| PathError::MalformedSegment {
                segment: raw.to_string(),
            })?;
        let index = captures[2]
            .trim()
            .parse::<usize>()
            .map_err(|_| PathError::BadIndex {
                segment: raw.to_string(),
            })?;

        Ok(Self::Index {
            key: captures[1].to_string(),
            index,
        })
    }

    pub fn key(&self) -> &str {
        match self {
            Self::Key(key) | Self::Index { key, .. } => key,
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => f.write_str(key),
            Self::Index { key, index } => write!(f, "{key}[{index}]"),
        }
    }
}

/// A plain lookup path such as `crowbar/network/admin[0]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPath {
    segments: Vec<Segment>,
}

impl DataPath {
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        if raw.is_empty() {
            return Err(PathError::Empty);
        }

        let segments = raw
            .split('/')
            .map(|segment| {
                if segment.is_empty() {
                    Err(PathError::EmptySegment {
                        path: raw.to_string(),
                    })
                } else {
                    Segment::parse(segment)
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }
}

impl fmt::Display for DataPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

/// `name(arg, ...).subcommand`
///
/// For `ipaddress` the subcommand is an accessor (`cidr`, `address`,
/// `ifname`); for the peer functions it is a further expression applied to
/// each peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionCall {
    pub name: String,
    pub args: Vec<String>,
    pub subcommand: Option<String>,
}

impl FunctionCall {
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        let captures = FUNCTION_CALL
            .captures(raw)
            .ok_or_else(|| PathError::MalformedCall {
                expr: raw.to_string(),
            })?;

        let args = match captures[2].trim() {
            "" => Vec::new(),
            list => list.split(',').map(|arg| arg.trim().to_string()).collect(),
        };

        Ok(Self {
            name: captures[1].to_string(),
            args,
            subcommand: captures.get(3).map(|m| m.as_str().trim().to_string()),
        })
    }

    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }

    pub fn looks_like_call(raw: &str) -> bool {
        FUNCTION_CALL.is_match(raw)
    }
}

impl fmt::Display for FunctionCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.args.join(","))?;
        if let Some(subcommand) = &self.subcommand {
            write!(f, ".{subcommand}")?;
        }
        Ok(())
    }
}

/// A resolvable expression, parsed once from its string form
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathExpr {
    Data(DataPath),
    Custom(FunctionCall),
    /// Kept so that evaluation can report it and resolve to nothing
    Invalid { raw: String, error: PathError },
}

impl PathExpr {
    /// Parse a path or `eval:` expression. Malformed input becomes
    /// [`PathExpr::Invalid`].
    pub fn parse(raw: &str) -> Self {
        Self::try_parse(raw).unwrap_or_else(|error| {
            warn!("Unusable path expression '{}': {}", raw, error);
            Self::Invalid {
                raw: raw.to_string(),
                error,
            }
        })
    }

    pub fn try_parse(raw: &str) -> Result<Self, PathError> {
        match raw.strip_prefix(EVAL_PREFIX) {
            Some(call) => FunctionCall::parse(call).map(Self::Custom),
            None => DataPath::parse(raw).map(Self::Data),
        }
    }

    /// Peer-function subcommands may name a function without `eval:`.
    pub fn parse_subcommand(raw: &str) -> Self {
        if !raw.starts_with(EVAL_PREFIX) && FunctionCall::looks_like_call(raw) {
            return match FunctionCall::parse(raw) {
                Ok(call) => Self::Custom(call),
                Err(error) => Self::Invalid {
                    raw: raw.to_string(),
                    error,
                },
            };
        }
        Self::parse(raw)
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, Self::Custom(_))
    }
}

impl fmt::Display for PathExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Data(path) => write!(f, "{path}"),
            Self::Custom(call) => write!(f, "{EVAL_PREFIX}{call}"),
            Self::Invalid { raw, .. } => f.write_str(raw),
        }
    }
}
