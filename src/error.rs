use std::fmt;

/// Represents errors that can occur when registering a new route.
///
/// All of these are programming errors in the application's wire-up, so the
/// [`Mux`](crate::Mux) registrars treat them as fatal and panic with the
/// `Display` message. [`Tree::insert`](crate::Tree::insert) surfaces them as
/// values for callers that drive the trie directly.
#[non_exhaustive]
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum InsertError {
    /// The pattern does not begin with `/`, or a parameter segment has no
    /// name.
    BadPattern {
        /// The offending pattern.
        pattern: String,
    },
    /// A catch-all segment was followed by more segments; it is only
    /// allowed at the end of a pattern.
    CatchAllNotLast {
        /// The offending pattern.
        pattern: String,
    },
    /// Two patterns that differ only in a parameter name would resolve to
    /// the same position in the trie, e.g. `/x/:a` and `/x/:b`.
    ParamNameConflict {
        /// The parameter name the new pattern tried to register.
        new: String,
        /// The parameter name already registered at this position.
        existing: String,
    },
}

impl fmt::Display for InsertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadPattern { pattern } => {
                write!(f, "malformed route pattern '{}'", pattern)
            }
            Self::CatchAllNotLast { pattern } => write!(
                f,
                "catch-all segments are only allowed at the end of a pattern, in '{}'",
                pattern
            ),
            Self::ParamNameConflict { new, existing } => write!(
                f,
                "parameter name '{}' conflicts with '{}' previously registered at the same position",
                new, existing
            ),
        }
    }
}

impl std::error::Error for InsertError {}
