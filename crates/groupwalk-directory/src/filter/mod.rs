//! Recipient filters used by dynamic groups.
//!
//! A filter is parsed once per evaluation and matched against every object
//! in scope. Attribute lookup goes through [`AttributeSource`] so the filter
//! has no knowledge of how objects are stored.

mod parser;

pub use parser::parse_filter;

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    /// Wildcard match where `*` matches any run of characters.
    Like,
    NotLike,
}

/// Right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterValue {
    Text(String),
    /// `$null`: the attribute is absent or empty.
    Null,
}

/// Parsed recipient filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecipientFilter {
    Compare {
        attribute: String,
        op: CompareOp,
        value: FilterValue,
    },
    Not(Box<RecipientFilter>),
    And(Vec<RecipientFilter>),
    Or(Vec<RecipientFilter>),
}

/// Anything a filter can be matched against.
pub trait AttributeSource {
    /// Value of `name` (case-insensitive), if set.
    fn attribute(&self, name: &str) -> Option<&str>;
}

impl RecipientFilter {
    pub fn matches<S: AttributeSource + ?Sized>(&self, source: &S) -> bool {
        match self {
            RecipientFilter::Compare {
                attribute,
                op,
                value,
            } => compare(source.attribute(attribute), *op, value),
            RecipientFilter::Not(inner) => !inner.matches(source),
            RecipientFilter::And(children) => children.iter().all(|c| c.matches(source)),
            RecipientFilter::Or(children) => children.iter().any(|c| c.matches(source)),
        }
    }
}

fn compare(actual: Option<&str>, op: CompareOp, expected: &FilterValue) -> bool {
    let actual = actual.filter(|v| !v.is_empty());
    let positive = match (expected, op) {
        (FilterValue::Null, _) => actual.is_none(),
        (FilterValue::Text(expected), CompareOp::Eq | CompareOp::Ne) => {
            actual.is_some_and(|a| a.eq_ignore_ascii_case(expected))
        }
        (FilterValue::Text(pattern), CompareOp::Like | CompareOp::NotLike) => {
            actual.is_some_and(|a| wildcard_match(pattern, a))
        }
    };
    match op {
        CompareOp::Eq | CompareOp::Like => positive,
        CompareOp::Ne | CompareOp::NotLike => !positive,
    }
}

/// Case-insensitive match where `*` in `pattern` matches any run of characters.
fn wildcard_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.to_lowercase().chars().collect();
    let text: Vec<char> = text.to_lowercase().chars().collect();

    let (mut p, mut t) = (0, 0);
    // Position of the last `*` seen and the text index it was tried at.
    let mut backtrack: Option<(usize, usize)> = None;
    while t < text.len() {
        if p < pattern.len() && pattern[p] == '*' {
            backtrack = Some((p, t));
            p += 1;
        } else if p < pattern.len() && pattern[p] == text[t] {
            p += 1;
            t += 1;
        } else if let Some((star, tried)) = backtrack {
            p = star + 1;
            t = tried + 1;
            backtrack = Some((star, tried + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|&c| c == '*')
}
