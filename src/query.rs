//! The boolean filter language accepted by [`search`](crate::Index::search).
//!
//! A query is one or more conditions joined by ` and `:
//!
//! ```text
//! fileExtension=go and fileSize<1000 and text contains "write behind"
//! ```
//!
//! Each condition is `<dimension> <operator> <value>`, where the dimension
//! is a word, the operator is one of `=`, `!=`, `<`, `<=`, `>`, `>=` or
//! `contains`, and the value is the rest of the segment with one pair of
//! surrounding quotes removed.

use std::{fmt, str::FromStr, sync::LazyLock};

use regex::Regex;

use crate::{
    document::Document,
    error::{Error, Result},
};

const CONJUNCTION: &str = " and ";

static CONDITION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z0-9_]+)\s*(=|!=|<=|>=|<|>|contains)\s*(.+)$")
        .expect("condition pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equals,
    NotEquals,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    Contains,
}

impl Operator {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Equals => "=",
            Self::NotEquals => "!=",
            Self::Less => "<",
            Self::LessEq => "<=",
            Self::Greater => ">",
            Self::GreaterEq => ">=",
            Self::Contains => "contains",
        }
    }

    /// Apply an ordering operator. Non-ordering operators never match.
    fn compare<T: PartialOrd + ?Sized>(self, left: &T, right: &T) -> bool {
        match self {
            Self::Less => left < right,
            Self::LessEq => left <= right,
            Self::Greater => left > right,
            Self::GreaterEq => left >= right,
            Self::Equals | Self::NotEquals | Self::Contains => false,
        }
    }
}

impl FromStr for Operator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "=" => Self::Equals,
            "!=" => Self::NotEquals,
            "<" => Self::Less,
            "<=" => Self::LessEq,
            ">" => Self::Greater,
            ">=" => Self::GreaterEq,
            "contains" => Self::Contains,
            other => {
                return Err(Error::Format(format!(
                    "unknown operator '{other}'"
                )));
            }
        })
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `dimension operator value` triple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryCondition {
    pub dimension: String,
    pub operator: Operator,
    pub value: String,
}

impl QueryCondition {
    pub fn new(
        dimension: impl Into<String>,
        operator: Operator,
        value: impl Into<String>,
    ) -> Self {
        Self {
            dimension: dimension.into(),
            operator,
            value: value.into(),
        }
    }

    fn parse(segment: &str) -> Result<Self> {
        let caps = CONDITION.captures(segment).ok_or_else(|| {
            Error::Format(format!("invalid condition format: {segment}"))
        })?;

        let operator = caps[2].parse()?;
        let value = strip_quotes(caps[3].trim());
        if value.is_empty() {
            return Err(Error::Format(format!(
                "condition has an empty value: {segment}"
            )));
        }

        Ok(Self {
            dimension: caps[1].to_string(),
            operator,
            value: value.to_string(),
        })
    }

    /// Test this condition against a document.
    ///
    /// A dimension the document does not carry, or an empty value, never
    /// matches. Ordering operators compare numerically when the document
    /// value is a number and lexically otherwise; a numeric document value
    /// compared against a non-numeric literal is an [`Error::Value`].
    ///
    /// # Examples
    ///
    /// ```
    /// use bitscout::{Document, query::{Operator, QueryCondition}};
    ///
    /// let doc = Document::default().with_meta("fileSize", "100");
    /// let cond = QueryCondition::new("fileSize", Operator::Greater, "10");
    /// assert!(cond.evaluate(&doc).unwrap());
    /// ```
    pub fn evaluate(&self, doc: &Document) -> Result<bool> {
        let Some(actual) = self.resolve(doc) else {
            return Ok(false);
        };
        if actual.is_empty() {
            return Ok(false);
        }

        match self.operator {
            Operator::Equals => Ok(eq_ignore_case(actual, &self.value)),
            Operator::NotEquals => Ok(!eq_ignore_case(actual, &self.value)),
            Operator::Contains => Ok(actual
                .to_lowercase()
                .contains(&self.value.to_lowercase())),
            Operator::Less
            | Operator::LessEq
            | Operator::Greater
            | Operator::GreaterEq => self.evaluate_ordering(actual),
        }
    }

    fn resolve<'a>(&self, doc: &'a Document) -> Option<&'a str> {
        if let Some(value) = doc.meta.get(&self.dimension) {
            return Some(value);
        }
        match self.dimension.as_str() {
            "filename" => doc.meta.get("filename").map(String::as_str),
            "path" => Some(&doc.source),
            "text" => Some(&doc.text),
            _ => None,
        }
    }

    // Only the document side decides between numeric and lexical
    // comparison; a non-numeric literal is an error only when the document
    // side parsed.
    fn evaluate_ordering(&self, actual: &str) -> Result<bool> {
        let Ok(actual_num) = actual.parse::<f64>() else {
            return Ok(self.operator.compare(actual, self.value.as_str()));
        };
        let expected_num = self.value.parse::<f64>().map_err(|_| {
            Error::Value(format!("query value '{}' is not numeric", self.value))
        })?;
        Ok(self.operator.compare(&actual_num, &expected_num))
    }
}

impl fmt::Display for QueryCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.dimension, self.operator, self.value)
    }
}

/// A parsed query: every condition must hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub raw: String,
    pub conditions: Vec<QueryCondition>,
}

impl Query {
    /// Parse a query string.
    ///
    /// Blank segments are skipped, so a blank query parses to zero
    /// conditions. Any other segment that is not a condition is an
    /// [`Error::Format`].
    ///
    /// # Examples
    ///
    /// ```
    /// use bitscout::query::{Operator, Query};
    ///
    /// let q = Query::parse("fileExtension=go and fileSize<1000").unwrap();
    /// assert_eq!(q.conditions.len(), 2);
    /// assert_eq!(q.conditions[1].operator, Operator::Less);
    ///
    /// assert!(Query::parse("bogus").is_err());
    /// ```
    pub fn parse(raw: &str) -> Result<Self> {
        let conditions = raw
            .split(CONJUNCTION)
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .map(QueryCondition::parse)
            .collect::<Result<Vec<_>>>()?;

        tracing::trace!(
            query = raw,
            conditions = conditions.len(),
            "parsed query"
        );

        Ok(Self {
            raw: raw.to_string(),
            conditions,
        })
    }

    pub fn evaluate(&self, doc: &Document) -> Result<bool> {
        for condition in &self.conditions {
            if !condition.evaluate(doc)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

fn strip_quotes(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2
            && let Some(inner) = value
                .strip_prefix(quote)
                .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}

fn eq_ignore_case(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}
