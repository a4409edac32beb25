//! Document selectors.
//!
//! A small query language over JSON documents modelled on the document
//! database's filter syntax. Backends evaluate selectors natively; the
//! in-memory backend and watch streams use [`Selector::matches`].

use std::cmp::Ordering;

use serde_json::{json, Map, Number, Value};

/// A stored document.
pub type Document = Map<String, Value>;

/// A condition on a single field.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Value equals the operand.
    Eq(Value),
    /// Value differs from the operand, or is absent.
    Ne(Value),
    /// Value is one of the listed values.
    In(Vec<Value>),
    /// Value is none of the listed values.
    Nin(Vec<Value>),
    /// Value is less than the operand.
    Lt(Value),
    /// Value is at most the operand.
    Lte(Value),
    /// Value is greater than the operand.
    Gt(Value),
    /// Value is at least the operand.
    Gte(Value),
    /// Field presence matches the flag.
    Exists(bool),
}

/// A boolean combination of field conditions.
#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    /// Matches every document.
    All,
    /// A condition on the value at a dotted path.
    Field {
        /// Dotted path into the document.
        path: String,
        /// Condition on the value found there.
        condition: Condition,
    },
    /// Every part matches.
    And(Vec<Selector>),
    /// Some part matches.
    Or(Vec<Selector>),
    /// The inner selector does not match.
    Not(Box<Selector>),
}

impl Selector {
    /// A condition on one field.
    #[must_use]
    pub fn field(path: impl Into<String>, condition: Condition) -> Self {
        Self::Field {
            path: path.into(),
            condition,
        }
    }

    /// Equality on one field.
    #[must_use]
    pub fn eq(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::field(path, Condition::Eq(value.into()))
    }

    /// Membership test. A single candidate is compiled to an equality.
    #[must_use]
    pub fn one_of(path: impl Into<String>, mut values: Vec<Value>) -> Self {
        if values.len() == 1 {
            if let Some(value) = values.pop() {
                return Self::field(path, Condition::Eq(value));
            }
        }
        Self::field(path, Condition::In(values))
    }

    /// Conjunction, flattening nested conjunctions and dropping `All`.
    #[must_use]
    pub fn and(parts: Vec<Selector>) -> Self {
        let mut flat = Vec::with_capacity(parts.len());
        for part in parts {
            match part {
                Self::All => {}
                Self::And(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => Self::All,
            1 => flat.pop().unwrap_or(Self::All),
            _ => Self::And(flat),
        }
    }

    /// Disjunction. Any `All` part makes the whole `All`.
    #[must_use]
    pub fn or(parts: Vec<Selector>) -> Self {
        if parts.iter().any(|p| matches!(p, Self::All)) {
            return Self::All;
        }
        match parts.len() {
            1 => parts.into_iter().next().unwrap_or(Self::All),
            _ => Self::Or(parts),
        }
    }

    /// Complement of `inner`.
    #[must_use]
    pub fn negate(inner: Selector) -> Self {
        Self::Not(Box::new(inner))
    }

    /// Evaluates the selector against a document.
    #[must_use]
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Self::All => true,
            Self::Field { path, condition } => condition.matches(lookup_path(doc, path)),
            Self::And(parts) => parts.iter().all(|p| p.matches(doc)),
            // An empty disjunction matches nothing.
            Self::Or(parts) => parts.iter().any(|p| p.matches(doc)),
            Self::Not(inner) => !inner.matches(doc),
        }
    }

    /// Renders the selector in the database's JSON filter syntax.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::All => json!({}),
            Self::Field { path, condition } => {
                let mut map = Map::new();
                map.insert(path.clone(), condition.to_json());
                Value::Object(map)
            }
            Self::And(parts) => json!({ "$and": parts.iter().map(Self::to_json).collect::<Vec<_>>() }),
            Self::Or(parts) => json!({ "$or": parts.iter().map(Self::to_json).collect::<Vec<_>>() }),
            Self::Not(inner) => json!({ "$nor": [inner.to_json()] }),
        }
    }
}

impl Condition {
    fn matches(&self, value: Option<&Value>) -> bool {
        match self {
            Self::Eq(expected) => value.map_or(expected.is_null(), |v| values_equal(v, expected)),
            Self::Ne(expected) => !Self::Eq(expected.clone()).matches(value),
            Self::In(candidates) => candidates
                .iter()
                .any(|c| Self::Eq(c.clone()).matches(value)),
            Self::Nin(candidates) => !Self::In(candidates.clone()).matches(value),
            Self::Lt(bound) => compare(value, bound) == Some(Ordering::Less),
            Self::Lte(bound) => matches!(
                compare(value, bound),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Self::Gt(bound) => compare(value, bound) == Some(Ordering::Greater),
            Self::Gte(bound) => matches!(
                compare(value, bound),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Self::Exists(expected) => value.is_some() == *expected,
        }
    }

    fn to_json(&self) -> Value {
        match self {
            Self::Eq(v) => json!({ "$eq": v }),
            Self::Ne(v) => json!({ "$ne": v }),
            Self::In(vs) => json!({ "$in": vs }),
            Self::Nin(vs) => json!({ "$nin": vs }),
            Self::Lt(v) => json!({ "$lt": v }),
            Self::Lte(v) => json!({ "$lte": v }),
            Self::Gt(v) => json!({ "$gt": v }),
            Self::Gte(v) => json!({ "$gte": v }),
            Self::Exists(b) => json!({ "$exists": b }),
        }
    }
}

/// Resolves a dotted path such as `a.b.c`.
#[must_use]
pub fn lookup_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let first = parts.next()?;
    let mut current = doc.get(first)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// Equality with numeric values compared by magnitude (`1 == 1.0`).
#[must_use]
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y) == Some(Ordering::Equal),
        _ => a == b,
    }
}

/// Integers compare exactly; floats and mixed pairs by magnitude.
fn compare_numbers(x: &Number, y: &Number) -> Option<Ordering> {
    match (x.as_i64(), y.as_i64()) {
        (Some(x), Some(y)) => return Some(x.cmp(&y)),
        // The other side is a u64 above i64::MAX.
        (Some(_), None) if y.is_u64() => return Some(Ordering::Less),
        (None, Some(_)) if x.is_u64() => return Some(Ordering::Greater),
        _ => {}
    }
    if let (Some(x), Some(y)) = (x.as_u64(), y.as_u64()) {
        return Some(x.cmp(&y));
    }
    x.as_f64()?.partial_cmp(&y.as_f64()?)
}

fn compare(value: Option<&Value>, bound: &Value) -> Option<Ordering> {
    match (value?, bound) {
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}
