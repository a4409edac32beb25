//! Mapping between triples and stored documents.
//!
//! Document layout:
//!
//! | field       | content                                                  |
//! |-------------|----------------------------------------------------------|
//! | `s`, `p`    | subject and predicate names                              |
//! | `o`         | JSON value of the object                                 |
//! | `otype`     | `atom`, `string`, `integer`, `double` or `bool`          |
//! | `origin`    | provenance tag                                           |
//! | `taxonomic` | whether `p` is a taxonomic predicate                     |
//! | `since`     | lower validity bound in epoch milliseconds, if any       |
//! | `until`     | upper validity bound in epoch milliseconds, if any       |
//! | `modal`     | serialized modal context, if qualified                   |
//! | `modalKey`  | canonical key of the modal context, empty if unqualified |

use serde_json::{Number, Value};

use crate::modal::ModalIteration;
use crate::storage::{Document, Selector, StorageError};
use crate::term::Term;
use crate::time::TimeInterval;
use crate::triple::Triple;

pub(crate) const F_SUBJECT: &str = "s";
pub(crate) const F_PREDICATE: &str = "p";
pub(crate) const F_OBJECT: &str = "o";
pub(crate) const F_OBJECT_TYPE: &str = "otype";
pub(crate) const F_ORIGIN: &str = "origin";
pub(crate) const F_TAXONOMIC: &str = "taxonomic";
pub(crate) const F_SINCE: &str = "since";
pub(crate) const F_UNTIL: &str = "until";
pub(crate) const F_MODAL: &str = "modal";
pub(crate) const F_MODAL_KEY: &str = "modalKey";

pub(crate) const F_VERSION: &str = "version";

/// JSON value and type tag of an atomic term. None for variables,
/// compounds and modal operators.
pub(crate) fn encode_term(term: &Term) -> Option<(Value, &'static str)> {
    match term {
        Term::Atom(a) => Some((Value::String(a.clone()), "atom")),
        Term::String(s) => Some((Value::String(s.clone()), "string")),
        Term::Integer(i) => Some((Value::from(*i), "integer")),
        Term::Double(d) => Number::from_f64(*d).map(|n| (Value::Number(n), "double")),
        Term::Bool(b) => Some((Value::Bool(*b), "bool")),
        Term::Variable(_) | Term::Compound(_) | Term::Modal(_) => None,
    }
}

fn decode_term(value: &Value, otype: &str) -> Option<Term> {
    match otype {
        "atom" => value.as_str().map(Term::atom),
        "string" => value.as_str().map(Term::string),
        "integer" => value.as_i64().map(Term::Integer),
        "double" => value.as_f64().map(Term::Double),
        "bool" => value.as_bool().map(Term::Bool),
        _ => None,
    }
}

pub(crate) fn encode_triple(triple: &Triple, taxonomic: bool) -> Result<Document, StorageError> {
    let (object, otype) = encode_term(triple.object()).ok_or_else(|| {
        StorageError::SerializationError(format!("object '{}' cannot be stored", triple.object()))
    })?;

    let mut doc = Document::new();
    doc.insert(F_SUBJECT.to_string(), Value::from(triple.subject_name()));
    doc.insert(F_PREDICATE.to_string(), Value::from(triple.predicate_name()));
    doc.insert(F_OBJECT.to_string(), object);
    doc.insert(F_OBJECT_TYPE.to_string(), Value::from(otype));
    doc.insert(F_ORIGIN.to_string(), Value::from(triple.origin()));
    doc.insert(F_TAXONOMIC.to_string(), Value::Bool(taxonomic));
    if let Some(since) = triple.interval().since_millis() {
        doc.insert(F_SINCE.to_string(), Value::from(since));
    }
    if let Some(until) = triple.interval().until_millis() {
        doc.insert(F_UNTIL.to_string(), Value::from(until));
    }
    if !triple.frame().is_empty() {
        let modal = serde_json::to_value(triple.frame())
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;
        doc.insert(F_MODAL.to_string(), modal);
    }
    doc.insert(F_MODAL_KEY.to_string(), Value::from(triple.frame().key()));
    Ok(doc)
}

fn text<'a>(doc: &'a Document, field: &str) -> Result<&'a str, StorageError> {
    doc.get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| StorageError::SerializationError(format!("document lacks string field '{field}'")))
}

pub(crate) fn decode_triple(doc: &Document) -> Result<Triple, StorageError> {
    let subject = text(doc, F_SUBJECT)?;
    let predicate = text(doc, F_PREDICATE)?;
    let otype = text(doc, F_OBJECT_TYPE)?;
    let origin = text(doc, F_ORIGIN)?;
    let object = doc
        .get(F_OBJECT)
        .and_then(|v| decode_term(v, otype))
        .ok_or_else(|| StorageError::SerializationError(format!("object does not decode as {otype}")))?;

    let interval = TimeInterval::from_millis(
        doc.get(F_SINCE).and_then(Value::as_i64),
        doc.get(F_UNTIL).and_then(Value::as_i64),
    );
    let frame = match doc.get(F_MODAL) {
        Some(raw) => serde_json::from_value::<ModalIteration>(raw.clone())
            .map_err(|e| StorageError::SerializationError(e.to_string()))?,
        None => ModalIteration::empty(),
    };

    Triple::new(Term::atom(subject), Term::atom(predicate), object)
        .map(|t| t.with_origin(origin).with_interval(interval).with_frame(frame))
        .map_err(|e| StorageError::SerializationError(e.to_string()))
}

/// Selector matching documents that encode exactly `triple`.
pub(crate) fn exact_selector(triple: &Triple) -> Result<Selector, StorageError> {
    let doc = encode_triple(triple, false)?;
    let mut parts = Vec::with_capacity(8);
    for field in [F_SUBJECT, F_PREDICATE, F_OBJECT, F_OBJECT_TYPE, F_ORIGIN, F_MODAL_KEY] {
        if let Some(value) = doc.get(field) {
            parts.push(Selector::eq(field, value.clone()));
        }
    }
    for field in [F_SINCE, F_UNTIL] {
        parts.push(Selector::eq(field, doc.get(field).cloned().unwrap_or(Value::Null)));
    }
    Ok(Selector::and(parts))
}
