use super::literal::Literal;
use indexmap::IndexMap;
use serde::Deserialize;

/// Ordered qualifier name to value mapping.
pub type Qualifiers = IndexMap<String, Literal>;

/// The declared value type of a qualifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualifierType {
    Bool,
    Int,
    Float,
    Str,
    List,
}

impl QualifierType {
    /// Whether `value` may be stored under a qualifier of this type. Integers
    /// are accepted where floats are declared.
    pub fn accepts(&self, value: &Literal) -> bool {
        matches!(
            (self, value),
            (QualifierType::Bool, Literal::Bool(_))
                | (QualifierType::Int, Literal::Int(_))
                | (QualifierType::Float, Literal::Float(_) | Literal::Int(_))
                | (QualifierType::Str, Literal::Str(_))
                | (QualifierType::List, Literal::List(_))
        )
    }
}

/// Infers a qualifier value from XML element text.
///
/// `true`/`false` become booleans, comma-separated text becomes a list of
/// trimmed strings, otherwise an integer, then a float, then the raw string is
/// tried. Blank text carries no value.
pub fn parse_qualifier_text(text: &str) -> Option<Literal> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if text.eq_ignore_ascii_case("true") {
        return Some(Literal::Bool(true));
    }
    if text.eq_ignore_ascii_case("false") {
        return Some(Literal::Bool(false));
    }
    if text.contains(',') {
        return Some(Literal::List(
            text.split(',')
                .map(|item| Literal::Str(item.trim().to_string()))
                .collect(),
        ));
    }
    if let Ok(i) = text.parse::<i64>() {
        return Some(Literal::Int(i));
    }
    if let Ok(f) = text.parse::<f64>() {
        return Some(Literal::Float(f));
    }
    Some(Literal::Str(text.to_string()))
}

/// Brings a parsed qualifier in line with its declared type where the text
/// form is ambiguous: a single-item list has no comma, and a float such as
/// `2.0` may have been written as `2`.
pub fn conform_to_type(value: Literal, declared: Option<QualifierType>) -> Literal {
    match (declared, value) {
        (Some(QualifierType::Float), Literal::Int(i)) => Literal::Float(i as f64),
        (Some(QualifierType::List), Literal::List(items)) => {
            Literal::List(items.into_iter().map(reinfer_item).collect())
        }
        (Some(QualifierType::List), single) => Literal::List(vec![single]),
        (Some(QualifierType::Str), Literal::Int(i)) => Literal::Str(i.to_string()),
        (_, value) => value,
    }
}

fn reinfer_item(item: Literal) -> Literal {
    match item {
        Literal::Str(s) => parse_qualifier_text(&s).unwrap_or(Literal::Str(s)),
        other => other,
    }
}
