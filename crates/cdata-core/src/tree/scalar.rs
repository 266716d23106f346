use super::DataTree;
use super::node::NodeBody;
use crate::core::error::DataError;
use crate::core::hierarchy::ids::NodeId;
use crate::core::metadata::kind::{NodeKind, ScalarKind};
use crate::core::metadata::literal::Literal;
use crate::core::metadata::qualifier::Qualifiers;
use crate::core::state::ValueState;
use crate::core::value::{Scalar, Value};

/// Qualifier checks for a scalar payload, as `(code, details)` pairs.
pub(crate) fn scalar_findings(kind: ScalarKind, qualifiers: &Qualifiers, value: &Scalar) -> Vec<(u32, String)> {
    let mut findings = Vec::new();
    match kind {
        ScalarKind::Int | ScalarKind::Float => {
            let Some(v) = value.as_f64() else {
                return findings;
            };
            if let Some(min) = qualifiers.get("min").and_then(Literal::as_f64) {
                if v < min {
                    findings.push((101, format!("Value {value} is below minimum {min}")));
                }
            }
            if let Some(max) = qualifiers.get("max").and_then(Literal::as_f64) {
                if v > max {
                    findings.push((102, format!("Value {value} is above maximum {max}")));
                }
            }
        }
        ScalarKind::String => {
            let len = value.as_str().map(|s| s.chars().count()).unwrap_or(0) as i64;
            if let Some(min) = qualifiers.get("minLength").and_then(Literal::as_i64) {
                if len < min {
                    findings.push((101, format!("String of length {len} is shorter than {min}")));
                }
            }
            if let Some(max) = qualifiers.get("maxLength").and_then(Literal::as_i64) {
                if len > max {
                    findings.push((102, format!("String of length {len} is longer than {max}")));
                }
            }
        }
        ScalarKind::Bool => {}
    }
    if kind != ScalarKind::Bool && only_enumerators(qualifiers) {
        if let Some(allowed) = qualifiers.get("enumerators").and_then(Literal::as_list) {
            let listed = allowed
                .iter()
                .any(|e| Scalar::from_literal(kind, e).is_some_and(|s| s == *value));
            if !allowed.is_empty() && !listed {
                let shown = Literal::List(allowed.to_vec());
                findings.push((103, format!("Value {value} is not in allowed values {shown}")));
            }
        }
    }
    findings
}

fn only_enumerators(qualifiers: &Qualifiers) -> bool {
    qualifiers
        .get("onlyEnumerators")
        .and_then(Literal::as_bool)
        .unwrap_or(false)
}

impl DataTree {
    /// The payload of a scalar node, if any.
    pub fn value(&self, id: NodeId) -> Result<Option<&Scalar>, DataError> {
        Ok(self.node(id)?.scalar())
    }

    /// Coerces and validates `value`, then stores it as the node's payload.
    ///
    /// On any failure the previous payload is kept. Assigning `Null` unsets
    /// the node.
    pub fn set_value(&mut self, id: NodeId, value: impl Into<Value>) -> Result<(), DataError> {
        let value = value.into();
        let kind = match self.kind(id)? {
            NodeKind::Scalar(kind) => kind,
            NodeKind::List => {
                return match value {
                    Value::List(items) => self.fill_list(id, items),
                    Value::Null => self.unset(id, None),
                    other => Err(self.type_mismatch(id, other.describe(), 5)),
                };
            }
            _ => return self.update(id, value),
        };
        if value.is_null() {
            return self.unset(id, None);
        }
        let scalar =
            Scalar::coerce(kind, &value).ok_or_else(|| self.type_mismatch(id, value.describe(), 5))?;
        let node = self.node(id)?;
        if !node.skip_validation {
            if let Some((code, details)) = scalar_findings(kind, &node.qualifiers, &scalar)
                .into_iter()
                .next()
            {
                return Err(self.violation(id, details, code));
            }
        }
        self.store_scalar(id, scalar)?;
        self.mark_self(id, ValueState::ExplicitlySet)
    }

    pub(crate) fn store_scalar(&mut self, id: NodeId, scalar: Scalar) -> Result<(), DataError> {
        if let NodeBody::Scalar(slot) = &mut self.node_mut(id)?.body {
            *slot = Some(scalar);
        }
        Ok(())
    }

    /// Runs `f` with qualifier validation suspended on `id`, restoring the
    /// previous mode afterwards whatever the outcome.
    pub fn with_validation_suspended<R>(
        &mut self,
        id: NodeId,
        f: impl FnOnce(&mut DataTree) -> Result<R, DataError>,
    ) -> Result<R, DataError> {
        let previous = self.node(id)?.skip_validation;
        self.node_mut(id)?.skip_validation = true;
        let result = f(self);
        if let Ok(node) = self.node_mut(id) {
            node.skip_validation = previous;
        }
        result
    }

    pub fn set_skip_validation(&mut self, id: NodeId, skip: bool) -> Result<(), DataError> {
        self.node_mut(id)?.skip_validation = skip;
        Ok(())
    }

    /// Orders two scalar nodes by payload. Unset or incomparable payloads
    /// yield `None`.
    pub fn compare_values(&self, a: NodeId, b: NodeId) -> Result<Option<std::cmp::Ordering>, DataError> {
        match (self.value(a)?, self.value(b)?) {
            (Some(x), Some(y)) => Ok(x.compare(y)),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::tree;
    use super::*;

    #[test]
    fn bounded_int_accepts_in_range_and_keeps_value_on_violation() {
        let mut tree = tree();
        let cycles = tree.create("CCycles", "NCYCLES").unwrap();

        tree.set_value(cycles, 5).unwrap();
        assert!(tree.is_set(cycles, None, false, false, true).unwrap());
        assert_eq!(tree.value(cycles).unwrap(), Some(&Scalar::Int(5)));

        let err = tree.set_value(cycles, 20).unwrap_err();
        assert!(matches!(err, DataError::ConstraintViolation { .. }));
        assert_eq!(err.code().map(|c| c.code), Some(102));
        assert_eq!(tree.value(cycles).unwrap(), Some(&Scalar::Int(5)));
    }

    #[test]
    fn strings_are_coerced_to_declared_kind() {
        let mut tree = tree();
        let weight = tree.create("CFloat", "WEIGHT").unwrap();
        tree.set_value(weight, "0.25").unwrap();
        assert_eq!(tree.value(weight).unwrap(), Some(&Scalar::Float(0.25)));

        let flag = tree.create("CBoolean", "USE_TLS").unwrap();
        tree.set_value(flag, "off").unwrap();
        assert_eq!(tree.value(flag).unwrap(), Some(&Scalar::Bool(false)));

        let err = tree.set_value(weight, "heavy").unwrap_err();
        assert!(matches!(err, DataError::TypeMismatch { .. }));
        assert_eq!(err.code().map(|c| c.code), Some(5));
    }

    #[test]
    fn only_enumerators_restricts_strings() {
        let mut tree = tree();
        let mode = tree.create("CMode", "MODE").unwrap();
        tree.set_value(mode, "fast").unwrap();
        let err = tree.set_value(mode, "medium").unwrap_err();
        assert_eq!(err.code().map(|c| c.code), Some(103));
        assert_eq!(tree.value(mode).unwrap(), Some(&Scalar::Str("fast".into())));
    }

    #[test]
    fn suspended_validation_is_restored() {
        let mut tree = tree();
        let cycles = tree.create("CCycles", "NCYCLES").unwrap();
        tree.with_validation_suspended(cycles, |t| t.set_value(cycles, 50))
            .unwrap();
        assert_eq!(tree.value(cycles).unwrap(), Some(&Scalar::Int(50)));
        assert!(!tree.node(cycles).unwrap().skips_validation());
        assert!(tree.set_value(cycles, 60).is_err());
    }

    #[test]
    fn null_unsets_the_payload() {
        let mut tree = tree();
        let title = tree.create("CString", "TITLE").unwrap();
        tree.set_value(title, "Refinement").unwrap();
        tree.set_value(title, Value::Null).unwrap();
        assert_eq!(tree.value(title).unwrap(), None);
        assert_eq!(tree.get_value_state(title, None).unwrap(), ValueState::NotSet);
    }

    #[test]
    fn string_length_bounds_are_checked() {
        let mut q = Qualifiers::new();
        q.insert("minLength".into(), Literal::Int(2));
        q.insert("maxLength".into(), Literal::Int(4));
        let short = scalar_findings(ScalarKind::String, &q, &Scalar::Str("a".into()));
        assert_eq!(short[0].0, 101);
        let long = scalar_findings(ScalarKind::String, &q, &Scalar::Str("abcde".into()));
        assert_eq!(long[0].0, 102);
        assert!(scalar_findings(ScalarKind::String, &q, &Scalar::Str("abc".into())).is_empty());
    }

    #[test]
    fn compares_payloads_of_two_nodes() {
        let mut tree = tree();
        let a = tree.create("CInt", "a").unwrap();
        let b = tree.create("CFloat", "b").unwrap();
        tree.set_value(a, 1).unwrap();
        tree.set_value(b, 1.5).unwrap();
        assert_eq!(tree.compare_values(a, b).unwrap(), Some(std::cmp::Ordering::Less));
    }
}
