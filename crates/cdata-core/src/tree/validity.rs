use super::DataTree;
use super::scalar::scalar_findings;
use crate::core::error::{DataError, ErrorReport};
use crate::core::hierarchy::ids::NodeId;
use crate::core::metadata::builtins::is_reserved_name;
use crate::core::metadata::kind::NodeKind;
use crate::core::metadata::literal::Literal;
use std::cmp::Ordering;

impl DataTree {
    /// Checks the node and everything below it against their qualifiers
    /// without raising.
    ///
    /// # Arguments
    ///
    /// * `id` - The root of the subtree to check.
    ///
    /// # Return
    ///
    /// Returns an [`ErrorReport`] with one entry per finding. Unset values
    /// are reported with code 1 (harmless) when `allowUndefined` holds and
    /// code 2 otherwise.
    pub fn validity(&self, id: NodeId) -> Result<ErrorReport, DataError> {
        let mut report = ErrorReport::new();
        self.collect_validity(id, &mut report)?;
        Ok(report)
    }

    fn qualifier_flag(&self, id: NodeId, key: &str) -> Result<bool, DataError> {
        Ok(self
            .node(id)?
            .qualifiers
            .get(key)
            .and_then(Literal::as_bool)
            .unwrap_or(false))
    }

    fn report_undefined(&self, id: NodeId, report: &mut ErrorReport) -> Result<(), DataError> {
        let code = if self.qualifier_flag(id, "allowUndefined")? { 1 } else { 2 };
        report.append(self.code(id, code), "Data has undefined value", self.path_or_name(id));
        Ok(())
    }

    fn collect_validity(&self, id: NodeId, report: &mut ErrorReport) -> Result<(), DataError> {
        let node = self.node(id)?;
        let path = self.path_or_name(id);
        match node.kind {
            NodeKind::Scalar(kind) => match node.scalar() {
                None => self.report_undefined(id, report)?,
                Some(value) => {
                    for (code, details) in scalar_findings(kind, &node.qualifiers, value) {
                        report.append(self.code(id, code), details, path.clone());
                    }
                }
            },
            NodeKind::List => {
                let items = node.list_items();
                let len = items.len() as i64;
                if let Some(min) = node.qualifiers.get("listMinLength").and_then(Literal::as_i64) {
                    if len < min {
                        report.append(self.code(id, 101), format!("{len} items, minimum {min}"), path.clone());
                    }
                }
                if let Some(max) = node.qualifiers.get("listMaxLength").and_then(Literal::as_i64) {
                    if len > max {
                        report.append(self.code(id, 102), format!("{len} items, maximum {max}"), path.clone());
                    }
                }
                let wanted = match node.qualifiers.get("listCompare").and_then(Literal::as_i64) {
                    Some(1) => Some(Ordering::Less),
                    Some(-1) => Some(Ordering::Greater),
                    _ => None,
                };
                if let Some(wanted) = wanted {
                    for (index, pair) in items.windows(2).enumerate() {
                        let ordering = self.compare_values(pair[0], pair[1])?;
                        if ordering.is_some_and(|o| o != wanted) {
                            report.append(
                                self.code(id, 103),
                                format!("items {index} and {} out of order", index + 1),
                                path.clone(),
                            );
                        }
                    }
                }
                for item in items {
                    self.collect_validity(*item, report)?;
                }
            }
            NodeKind::Composite | NodeKind::Container | NodeKind::FileRef => {
                if node.kind == NodeKind::FileRef && self.full_path(id)?.is_none() {
                    if !self.qualifier_flag(id, "allowUndefined")? {
                        self.report_undefined(id, report)?;
                    }
                    if self.qualifier_flag(id, "mustExist")? {
                        report.append(self.code(id, 4), "File does not exist", path.clone());
                    }
                    return Ok(());
                }
                if node.kind == NodeKind::FileRef
                    && self.qualifier_flag(id, "mustExist")?
                    && !self.file_exists(id)?
                {
                    report.append(self.code(id, 4), "File does not exist", path.clone());
                }
                for (name, child) in &node.slots {
                    if !is_reserved_name(name) {
                        self.collect_validity(*child, report)?;
                    }
                }
            }
        }
        Ok(())
    }
}
