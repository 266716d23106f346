use super::DataTree;
use crate::core::error::DataError;
use crate::core::hierarchy::ids::NodeId;
use crate::core::metadata::kind::NodeKind;
use crate::core::value::Scalar;
use std::path::{Path, PathBuf};

const BASE_NAME: &str = "baseName";
const REL_PATH: &str = "relPath";
const PROJECT: &str = "project";

impl DataTree {
    fn ensure_file_ref(&self, id: NodeId) -> Result<(), DataError> {
        match self.kind(id)? {
            NodeKind::FileRef => Ok(()),
            other => Err(self.type_mismatch(id, format!("file path on {other} node"), 5)),
        }
    }

    fn text_field(&self, id: NodeId, field: &str) -> Result<Option<&str>, DataError> {
        let Some(child) = self.attribute(id, field) else {
            return Ok(None);
        };
        Ok(match self.value(child)? {
            Some(Scalar::Str(s)) if !s.is_empty() => Some(s.as_str()),
            _ => None,
        })
    }

    /// Points the reference at `path`: the whole path goes to `baseName` and
    /// any project-relative location is cleared.
    pub fn set_full_path(&mut self, id: NodeId, path: &str) -> Result<(), DataError> {
        self.ensure_file_ref(id)?;
        let base = self.get_attribute(id, BASE_NAME)?;
        self.set_value(base, path)?;
        for field in [REL_PATH, PROJECT] {
            if let Some(child) = self.attribute(id, field) {
                self.unset(child, None)?;
            }
        }
        Ok(())
    }

    /// `relPath` joined with `baseName`, or `baseName` alone.
    pub fn full_path(&self, id: NodeId) -> Result<Option<String>, DataError> {
        self.ensure_file_ref(id)?;
        let Some(base) = self.text_field(id, BASE_NAME)? else {
            return Ok(None);
        };
        let path = match self.text_field(id, REL_PATH)? {
            Some(rel) => Path::new(rel).join(base),
            None => PathBuf::from(base),
        };
        Ok(Some(path.to_string_lossy().into_owned()))
    }

    /// Whether the referenced path exists on disk.
    pub fn file_exists(&self, id: NodeId) -> Result<bool, DataError> {
        Ok(self.full_path(id)?.is_some_and(|p| Path::new(&p).exists()))
    }
}
