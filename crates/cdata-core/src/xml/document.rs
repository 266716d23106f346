use super::codec::EncodeOptions;
use super::element::Element;
use crate::core::error::DataError;
use crate::core::hierarchy::ids::NodeId;
use crate::tree::DataTree;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use tracing::{info, instrument};

/// Root attribute naming the document function.
pub const FUNCTION_ATTRIBUTE: &str = "function";

/// Defines how a node tree is stored as a whole XML document.
///
/// Both document flavours share one element grammar. The root element is
/// tagged with the node's name and carries a `function` attribute telling the
/// flavours apart; implementors choose what the body holds.
pub trait DataDocument {
    /// Value of the root `function` attribute.
    const FUNCTION: &'static str;

    /// What the body of the document carries.
    fn encode_options() -> EncodeOptions;

    /// Whether unrecognised elements are skipped on load.
    fn ignore_missing() -> bool;

    /// Brings the tree into shape before it is encoded.
    fn prepare(_tree: &mut DataTree, _root: NodeId) -> Result<(), DataError> {
        Ok(())
    }

    /// Loads a document into `root`.
    ///
    /// # Arguments
    ///
    /// * `tree` - The tree owning `root`.
    /// * `root` - The node the document describes.
    /// * `reader` - The buffered reader to read from.
    ///
    /// # Return
    ///
    /// Returns `Ok(())` once the body has been decoded into `root`.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::Structural`] (code 107) if the root tag is not the
    /// node's name or the document has another function, and any error raised
    /// while parsing or decoding the body.
    fn read_from(tree: &mut DataTree, root: NodeId, reader: &mut impl BufRead) -> Result<(), DataError> {
        let element = Element::read_from(reader)?;
        let expected = tree.name(root)?;
        if element.name != expected {
            let details = format!("document root <{}> does not describe '{expected}'", element.name);
            return Err(tree.structural(root, details, 107));
        }
        match element.attribute(FUNCTION_ATTRIBUTE) {
            Some(function) if function == Self::FUNCTION => {}
            other => {
                let details = format!(
                    "expected a {} document, found {}",
                    Self::FUNCTION,
                    other.unwrap_or("no function")
                );
                return Err(tree.structural(root, details, 107));
            }
        }
        tree.decode(root, &element, Self::ignore_missing())
    }

    /// Writes `root` as a document.
    ///
    /// # Arguments
    ///
    /// * `tree` - The tree owning `root`.
    /// * `root` - The node to write.
    /// * `writer` - The writer to output to.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails or the writer does.
    fn write_to(tree: &mut DataTree, root: NodeId, writer: &mut impl Write) -> Result<(), DataError> {
        Self::prepare(tree, root)?;
        let mut element = tree.encode_with(root, None, &Self::encode_options())?;
        element.set_attribute(FUNCTION_ATTRIBUTE, Self::FUNCTION);
        element.write_to(writer)?;
        Ok(())
    }

    #[instrument(skip_all, fields(function = Self::FUNCTION))]
    fn read_from_path<P: AsRef<Path>>(tree: &mut DataTree, root: NodeId, path: P) -> Result<(), DataError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| io_error(path, e))?;
        let mut reader = BufReader::new(file);
        Self::read_from(tree, root, &mut reader)?;
        info!(path = %path.display(), "Loaded document");
        Ok(())
    }

    #[instrument(skip_all, fields(function = Self::FUNCTION))]
    fn write_to_path<P: AsRef<Path>>(tree: &mut DataTree, root: NodeId, path: P) -> Result<(), DataError> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| io_error(path, e))?;
        let mut writer = BufWriter::new(file);
        Self::write_to(tree, root, &mut writer)?;
        writer.flush().map_err(|e| io_error(path, e))?;
        info!(path = %path.display(), "Wrote document");
        Ok(())
    }
}

fn io_error(path: &Path, source: std::io::Error) -> DataError {
    DataError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Structure and qualifier overrides of every declared field, without values.
pub struct DefinitionDocument;

impl DataDocument for DefinitionDocument {
    const FUNCTION: &'static str = "DEF";

    fn encode_options() -> EncodeOptions {
        EncodeOptions {
            exclude_unset: false,
            include_values: false,
            include_qualifiers: true,
        }
    }

    fn ignore_missing() -> bool {
        false
    }

    fn prepare(tree: &mut DataTree, root: NodeId) -> Result<(), DataError> {
        tree.realize_all(root)
    }
}

/// Values of explicitly set fields, read against an already-defined structure.
pub struct ParameterDocument;

impl DataDocument for ParameterDocument {
    const FUNCTION: &'static str = "PARAMS";

    fn encode_options() -> EncodeOptions {
        EncodeOptions {
            exclude_unset: true,
            include_values: true,
            include_qualifiers: false,
        }
    }

    fn ignore_missing() -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::metadata::literal::Literal;
    use crate::core::state::ValueState;
    use crate::core::value::Value;
    use crate::tree::test_support::tree;
    use std::sync::{Arc, Mutex};

    const FIELDS: [&str; 7] = ["NCYCLES", "MODE", "TITLE", "WEIGHT", "USE_TLS", "CELLS", "XYZIN"];

    fn configured(tree: &mut DataTree) -> NodeId {
        let control = tree.create("CControl", "control").unwrap();
        let title = tree.get_attribute(control, "TITLE").unwrap();
        tree.set_qualifier(title, "maxLength", Some(Literal::Int(20))).unwrap();
        tree.update(
            control,
            Value::map([
                ("NCYCLES", Value::from(3)),
                ("MODE", Value::from("fast")),
                ("TITLE", Value::from("Refinement")),
                ("WEIGHT", Value::from(0.5)),
                ("USE_TLS", Value::from(false)),
                ("XYZIN", Value::from("/data/model.pdb")),
            ]),
        )
        .unwrap();
        let cells = tree.get_attribute(control, "CELLS").unwrap();
        tree.append(cells, Value::map([("a", 1.0), ("b", 2.0)])).unwrap();
        control
    }

    fn write<D: DataDocument>(tree: &mut DataTree, root: NodeId) -> Vec<u8> {
        let mut buffer = Vec::new();
        D::write_to(tree, root, &mut buffer).unwrap();
        buffer
    }

    #[test]
    fn definition_then_parameters_rebuild_the_node() {
        let mut source = tree();
        let control = configured(&mut source);
        let definition = write::<DefinitionDocument>(&mut source, control);
        let parameters = write::<ParameterDocument>(&mut source, control);

        let mut target = tree();
        let loaded = target.create("CControl", "control").unwrap();
        DefinitionDocument::read_from(&mut target, loaded, &mut definition.as_slice()).unwrap();
        let title = target.attribute(loaded, "TITLE").unwrap();
        assert_eq!(target.qualifier(title, "maxLength").unwrap(), Some(&Literal::Int(20)));
        assert_eq!(target.value(title).unwrap(), None);

        ParameterDocument::read_from(&mut target, loaded, &mut parameters.as_slice()).unwrap();
        assert_eq!(target.get(loaded).unwrap(), source.get(control).unwrap());
        for field in FIELDS {
            assert_eq!(
                target.get_value_state(loaded, Some(field)).unwrap(),
                ValueState::ExplicitlySet,
                "{field}"
            );
        }
    }

    #[test]
    fn loading_a_definition_sets_nothing() {
        let mut source = tree();
        let control = configured(&mut source);
        let definition = write::<DefinitionDocument>(&mut source, control);

        let mut target = tree();
        let loaded = target.create("CControl", "control").unwrap();
        DefinitionDocument::read_from(&mut target, loaded, &mut definition.as_slice()).unwrap();
        let cells = target.attribute(loaded, "CELLS").unwrap();
        assert_eq!(target.list_items(cells).unwrap().len(), 1);
        assert!(!target.is_set(cells, None, false, false, true).unwrap());
        assert!(!target.is_set(loaded, None, false, false, true).unwrap());

        let parameters = String::from_utf8(write::<ParameterDocument>(&mut target, loaded)).unwrap();
        assert!(!parameters.contains("CELLS"));
    }

    #[test]
    fn definition_documents_carry_no_values() {
        let mut tree = tree();
        let control = configured(&mut tree);
        let xml = String::from_utf8(write::<DefinitionDocument>(&mut tree, control)).unwrap();
        assert!(xml.contains("<control function=\"DEF\">"));
        assert!(xml.contains("<CCycles id=\"NCYCLES\"/>"));
        assert!(xml.contains("<maxLength>20</maxLength>"));
        assert!(!xml.contains("Refinement"));
    }

    #[test]
    fn parameter_documents_skip_unset_fields() {
        let mut tree = tree();
        let control = tree.create("CControl", "control").unwrap();
        tree.assign(control, "NCYCLES", 5).unwrap();
        let xml = String::from_utf8(write::<ParameterDocument>(&mut tree, control)).unwrap();
        assert!(xml.contains("<CCycles id=\"NCYCLES\">5</CCycles>"));
        assert!(!xml.contains("MODE"));
        assert!(!xml.contains("qualifiers"));
    }

    #[test]
    fn mismatched_documents_are_rejected() {
        let mut tree = tree();
        let control = configured(&mut tree);
        let parameters = write::<ParameterDocument>(&mut tree, control);

        let err = DefinitionDocument::read_from(&mut tree, control, &mut parameters.as_slice()).unwrap_err();
        assert!(matches!(err, DataError::Structural { .. }));
        assert_eq!(err.code().map(|c| c.code), Some(107));

        let other = tree.create("CControl", "other").unwrap();
        let err = ParameterDocument::read_from(&mut tree, other, &mut parameters.as_slice()).unwrap_err();
        assert_eq!(err.code().map(|c| c.code), Some(107));
    }

    #[test]
    fn unparseable_documents_surface_xml_errors() {
        let mut tree = tree();
        let control = tree.create("CControl", "control").unwrap();
        let err = ParameterDocument::read_from(&mut tree, control, &mut "<control>".as_bytes()).unwrap_err();
        assert!(matches!(err, DataError::Xml(_)));
    }

    #[test]
    fn path_variants_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("control.params.xml");
        let mut source = tree();
        let control = configured(&mut source);
        ParameterDocument::write_to_path(&mut source, control, &path).unwrap();

        let mut target = tree();
        let loaded = target.create("CControl", "control").unwrap();
        ParameterDocument::read_from_path(&mut target, loaded, &path).unwrap();
        assert_eq!(target.get(loaded).unwrap(), source.get(control).unwrap());

        let missing = dir.path().join("absent.xml");
        let err = ParameterDocument::read_from_path(&mut target, loaded, &missing).unwrap_err();
        assert!(matches!(err, DataError::Io { .. }));
    }

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn saving_logs_the_destination() {
        let buffer = SharedBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::INFO)
            .finish();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("control.def.xml");
        tracing::subscriber::with_default(subscriber, || {
            let mut tree = tree();
            let control = tree.create("CControl", "control").unwrap();
            DefinitionDocument::write_to_path(&mut tree, control, &path).unwrap();
        });

        let logs = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        assert!(logs.contains("Wrote document"));
        assert!(logs.contains("control.def.xml"));
    }
}
