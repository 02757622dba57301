//! Request schema validation.
//!
//! Each (method, layout version) pair has at most one XSD file. When the
//! file is absent the request counts as valid and no validator runs.

use crate::config::ProtocolVersion;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Pluggable schema validator.
pub trait SchemaValidator {
    /// Validate `xml` against the schema at `schema`, returning every issue found.
    fn validate(&self, xml: &str, schema: &Path) -> Result<(), Vec<String>>;
}

/// Location of the schema for a method and layout version.
pub fn schema_path(schemes_dir: &Path, version: ProtocolVersion, method: &str) -> PathBuf {
    schemes_dir
        .join(version.scheme_set())
        .join(format!("{}_v{}.xsd", method, version.as_str()))
}

/// Run `validator` only when a schema exists for the method.
///
/// Returns `Ok(())` when there is no schema file.
pub fn validate_if_present(
    validator: &dyn SchemaValidator,
    schemes_dir: &Path,
    version: ProtocolVersion,
    method: &str,
    xml: &str,
) -> Result<(), Vec<String>> {
    let schema = schema_path(schemes_dir, version, method);
    if !schema.is_file() {
        debug!(schema = %schema.display(), "No schema for method, skipping validation");
        return Ok(());
    }
    debug!(schema = %schema.display(), "Validating request body");
    validator.validate(xml, &schema)
}

/// Validator checking that the schema is readable and the document is
/// well-formed XML. Attach a full XSD engine through
/// [`NfseClient::with_validator`](crate::client::NfseClient::with_validator)
/// for structural checks.
#[derive(Debug, Clone, Copy, Default)]
pub struct WellFormedValidator;

impl SchemaValidator for WellFormedValidator {
    fn validate(&self, xml: &str, schema: &Path) -> Result<(), Vec<String>> {
        let mut issues = Vec::new();

        if let Err(e) = std::fs::metadata(schema) {
            issues.push(format!("Schema {} is not readable: {}", schema.display(), e));
        }

        if let Err(issue) = check_well_formed(xml) {
            issues.push(issue);
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }
}

fn check_well_formed(xml: &str) -> Result<(), String> {
    let mut reader = Reader::from_str(xml);
    let mut depth = 0usize;
    let mut roots = 0usize;

    loop {
        match reader.read_event() {
            Ok(Event::Start(_)) => {
                if depth == 0 {
                    roots += 1;
                }
                depth += 1;
            }
            Ok(Event::Empty(_)) => {
                if depth == 0 {
                    roots += 1;
                }
            }
            Ok(Event::End(_)) => depth = depth.saturating_sub(1),
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(format!(
                    "Malformed XML at position {}: {}",
                    reader.buffer_position(),
                    e
                ));
            }
            _ => {}
        }
    }

    if depth != 0 {
        return Err("Malformed XML: unclosed element".to_string());
    }
    match roots {
        0 => Err("Malformed XML: no root element".to_string()),
        1 => Ok(()),
        n => Err(format!("Malformed XML: {} root elements", n)),
    }
}
