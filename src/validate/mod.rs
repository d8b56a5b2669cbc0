//! Attribute allow-list validation for policy documents.
//!
//! Every element named in the schema is checked for attributes the schema
//! does not declare. Nothing else is validated: unknown elements, missing
//! attributes and nesting are out of reach of an allow-list. A document
//! that cannot be parsed produces one `MalformedDocument` diagnostic and no
//! attribute checks.

pub mod scan;
pub mod schema;

use std::collections::HashMap;

use serde::Serialize;
use tracing::debug;

use crate::position::LineIndex;
use scan::{scan_elements, ElementSpan, ParseFailure};
pub use schema::{ElementRule, PolicySchema, SchemaError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiagnosticKind {
    UnknownAttribute,
    MalformedDocument,
}

/// A positioned validation message, rendered by the editor as a marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    pub message: String,
    pub start_line: u32,
    pub start_column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

/// Validator bound to one schema.
#[derive(Debug, Clone)]
pub struct AttributeValidator {
    schema: PolicySchema,
}

impl AttributeValidator {
    pub fn new(schema: PolicySchema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &PolicySchema {
        &self.schema
    }

    pub fn validate(&self, document: &str) -> Vec<Diagnostic> {
        validate(document, &self.schema)
    }
}

impl Default for AttributeValidator {
    fn default() -> Self {
        Self::new(PolicySchema::builtin())
    }
}

/// Validate `document` against `schema`.
///
/// Diagnostics come out grouped by schema rule, then element order, then
/// attribute order. Use [`sorted_by_position`] for reading order.
pub fn validate(document: &str, schema: &PolicySchema) -> Vec<Diagnostic> {
    let index = LineIndex::new(document);

    let elements = match scan_elements(document) {
        Ok(elements) => elements,
        Err(failure) => {
            debug!(offset = failure.offset, reason = %failure.reason, "document is malformed");
            return vec![malformed(&index, document, &failure)];
        }
    };

    let diagnostics = unknown_attributes(&index, &elements, schema);
    debug!(diagnostics = diagnostics.len(), "validated policy document");
    diagnostics
}

/// Diagnostics for scanned elements, in schema/element/attribute order.
/// Attributes without a located offset are dropped.
fn unknown_attributes(index: &LineIndex<'_>, elements: &[ElementSpan], schema: &PolicySchema) -> Vec<Diagnostic> {
    let mut by_name: HashMap<&str, Vec<&ElementSpan>> = HashMap::new();
    for element in elements {
        by_name.entry(element.name.as_str()).or_default().push(element);
    }

    let mut diagnostics = Vec::new();
    for rule in schema.rules() {
        let Some(occurrences) = by_name.get(rule.name.as_str()) else {
            continue;
        };
        for element in occurrences {
            for attr in &element.attributes {
                if rule.allows(&attr.name) {
                    continue;
                }
                let Some(offset) = attr.offset else {
                    debug!(element = %element.name, attribute = %attr.name, "attribute not located, diagnostic dropped");
                    continue;
                };
                let start = index.position(offset);
                diagnostics.push(Diagnostic {
                    severity: Severity::Error,
                    kind: DiagnosticKind::UnknownAttribute,
                    message: format!("Unknown attribute: {}", attr.name),
                    start_line: start.line,
                    start_column: start.column,
                    end_line: start.line,
                    end_column: start.column + attr.name.chars().count() as u32,
                });
            }
        }
    }

    diagnostics
}

/// Reorder diagnostics by start position, keeping the original order for ties.
pub fn sorted_by_position(mut diagnostics: Vec<Diagnostic>) -> Vec<Diagnostic> {
    diagnostics.sort_by_key(|d| (d.start_line, d.start_column));
    diagnostics
}

fn malformed(index: &LineIndex<'_>, document: &str, failure: &ParseFailure) -> Diagnostic {
    let start = index.position(failure.offset);
    let end_column = if failure.offset < document.len() {
        start.column + 1
    } else {
        start.column
    };
    Diagnostic {
        severity: Severity::Error,
        kind: DiagnosticKind::MalformedDocument,
        message: format!("Malformed document: {}", failure.reason),
        start_line: start.line,
        start_column: start.column,
        end_line: start.line,
        end_column,
    }
}
