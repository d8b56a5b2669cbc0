//! Policy schema catalog: which attributes each policy element may carry.
//!
//! The built-in catalog covers the gateway's standard policies. A custom
//! catalog can be loaded from YAML:
//!
//! ```yaml
//! elements:
//!   - name: set-header
//!     attributes: [name, exists-action]
//! ```

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to read schema {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid schema YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("element declared twice: {0}")]
    DuplicateElement(String),
}

/// Allowed attributes for one element name.
#[derive(Debug, Clone)]
pub struct ElementRule {
    pub name: String,
    pub allowed_attributes: HashSet<String>,
}

impl ElementRule {
    pub fn new<I, S>(name: &str, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.to_string(),
            allowed_attributes: attributes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn allows(&self, attribute: &str) -> bool {
        self.allowed_attributes.contains(attribute)
    }
}

/// Ordered element catalog. Order is significant: the validator reports
/// diagnostics rule by rule.
#[derive(Debug, Clone, Default)]
pub struct PolicySchema {
    rules: Vec<ElementRule>,
    by_name: HashMap<String, usize>,
}

#[derive(Debug, Deserialize)]
struct SchemaYaml {
    #[serde(default)]
    elements: Vec<ElementYaml>,
}

#[derive(Debug, Deserialize)]
struct ElementYaml {
    name: String,
    #[serde(default)]
    attributes: Vec<String>,
}

/// Standard gateway policies and their top-level attributes.
const BUILTIN: &[(&str, &[&str])] = &[
    ("check-header", &["name", "failed-check-httpcode", "failed-check-error-message"]),
    ("rate-limit", &["calls", "renewal-period"]),
    ("ip-filter", &["action"]),
    ("quota", &["calls", "bandwidth", "renewal-period"]),
    ("validate-jwt", &["header-name", "failed-validation-httpcode", "failed-validation-error-message"]),
    ("choose", &[]),
    ("mock-response", &["status-code", "content-type"]),
    ("retry", &["condition", "count", "interval", "delta", "max-interval", "first-fast-retry"]),
    ("return-response", &[]),
    ("send-request", &["mode", "response-variable-name"]),
    ("set-variable", &["name", "value"]),
    ("authentication-basic", &["username", "password"]),
    ("authentication-certificate", &["thumbprint", "certificate-id"]),
    ("cache-store", &["duration"]),
    ("cache-lookup", &["vary-by-developer", "vary-by-developer-groups", "downstream-caching-type"]),
    ("allow-cross-domain-calls", &[]),
    ("cors", &["allow-credentials"]),
    ("json-to-xml", &["apply", "consider-accept-header"]),
    ("xml-to-json", &["kind"]),
    ("find-and-replace", &["from", "to"]),
    ("set-body", &[]),
    ("set-header", &["name", "exists-action"]),
    ("set-query-parameter", &["name", "exists-action"]),
    ("rewrite-uri", &["template"]),
    ("validate-content", &["unspecified-content-type-action"]),
    ("validate-parameters", &["specified-parameter-action", "unspecified-parameter-action"]),
];

impl PolicySchema {
    /// Build a schema from rules. Element names must be unique.
    pub fn new(rules: Vec<ElementRule>) -> Result<Self, SchemaError> {
        let mut by_name = HashMap::with_capacity(rules.len());
        for (i, rule) in rules.iter().enumerate() {
            if by_name.insert(rule.name.clone(), i).is_some() {
                return Err(SchemaError::DuplicateElement(rule.name.clone()));
            }
        }
        Ok(Self { rules, by_name })
    }

    /// The standard policy catalog.
    pub fn builtin() -> Self {
        let rules: Vec<ElementRule> = BUILTIN
            .iter()
            .map(|(name, attrs)| ElementRule::new(name, attrs.iter().copied()))
            .collect();
        let by_name = rules
            .iter()
            .enumerate()
            .map(|(i, r)| (r.name.clone(), i))
            .collect();
        Self { rules, by_name }
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, SchemaError> {
        let parsed: SchemaYaml = serde_yaml::from_str(yaml)?;
        let rules = parsed
            .elements
            .into_iter()
            .map(|e| ElementRule::new(&e.name, e.attributes))
            .collect();
        Self::new(rules)
    }

    pub fn load(path: &Path) -> Result<Self, SchemaError> {
        let content = std::fs::read_to_string(path).map_err(|source| SchemaError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    pub fn rules(&self) -> &[ElementRule] {
        &self.rules
    }

    pub fn rule(&self, element: &str) -> Option<&ElementRule> {
        self.by_name.get(element).map(|&i| &self.rules[i])
    }

    /// Whether `attribute` is allowed on `element`. Unknown elements allow nothing.
    pub fn allows(&self, element: &str, attribute: &str) -> bool {
        self.rule(element).is_some_and(|r| r.allows(attribute))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// One line per element, `- name - [a, b]`, in catalog order.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        for rule in &self.rules {
            let mut attrs: Vec<&str> = rule.allowed_attributes.iter().map(String::as_str).collect();
            attrs.sort_unstable();
            out.push_str(&format!("- {} - [{}]\n", rule.name, attrs.join(", ")));
        }
        out
    }
}
