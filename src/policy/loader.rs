use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::domain::RuleDocument;
use crate::rules::{RuleError, RuleSnapshot};

/// Errors that can occur during rule loading.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Compile error: {0}")]
    Compile(#[from] RuleError),
}

/// Parse, validate and compile a rule document from raw bytes.
pub fn load_rules_from_bytes(bytes: &[u8]) -> Result<RuleSnapshot, LoadError> {
    let document: RuleDocument = serde_yaml::from_slice(bytes)?;

    validate_document(&document)?;

    Ok(RuleSnapshot::compile(&document, fingerprint(bytes))?)
}

/// Load a rule snapshot from a YAML file.
pub fn load_rules(path: impl AsRef<Path>) -> Result<RuleSnapshot, LoadError> {
    let bytes = fs::read(path)?;
    load_rules_from_bytes(&bytes)
}

/// Hex SHA-256 of the rule source, used to detect changes.
pub fn fingerprint(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Document-level checks that no single rule can make on its own.
fn validate_document(document: &RuleDocument) -> Result<(), LoadError> {
    if let Some(version) = &document.version {
        if version.trim().is_empty() {
            return Err(LoadError::Validation(
                "Rule document version cannot be blank".to_string(),
            ));
        }
    }

    let mut seen_ids = HashSet::new();
    for rule in &document.rules {
        if !seen_ids.insert(rule.id.trim()) {
            return Err(LoadError::Validation(format!(
                "Duplicate rule ID: {}",
                rule.id
            )));
        }
    }

    for suppression in &document.suppressions {
        let generic = suppression.generic.trim();
        if !seen_ids.contains(generic) {
            return Err(LoadError::Validation(format!(
                "Suppression references unknown generic rule: {}",
                suppression.generic
            )));
        }
        if suppression.specific.is_empty() {
            return Err(LoadError::Validation(format!(
                "Suppression for {} lists no specific rules",
                suppression.generic
            )));
        }
        for specific in &suppression.specific {
            let specific = specific.trim();
            if !seen_ids.contains(specific) {
                return Err(LoadError::Validation(format!(
                    "Suppression references unknown specific rule: {}",
                    specific
                )));
            }
            if specific == generic {
                return Err(LoadError::Validation(format!(
                    "Rule {} cannot suppress itself",
                    generic
                )));
            }
        }
    }

    Ok(())
}

/// Loader bound to one rule source path.
#[derive(Debug, Clone)]
pub struct RuleLoader {
    path: PathBuf,
}

impl RuleLoader {
    /// Create a new rule loader.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        RuleLoader { path: path.into() }
    }

    /// Load and compile the full rule set.
    pub fn load(&self) -> Result<RuleSnapshot, LoadError> {
        load_rules(&self.path)
    }

    /// Fingerprint the current source without compiling it.
    pub fn current_fingerprint(&self) -> Result<String, LoadError> {
        let bytes = fs::read(&self.path)?;
        Ok(fingerprint(&bytes))
    }

    /// Get the rule source path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Action;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_rules(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn test_load_rules() {
        let file = write_rules(
            r#"
version: "test-1.0"
rules:
  - id: SSN-1.0
    pattern: '\b\d{3}-\d{2}-\d{4}\b'
    action: block
  - id: LONG-1
    max_length: 5000
    directions: [outbound]
    action: flag
"#,
        );

        let snapshot = load_rules(file.path()).unwrap();

        assert_eq!(snapshot.version.as_deref(), Some("test-1.0"));
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.rules[0].action(), Action::Block);
        assert_eq!(snapshot.fingerprint.len(), 64);
    }

    #[test]
    fn test_validation_duplicate_ids() {
        let file = write_rules(
            r#"
rules:
  - id: R1
    pattern: a
    action: block
  - id: R1
    pattern: b
    action: flag
"#,
        );

        let result = load_rules(file.path());
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Duplicate"));
    }

    #[test]
    fn test_validation_unknown_suppression_target() {
        let file = write_rules(
            r#"
rules:
  - id: CRED-GENERIC
    pattern: secret
    action: flag
suppressions:
  - generic: CRED-GENERIC
    specific: [CRED-MISSING]
"#,
        );

        let err = load_rules(file.path()).unwrap_err();
        assert!(matches!(err, LoadError::Validation(_)));
        assert!(err.to_string().contains("CRED-MISSING"));
    }

    #[test]
    fn test_invalid_pattern_is_compile_error() {
        let file = write_rules(
            r#"
rules:
  - id: R1
    pattern: '(['
    action: block
"#,
        );

        assert!(matches!(
            load_rules(file.path()),
            Err(LoadError::Compile(RuleError::InvalidPattern { .. }))
        ));
    }

    #[test]
    fn test_bad_action_is_yaml_error() {
        let file = write_rules(
            r#"
rules:
  - id: R1
    pattern: a
    action: quarantine
"#,
        );

        assert!(matches!(load_rules(file.path()), Err(LoadError::Yaml(_))));
    }

    #[test]
    fn test_loader_fingerprint_tracks_content() {
        let file = write_rules("rules: []");
        let loader = RuleLoader::new(file.path());

        let before = loader.current_fingerprint().unwrap();
        assert_eq!(before, loader.load().unwrap().fingerprint);

        std::fs::write(file.path(), "version: v2\nrules: []\n").unwrap();
        assert_ne!(before, loader.current_fingerprint().unwrap());
    }
}
