//! Data-format validators (JSON, YAML, TOML).

use serde::Deserialize;

use super::{Diagnostic, Validator};

/// JSON via `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonValidator;

impl Validator for JsonValidator {
    fn name(&self) -> &str {
        "json"
    }

    fn validate(&self, content: &str) -> Result<(), Diagnostic> {
        serde_json::from_str::<serde_json::Value>(content)
            .map(|_| ())
            .map_err(|e| Diagnostic::at(e.to_string(), e.line(), e.column()))
    }
}

/// YAML via `serde_yaml`; every document of a multi-document stream is checked.
#[derive(Debug, Clone, Copy, Default)]
pub struct YamlValidator;

impl Validator for YamlValidator {
    fn name(&self) -> &str {
        "yaml"
    }

    fn validate(&self, content: &str) -> Result<(), Diagnostic> {
        for document in serde_yaml::Deserializer::from_str(content) {
            if let Err(e) = serde_yaml::Value::deserialize(document) {
                return Err(match e.location() {
                    Some(loc) => Diagnostic::at(e.to_string(), loc.line(), loc.column()),
                    None => Diagnostic::new(e.to_string()),
                });
            }
        }
        Ok(())
    }
}

/// TOML via `toml`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TomlValidator;

impl Validator for TomlValidator {
    fn name(&self) -> &str {
        "toml"
    }

    fn validate(&self, content: &str) -> Result<(), Diagnostic> {
        match content.parse::<toml::Table>() {
            Ok(_) => Ok(()),
            Err(e) => {
                let message = e.message().to_string();
                Err(match e.span() {
                    Some(span) => Diagnostic::at_offset(message, content, span.start),
                    None => Diagnostic::new(message),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json() {
        assert!(JsonValidator.validate("{\"a\": [1, 2, 3]}").is_ok());
        let err = JsonValidator.validate("{\n  \"a\": [1, 2\n}").unwrap_err();
        assert_eq!(err.line, Some(3));
    }

    #[test]
    fn test_yaml_multi_document() {
        assert!(YamlValidator.validate("a: 1\n---\nb: [2, 3]\n").is_ok());
        assert!(YamlValidator.validate("a: 1\n---\nb: [2, 3\n").is_err());
        assert!(YamlValidator.validate("key: value\n  bad indent: x\n").is_err());
    }

    #[test]
    fn test_toml() {
        assert!(TomlValidator
            .validate("[package]\nname = \"demo\"\nversion = \"0.1.0\"\n")
            .is_ok());
        let err = TomlValidator.validate("[package]\nname = \n").unwrap_err();
        assert!(err.line.is_some());
    }
}
