//! Per-language output validators.
//!
//! Validators are pure and deterministic: the same content always yields the
//! same outcome. They are registered by language tag, with aliases, in a
//! [`ValidatorRegistry`]; adding a language is one registration. Languages
//! without a validator resolve to [`ValidationOutcome::NoValidator`].

mod lexical;
mod markup;
mod structured;
mod syntax;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::core::ValidationStatus;
use crate::parsing::normalize_language;

pub use lexical::{CssValidator, MarkdownValidator, ShellValidator, SqlValidator};
pub use markup::{HtmlValidator, XmlValidator};
pub use structured::{JsonValidator, TomlValidator, YamlValidator};
pub use syntax::TreeSitterValidator;

/// Why content failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Human-readable description.
    pub message: String,
    /// 1-based line, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    /// 1-based column, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<usize>,
}

impl Diagnostic {
    /// Creates a diagnostic without a position.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: None,
            column: None,
        }
    }

    /// Creates a diagnostic at a 1-based line and column.
    #[must_use]
    pub fn at(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            message: message.into(),
            line: Some(line),
            column: Some(column),
        }
    }

    /// Creates a diagnostic at a byte offset into `content`.
    #[must_use]
    pub fn at_offset(message: impl Into<String>, content: &str, offset: usize) -> Self {
        let (line, column) = line_col(content, offset);
        Self::at(message, line, column)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.line, self.column) {
            (Some(line), Some(column)) => write!(f, "line {line}, column {column}: {}", self.message),
            (Some(line), None) => write!(f, "line {line}: {}", self.message),
            _ => write!(f, "{}", self.message),
        }
    }
}

/// 1-based line and column of a byte offset.
#[must_use]
pub fn line_col(content: &str, offset: usize) -> (usize, usize) {
    let mut offset = offset.min(content.len());
    while !content.is_char_boundary(offset) {
        offset -= 1;
    }
    let before = &content[..offset];
    let line = before.matches('\n').count() + 1;
    let column = before.rsplit('\n').next().map_or(0, |l| l.chars().count()) + 1;
    (line, column)
}

/// Result of validating one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    /// The content is syntactically acceptable.
    Passed,
    /// The content is broken.
    Failed(Diagnostic),
    /// No validator is registered for the language.
    NoValidator,
}

impl ValidationOutcome {
    /// The status recorded on a generation result.
    #[must_use]
    pub fn status(&self) -> ValidationStatus {
        match self {
            Self::Passed => ValidationStatus::Passed,
            Self::Failed(_) => ValidationStatus::Failed,
            Self::NoValidator => ValidationStatus::SkippedNoValidator,
        }
    }

    /// The diagnostic, if validation failed.
    #[must_use]
    pub fn diagnostic(&self) -> Option<&Diagnostic> {
        match self {
            Self::Failed(d) => Some(d),
            _ => None,
        }
    }
}

/// A syntax or lint-level check for one language.
pub trait Validator: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Checks `content`.
    fn validate(&self, content: &str) -> Result<(), Diagnostic>;
}

/// A validator built from a closure.
pub struct FnValidator<F> {
    name: String,
    check: F,
}

impl<F> FnValidator<F>
where
    F: Fn(&str) -> Result<(), Diagnostic> + Send + Sync,
{
    /// Wraps `check` as a validator.
    pub fn new(name: impl Into<String>, check: F) -> Self {
        Self {
            name: name.into(),
            check,
        }
    }
}

impl<F> Validator for FnValidator<F>
where
    F: Fn(&str) -> Result<(), Diagnostic> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self, content: &str) -> Result<(), Diagnostic> {
        (self.check)(content)
    }
}

/// Maps language tags to validators.
#[derive(Clone, Default)]
pub struct ValidatorRegistry {
    validators: HashMap<String, Arc<dyn Validator>>,
}

impl fmt::Debug for ValidatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatorRegistry")
            .field("languages", &self.languages())
            .finish()
    }
}

impl ValidatorRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the built-in validators.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(&["python", "py"], TreeSitterValidator::python());
        registry.register(
            &["javascript", "js", "jsx", "mjs", "cjs", "node"],
            TreeSitterValidator::javascript(),
        );
        registry.register(&["typescript", "ts"], TreeSitterValidator::typescript());
        registry.register(&["tsx"], TreeSitterValidator::tsx());
        registry.register(&["rust", "rs"], TreeSitterValidator::rust());
        registry.register(&["go", "golang"], TreeSitterValidator::go());
        registry.register(&["java"], TreeSitterValidator::java());
        registry.register(&["json"], JsonValidator);
        registry.register(&["yaml", "yml"], YamlValidator);
        registry.register(&["toml"], TomlValidator);
        registry.register(&["xml", "svg"], XmlValidator);
        registry.register(&["html", "htm"], HtmlValidator);
        registry.register(&["css"], CssValidator);
        registry.register(&["shell", "sh", "bash", "zsh"], ShellValidator);
        registry.register(&["sql"], SqlValidator);
        registry.register(&["markdown", "md"], MarkdownValidator);
        registry
    }

    /// Registers `validator` under every tag in `tags`, replacing earlier ones.
    pub fn register<V>(&mut self, tags: &[&str], validator: V)
    where
        V: Validator + 'static,
    {
        let validator: Arc<dyn Validator> = Arc::new(validator);
        for tag in tags {
            self.validators
                .insert(normalize_language(tag), Arc::clone(&validator));
        }
    }

    /// Builder form of [`register`](Self::register).
    #[must_use]
    pub fn with_validator<V>(mut self, tags: &[&str], validator: V) -> Self
    where
        V: Validator + 'static,
    {
        self.register(tags, validator);
        self
    }

    /// Returns true if a validator is registered for `language`.
    #[must_use]
    pub fn has_validator(&self, language: &str) -> bool {
        self.validators.contains_key(&normalize_language(language))
    }

    /// Every registered tag, sorted.
    #[must_use]
    pub fn languages(&self) -> Vec<String> {
        self.validators
            .keys()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Validates `content` as `language`.
    #[must_use]
    pub fn validate(&self, language: &str, content: &str) -> ValidationOutcome {
        let tag = normalize_language(language);
        let Some(validator) = self.validators.get(&tag) else {
            debug!(language = %tag, "No validator registered");
            return ValidationOutcome::NoValidator;
        };
        match validator.validate(content) {
            Ok(()) => ValidationOutcome::Passed,
            Err(diagnostic) => {
                debug!(
                    language = %tag,
                    validator = validator.name(),
                    diagnostic = %diagnostic,
                    "Validation failed"
                );
                ValidationOutcome::Failed(diagnostic)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_col() {
        let text = "ab\ncdé\nf";
        assert_eq!(line_col(text, 0), (1, 1));
        assert_eq!(line_col(text, 3), (2, 1));
        assert_eq!(line_col(text, 8), (3, 1));
        assert_eq!(line_col(text, 100), (3, 2));
    }

    #[test]
    fn test_diagnostic_display() {
        assert_eq!(Diagnostic::at("bad", 2, 5).to_string(), "line 2, column 5: bad");
        assert_eq!(Diagnostic::new("bad").to_string(), "bad");
    }

    #[test]
    fn test_unknown_languages_have_no_validator() {
        let registry = ValidatorRegistry::with_defaults();
        for tag in ["r", "text", "dockerfile", ""] {
            assert_eq!(registry.validate(tag, "anything"), ValidationOutcome::NoValidator);
        }
        assert_eq!(
            ValidationOutcome::NoValidator.status(),
            ValidationStatus::SkippedNoValidator
        );
    }

    #[test]
    fn test_aliases_resolve_case_insensitively() {
        let registry = ValidatorRegistry::with_defaults();
        assert!(registry.has_validator("PY"));
        assert!(registry.has_validator("yml"));
        assert!(registry.has_validator("Bash"));
        assert_eq!(registry.validate("JSON", "{\"a\": 1}"), ValidationOutcome::Passed);
    }

    #[test]
    fn test_register_custom_language() {
        let registry = ValidatorRegistry::new().with_validator(
            &["r"],
            FnValidator::new("r-nonempty", |content: &str| {
                if content.trim().is_empty() {
                    Err(Diagnostic::new("empty script"))
                } else {
                    Ok(())
                }
            }),
        );
        assert_eq!(registry.validate("r", "x <- 1"), ValidationOutcome::Passed);
        assert!(matches!(registry.validate("r", "  "), ValidationOutcome::Failed(_)));
        assert_eq!(registry.languages(), vec!["r".to_string()]);
    }

    #[test]
    fn test_validation_is_idempotent() {
        let registry = ValidatorRegistry::with_defaults();
        let samples = [
            ("python", "def f(:\n    pass\n"),
            ("python", "print('ok')\n"),
            ("json", "{\"a\": [1, 2}"),
            ("yaml", "a: 1\nb: [2, 3]\n"),
            ("html", "<div></span></div>"),
            ("bash", "if true; then\necho hi\n"),
            ("sql", "SELECT 1"),
        ];
        for (language, content) in samples {
            let first = registry.validate(language, content);
            let second = registry.validate(language, content);
            assert_eq!(first, second, "{language} validation changed between runs");
        }
    }
}
