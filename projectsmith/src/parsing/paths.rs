//! Path sanitization and language inference.

/// Longest project name kept after sanitization.
pub const MAX_PROJECT_NAME_CHARS: usize = 20;

/// Longest objective slug used in fallback project names and log file names.
pub const OBJECTIVE_SLUG_CHARS: usize = 50;

/// Reduces one path segment to `[A-Za-z0-9_.-]`.
///
/// Other characters become `_`; a substituted `_` merges with any neighbouring
/// `_`, and substituted underscores at either end are trimmed. Underscores that
/// were already present (`__init__.py`) are kept.
#[must_use]
pub fn sanitize_segment(segment: &str) -> String {
    let mut chars: Vec<(char, bool)> = Vec::with_capacity(segment.len());
    for c in segment.chars() {
        let substituted = !(c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));
        let c = if substituted { '_' } else { c };
        match chars.last_mut() {
            Some(last) if last.0 == '_' && c == '_' && (substituted || last.1) => {
                last.1 = last.1 && substituted;
            }
            _ => chars.push((c, substituted)),
        }
    }
    let start = chars.iter().position(|&(_, sub)| !sub).unwrap_or(chars.len());
    let end = chars.iter().rposition(|&(_, sub)| !sub).map_or(start, |i| i + 1);
    chars[start..end].iter().map(|&(c, _)| c).collect()
}

/// Sanitizes a model-proposed relative path.
///
/// Strips surrounding quotes and backticks, drive prefixes, absolute roots, and
/// `.`/`..` components, then sanitizes every segment. Returns `None` when
/// nothing usable is left.
#[must_use]
pub fn sanitize_path(raw: &str) -> Option<String> {
    let trimmed = raw
        .trim()
        .trim_matches(|c| matches!(c, '`' | '"' | '\''))
        .trim()
        .replace('\\', "/");
    let without_drive = match trimmed.as_bytes() {
        [letter, b':', ..] if letter.is_ascii_alphabetic() => &trimmed[2..],
        _ => trimmed.as_str(),
    };

    let segments: Vec<String> = without_drive
        .split('/')
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .map(sanitize_segment)
        .filter(|s| !s.is_empty() && s.chars().any(|c| c != '.'))
        .collect();

    if segments.is_empty() {
        None
    } else {
        Some(segments.join("/"))
    }
}

/// Sanitizes a free-form name (project name, objective slug), capped at `max_chars`.
#[must_use]
pub fn sanitize_name(raw: &str, max_chars: usize) -> String {
    let cut: String = raw.trim().chars().take(max_chars).collect();
    let name = sanitize_segment(&cut).trim_matches('.').to_string();
    if name.is_empty() {
        "project".to_string()
    } else {
        name
    }
}

/// Canonical language tag for a fence tag or alias, lowercased.
#[must_use]
pub fn normalize_language(tag: &str) -> String {
    tag.trim().to_ascii_lowercase()
}

/// Infers a language tag from a file extension.
#[must_use]
pub fn language_for_path(path: &str) -> Option<&'static str> {
    let file = path.rsplit('/').next().unwrap_or(path);
    let lower = file.to_ascii_lowercase();
    if lower == "dockerfile" {
        return Some("dockerfile");
    }
    if lower == "makefile" {
        return Some("makefile");
    }
    let (_, ext) = lower.rsplit_once('.')?;
    let language = match ext {
        "py" => "python",
        "js" | "mjs" | "cjs" => "javascript",
        "jsx" => "jsx",
        "ts" => "typescript",
        "tsx" => "tsx",
        "rs" => "rust",
        "go" => "go",
        "java" => "java",
        "json" => "json",
        "yaml" | "yml" => "yaml",
        "toml" => "toml",
        "xml" => "xml",
        "svg" => "svg",
        "html" | "htm" => "html",
        "css" => "css",
        "sh" | "bash" => "bash",
        "sql" => "sql",
        "md" | "markdown" => "markdown",
        "r" => "r",
        "txt" => "text",
        _ => return None,
    };
    Some(language)
}

/// File extension used for untitled entries of a language.
#[must_use]
pub fn extension_for_language(language: &str) -> &'static str {
    match normalize_language(language).as_str() {
        "python" | "py" => "py",
        "javascript" | "js" => "js",
        "jsx" => "jsx",
        "typescript" | "ts" => "ts",
        "tsx" => "tsx",
        "rust" | "rs" => "rs",
        "go" | "golang" => "go",
        "java" => "java",
        "json" => "json",
        "yaml" | "yml" => "yaml",
        "toml" => "toml",
        "xml" => "xml",
        "svg" => "svg",
        "html" | "htm" => "html",
        "css" => "css",
        "shell" | "sh" | "bash" => "sh",
        "sql" => "sql",
        "markdown" | "md" => "md",
        "r" => "r",
        _ => "txt",
    }
}
