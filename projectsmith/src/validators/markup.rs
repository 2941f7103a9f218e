//! Markup validators (XML, SVG, HTML).

use quick_xml::events::Event;
use quick_xml::Reader;
use scraper::Html;

use super::{Diagnostic, Validator};

/// Well-formedness check via `quick-xml`: matched tags, no unclosed elements,
/// and exactly one root element.
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlValidator;

fn position(reader: &Reader<&[u8]>) -> usize {
    usize::try_from(reader.buffer_position()).unwrap_or(usize::MAX)
}

impl Validator for XmlValidator {
    fn name(&self) -> &str {
        "xml"
    }

    fn validate(&self, content: &str) -> Result<(), Diagnostic> {
        let mut reader = Reader::from_str(content);
        reader.config_mut().trim_text(true);

        let mut depth = 0usize;
        let mut roots = 0usize;
        loop {
            let event = reader.read_event().map_err(|e| {
                let offset = usize::try_from(reader.error_position()).unwrap_or(usize::MAX);
                Diagnostic::at_offset(e.to_string(), content, offset)
            })?;
            match event {
                Event::Start(_) => {
                    if depth == 0 {
                        roots += 1;
                    }
                    depth += 1;
                }
                Event::End(_) => depth = depth.saturating_sub(1),
                Event::Empty(_) if depth == 0 => roots += 1,
                Event::Text(text) if depth == 0 && text.iter().any(|b| !b.is_ascii_whitespace()) => {
                    return Err(Diagnostic::at_offset(
                        "text outside the root element",
                        content,
                        position(&reader),
                    ));
                }
                Event::Eof => break,
                _ => {}
            }
            if roots > 1 {
                return Err(Diagnostic::at_offset(
                    "more than one root element",
                    content,
                    position(&reader),
                ));
            }
        }

        if depth > 0 {
            return Err(Diagnostic::at_offset(
                format!("{depth} element(s) left unclosed"),
                content,
                content.len(),
            ));
        }
        if roots == 0 {
            return Err(Diagnostic::new("no root element"));
        }
        Ok(())
    }
}

/// HTML check via the html5ever tree builder behind `scraper`.
///
/// Content with a doctype (or an `<html>` element) is parsed as a document;
/// anything else is parsed as a body fragment.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlValidator;

fn is_document(content: &str) -> Option<bool> {
    let head = content.trim_start().get(..9)?.to_ascii_lowercase();
    Some(head == "<!doctype")
}

impl Validator for HtmlValidator {
    fn name(&self) -> &str {
        "html"
    }

    fn validate(&self, content: &str) -> Result<(), Diagnostic> {
        let html = if is_document(content).unwrap_or(false) {
            Html::parse_document(content)
        } else if content.to_ascii_lowercase().contains("<html") {
            Html::parse_document(&format!("<!DOCTYPE html>\n{content}"))
        } else {
            Html::parse_fragment(content)
        };

        match html.errors.first() {
            None => Ok(()),
            Some(first) if html.errors.len() == 1 => Err(Diagnostic::new(first.to_string())),
            Some(first) => Err(Diagnostic::new(format!(
                "{first} (and {} more parse error(s))",
                html.errors.len() - 1
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xml_well_formed() {
        assert!(XmlValidator
            .validate("<?xml version=\"1.0\"?>\n<root><item a=\"1\"/><item>x</item></root>\n")
            .is_ok());
        assert!(XmlValidator
            .validate("<svg xmlns=\"http://www.w3.org/2000/svg\"><circle r=\"4\"/></svg>")
            .is_ok());
    }

    #[test]
    fn test_xml_errors() {
        assert!(XmlValidator.validate("<a><b></a>").is_err());
        assert!(XmlValidator.validate("<a><b></b>").is_err());
        assert!(XmlValidator.validate("<a/><b/>").is_err());
        assert!(XmlValidator.validate("").is_err());
    }

    #[test]
    fn test_html_document_and_fragment() {
        let doc = "<!DOCTYPE html>\n<html><head><title>Calc</title></head><body><h1>Hi</h1></body></html>\n";
        assert!(HtmlValidator.validate(doc).is_ok());
        assert!(HtmlValidator.validate("<p>Hello <b>world</b></p>").is_ok());
    }

    #[test]
    fn test_html_mismatched_end_tag_fails() {
        assert!(HtmlValidator.validate("<div></span></div>").is_err());
    }
}
