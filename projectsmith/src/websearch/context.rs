//! Formatting search hits into prompt context.

use super::client::SearchHit;

/// Renders hits as a numbered list, capped at `max_chars`.
///
/// Returns `None` when there is nothing worth injecting.
#[must_use]
pub fn format_search_context(query: &str, hits: &[SearchHit], max_chars: usize) -> Option<String> {
    let hits: Vec<&SearchHit> = hits
        .iter()
        .filter(|h| !h.snippet.trim().is_empty() || !h.title.trim().is_empty())
        .collect();
    if hits.is_empty() {
        return None;
    }

    let mut out = format!("Search results for \"{}\":\n", query.trim());
    for (i, hit) in hits.iter().enumerate() {
        let mut item = format!("{}. {}", i + 1, hit.title.trim());
        if !hit.url.is_empty() {
            item.push_str(&format!(" <{}>", hit.url));
        }
        item.push('\n');
        let snippet = hit.snippet.trim();
        if !snippet.is_empty() {
            item.push_str("   ");
            item.push_str(snippet);
            item.push('\n');
        }
        if out.chars().count() + item.chars().count() > max_chars {
            break;
        }
        out.push_str(&item);
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_numbers_hits() {
        let hits = vec![
            SearchHit::new("Rust book", "Ownership explained", "https://doc.rust-lang.org"),
            SearchHit::new("Answer", "Use a Vec", ""),
        ];
        let ctx = format_search_context("rust vec", &hits, 1_000).unwrap();
        assert!(ctx.starts_with("Search results for \"rust vec\""));
        assert!(ctx.contains("1. Rust book <https://doc.rust-lang.org>"));
        assert!(ctx.contains("2. Answer\n   Use a Vec"));
    }

    #[test]
    fn test_empty_hits_yield_none() {
        assert_eq!(format_search_context("q", &[], 100), None);
        assert_eq!(format_search_context("q", &[SearchHit::new(" ", "", "")], 100), None);
    }

    #[test]
    fn test_cap_drops_trailing_hits() {
        let hits: Vec<SearchHit> = (0..50)
            .map(|i| SearchHit::new(format!("title {i}"), "x".repeat(40), ""))
            .collect();
        let ctx = format_search_context("q", &hits, 300).unwrap();
        assert!(ctx.chars().count() <= 300);
        assert!(ctx.contains("1. title 0"));
        assert!(!ctx.contains("title 49"));
    }
}
