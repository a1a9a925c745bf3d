//! Logic-aware fragment extraction
//!
//! Each source format maps to one [`Strategy`]. Every strategy turns file
//! text into an ordered list of fragments and shares the same guarantees:
//! fragments follow file order, none exceeds the size ceiling, and a
//! non-empty file always yields at least one fragment.

mod cursor;
mod lua;
mod markup;

use std::path::PathBuf;

/// Size and content thresholds shared by all strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractOptions {
    /// Soft ceiling in characters; longer fragments are truncated, never split.
    pub chunk_limit: usize,
    /// Structural fragments must be strictly longer than this once trimmed.
    pub min_fragment_len: usize,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            chunk_limit: 4000,
            min_fragment_len: 80,
        }
    }
}

/// Extraction strategy, selected by file extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
    /// Lua: units bounded by `function`/event openers and matching `end`.
    BalancedKeyword,
    /// JavaScript: slices between declaration / listener / fetch / message markers.
    CursorBoundary,
    /// HTML: embedded `<script>` regions.
    DelimitedRegion,
    /// Anything else: the whole file.
    WholeFile,
}

impl Strategy {
    /// Pick a strategy for an extension such as `.lua` (case-insensitive).
    pub fn for_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            ".lua" => Self::BalancedKeyword,
            ".js" => Self::CursorBoundary,
            ".html" | ".htm" => Self::DelimitedRegion,
            _ => Self::WholeFile,
        }
    }
}

/// One slice of a source file chosen for annotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeFragment {
    pub bundle: String,
    pub file: PathBuf,
    pub text: String,
}

/// Split `text` into fragments with `strategy`.
///
/// Returns nothing only for empty input.
pub fn extract_fragments(text: &str, strategy: Strategy, opts: &ExtractOptions) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    let fragments = match strategy {
        Strategy::BalancedKeyword => lua::extract(text, opts),
        Strategy::CursorBoundary => cursor::extract(text, opts),
        Strategy::DelimitedRegion => markup::extract(text, opts),
        Strategy::WholeFile => Vec::new(),
    };
    if fragments.is_empty() {
        vec![truncate(text, opts.chunk_limit).to_string()]
    } else {
        fragments
    }
}

/// First `limit` characters of `text`.
pub fn truncate(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Whether a candidate carries enough content to keep.
fn has_content(fragment: &str, opts: &ExtractOptions) -> bool {
    fragment.trim().chars().count() > opts.min_fragment_len
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_by_extension() {
        assert_eq!(Strategy::for_extension(".lua"), Strategy::BalancedKeyword);
        assert_eq!(Strategy::for_extension(".JS"), Strategy::CursorBoundary);
        assert_eq!(Strategy::for_extension(".html"), Strategy::DelimitedRegion);
        assert_eq!(Strategy::for_extension(".css"), Strategy::WholeFile);
    }

    #[test]
    fn truncate_counts_chars() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("abc", 10), "abc");
        assert_eq!(truncate("abc", 0), "");
    }

    #[test]
    fn only_empty_input_yields_nothing() {
        let opts = ExtractOptions::default();
        assert!(extract_fragments("", Strategy::BalancedKeyword, &opts).is_empty());
        for strategy in [
            Strategy::BalancedKeyword,
            Strategy::CursorBoundary,
            Strategy::DelimitedRegion,
            Strategy::WholeFile,
        ] {
            assert_eq!(extract_fragments(" \n\t", strategy, &opts), vec![" \n\t"]);
        }
    }

    #[test]
    fn whole_file_is_truncated() {
        let opts = ExtractOptions {
            chunk_limit: 10,
            min_fragment_len: 80,
        };
        let out = extract_fragments("body { color: red; margin: 0 }", Strategy::WholeFile, &opts);
        assert_eq!(out, vec!["body { col"]);
    }

    #[test]
    fn no_markers_falls_back_to_whole_file() {
        let opts = ExtractOptions::default();
        let text = "local x = 1\nprint(x)\n";
        for strategy in [
            Strategy::BalancedKeyword,
            Strategy::CursorBoundary,
            Strategy::DelimitedRegion,
        ] {
            assert_eq!(extract_fragments(text, strategy, &opts), vec![text]);
        }
    }

    #[test]
    fn every_fragment_within_ceiling() {
        let opts = ExtractOptions {
            chunk_limit: 120,
            min_fragment_len: 10,
        };
        let body = "    print('x')\n".repeat(40);
        let lua = format!("function a()\n{body}end\n\nfunction b()\n{body}end\n");
        let js = format!("function a() {{\n{body}}}\nfunction b() {{\n{body}}}\n");
        let html = format!("<div></div><script>\n{body}</script>");
        for (text, strategy) in [
            (lua.as_str(), Strategy::BalancedKeyword),
            (js.as_str(), Strategy::CursorBoundary),
            (html.as_str(), Strategy::DelimitedRegion),
            (lua.as_str(), Strategy::WholeFile),
        ] {
            let out = extract_fragments(text, strategy, &opts);
            assert!(!out.is_empty());
            assert!(out.iter().all(|f| !f.is_empty() && f.chars().count() <= 120));
        }
    }
}
