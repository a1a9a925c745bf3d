//! Delimited-region extraction for HTML: every `<script ...>...</script>` block, verbatim.

use super::{ExtractOptions, truncate};

const OPEN_TAG: &str = "<script";
const CLOSE_TAG: &str = "</script>";

pub(super) fn extract(text: &str, opts: &ExtractOptions) -> Vec<String> {
    // ASCII lower-casing keeps byte offsets aligned with `text`
    let lower = text.to_ascii_lowercase();
    let mut fragments = Vec::new();
    let mut from = 0;

    while let Some(open) = lower[from..].find(OPEN_TAG).map(|p| from + p) {
        let Some(close) = lower[open..].find(CLOSE_TAG).map(|p| open + p) else {
            break;
        };
        let end = close + CLOSE_TAG.len();
        fragments.push(truncate(&text[open..end], opts.chunk_limit).to_string());
        from = end;
    }
    fragments
}
