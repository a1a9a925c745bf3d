//! Cursor-boundary extraction for JavaScript
//!
//! Boundaries are named function declarations, `window.addEventListener`,
//! `fetch(` and `postMessage`. Each fragment runs from one boundary to the
//! next (or to end of file).

use super::{ExtractOptions, has_content, truncate};

/// Literal markers, matched anywhere in the text.
const LITERAL_MARKERS: [&str; 3] = ["window.addEventListener", "fetch(", "postMessage"];

pub(super) fn extract(text: &str, opts: &ExtractOptions) -> Vec<String> {
    let starts = boundaries(text);
    starts
        .iter()
        .enumerate()
        .filter_map(|(i, &start)| {
            let end = starts.get(i + 1).copied().unwrap_or(text.len());
            let block = &text[start..end];
            has_content(block, opts).then(|| truncate(block, opts.chunk_limit).to_string())
        })
        .collect()
}

/// Start offsets of non-overlapping marker matches, leftmost first.
fn boundaries(text: &str) -> Vec<usize> {
    let mut spans: Vec<(usize, usize)> = function_declarations(text);
    for marker in LITERAL_MARKERS {
        spans.extend(text.match_indices(marker).map(|(pos, m)| (pos, pos + m.len())));
    }
    spans.sort_unstable();

    let mut starts = Vec::with_capacity(spans.len());
    let mut covered_to = 0;
    for (start, end) in spans {
        if start < covered_to {
            continue;
        }
        starts.push(start);
        covered_to = end;
    }
    starts
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

/// Spans of `function <name> (`, where `function` is a whole word.
fn function_declarations(text: &str) -> Vec<(usize, usize)> {
    let bytes = text.as_bytes();
    text.match_indices("function")
        .filter_map(|(pos, kw)| {
            if pos > 0 && is_ident_byte(bytes[pos - 1]) {
                return None;
            }
            let mut i = pos + kw.len();
            let ws = bytes[i..].iter().take_while(|b| b.is_ascii_whitespace()).count();
            if ws == 0 {
                return None;
            }
            i += ws;
            let name = bytes[i..].iter().take_while(|b| is_ident_byte(**b)).count();
            if name == 0 {
                return None;
            }
            i += name;
            i += bytes[i..].iter().take_while(|b| b.is_ascii_whitespace()).count();
            (bytes.get(i) == Some(&b'(')).then_some((pos, i + 1))
        })
        .collect()
}
