//! Balanced-keyword extraction for Lua
//!
//! A unit starts on a line that declares a function or registers an event
//! handler, and ends on the line where block depth falls back to where it
//! was before that line. Depth counts every block opener (`function`, `if`,
//! `do`, `repeat`) against every closer (`end`, `until`), ignoring strings
//! and comments, so the `end` of a loop does not close its function.
//! Units nested inside a unit are part of the outer unit.

use super::{ExtractOptions, has_content, truncate};

/// Calls whose line starts a unit, typically followed by an inline handler.
const EVENT_CALLS: [&str; 4] = [
    "RegisterNetEvent",
    "RegisterNUICallback",
    "AddEventHandler",
    "RegisterCommand",
];

pub(super) fn extract(text: &str, opts: &ExtractOptions) -> Vec<String> {
    let lines: Vec<&str> = text.lines().collect();
    let mut scanner = Scanner::default();
    let mut depth = 0usize;
    // (start line, depth before the start line)
    let mut unit: Option<(usize, usize)> = None;
    let mut fragments = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        let words = scanner.words(line);
        if unit.is_none() && opens_unit(&words) {
            unit = Some((i, depth));
        }

        let opened = words.iter().filter(|w| is_opener(w)).count();
        let closed = words.iter().filter(|w| is_closer(w)).count();
        depth = (depth + opened).saturating_sub(closed);

        if let Some((start, base)) = unit {
            if depth <= base {
                unit = None;
                if i > start {
                    let block = lines[start..=i].join("\n");
                    if has_content(&block, opts) {
                        fragments.push(truncate(&block, opts.chunk_limit).to_string());
                    }
                }
            }
        }
    }

    fragments
}

fn is_opener(word: &str) -> bool {
    matches!(word, "function" | "if" | "do" | "repeat")
}

fn is_closer(word: &str) -> bool {
    matches!(word, "end" | "until")
}

/// `function ...`, `local function ...`, or a line calling an event registrar.
fn opens_unit(words: &[&str]) -> bool {
    match words {
        ["function", ..] | ["local", "function", ..] => true,
        _ => words.iter().any(|w| EVENT_CALLS.contains(w)),
    }
}

/// Line tokenizer that remembers open long strings and long comments.
#[derive(Default)]
struct Scanner {
    /// `=` count of the long bracket we are inside, if any.
    long_level: Option<usize>,
}

impl Scanner {
    /// Identifier-like words of `line` outside strings and comments.
    fn words<'a>(&mut self, line: &'a str) -> Vec<&'a str> {
        let bytes = line.as_bytes();
        let mut words = Vec::new();
        let mut i = 0;

        while i < bytes.len() {
            if let Some(level) = self.long_level {
                match find_long_close(&bytes[i..], level) {
                    Some(len) => {
                        i += len;
                        self.long_level = None;
                        continue;
                    }
                    None => return words,
                }
            }

            let b = bytes[i];
            if b == b'-' && bytes.get(i + 1) == Some(&b'-') {
                match long_open(&bytes[i + 2..]) {
                    Some((level, len)) => {
                        self.long_level = Some(level);
                        i += 2 + len;
                        continue;
                    }
                    None => return words,
                }
            }
            if b == b'[' {
                if let Some((level, len)) = long_open(&bytes[i..]) {
                    self.long_level = Some(level);
                    i += len;
                    continue;
                }
            }
            if b == b'"' || b == b'\'' {
                i = skip_short_string(bytes, i);
                continue;
            }
            if b.is_ascii_alphabetic() || b == b'_' {
                let start = i;
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                    i += 1;
                }
                words.push(&line[start..i]);
                continue;
            }
            if b.is_ascii_digit() {
                // Skip numerals so `0x1Fend` style tails never read as keywords
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'.') {
                    i += 1;
                }
                continue;
            }
            i += 1;
        }
        words
    }
}

/// `[[`, `[=[`, `[==[` ... at the start of `bytes`: (level, byte length).
fn long_open(bytes: &[u8]) -> Option<(usize, usize)> {
    if bytes.first() != Some(&b'[') {
        return None;
    }
    let level = bytes[1..].iter().take_while(|b| **b == b'=').count();
    (bytes.get(1 + level) == Some(&b'[')).then_some((level, level + 2))
}

/// Bytes up to and including the matching `]=*]`, if it is on this line.
fn find_long_close(bytes: &[u8], level: usize) -> Option<usize> {
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b']' {
            let eq = bytes[i + 1..].iter().take_while(|b| **b == b'=').count();
            if eq == level && bytes.get(i + 1 + eq) == Some(&b']') {
                return Some(i + eq + 2);
            }
        }
        i += 1;
    }
    None
}

/// Index just past the string opened at `start`; unterminated strings end the line.
fn skip_short_string(bytes: &[u8], start: usize) -> usize {
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b if b == quote => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> ExtractOptions {
        ExtractOptions {
            chunk_limit: 4000,
            min_fragment_len: 20,
        }
    }

    fn words(line: &str) -> Vec<String> {
        Scanner::default()
            .words(line)
            .into_iter()
            .map(String::from)
            .collect()
    }

    #[test]
    fn scanner_skips_strings_and_comments() {
        assert_eq!(words("print('end') -- end"), vec!["print"]);
        assert_eq!(words(r#"local s = "do \" end""#), vec!["local", "s"]);
        assert_eq!(words("x = [[ if ]] y"), vec!["x", "y"]);
    }

    #[test]
    fn scanner_tracks_multiline_long_comment() {
        let mut s = Scanner::default();
        assert_eq!(s.words("--[==[ start"), Vec::<&str>::new());
        assert_eq!(s.words("function inside() end"), Vec::<&str>::new());
        assert_eq!(s.words("]==] if"), vec!["if"]);
    }

    #[test]
    fn separate_units() {
        let text = "\
function first()
    print('first unit body')
end

local x = 1

function second(a, b)
    return a + b + 1000
end
";
        let out = extract(text, &opts());
        assert_eq!(out.len(), 2);
        assert!(out[0].starts_with("function first()") && out[0].ends_with("end"));
        assert!(out[1].starts_with("function second(a, b)") && out[1].ends_with("end"));
    }

    #[test]
    fn nested_units_collapse_into_outer() {
        let text = "\
RegisterNetEvent('garage:open', function(data)
    local function helper()
        return data.id
    end
    for i = 1, 10 do
        if i > 5 then
            print(helper())
        end
    end
end)
";
        let out = extract(text, &opts());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0], text.trim_end());
    }

    #[test]
    fn loop_end_does_not_close_function() {
        let text = "\
function count()
    for i = 1, 3 do
        print(i)
    end
    while true do break end
    return 'counted all the things'
end
";
        let out = extract(text, &opts());
        assert_eq!(out.len(), 1);
        assert!(out[0].contains("return 'counted all the things'"));
    }

    #[test]
    fn one_line_and_short_units_dropped() {
        let text = "\
function tiny() return 1 end
RegisterNetEvent('x')
function short()
end
";
        assert!(extract(text, &opts()).is_empty());
    }

    #[test]
    fn unterminated_unit_dropped() {
        let text = "function broken()\n    print('never closed, runs to end of file')\n";
        assert!(extract(text, &opts()).is_empty());
    }

    #[test]
    fn stray_end_at_top_level_is_harmless() {
        let text = "\
end
end
function after()
    print('still found after stray ends')
end
";
        let out = extract(text, &opts());
        assert_eq!(out.len(), 1);
        assert!(out[0].starts_with("function after()"));
    }

    #[test]
    fn unit_inside_top_level_block() {
        let text = "\
Citizen.CreateThread(function()
    while true do
        Wait(0)
    end
end)

if Config.Debug then
    function debugDump(tbl)
        print(json.encode(tbl, { indent = true }))
    end
end
";
        let out = extract(text, &opts());
        assert_eq!(out.len(), 1);
        assert!(out[0].trim_start().starts_with("function debugDump(tbl)"));
    }

    #[test]
    fn repeat_until_balances() {
        let text = "\
function drain(queue)
    repeat
        local item = table.remove(queue)
    until item == nil
    print('queue drained completely')
end
";
        assert_eq!(extract(text, &opts()).len(), 1);
    }
}
