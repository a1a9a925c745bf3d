//! Bundle manifest parsing
//!
//! Manifests look like Lua but are read with plain pattern matching:
//! `keyword "value"` scalars and `keyword { 'a', 'b' }` groups. Parsing is
//! best effort. Anything unrecognised or malformed is left out of the
//! result instead of failing the bundle.

use serde::Serialize;

/// Scalar metadata keywords, in `BundleManifest` field order.
const SCALAR_KEYS: [&str; 5] = ["name", "author", "description", "version", "ui_page"];

/// File groups a manifest can declare.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileGroup {
    ClientScripts,
    ServerScripts,
    SharedScripts,
    Files,
}

impl FileGroup {
    pub const ALL: [FileGroup; 4] = [
        Self::ClientScripts,
        Self::ServerScripts,
        Self::SharedScripts,
        Self::Files,
    ];

    /// Keyword introducing a `{ ... }` list.
    pub fn keyword(self) -> &'static str {
        match self {
            Self::ClientScripts => "client_scripts",
            Self::ServerScripts => "server_scripts",
            Self::SharedScripts => "shared_scripts",
            Self::Files => "files",
        }
    }

    /// Single-entry form, e.g. `client_script 'main.lua'` or `file 'data.json'`.
    pub fn singular_keyword(self) -> &'static str {
        match self {
            Self::ClientScripts => "client_script",
            Self::ServerScripts => "server_script",
            Self::SharedScripts => "shared_script",
            Self::Files => "file",
        }
    }
}

/// Parsed manifest. Absent fields stay `None` / empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BundleManifest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// UI entry page, included during resolution whatever its extension.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ui_page: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub client_scripts: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub server_scripts: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub shared_scripts: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
}

impl BundleManifest {
    /// Declared patterns of one group, duplicates included.
    pub fn group(&self, group: FileGroup) -> &[String] {
        match group {
            FileGroup::ClientScripts => &self.client_scripts,
            FileGroup::ServerScripts => &self.server_scripts,
            FileGroup::SharedScripts => &self.shared_scripts,
            FileGroup::Files => &self.files,
        }
    }

    fn group_mut(&mut self, group: FileGroup) -> &mut Vec<String> {
        match group {
            FileGroup::ClientScripts => &mut self.client_scripts,
            FileGroup::ServerScripts => &mut self.server_scripts,
            FileGroup::SharedScripts => &mut self.shared_scripts,
            FileGroup::Files => &mut self.files,
        }
    }

    /// JSON snapshot stored with every record.
    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Parse manifest text. Never fails.
pub fn parse_manifest(text: &str) -> BundleManifest {
    let mut manifest = BundleManifest::default();

    let [name, author, description, version, ui_page] = SCALAR_KEYS.map(|k| first_quoted(text, k));
    manifest.name = name;
    manifest.author = author;
    manifest.description = description;
    manifest.version = version;
    manifest.ui_page = ui_page;

    for group in FileGroup::ALL {
        let entries = manifest.group_mut(group);
        for body in braced_lists(text, group.keyword()) {
            entries.extend(split_entries(body));
        }
        entries.extend(all_quoted(text, group.singular_keyword()));
    }

    manifest
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Byte offsets just past each whole-word occurrence of `key` followed by whitespace.
fn keyword_ends<'a>(text: &'a str, key: &'a str) -> impl Iterator<Item = usize> + 'a {
    let bytes = text.as_bytes();
    text.match_indices(key).filter_map(move |(pos, _)| {
        let before_ok = pos == 0 || !is_ident_byte(bytes[pos - 1]);
        let end = pos + key.len();
        let ws_after = bytes.get(end).is_some_and(|b| b.is_ascii_whitespace());
        (before_ok && ws_after).then_some(end)
    })
}

/// The quoted string right after `key` at `end`, skipping whitespace.
fn quoted_after(text: &str, end: usize) -> Option<String> {
    let rest = text[end..].trim_start();
    let quote = rest.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let body = &rest[1..];
    let close = body.find(quote)?;
    let value = &body[..close];
    (!value.is_empty()).then(|| value.to_string())
}

fn first_quoted(text: &str, key: &str) -> Option<String> {
    keyword_ends(text, key).find_map(|end| quoted_after(text, end))
}

fn all_quoted(text: &str, key: &str) -> Vec<String> {
    keyword_ends(text, key)
        .filter_map(|end| quoted_after(text, end))
        .collect()
}

/// Bodies of every `key { ... }` list. A list without a closing brace is skipped.
fn braced_lists<'a>(text: &'a str, key: &'a str) -> Vec<&'a str> {
    keyword_ends(text, key)
        .filter_map(|end| {
            let rest = text[end..].trim_start();
            let body = rest.strip_prefix('{')?;
            let close = body.find('}')?;
            let body = &body[..close];
            (!body.trim().is_empty()).then_some(body)
        })
        .collect()
}

/// Remove a `--` line comment that starts outside quotes.
fn strip_line_comment(line: &str) -> &str {
    let mut quote: Option<char> = None;
    let mut prev = '\0';
    for (i, c) in line.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c == '-' && prev == '-' => return &line[..i - 1],
            None => {}
        }
        prev = c;
    }
    line
}

/// Split a list body on commas, trimming whitespace and quote characters.
fn split_entries(body: &str) -> Vec<String> {
    let uncommented: String = body
        .lines()
        .map(strip_line_comment)
        .collect::<Vec<_>>()
        .join("\n");
    uncommented
        .split(',')
        .map(|e| e.trim().trim_matches(|c| c == '\'' || c == '"').trim())
        .filter(|e| !e.is_empty())
        .map(String::from)
        .collect()
}
