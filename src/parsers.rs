//! Parsers for the metadata files found inside package payloads.
//!
//! Both are deliberately small: they read only what the indexer consumes and
//! report anything they cannot make sense of as a [`ParseError`], which the
//! enricher treats as recoverable.

use crate::traits::{Attributes, MetadataParser, ParseError};
use std::collections::HashMap;

const DESKTOP_GROUP: &str = "Desktop Entry";

/// Reads the `[Desktop Entry]` group of a freedesktop `.desktop` file.
///
/// Keys keep their original spelling (`Categories`, `Icon`, `Name[de]`).
/// When a key repeats, the first value wins.
#[derive(Debug, Default, Clone, Copy)]
pub struct DesktopEntryParser;

impl MetadataParser for DesktopEntryParser {
    fn format_id(&self) -> &str {
        "desktop"
    }

    fn parse(&self, content: &[u8]) -> Result<Attributes, ParseError> {
        let text = std::str::from_utf8(content)?;
        let mut attrs = Attributes::new();
        let mut group: Option<&str> = None;
        let mut saw_entry_group = false;

        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some(name) = line.strip_prefix('[') {
                let name = name.strip_suffix(']').ok_or_else(|| {
                    ParseError::InvalidContent(format!("line {}: unclosed group header", idx + 1))
                })?;
                saw_entry_group |= name == DESKTOP_GROUP;
                group = Some(name);
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                return Err(ParseError::InvalidContent(format!(
                    "line {}: expected key=value",
                    idx + 1
                )));
            };

            match group {
                None => {
                    return Err(ParseError::InvalidContent(format!(
                        "line {}: key '{}' outside of any group",
                        idx + 1,
                        key.trim()
                    )))
                }
                Some(DESKTOP_GROUP) => {
                    attrs
                        .entry(key.trim().to_string())
                        .or_insert_with(|| value.trim().to_string());
                }
                Some(_) => {}
            }
        }

        if !saw_entry_group {
            return Err(ParseError::InvalidContent(format!(
                "missing [{DESKTOP_GROUP}] group"
            )));
        }

        Ok(attrs)
    }
}

/// Sections that end the preamble of a spec file.
const SPEC_SECTIONS: &[&str] = &[
    "%description",
    "%package",
    "%prep",
    "%build",
    "%install",
    "%check",
    "%files",
    "%changelog",
];

/// Reads the preamble tags of an RPM spec file.
///
/// Tag names are lowercased (`URL:` is available as `url`). `%global` and
/// `%define` macros, as well as the `name`, `version`, `release` and `url` tags, are
/// expanded inside tag values.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpecFileParser;

impl MetadataParser for SpecFileParser {
    fn format_id(&self) -> &str {
        "spec"
    }

    fn parse(&self, content: &[u8]) -> Result<Attributes, ParseError> {
        let text = std::str::from_utf8(content)?;
        let mut attrs = Attributes::new();
        let mut macros: HashMap<String, String> = HashMap::new();

        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some(first) = line.split_whitespace().next() {
                if SPEC_SECTIONS.contains(&first) {
                    break;
                }
                if first == "%global" || first == "%define" {
                    let mut parts = line.splitn(3, char::is_whitespace).skip(1);
                    let name = parts.next().unwrap_or_default().trim();
                    let body = parts.next().unwrap_or_default().trim();
                    if name.is_empty() {
                        return Err(ParseError::InvalidContent(format!(
                            "line {line_no}: {first} without a macro name"
                        )));
                    }
                    let body = expand_macros(body, &macros, line_no)?;
                    macros.insert(name.to_string(), body);
                    continue;
                }
            }

            let Some((tag, value)) = line.split_once(':') else {
                continue;
            };
            if !is_tag_name(tag) {
                continue;
            }

            let tag = tag.to_ascii_lowercase();
            let value = expand_macros(value.trim(), &macros, line_no)?;
            if matches!(tag.as_str(), "name" | "version" | "release" | "url") {
                macros.entry(tag.clone()).or_insert_with(|| value.clone());
            }
            attrs.entry(tag).or_insert(value);
        }

        if attrs.is_empty() {
            return Err(ParseError::InvalidContent(
                "no preamble tags found".to_string(),
            ));
        }

        Ok(attrs)
    }
}

fn is_tag_name(tag: &str) -> bool {
    let mut chars = tag.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '(' || c == ')')
}

/// Expands `%{name}`, `%{?name}` and `%name` references. Unknown macros are
/// kept verbatim; `%%` is a literal percent sign.
fn expand_macros(
    value: &str,
    macros: &HashMap<String, String>,
    line_no: usize,
) -> Result<String, ParseError> {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        if let Some(stripped) = after.strip_prefix('%') {
            out.push('%');
            rest = stripped;
            continue;
        }

        if let Some(body) = after.strip_prefix('{') {
            let end = body.find('}').ok_or_else(|| {
                ParseError::InvalidContent(format!("line {line_no}: unterminated macro in '{value}'"))
            })?;
            let inner = &body[..end];
            let (conditional, name) = match inner.strip_prefix('?') {
                Some(name) => (true, name),
                None => (false, inner),
            };
            match macros.get(name) {
                Some(expansion) => out.push_str(expansion),
                None if conditional => {}
                None => {
                    out.push_str("%{");
                    out.push_str(inner);
                    out.push('}');
                }
            }
            rest = &body[end + 1..];
            continue;
        }

        let name_len = after
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(after.len());
        let name = &after[..name_len];
        match macros.get(name) {
            Some(expansion) if !name.is_empty() => out.push_str(expansion),
            _ => {
                out.push('%');
                out.push_str(name);
            }
        }
        rest = &after[name_len..];
    }

    out.push_str(rest);
    Ok(out)
}
