// SPDX-FileCopyrightText: 2026 SafeVault Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turns figment failures into miette diagnostics that point into the
//! offending `safevault.toml`.
//!
//! Valid keys come from the [`SECTIONS`] table that mirrors
//! [`SafevaultConfig`](crate::model::SafevaultConfig), so a typo gets a
//! "did you mean" hint and a key written under the wrong section is told
//! where it belongs.

#![allow(unused_assignments)] // miette's Diagnostic derive generates code triggering this lint

use std::ops::Range;
use std::path::{Path, PathBuf};

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// Jaro-Winkler score above which a known key is offered as a correction.
const SUGGESTION_THRESHOLD: f64 = 0.75;

/// One `[section]` of the configuration file and the keys it accepts.
#[derive(Debug, Clone, Copy)]
pub struct Section {
    pub name: &'static str,
    pub keys: &'static [&'static str],
}

/// Every section of `safevault.toml`.
pub const SECTIONS: &[Section] = &[
    Section {
        name: "vault",
        keys: &[
            "kdf_memory_cost",
            "kdf_iterations",
            "kdf_parallelism",
            "idle_timeout_secs",
            "unlock_timeout_secs",
        ],
    },
    Section {
        name: "storage",
        keys: &["backend", "path", "slot"],
    },
    Section {
        name: "log",
        keys: &["level"],
    },
];

fn section(name: &str) -> Option<&'static Section> {
    SECTIONS.iter().find(|s| s.name == name)
}

/// A configuration error with rich diagnostic information.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    /// A `[section]` that SafeVault does not know.
    #[error("unknown configuration section `[{section}]`")]
    #[diagnostic(
        code(safevault::config::unknown_section),
        help("{}", section_help(suggestion.as_deref()))
    )]
    UnknownSection {
        section: String,
        suggestion: Option<String>,
        #[label("this section is not recognized")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    /// An unknown key inside a known section.
    #[error("unknown key `{key}` in `[{section}]`")]
    #[diagnostic(
        code(safevault::config::unknown_key),
        help("{}", unknown_key_help(suggestion.as_deref(), valid_keys))
    )]
    UnknownKey {
        section: String,
        key: String,
        suggestion: Option<String>,
        /// Comma-separated keys accepted by the section.
        valid_keys: String,
        #[label("this key is not recognized")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    /// A real key written under the wrong section.
    #[error("key `{key}` does not belong in {found_in}")]
    #[diagnostic(
        code(safevault::config::misplaced_key),
        help("move `{key}` under `[{belongs_in}]`")
    )]
    MisplacedKey {
        key: String,
        /// `[section]` or `the top level`.
        found_in: String,
        belongs_in: &'static str,
        #[label("expected under [{belongs_in}]")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    /// A value that does not fit its key.
    #[error("invalid value for `{key}`: {detail}")]
    #[diagnostic(
        code(safevault::config::invalid_value),
        help("{}", invalid_value_help(expected, origin.as_deref()))
    )]
    InvalidValue {
        /// Dotted path, e.g. `vault.kdf_iterations`.
        key: String,
        detail: String,
        expected: String,
        /// Where the value came from when it was not a file we can show.
        origin: Option<String>,
        #[label("this value")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    /// A semantic check that ran after parsing failed.
    #[error("validation error: {message}")]
    #[diagnostic(code(safevault::config::validation))]
    Validation { message: String },

    #[error("configuration error: {0}")]
    #[diagnostic(code(safevault::config::other))]
    Other(String),
}

fn section_help(suggestion: Option<&str>) -> String {
    let known = SECTIONS
        .iter()
        .map(|s| format!("[{}]", s.name))
        .collect::<Vec<_>>()
        .join(", ");
    match suggestion {
        Some(s) => format!("did you mean `[{s}]`? Known sections: {known}"),
        None => format!("known sections: {known}"),
    }
}

fn unknown_key_help(suggestion: Option<&str>, valid_keys: &str) -> String {
    match suggestion {
        Some(s) => format!("did you mean `{s}`? Valid keys: {valid_keys}"),
        None => format!("valid keys: {valid_keys}"),
    }
}

fn invalid_value_help(expected: &str, origin: Option<&str>) -> String {
    match origin {
        Some(origin) => format!("expected {expected} (set by {origin})"),
        None => format!("expected {expected}"),
    }
}

/// Contents of a configuration file, kept so diagnostics can quote it.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    /// Canonical path, or `None` for inline TOML.
    path: Option<PathBuf>,
    name: String,
    content: String,
}

impl ConfigSource {
    /// Read `path`; `None` when the file does not exist or is unreadable.
    pub fn read(path: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        Some(Self {
            path: Some(std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())),
            name: path.display().to_string(),
            content,
        })
    }

    pub fn inline(content: &str) -> Self {
        Self {
            path: None,
            name: "<inline>".to_string(),
            content: content.to_string(),
        }
    }

    fn named(&self) -> NamedSource<String> {
        NamedSource::new(&self.name, self.content.clone())
    }
}

/// Convert every error inside a `figment::Error` into a diagnostic.
pub fn figment_to_config_errors(err: figment::Error, sources: &[ConfigSource]) -> Vec<ConfigError> {
    err.into_iter()
        .map(|error| classify(&error, sources))
        .collect()
}

fn classify(error: &figment::Error, sources: &[ConfigSource]) -> ConfigError {
    use figment::error::Kind;

    let source = source_for(error, sources);
    match &error.kind {
        Kind::UnknownField(field, expected) => {
            let found_in = error
                .path
                .first()
                .and_then(|name| section(name))
                .or_else(|| section_with_keys(expected));
            match found_in {
                Some(found_in) => unknown_key(found_in, field, source),
                None => unknown_top_level(field, source),
            }
        }
        Kind::InvalidType(actual, expected) | Kind::InvalidValue(actual, expected) => {
            invalid_value(error, format!("found {actual}"), expected.clone(), source)
        }
        Kind::UnknownVariant(variant, choices) => invalid_value(
            error,
            format!("`{variant}` is not supported"),
            format!("one of {}", choices.join(", ")),
            source,
        ),
        _ => ConfigError::Other(error.to_string()),
    }
}

/// figment reports the accepted fields; use them when the path is empty.
fn section_with_keys(expected: &[&str]) -> Option<&'static Section> {
    SECTIONS
        .iter()
        .find(|s| s.keys.len() == expected.len() && s.keys.iter().all(|k| expected.contains(k)))
}

/// Section that owns `key`, if any.
fn home_of(key: &str) -> Option<&'static Section> {
    SECTIONS.iter().find(|s| s.keys.contains(&key))
}

fn unknown_top_level(field: &str, source: Option<&ConfigSource>) -> ConfigError {
    if let Some(home) = home_of(field) {
        let (span, src) = key_span(source, None, field);
        return ConfigError::MisplacedKey {
            key: field.to_string(),
            found_in: "the top level".to_string(),
            belongs_in: home.name,
            span,
            src,
        };
    }

    let names: Vec<&str> = SECTIONS.iter().map(|s| s.name).collect();
    let (span, src) = source
        .and_then(|s| locate_section(&s.content, field).map(|range| (s, range)))
        .map(|(s, range)| (Some(to_span(range)), Some(s.named())))
        .unwrap_or((None, None));
    ConfigError::UnknownSection {
        section: field.to_string(),
        suggestion: suggest_key(field, &names),
        span,
        src,
    }
}

fn unknown_key(found_in: &Section, field: &str, source: Option<&ConfigSource>) -> ConfigError {
    let (span, src) = key_span(source, Some(found_in.name), field);
    if let Some(home) = home_of(field) {
        return ConfigError::MisplacedKey {
            key: field.to_string(),
            found_in: format!("[{}]", found_in.name),
            belongs_in: home.name,
            span,
            src,
        };
    }
    ConfigError::UnknownKey {
        section: found_in.name.to_string(),
        key: field.to_string(),
        suggestion: suggest_key(field, found_in.keys),
        valid_keys: found_in.keys.join(", "),
        span,
        src,
    }
}

fn invalid_value(
    error: &figment::Error,
    detail: String,
    expected: String,
    source: Option<&ConfigSource>,
) -> ConfigError {
    let path: Vec<&str> = error.path.iter().map(String::as_str).collect();
    let (span, src) = match path.as_slice() {
        [] => (None, None),
        [.., field] => {
            let section = (path.len() > 1).then(|| path[0]);
            source
                .and_then(|s| locate_key(&s.content, section, field).map(|loc| (s, loc.value)))
                .map(|(s, range)| (Some(to_span(range)), Some(s.named())))
                .unwrap_or((None, None))
        }
    };
    let origin = if src.is_none() { env_origin(error, &path) } else { None };
    ConfigError::InvalidValue {
        key: path.join("."),
        detail,
        expected,
        origin,
        span,
        src,
    }
}

fn key_span(
    source: Option<&ConfigSource>,
    section: Option<&str>,
    key: &str,
) -> (Option<SourceSpan>, Option<NamedSource<String>>) {
    source
        .and_then(|s| locate_key(&s.content, section, key).map(|loc| (s, loc.key)))
        .map(|(s, range)| (Some(to_span(range)), Some(s.named())))
        .unwrap_or((None, None))
}

/// The file an error came from. Non-file errors fall back to inline TOML.
fn source_for<'a>(error: &figment::Error, sources: &'a [ConfigSource]) -> Option<&'a ConfigSource> {
    match error.metadata.as_ref().and_then(|m| m.source.as_ref()) {
        Some(figment::Source::File(path)) => {
            let wanted = std::fs::canonicalize(path).unwrap_or_else(|_| path.clone());
            sources.iter().find(|s| s.path.as_deref() == Some(wanted.as_path()))
        }
        _ if is_env(error) => None,
        _ => sources.iter().find(|s| s.path.is_none()),
    }
}

fn is_env(error: &figment::Error) -> bool {
    error
        .metadata
        .as_ref()
        .is_some_and(|m| m.name.contains("environment"))
}

/// Name the environment variable behind a bad value.
fn env_origin(error: &figment::Error, path: &[&str]) -> Option<String> {
    is_env(error).then(|| format!("environment variable SAFEVAULT_{}", path.join("_").to_uppercase()))
}

fn to_span(range: Range<usize>) -> SourceSpan {
    SourceSpan::new(range.start.into(), range.len())
}

/// Byte ranges of a `key = value` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyLocation {
    pub key: Range<usize>,
    pub value: Range<usize>,
}

/// Find `key` inside `[section]`, or before the first header when `section`
/// is `None`.
pub fn locate_key(content: &str, section: Option<&str>, key: &str) -> Option<KeyLocation> {
    let mut current: Option<&str> = None;
    let mut offset = 0;
    for line in content.split_inclusive('\n') {
        let start = offset;
        offset += line.len();

        let trimmed = line.trim_start();
        if let Some(name) = header_name(trimmed) {
            current = Some(name);
            continue;
        }
        if current != section {
            continue;
        }
        let Some(after_key) = trimmed.strip_prefix(key) else {
            continue;
        };
        let Some(after_eq) = after_key.trim_start().strip_prefix('=') else {
            continue;
        };

        let key_start = start + (line.len() - trimmed.len());
        let value = after_eq.trim();
        let value_start = start + line.len() - after_eq.trim_start().len();
        return Some(KeyLocation {
            key: key_start..key_start + key.len(),
            value: value_start..value_start + value.len(),
        });
    }
    None
}

/// Byte range of `name` inside its `[name]` header.
pub fn locate_section(content: &str, name: &str) -> Option<Range<usize>> {
    let mut offset = 0;
    for line in content.split_inclusive('\n') {
        let start = offset;
        offset += line.len();
        if header_name(line.trim_start()) == Some(name) {
            let at = start + line.find(name)?;
            return Some(at..at + name.len());
        }
    }
    None
}

fn header_name(line: &str) -> Option<&str> {
    let inner = line.trim_end().strip_prefix('[')?.strip_suffix(']')?;
    Some(inner.trim())
}

/// Closest candidate to `unknown` by Jaro-Winkler similarity, if any is close.
pub fn suggest_key(unknown: &str, candidates: &[&str]) -> Option<String> {
    candidates
        .iter()
        .map(|&c| (c, strsim::jaro_winkler(unknown, c)))
        .filter(|&(_, score)| score > SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(c, _)| c.to_string())
}

/// Render diagnostics to stderr with miette's graphical handler.
pub fn render_errors(errors: &[ConfigError]) {
    let handler = miette::GraphicalReportHandler::new();
    for error in errors {
        let mut buf = String::new();
        match handler.render_report(&mut buf, error as &dyn Diagnostic) {
            Ok(()) => eprint!("{buf}"),
            Err(_) => eprintln!("Error: {error}"),
        }
    }
}
