//! Identity files.
//!
//! A holon's identity file opens with a `---`-delimited frontmatter block
//! of `key: value` pairs, followed by free-form body text this crate does
//! not interpret:
//!
//! ```text
//! ---
//! uuid: 0191c2f3-…
//! given_name: "Ada"
//! clade: weaver
//! parents: [adam, eve]
//! ---
//! A motto, a story, anything.
//! ```
//!
//! Values may be wrapped in ASCII double quotes; list values use `[a, b]`
//! syntax. Keys this crate does not recognise are ignored, so files may
//! carry forward-compatible extras.

use std::fmt;
use std::path::Path;

/// Error reading an identity file.
#[derive(Debug)]
pub enum IdentityError {
    /// The file does not open with a `---` line.
    MissingFrontmatter,
    /// The opening `---` is never matched by a closing one.
    UnterminatedFrontmatter,
    /// The file could not be read at all.
    Io(String),
}

impl fmt::Display for IdentityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentityError::MissingFrontmatter => {
                f.write_str("identity file has no frontmatter header")
            }
            IdentityError::UnterminatedFrontmatter => {
                f.write_str("identity frontmatter is never terminated")
            }
            IdentityError::Io(msg) => write!(f, "identity file unreadable: {msg}"),
        }
    }
}

impl std::error::Error for IdentityError {}

/// The parsed frontmatter header of an identity file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub uuid: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub motto: Option<String>,
    pub composer: Option<String>,
    pub clade: Option<String>,
    pub status: Option<String>,
    pub born: Option<String>,
    pub lang: Option<String>,
    pub reproduction: Option<String>,
    pub generated_by: Option<String>,
    pub proto_status: Option<String>,
    pub parents: Vec<String>,
    pub aliases: Vec<String>,
}

impl Identity {
    /// Parse the frontmatter header from identity-file text.
    pub fn from_str(text: &str) -> Result<Identity, IdentityError> {
        let mut lines = text.lines().map(|line| line.trim_end_matches('\r'));
        match lines.next() {
            Some("---") => {}
            _ => return Err(IdentityError::MissingFrontmatter),
        }

        let mut identity = Identity::default();
        for line in lines {
            if line == "---" {
                return Ok(identity);
            }
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            identity.assign(key.trim(), value.trim());
        }
        Err(IdentityError::UnterminatedFrontmatter)
    }

    /// Read and parse an identity file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Identity, IdentityError> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| IdentityError::Io(format!("{}: {e}", path.as_ref().display())))?;
        Identity::from_str(&text)
    }

    fn assign(&mut self, key: &str, value: &str) {
        match key {
            "uuid" => self.uuid = Some(unquote(value)),
            "given_name" => self.given_name = Some(unquote(value)),
            "family_name" => self.family_name = Some(unquote(value)),
            "motto" => self.motto = Some(unquote(value)),
            "composer" => self.composer = Some(unquote(value)),
            "clade" => self.clade = Some(unquote(value)),
            "status" => self.status = Some(unquote(value)),
            "born" => self.born = Some(unquote(value)),
            "lang" => self.lang = Some(unquote(value)),
            "reproduction" => self.reproduction = Some(unquote(value)),
            "generated_by" => self.generated_by = Some(unquote(value)),
            "proto_status" => self.proto_status = Some(unquote(value)),
            "parents" => self.parents = parse_list(value),
            "aliases" => self.aliases = parse_list(value),
            _ => {}
        }
    }
}

fn unquote(value: &str) -> String {
    let value = value.trim();
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        value[1..value.len() - 1].to_string()
    } else {
        value.to_string()
    }
}

fn parse_list(value: &str) -> Vec<String> {
    let inner = value
        .trim()
        .strip_prefix('[')
        .and_then(|v| v.strip_suffix(']'))
        .unwrap_or(value);
    inner
        .split(',')
        .map(unquote)
        .filter(|item| !item.is_empty())
        .collect()
}
