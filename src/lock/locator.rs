//! Input locators
//!
//! A locator names where an input comes from. Supported forms:
//!
//! | Form | Example |
//! |------|---------|
//! | local directory | `path:../shared` |
//! | git repository | `git+https://example.com/repo.git?ref=main&rev=<sha>` |
//! | GitHub shorthand | `github:owner/repo/branch` |
//! | archive | `tarball+https://example.com/src.tar.gz` |
//!
//! A git ref of the form `semver:<req>` selects the highest matching tag.

use crate::error::{LockstepError, LockstepResult};
use semver::VersionReq;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

const ARCHIVE_SUFFIXES: &[&str] = &[".tar.gz", ".tgz", ".tar.xz", ".tar.bz2", ".tar.zst", ".zip"];

/// Which ref of a git repository to follow
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitRef {
    /// Branch or tag name
    Named(String),
    /// Highest `vX.Y.Z` tag matching the requirement
    Semver(VersionReq),
}

impl fmt::Display for GitRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => f.write_str(name),
            Self::Semver(req) => write!(f, "semver:{}", req),
        }
    }
}

/// Where an input's content lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// Local directory, relative paths resolved against the project root
    Path(PathBuf),
    /// Git repository, optionally pinned to a commit
    Git {
        url: String,
        reference: Option<GitRef>,
        rev: Option<String>,
    },
    /// Downloadable archive
    Tarball(String),
}

/// A parsed locator that remembers how it was written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    raw: String,
    source: Source,
}

impl Locator {
    /// Parse a locator string
    pub fn parse(raw: &str) -> LockstepResult<Self> {
        let raw = raw.trim();
        let invalid = |reason: &str| LockstepError::InvalidLocator {
            locator: raw.to_string(),
            reason: reason.to_string(),
        };

        let source = if let Some(path) = raw.strip_prefix("path:") {
            if path.is_empty() {
                return Err(invalid("empty path"));
            }
            Source::Path(PathBuf::from(path))
        } else if raw.starts_with("./") || raw.starts_with("../") || raw.starts_with('/') {
            Source::Path(PathBuf::from(raw))
        } else if let Some(rest) = raw.strip_prefix("github:") {
            parse_github(rest).map_err(|reason| invalid(&reason))?
        } else if let Some(rest) = raw.strip_prefix("git+") {
            parse_git(rest).map_err(|reason| invalid(&reason))?
        } else if let Some(url) = raw.strip_prefix("tarball+") {
            if !is_http(url) {
                return Err(invalid("tarball URL must be http(s)"));
            }
            Source::Tarball(url.to_string())
        } else if is_http(raw) && ARCHIVE_SUFFIXES.iter().any(|s| raw.ends_with(s)) {
            Source::Tarball(raw.to_string())
        } else {
            return Err(invalid(
                "expected path:, git+, github:, tarball+ or an archive URL",
            ));
        };

        Ok(Self {
            raw: raw.to_string(),
            source,
        })
    }

    /// The locator exactly as written in the descriptor
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn source(&self) -> &Source {
        &self.source
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for Locator {
    type Err = LockstepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn is_http(url: &str) -> bool {
    url.starts_with("https://") || url.starts_with("http://")
}

/// A full 40-character hex commit id
pub fn is_commit_sha(s: &str) -> bool {
    s.len() == 40 && s.chars().all(|c| c.is_ascii_hexdigit())
}

fn parse_ref(value: &str) -> Result<GitRef, String> {
    if value.is_empty() {
        return Err("empty ref".to_string());
    }
    match value.strip_prefix("semver:") {
        Some(req) => VersionReq::parse(req)
            .map(GitRef::Semver)
            .map_err(|e| format!("invalid semver requirement '{}': {}", req, e)),
        None => Ok(GitRef::Named(value.to_string())),
    }
}

fn parse_rev(value: &str) -> Result<String, String> {
    if is_commit_sha(value) {
        Ok(value.to_ascii_lowercase())
    } else {
        Err(format!("rev '{}' is not a 40-character commit id", value))
    }
}

/// Split `?ref=..&rev=..` off a URL
fn parse_query(query: &str) -> Result<(Option<GitRef>, Option<String>), String> {
    let mut reference = None;
    let mut rev = None;
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| format!("malformed query parameter '{}'", pair))?;
        match key {
            "ref" => reference = Some(parse_ref(value)?),
            "rev" => rev = Some(parse_rev(value)?),
            other => return Err(format!("unsupported query parameter '{}'", other)),
        }
    }
    Ok((reference, rev))
}

fn parse_git(rest: &str) -> Result<Source, String> {
    let (url, query) = rest.split_once('?').unwrap_or((rest, ""));
    if url.is_empty() {
        return Err("empty repository URL".to_string());
    }
    let (reference, rev) = parse_query(query)?;
    Ok(Source::Git {
        url: url.to_string(),
        reference,
        rev,
    })
}

fn parse_github(rest: &str) -> Result<Source, String> {
    let (path, query) = rest.split_once('?').unwrap_or((rest, ""));
    let mut parts = path.splitn(3, '/');
    let owner = parts.next().filter(|s| !s.is_empty());
    let repo = parts.next().filter(|s| !s.is_empty());
    let (Some(owner), Some(repo)) = (owner, repo) else {
        return Err("expected github:<owner>/<repo>[/<ref>]".to_string());
    };

    let (mut reference, mut rev) = parse_query(query)?;
    if let Some(tail) = parts.next().filter(|s| !s.is_empty()) {
        if is_commit_sha(tail) {
            rev = Some(tail.to_ascii_lowercase());
        } else {
            reference = Some(parse_ref(tail)?);
        }
    }

    Ok(Source::Git {
        url: format!("https://github.com/{}/{}", owner, repo),
        reference,
        rev,
    })
}
