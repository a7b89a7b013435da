//! Fetching concrete revisions for locators
//!
//! The resolver only talks to the [`Fetcher`] trait, so tests can swap in
//! a fake that never touches the network.

use crate::error::{LockstepError, LockstepResult};
use crate::hash::{hash_tree, HASH_PREFIX};
use crate::lock::locator::{is_commit_sha, GitRef, Locator, Source};
use async_trait::async_trait;
use semver::Version;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// The immutable identity a locator resolved to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    /// Commit id or content hash
    pub revision: String,
    /// Address that fetches exactly `revision`
    pub resolved_locator: String,
}

/// Identifies the concrete revision behind a locator
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Resolve a locator to an immutable revision.
    ///
    /// Failures that may succeed on retry (network, remote errors) must be
    /// reported as transient `Fetch` errors.
    async fn fetch(&self, locator: &Locator) -> LockstepResult<Fetched>;
}

/// Default fetcher: local directories, git remotes and archives
pub struct SourceFetcher {
    /// Base for relative `path:` locators (the project root)
    root: PathBuf,
    /// Bound on one download, also applied inside the blocking HTTP client
    timeout: Duration,
}

impl SourceFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn fetch_path(&self, locator: &Locator, path: &Path) -> LockstepResult<Fetched> {
        let full = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };

        if !full.is_dir() {
            return Err(LockstepError::permanent_fetch(
                locator.as_str(),
                format!("{} is not a directory", full.display()),
            ));
        }

        let canonical = full.canonicalize().unwrap_or_else(|_| full.clone());
        let hash_root = canonical.clone();
        let revision = tokio::task::spawn_blocking(move || hash_tree(&hash_root))
            .await
            .map_err(|e| LockstepError::Internal(format!("hashing task failed: {}", e)))??;

        debug!("Hashed {} -> {}", canonical.display(), revision);
        Ok(Fetched {
            revision,
            resolved_locator: format!("path:{}", canonical.display()),
        })
    }

    async fn fetch_git(
        &self,
        locator: &Locator,
        url: &str,
        reference: Option<&GitRef>,
        rev: Option<&str>,
    ) -> LockstepResult<Fetched> {
        let commit = match (rev, reference) {
            (Some(rev), _) => rev.to_string(),
            (None, Some(GitRef::Semver(req))) => {
                let output = ls_remote(locator, &["--tags", url]).await?;
                let (tag, commit) = pick_semver_tag(&output, req).ok_or_else(|| {
                    LockstepError::permanent_fetch(
                        locator.as_str(),
                        format!("no tag matches {}", req),
                    )
                })?;
                debug!("Selected tag {} ({}) for {}", tag, commit, locator);
                commit
            }
            (None, Some(GitRef::Named(name))) => {
                let output = ls_remote(locator, &[url, name]).await?;
                first_commit(&output).ok_or_else(|| {
                    LockstepError::permanent_fetch(
                        locator.as_str(),
                        format!("ref '{}' not found", name),
                    )
                })?
            }
            (None, None) => {
                let output = ls_remote(locator, &[url, "HEAD"]).await?;
                first_commit(&output).ok_or_else(|| {
                    LockstepError::permanent_fetch(locator.as_str(), "remote has no HEAD")
                })?
            }
        };

        let resolved_locator = match reference {
            Some(reference) => format!("git+{}?ref={}&rev={}", url, reference, commit),
            None => format!("git+{}?rev={}", url, commit),
        };

        Ok(Fetched {
            revision: commit,
            resolved_locator,
        })
    }

    async fn fetch_tarball(&self, locator: &Locator, url: &str) -> LockstepResult<Fetched> {
        let target = url.to_string();
        let raw = locator.as_str().to_string();
        let timeout = self.timeout;
        let digest = tokio::task::spawn_blocking(move || download_digest(&raw, &target, timeout))
            .await
            .map_err(|e| LockstepError::Internal(format!("download task failed: {}", e)))??;

        Ok(Fetched {
            revision: format!("{}{}", HASH_PREFIX, digest),
            resolved_locator: format!("tarball+{}", url),
        })
    }
}

#[async_trait]
impl Fetcher for SourceFetcher {
    async fn fetch(&self, locator: &Locator) -> LockstepResult<Fetched> {
        match locator.source() {
            Source::Path(path) => self.fetch_path(locator, path).await,
            Source::Git {
                url,
                reference,
                rev,
            } => {
                self.fetch_git(locator, url, reference.as_ref(), rev.as_deref())
                    .await
            }
            Source::Tarball(url) => self.fetch_tarball(locator, url).await,
        }
    }
}

/// Run `git ls-remote` and return its stdout
async fn ls_remote(locator: &Locator, args: &[&str]) -> LockstepResult<String> {
    debug!("git ls-remote {}", args.join(" "));
    let output = Command::new("git")
        .arg("ls-remote")
        .args(args)
        .env("GIT_TERMINAL_PROMPT", "0")
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| LockstepError::permanent_fetch(locator.as_str(), format!("running git: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let message = format!("git ls-remote failed: {}", stderr.trim());
        return Err(if is_permanent_git_failure(output.status.code(), &stderr) {
            LockstepError::permanent_fetch(locator.as_str(), message)
        } else {
            LockstepError::transient_fetch(locator.as_str(), message)
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Git failures that retrying cannot fix: missing repositories and refused
/// credentials. Git reports both with exit code 128.
fn is_permanent_git_failure(code: Option<i32>, stderr: &str) -> bool {
    if code != Some(128) {
        return false;
    }
    let msg = stderr.to_lowercase();
    msg.contains("not found")
        || msg.contains("does not exist")
        || msg.contains("authentication failed")
        || msg.contains("could not read username")
        || msg.contains("permission denied")
}

/// First commit id in `ls-remote` output
fn first_commit(output: &str) -> Option<String> {
    output
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .find(|sha| is_commit_sha(sha))
        .map(str::to_ascii_lowercase)
}

/// Highest `v?X.Y.Z` tag matching `req`, with its commit.
///
/// Annotated tags list both the tag object and the peeled `^{}` commit;
/// the peeled line wins.
fn pick_semver_tag(output: &str, req: &semver::VersionReq) -> Option<(String, String)> {
    let mut best: Option<(Version, String, String)> = None;

    for line in output.lines() {
        let mut fields = line.split_whitespace();
        let (Some(sha), Some(name)) = (fields.next(), fields.next()) else {
            continue;
        };
        let Some(tag) = name.strip_prefix("refs/tags/") else {
            continue;
        };
        let (tag, peeled) = match tag.strip_suffix("^{}") {
            Some(tag) => (tag, true),
            None => (tag, false),
        };
        let Ok(version) = Version::parse(tag.trim_start_matches('v')) else {
            continue;
        };
        if !req.matches(&version) {
            continue;
        }

        let replace = match &best {
            None => true,
            Some((current, current_tag, _)) => {
                version > *current || (version == *current && current_tag == tag && peeled)
            }
        };
        if replace {
            best = Some((version, tag.to_string(), sha.to_ascii_lowercase()));
        }
    }

    best.map(|(_, tag, sha)| (tag, sha))
}

/// Stream an archive through SHA-256.
///
/// `timeout` covers the whole exchange, body included.
fn download_digest(locator: &str, url: &str, timeout: Duration) -> LockstepResult<String> {
    debug!("Downloading {}", url);
    let config = ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build();
    let agent = ureq::Agent::new_with_config(config);

    let mut response = agent.get(url).call().map_err(|e| match e {
        ureq::Error::StatusCode(code) if (400..500).contains(&code) && code != 429 => {
            LockstepError::permanent_fetch(locator, format!("HTTP {}", code))
        }
        other => LockstepError::transient_fetch(locator, other.to_string()),
    })?;

    let mut hasher = Sha256::new();
    let mut reader = response.body_mut().as_reader();
    std::io::copy(&mut reader, &mut hasher)
        .map_err(|e| LockstepError::transient_fetch(locator, format!("reading body: {}", e)))?;

    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SHA_A: &str = "1111111111111111111111111111111111111111";
    const SHA_B: &str = "2222222222222222222222222222222222222222";
    const SHA_C: &str = "3333333333333333333333333333333333333333";

    #[tokio::test]
    async fn path_fetch_is_content_addressed() {
        let temp = TempDir::new().unwrap();
        let input = temp.path().join("base");
        std::fs::create_dir(&input).unwrap();
        std::fs::write(input.join("default.toml"), "x = 1").unwrap();

        let fetcher = SourceFetcher::new(temp.path());
        let locator = Locator::parse("path:base").unwrap();

        let first = fetcher.fetch(&locator).await.unwrap();
        let second = fetcher.fetch(&locator).await.unwrap();
        assert_eq!(first, second);
        assert!(first.revision.starts_with(HASH_PREFIX));
        assert!(first.resolved_locator.starts_with("path:"));

        std::fs::write(input.join("default.toml"), "x = 2").unwrap();
        let third = fetcher.fetch(&locator).await.unwrap();
        assert_ne!(first.revision, third.revision);
    }

    #[tokio::test]
    async fn missing_path_is_permanent() {
        let temp = TempDir::new().unwrap();
        let fetcher = SourceFetcher::new(temp.path());
        let locator = Locator::parse("path:does-not-exist").unwrap();

        let err = fetcher.fetch(&locator).await.unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn pinned_git_needs_no_network() {
        let fetcher = SourceFetcher::new(".");
        let locator = Locator::parse(&format!("github:owner/repo/{}", SHA_A)).unwrap();

        let fetched = fetcher.fetch(&locator).await.unwrap();
        assert_eq!(fetched.revision, SHA_A);
        assert_eq!(
            fetched.resolved_locator,
            format!("git+https://github.com/owner/repo?rev={}", SHA_A)
        );
    }

    #[tokio::test]
    async fn stalled_download_gives_up() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        std::thread::spawn(move || {
            // Accept and hold connections without ever answering
            let mut held = Vec::new();
            for stream in listener.incoming().flatten() {
                held.push(stream);
            }
        });

        let fetcher = SourceFetcher::new(".").with_timeout(Duration::from_millis(300));
        let locator =
            Locator::parse(&format!("tarball+http://127.0.0.1:{}/src.tar.gz", port)).unwrap();

        let started = std::time::Instant::now();
        let err = tokio::time::timeout(Duration::from_secs(10), fetcher.fetch(&locator))
            .await
            .expect("download should stop on its own")
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn git_failures_are_classified() {
        assert!(is_permanent_git_failure(
            Some(128),
            "remote: Repository not found.\nfatal: repository 'https://github.com/a/b/' not found"
        ));
        assert!(is_permanent_git_failure(
            Some(128),
            "fatal: Authentication failed for 'https://example.com/r.git/'"
        ));
        assert!(!is_permanent_git_failure(
            Some(128),
            "fatal: unable to access 'https://example.com/r.git/': Could not resolve host"
        ));
        assert!(!is_permanent_git_failure(Some(2), "not found"));
    }

    #[test]
    fn first_commit_skips_noise() {
        let output = format!("warning: redirecting\n{}\tHEAD\n", SHA_B);
        assert_eq!(first_commit(&output).as_deref(), Some(SHA_B));
        assert!(first_commit("").is_none());
    }

    #[test]
    fn semver_tag_picks_highest_match() {
        let output = format!(
            "{a}\trefs/tags/v1.2.0\n{b}\trefs/tags/v1.4.1\n{c}\trefs/tags/v2.0.0\n{a}\trefs/tags/nightly\n",
            a = SHA_A,
            b = SHA_B,
            c = SHA_C
        );
        let req = semver::VersionReq::parse("^1.2").unwrap();
        let (tag, sha) = pick_semver_tag(&output, &req).unwrap();
        assert_eq!(tag, "v1.4.1");
        assert_eq!(sha, SHA_B);
    }

    #[test]
    fn semver_tag_prefers_peeled_commit() {
        let output = format!(
            "{a}\trefs/tags/v1.0.0\n{b}\trefs/tags/v1.0.0^{{}}\n",
            a = SHA_A,
            b = SHA_B
        );
        let req = semver::VersionReq::parse("=1.0.0").unwrap();
        let (_, sha) = pick_semver_tag(&output, &req).unwrap();
        assert_eq!(sha, SHA_B);
    }

    #[test]
    fn semver_tag_no_match() {
        let output = format!("{}\trefs/tags/v0.9.0\n", SHA_A);
        let req = semver::VersionReq::parse("^1").unwrap();
        assert!(pick_semver_tag(&output, &req).is_none());
    }
}
