//! SHA-256 content hashing for inputs, source trees and lock files
//!
//! Same bytes = same hash. Directory hashes walk the tree in sorted order
//! so the result does not depend on filesystem iteration order.

use crate::error::{LockstepError, LockstepResult};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use walkdir::WalkDir;

/// Prefix carried by every revision derived from content
pub const HASH_PREFIX: &str = "sha256-";

/// Directory entries never included in a tree hash
const SKIPPED: &[&str] = &[".git", "target", "lockstep.lock"];

/// Hex-encoded SHA-256 of a byte slice
pub fn hash_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Hex-encoded SHA-256 over a sequence of fields, each NUL-terminated
pub fn hash_fields<'a>(fields: impl IntoIterator<Item = &'a str>) -> String {
    let mut hasher = Sha256::new();
    for field in fields {
        hasher.update(field.as_bytes());
        hasher.update(b"\0");
    }
    hex::encode(hasher.finalize())
}

fn is_skipped(entry: &walkdir::DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .is_some_and(|name| SKIPPED.contains(&name))
}

/// Hash a directory tree: relative paths and file contents, sorted by path
pub fn hash_tree(root: &Path) -> LockstepResult<String> {
    if !root.is_dir() {
        return Err(LockstepError::io(
            format!("hashing {}", root.display()),
            std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
        ));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_skipped(e))
    {
        let entry = entry.map_err(|e| LockstepError::Io {
            context: format!("walking {}", root.display()),
            source: e.into(),
        })?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }

    let mut hasher = Sha256::new();
    for path in files {
        let relative = path.strip_prefix(root).unwrap_or(&path);
        // Forward slashes so the hash is identical across host platforms
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        hasher.update(relative.as_bytes());
        hasher.update(b"\0");

        let file = File::open(&path)
            .map_err(|e| LockstepError::io(format!("reading {}", path.display()), e))?;
        std::io::copy(&mut BufReader::new(file), &mut hasher)
            .map_err(|e| LockstepError::io(format!("reading {}", path.display()), e))?;
        hasher.update(b"\0");
    }

    Ok(format!("{}{}", HASH_PREFIX, hex::encode(hasher.finalize())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn hash_bytes_is_sha256() {
        assert_eq!(
            hash_bytes(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn fields_are_separated() {
        assert_ne!(hash_fields(["ab", "c"]), hash_fields(["a", "bc"]));
    }

    #[test]
    fn tree_hash_deterministic() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "aaa").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/b.txt"), "bbb").unwrap();

        let first = hash_tree(dir.path()).unwrap();
        let second = hash_tree(dir.path()).unwrap();
        assert_eq!(first, second);
        assert!(first.starts_with(HASH_PREFIX));
    }

    #[test]
    fn tree_hash_changes_with_content() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "one").unwrap();
        let before = hash_tree(dir.path()).unwrap();

        std::fs::write(dir.path().join("a.txt"), "two").unwrap();
        let after = hash_tree(dir.path()).unwrap();
        assert_ne!(before, after);
    }

    #[test]
    fn tree_hash_skips_vcs_and_build_dirs() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "aaa").unwrap();
        let before = hash_tree(dir.path()).unwrap();

        std::fs::create_dir(dir.path().join(".git")).unwrap();
        std::fs::write(dir.path().join(".git/HEAD"), "ref: refs/heads/main").unwrap();
        std::fs::create_dir(dir.path().join("target")).unwrap();
        std::fs::write(dir.path().join("target/out"), "binary").unwrap();
        std::fs::write(dir.path().join("lockstep.lock"), "version = 1").unwrap();

        assert_eq!(before, hash_tree(dir.path()).unwrap());
    }

    #[test]
    fn tree_hash_missing_dir() {
        assert!(hash_tree(Path::new("/nonexistent/lockstep-input")).is_err());
    }
}
