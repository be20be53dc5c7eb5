//! Output filename derivation and collision resolution.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Mutex;

/// Basename used when sanitizing leaves nothing behind.
const FALLBACK_BASENAME: &str = "file";

/// Pixel dimensions of an image output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Disambiguating suffix placed between the basename and the extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NameSuffix {
    /// `_{width}x{height}`
    Dimensions(Dimensions),
    /// `_{n}`, 1-based.
    Index(usize),
}

impl fmt::Display for NameSuffix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dimensions(d) => write!(f, "_{}", d),
            Self::Index(n) => write!(f, "_{}", n),
        }
    }
}

/// Replaces filesystem-illegal characters and trims the result.
pub fn sanitize_basename(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let trimmed = replaced.trim_matches(|c: char| c.is_whitespace() || c == '.');
    if trimmed.is_empty() {
        FALLBACK_BASENAME.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Strips directory components and the final extension from a filename.
pub fn source_stem(file_name: &str) -> &str {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(file_name);
    match base.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => base,
    }
}

/// Builds `<sanitized stem><suffix>.<extension>` for a source filename.
pub fn output_filename(source_name: &str, suffix: Option<NameSuffix>, extension: &str) -> String {
    let stem = sanitize_basename(source_stem(source_name));
    match suffix {
        Some(suffix) => format!("{}{}.{}", stem, suffix, extension),
        None => format!("{}.{}", stem, extension),
    }
}

/// Returns `name` if unused, otherwise the first free `stem_N.ext` with N >= 1.
pub fn make_unique_filename(name: &str, used: &HashSet<String>) -> String {
    if !used.contains(name) {
        return name.to_string();
    }

    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    };

    (1..)
        .map(|n| match ext {
            Some(ext) => format!("{}_{}.{}", stem, n, ext),
            None => format!("{}_{}", stem, n),
        })
        .find(|candidate| !used.contains(candidate))
        .unwrap_or_else(|| name.to_string())
}

/// A set of claimed filenames shared by concurrently finishing tasks.
///
/// [`claim`](Self::claim) resolves and records a name under one lock, so two
/// callers can never end up with the same disambiguated name.
#[derive(Debug, Default)]
pub struct UsedNames {
    names: Mutex<HashSet<String>>,
}

impl UsedNames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the set with names that are already taken.
    pub fn with_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: Mutex::new(names.into_iter().map(Into::into).collect()),
        }
    }

    /// Resolves `name` against the set and records the result.
    pub fn claim(&self, name: &str) -> String {
        let mut names = self.names.lock().unwrap_or_else(|e| e.into_inner());
        let unique = make_unique_filename(name, &names);
        names.insert(unique.clone());
        unique
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.names.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn set(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_make_unique_filename_unused() {
        assert_eq!(make_unique_filename("a.png", &HashSet::new()), "a.png");
    }

    #[test]
    fn test_make_unique_filename_skips_taken_indices() {
        let used = set(&["a.png", "a_1.png", "a_2.png"]);
        assert_eq!(make_unique_filename("a.png", &used), "a_3.png");
    }

    #[test]
    fn test_make_unique_filename_without_extension() {
        let used = set(&["README"]);
        assert_eq!(make_unique_filename("README", &used), "README_1");
    }

    #[test]
    fn test_sanitize_basename() {
        assert_eq!(sanitize_basename("normal"), "normal");
        assert_eq!(sanitize_basename("AC/DC"), "AC_DC");
        assert_eq!(sanitize_basename("What?!"), "What_!");
        assert_eq!(sanitize_basename("  spaced out.  "), "spaced out");
        assert_eq!(sanitize_basename("tab\there"), "tab_here");
        assert_eq!(sanitize_basename(" ... "), "file");
    }

    #[test]
    fn test_source_stem() {
        assert_eq!(source_stem("photo.jpeg"), "photo");
        assert_eq!(source_stem("archive.tar.gz"), "archive.tar");
        assert_eq!(source_stem("dir/sub\\clip.wav"), "clip");
        assert_eq!(source_stem(".hidden"), ".hidden");
        assert_eq!(source_stem("noext"), "noext");
    }

    #[test]
    fn test_output_filename_with_suffixes() {
        assert_eq!(output_filename("song.wav", None, "mp3"), "song.mp3");
        assert_eq!(
            output_filename("logo.png", Some(NameSuffix::Dimensions(Dimensions::new(32, 32))), "ico"),
            "logo_32x32.ico"
        );
        assert_eq!(
            output_filename("favicon.ico", Some(NameSuffix::Index(2)), "png"),
            "favicon_2.png"
        );
        assert_eq!(output_filename("we:ird?.gif", None, "png"), "we_ird_.png");
    }

    #[test]
    fn test_used_names_claim_is_serialized() {
        let used = Arc::new(UsedNames::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let used = Arc::clone(&used);
                std::thread::spawn(move || used.claim("out.png"))
            })
            .collect();

        let mut names: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 8);
        assert!(names.contains(&"out.png".to_string()));
        assert!(names.contains(&"out_7.png".to_string()));
    }

    #[test]
    fn test_used_names_seeded() {
        let used = UsedNames::with_names(["a.png"]);
        assert!(used.contains("a.png"));
        assert_eq!(used.claim("a.png"), "a_1.png");
        assert_eq!(used.len(), 2);
        used.clear();
        assert!(used.is_empty());
    }
}
