//! A case-insensitive path preserving original casing.
//!
//! Mirrors the source application's `Path`: construction normalizes the
//! string (no `..`/`.`/empty segments survive), but every comparison,
//! ordering, and hash operates on the case-folded form so two paths that
//! differ only in case are the same path.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Extensions recognized as "encodings" so `a.tar.gz` splits as stem `a`,
/// suffix `.tar.gz` rather than stem `a.tar`, suffix `.gz`. Ported from
/// Python's `mimetypes.encodings_map`.
const ENCODING_SUFFIXES: &[&str] = &[".gz", ".Z", ".bz2", ".xz", ".br"];

#[derive(Clone, Eq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Path(String);

impl Path {
    pub fn new(path: impl AsRef<str>) -> Self {
        Path(normalize(path.as_ref()))
    }

    pub fn root() -> Self {
        Path(".".to_string())
    }

    pub fn is_root(&self) -> bool {
        self.0 == "."
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The final path component.
    pub fn name(&self) -> &str {
        match self.0.rfind('/') {
            Some(i) => &self.0[i + 1..],
            None => {
                if self.0 == "." {
                    "."
                } else {
                    &self.0
                }
            }
        }
    }

    /// The parent of this path. The parent of `"."` is itself.
    pub fn parent(&self) -> Path {
        if self.0 == "." {
            return self.clone();
        }
        match self.0.rfind('/') {
            Some(0) => Path("/".to_string()),
            Some(i) => Path(self.0[..i].to_string()),
            None => Path::root(),
        }
    }

    /// All ancestors, nearest first, ending with (and including) the root.
    pub fn parents(&self) -> Vec<Path> {
        let mut out = Vec::new();
        let mut cur = self.clone();
        loop {
            let p = cur.parent();
            out.push(p.clone());
            if p.is_root() || p == cur {
                break;
            }
            cur = p;
        }
        out
    }

    /// The final path component without its (possibly compound) suffix.
    pub fn stem(&self) -> &str {
        split_ext(self.name()).0
    }

    /// The (possibly compound, e.g. `.tar.gz`) suffix of the final component.
    pub fn suffix(&self) -> String {
        split_ext(self.name()).1
    }

    /// True if `self` is `other`, or nested under `other`, case-insensitively.
    /// `other == "."` is relative-to everything.
    pub fn is_relative_to(&self, other: &Path) -> bool {
        if other.0 == "." || self == other {
            return true;
        }
        let start = other.0.to_lowercase();
        self.0.to_lowercase().starts_with(&format!("{start}/"))
    }

    /// `self` with its leading `other`-length prefix replaced by `other`'s
    /// original casing. Requires `self.is_relative_to(other)`.
    pub fn with_restored_casing(&self, other: &Path) -> Path {
        debug_assert!(self.is_relative_to(other));
        if other.0 == "." {
            return self.clone();
        }
        Path(format!("{}{}", other.0, &self.0[other.0.len()..]))
    }

    /// `self` with its stem replaced, suffix preserved.
    pub fn with_stem(&self, next_stem: &str) -> Path {
        self.parent().join(&format!("{next_stem}{}", self.suffix()))
    }

    /// `self` with its suffix removed.
    pub fn with_stem_only(&self) -> Path {
        self.parent().join(self.stem())
    }

    /// Join a child segment (or relative path) onto `self`.
    pub fn join(&self, child: &str) -> Path {
        if child.is_empty() {
            return self.clone();
        }
        if self.0 == "." {
            Path::new(child)
        } else {
            Path::new(format!("{}/{}", self.0, child))
        }
    }

    fn casefold(&self) -> String {
        self.0.to_lowercase()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Path({:?})", self.0)
    }
}

impl From<&str> for Path {
    fn from(s: &str) -> Self {
        Path::new(s)
    }
}

impl From<String> for Path {
    fn from(s: String) -> Self {
        Path::new(s)
    }
}

impl PartialEq for Path {
    fn eq(&self, other: &Self) -> bool {
        self.casefold() == other.casefold()
    }
}

impl Hash for Path {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.casefold().hash(state);
    }
}

impl PartialOrd for Path {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Path {
    fn cmp(&self, other: &Self) -> Ordering {
        self.casefold().cmp(&other.casefold())
    }
}

/// Normalize a path string: split on `/`, drop empty/`.` segments, resolve
/// `..` against preceding segments, rejoin. Equivalent to
/// `os.path.normpath` for the subset of inputs this domain produces
/// (relative POSIX-style paths; no drive letters, no leading `/` retained
/// since every path is namespace-relative).
fn normalize(path: &str) -> String {
    let mut stack: Vec<&str> = Vec::new();
    for seg in path.split('/') {
        match seg {
            "" | "." => continue,
            ".." => {
                stack.pop();
            }
            s => stack.push(s),
        }
    }
    if stack.is_empty() {
        ".".to_string()
    } else {
        stack.join("/")
    }
}

fn split_ext(name: &str) -> (&str, String) {
    let (stem, suffix) = split_once_ext(name);
    if let Some(enc) = ENCODING_SUFFIXES.iter().find(|e| e.eq_ignore_ascii_case(suffix)) {
        let (stem2, suffix2) = split_once_ext(stem);
        (stem2, format!("{suffix2}{enc}"))
    } else {
        (stem, suffix.to_string())
    }
}

/// Split `"a.b.c"` into `("a.b", ".c")`, matching `os.path.splitext`: a
/// leading-dot-only name (`".bashrc"`) has no suffix.
fn split_once_ext(name: &str) -> (&str, &str) {
    let trimmed = name.trim_start_matches('.');
    let lead = name.len() - trimmed.len();
    match trimmed.rfind('.') {
        Some(i) => (&name[..lead + i], &name[lead + i..]),
        None => (name, ""),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn normalizes_redundant_segments() {
        assert_eq!(Path::new("a//b/./c").as_str(), "a/b/c");
        assert_eq!(Path::new("a/b/../c").as_str(), "a/c");
        assert_eq!(Path::new("").as_str(), ".");
    }

    #[test]
    fn equality_is_case_insensitive() {
        assert_eq!(Path::new("Foo/Bar.TXT"), Path::new("foo/bar.txt"));
    }

    #[test]
    fn name_parent_stem_suffix() {
        let p = Path::new("a/b/report.tar.gz");
        assert_eq!(p.name(), "report.tar.gz");
        assert_eq!(p.parent(), Path::new("a/b"));
        assert_eq!(p.stem(), "report");
        assert_eq!(p.suffix(), ".tar.gz");
    }

    #[test]
    fn dotfile_has_no_suffix() {
        let p = Path::new(".bashrc");
        assert_eq!(p.stem(), ".bashrc");
        assert_eq!(p.suffix(), "");
    }

    #[test]
    fn is_relative_to_and_restore_casing() {
        let parent = Path::new("A/B");
        let child = Path::new("a/b/C.txt");
        assert!(child.is_relative_to(&parent));
        assert_eq!(child.with_restored_casing(&parent), Path::new("A/B/C.txt"));
        assert!(Path::new("anything").is_relative_to(&Path::root()));
    }

    #[test]
    fn with_stem_preserves_suffix() {
        let p = Path::new("a/photo.jpg");
        assert_eq!(p.with_stem("photo (1)"), Path::new("a/photo (1).jpg"));
    }

    #[test]
    fn parents_end_at_root() {
        let p = Path::new("a/b/c");
        let parents: Vec<_> = p.parents();
        assert_eq!(parents, vec![Path::new("a/b"), Path::new("a"), Path::root()]);
    }
}
