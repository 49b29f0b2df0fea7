//! Path guard: which request paths skip authentication.

/// Trailing marker that turns an exclusion into a prefix match.
pub const WILDCARD: char = '*';

/// Whether `path` needs authentication given the exclusion patterns.
///
/// A missing path is never exempt. The path is compared with a trailing `/`
/// appended if it lacks one, so `/api/v1/status` and `/api/v1/status/` behave
/// the same. Exact patterns must therefore be written with the trailing slash.
pub fn requires_auth<S: AsRef<str>>(path: Option<&str>, excluded: &[S]) -> bool {
    let Some(path) = path else { return true; };
    if excluded.is_empty() { return true; }

    let normalized;
    let path = if path.ends_with('/') {
        path
    } else {
        normalized = format!("{}/", path);
        normalized.as_str()
    };

    !excluded.iter().any(|pat| {
        let pat = pat.as_ref();
        match pat.strip_suffix(WILDCARD) {
            Some(prefix) => path.starts_with(prefix),
            None => pat == path,
        }
    })
}

/// Configured exclusion list owned by the service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathGuard {
    excluded: Vec<String>,
}

impl PathGuard {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { excluded: patterns.into_iter().map(Into::<String>::into).filter(|p| !p.is_empty()).collect() }
    }

    /// Parse a comma separated list, ignoring blanks.
    pub fn parse(list: &str) -> Self {
        Self::new(list.split(',').map(str::trim))
    }

    pub fn patterns(&self) -> &[String] { &self.excluded }

    pub fn requires_auth(&self, path: Option<&str>) -> bool {
        requires_auth(path, self.excluded.as_slice())
    }
}
