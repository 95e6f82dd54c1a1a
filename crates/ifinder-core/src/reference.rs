use serde::{Deserialize, Serialize};

/// A URL or a path relative to the portal origin, as handed over by the calling policy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Reference(String);

impl Reference {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_absolute(&self) -> bool {
        has_scheme(self.0.trim())
    }

    /// Absolute address of this reference under `base`.
    pub fn resolve(&self, base: &str) -> String {
        resolve(base, &self.0)
    }
}

impl std::fmt::Display for Reference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Reference {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Reference {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// `scheme://...` with an RFC 3986 scheme name.
///
/// `localhost:8080/x` and `mailto:x` are treated as relative: only hierarchical URLs count.
pub fn has_scheme(s: &str) -> bool {
    let Some((scheme, rest)) = s.split_once(':') else {
        return false;
    };
    let mut chars = scheme.chars();
    let starts_alpha = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic());
    starts_alpha
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        && rest.starts_with("//")
}

/// Resolve `reference` against `base`.
///
/// Absolute references are returned as-is (trimmed). Anything else is joined to `base` with
/// exactly one separating slash. Total: never fails, same input gives the same output.
pub fn resolve(base: &str, reference: &str) -> String {
    let r = reference.trim();
    if has_scheme(r) {
        return r.to_string();
    }
    format!(
        "{}/{}",
        base.trim().trim_end_matches('/'),
        r.trim_start_matches('/')
    )
}
