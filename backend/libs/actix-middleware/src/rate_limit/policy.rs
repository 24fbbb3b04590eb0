//! Category policy table: request path → throttling category
//!
//! Rules are evaluated in order and the first rule with a prefix the path
//! starts with wins. Matching is plain string prefixing, so `/api/auth` also
//! covers `/api/authors`. Paths that match nothing fall into the default
//! category.

use std::time::Duration;

pub const DEFAULT_CATEGORY: &str = "default";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("category name must not be empty")]
    EmptyName,
    #[error("category {0} must allow at least one request")]
    ZeroLimit(String),
    #[error("category {0} must have a window of at least one second")]
    ZeroWindow(String),
    #[error("category {0} is defined more than once")]
    Duplicate(String),
    #[error("category {0} has no path prefixes")]
    NoPrefixes(String),
}

/// Throttling policy shared by every path in one category
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryPolicy {
    pub name: String,
    pub prefixes: Vec<String>,
    /// Requests allowed per window
    pub limit: u32,
    pub window: Duration,
}

impl CategoryPolicy {
    pub fn new<I, S>(name: impl Into<String>, prefixes: I, limit: u32, window_seconds: u64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            prefixes: prefixes.into_iter().map(Into::into).collect(),
            limit,
            window: Duration::from_secs(window_seconds),
        }
    }

    fn validate(&self) -> Result<(), PolicyError> {
        if self.name.trim().is_empty() {
            return Err(PolicyError::EmptyName);
        }
        if self.limit == 0 {
            return Err(PolicyError::ZeroLimit(self.name.clone()));
        }
        if self.window.as_secs() == 0 {
            return Err(PolicyError::ZeroWindow(self.name.clone()));
        }
        Ok(())
    }

    fn matches(&self, path: &str) -> bool {
        self.prefixes.iter().any(|prefix| path.starts_with(prefix.as_str()))
    }
}

/// Ordered category rules plus the fallback category
#[derive(Debug, Clone)]
pub struct PolicyTable {
    rules: Vec<CategoryPolicy>,
    default: CategoryPolicy,
}

impl PolicyTable {
    pub fn new(rules: Vec<CategoryPolicy>, default: CategoryPolicy) -> Result<Self, PolicyError> {
        default.validate()?;
        let mut seen = vec![default.name.as_str()];
        for rule in &rules {
            rule.validate()?;
            if rule.prefixes.is_empty() {
                return Err(PolicyError::NoPrefixes(rule.name.clone()));
            }
            if seen.contains(&rule.name.as_str()) {
                return Err(PolicyError::Duplicate(rule.name.clone()));
            }
            seen.push(&rule.name);
        }
        Ok(Self { rules, default })
    }

    /// Categories of the content API with a one minute default window
    pub fn builtin(default_limit: u32) -> Result<Self, PolicyError> {
        Self::new(
            builtin_rules(),
            CategoryPolicy::new(DEFAULT_CATEGORY, Vec::<String>::new(), default_limit, 60),
        )
    }

    /// Classify a request path. Any query string or fragment is ignored.
    pub fn classify(&self, path: &str) -> &CategoryPolicy {
        let path = strip_query(path);
        self.rules
            .iter()
            .find(|rule| rule.matches(path))
            .unwrap_or(&self.default)
    }

    pub fn categories(&self) -> impl Iterator<Item = &CategoryPolicy> {
        self.rules.iter().chain(std::iter::once(&self.default))
    }
}

/// Category rules of the content API, one minute windows
pub fn builtin_rules() -> Vec<CategoryPolicy> {
    vec![
        CategoryPolicy::new("auth", ["/api/auth"], 10, 60),
        CategoryPolicy::new("admin", ["/api/admin"], 120, 60),
        CategoryPolicy::new("facts", ["/api/facts"], 30, 60),
        CategoryPolicy::new("statistics", ["/api/statistics"], 30, 60),
        CategoryPolicy::new("news", ["/api/news"], 30, 60),
        CategoryPolicy::new("ai", ["/api/ai"], 30, 60),
    ]
}

fn strip_query(path: &str) -> &str {
    path.split(|c| c == '?' || c == '#').next().unwrap_or(path)
}

/// Segment-aware prefix test used by route access rules: `/api/auth` matches
/// `/api/auth` and `/api/auth/login` but not `/api/authors`.
pub(crate) fn path_has_prefix(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}
