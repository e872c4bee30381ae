//! Name resolution: file stem to callable name.

use std::fmt;
use std::sync::Arc;

/// Named, swappable strategy turning a file stem into a script name.
///
/// Strategies must be pure and total; two stems that resolve to the same
/// name are a naming conflict in the registry.
#[derive(Clone)]
pub struct NameResolver {
    label: Arc<str>,
    resolve: Arc<dyn Fn(&str) -> String + Send + Sync>,
}

impl NameResolver {
    /// Build a resolver from a label and a pure function.
    pub fn new<F>(label: impl Into<Arc<str>>, resolve: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self {
            label: label.into(),
            resolve: Arc::new(resolve),
        }
    }

    /// `return_one` -> `returnOne`.
    pub fn camel_case() -> Self {
        Self::new("camel_case", camel_case)
    }

    /// Keep the stem as-is.
    pub fn identity() -> Self {
        Self::new("identity", str::to_string)
    }

    /// Resolve a file stem (or directory-relative path) to a script name.
    pub fn resolve(&self, stem: &str) -> String {
        (self.resolve)(stem)
    }

    /// Strategy label.
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl Default for NameResolver {
    fn default() -> Self {
        Self::camel_case()
    }
}

impl fmt::Debug for NameResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NameResolver")
            .field("label", &self.label)
            .finish()
    }
}

fn is_boundary(c: char) -> bool {
    matches!(c, '_' | '-' | '/')
}

/// Lowercase, then capitalize the first character after each run of
/// separators, except at the start.
pub fn camel_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut upper_next = false;

    for c in input.chars().flat_map(char::to_lowercase) {
        if is_boundary(c) {
            upper_next = !out.is_empty();
            continue;
        }
        if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }

    out
}
