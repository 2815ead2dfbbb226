//! Cache key for stored pages.

use std::fmt;

/// Identifies one stored rendering of a page.
///
/// The viewer is part of the key because the page chrome differs between
/// anonymous and signed-in readers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageKey {
    prefix: String,
    path_and_query: String,
    viewer: Option<i64>,
}

impl PageKey {
    pub fn new(prefix: &str, path_and_query: &str, viewer: Option<i64>) -> Self {
        Self {
            prefix: prefix.to_string(),
            path_and_query: path_and_query.to_string(),
            viewer,
        }
    }
}

impl fmt::Display for PageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.viewer {
            Some(id) => write!(f, "{}:{}:user-{id}", self.prefix, self.path_and_query),
            None => write!(f, "{}:{}:anonymous", self.prefix, self.path_and_query),
        }
    }
}
