//! Path helpers shared by the matcher, discoverers and storage.

use crate::error::{Result, RoutingError};
use url::Url;

/// Non-empty segments of a slash separated path.
pub fn elements_of(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Joins segments into an absolute path. No segments yields `/`.
pub fn path_from<S: AsRef<str>>(elements: &[S]) -> String {
    if elements.is_empty() {
        return "/".to_string();
    }
    let mut out = String::new();
    for element in elements {
        out.push('/');
        out.push_str(element.as_ref());
    }
    out
}

/// Normalizes `path` to an absolute path of at most `max_depth` segments.
pub fn normalize(path: &str, max_depth: usize) -> String {
    let elements = elements_of(path);
    let take = elements.len().min(max_depth);
    path_from(&elements[..take])
}

pub fn depth(path: &str) -> usize {
    elements_of(path).len()
}

/// Parent of an absolute path, `/` for top level paths.
pub fn parent_path(path: &str) -> String {
    let elements = elements_of(path);
    if elements.len() <= 1 {
        return "/".to_string();
    }
    path_from(&elements[..elements.len() - 1])
}

/// Segment-boundary aware ancestry check: `/org/a` is below `/org`, `/organic` is not.
pub fn is_descendant_or_self(path: &str, ancestor: &str) -> bool {
    let path = elements_of(path);
    let ancestor = elements_of(ancestor);
    path.len() >= ancestor.len() && path[..ancestor.len()] == ancestor[..]
}

/// Parses a remote URL as a directory base, so relative joins land below it.
pub fn base_url(base: &str) -> Result<Url> {
    let mut url = Url::parse(base)
        .map_err(|e| RoutingError::InvalidArgument(format!("remote URL '{base}': {e}")))?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Resolves a repository path below a base URL.
pub fn join_url(base: &str, path: &str) -> Result<String> {
    let url = base_url(base)?
        .join(path.trim_start_matches('/'))
        .map_err(|e| RoutingError::InvalidArgument(format!("path '{path}': {e}")))?;
    Ok(url.into())
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
