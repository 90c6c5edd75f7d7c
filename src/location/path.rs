//! Paths, locations and form data.
//!
//! # Responsibilities
//! - Split an href into pathname/search/hash and back
//! - Resolve relative targets (`..`, `.`) against a pathname
//! - Strip a configured basename
//! - Encode form data into a search string for GET submissions

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::form_urlencoded;

/// The string-encodable part of a location.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Path {
    pub pathname: String,
    /// Either empty or starting with `?`.
    pub search: String,
    /// Either empty or starting with `#`.
    pub hash: String,
}

impl Path {
    pub fn new(pathname: impl Into<String>) -> Self {
        Self {
            pathname: pathname.into(),
            search: String::new(),
            hash: String::new(),
        }
    }

    pub fn with_search(mut self, search: impl AsRef<str>) -> Self {
        self.search = normalize_search(search.as_ref());
        self
    }

    pub fn with_hash(mut self, hash: impl AsRef<str>) -> Self {
        self.hash = normalize_hash(hash.as_ref());
        self
    }
}

impl std::fmt::Display for Path {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&create_path(self))
    }
}

impl From<&str> for Path {
    fn from(href: &str) -> Self {
        parse_path(href)
    }
}

impl From<String> for Path {
    fn from(href: String) -> Self {
        parse_path(&href)
    }
}

/// A history entry: path plus opaque state and a unique key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub pathname: String,
    pub search: String,
    pub hash: String,
    /// Application data attached to the entry; not part of the href.
    pub state: Option<Value>,
    /// Unique per history entry.
    pub key: String,
}

impl Location {
    pub fn new(path: Path, state: Option<Value>, key: impl Into<String>) -> Self {
        Self {
            pathname: path.pathname,
            search: path.search,
            hash: path.hash,
            state,
            key: key.into(),
        }
    }

    pub fn path(&self) -> Path {
        Path {
            pathname: self.pathname.clone(),
            search: self.search.clone(),
            hash: self.hash.clone(),
        }
    }

    /// `pathname + search + hash`.
    pub fn href(&self) -> String {
        create_path(&self.path())
    }

    /// pathname + search, which is what loaders see as their URL.
    pub fn url(&self) -> String {
        format!("{}{}", self.pathname, self.search)
    }
}

impl Default for Location {
    fn default() -> Self {
        Self::new(Path::new("/"), None, "default")
    }
}

/// Random 8 character key for a new history entry.
pub fn create_key() -> String {
    std::iter::repeat_with(fastrand::alphanumeric)
        .take(8)
        .collect::<String>()
        .to_lowercase()
}

/// Render a [`Path`] as an href.
pub fn create_path(path: &Path) -> String {
    let mut href = if path.pathname.is_empty() {
        "/".to_string()
    } else {
        path.pathname.clone()
    };
    if !path.search.is_empty() && path.search != "?" {
        if !path.search.starts_with('?') {
            href.push('?');
        }
        href.push_str(&path.search);
    }
    if !path.hash.is_empty() && path.hash != "#" {
        if !path.hash.starts_with('#') {
            href.push('#');
        }
        href.push_str(&path.hash);
    }
    href
}

/// Split an href into its parts. The pathname is left empty when the href
/// only carries a search and/or hash, so it can resolve against the current
/// location.
pub fn parse_path(href: &str) -> Path {
    let mut rest = href;
    let mut path = Path::default();

    if let Some(idx) = rest.find('#') {
        path.hash = rest[idx..].to_string();
        rest = &rest[..idx];
    }
    if let Some(idx) = rest.find('?') {
        path.search = rest[idx..].to_string();
        rest = &rest[..idx];
    }
    path.pathname = rest.to_string();
    if path.hash == "#" {
        path.hash.clear();
    }
    if path.search == "?" {
        path.search.clear();
    }
    path
}

fn normalize_search(search: &str) -> String {
    if search.is_empty() || search == "?" {
        String::new()
    } else if search.starts_with('?') {
        search.to_string()
    } else {
        format!("?{search}")
    }
}

fn normalize_hash(hash: &str) -> String {
    if hash.is_empty() || hash == "#" {
        String::new()
    } else if hash.starts_with('#') {
        hash.to_string()
    } else {
        format!("#{hash}")
    }
}

/// Resolve `to` against `from_pathname`. Absolute targets replace the
/// pathname; relative ones walk `.` and `..` segments from it.
pub fn resolve_path(to: &Path, from_pathname: &str) -> Path {
    let pathname = if to.pathname.is_empty() {
        from_pathname.to_string()
    } else if to.pathname.starts_with('/') {
        resolve_pathname(&to.pathname, "/")
    } else {
        resolve_pathname(&to.pathname, from_pathname)
    };

    Path {
        pathname,
        search: normalize_search(&to.search),
        hash: normalize_hash(&to.hash),
    }
}

fn resolve_pathname(relative: &str, from: &str) -> String {
    let mut segments: Vec<&str> = from
        .trim_end_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();

    for segment in relative.split('/') {
        match segment {
            ".." => {
                segments.pop();
            }
            "." | "" => {}
            other => segments.push(other),
        }
    }

    if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", segments.join("/"))
    }
}

/// Join path pieces and collapse duplicate slashes.
pub fn join_paths<'a>(paths: impl IntoIterator<Item = &'a str>) -> String {
    let joined = paths.into_iter().collect::<Vec<_>>().join("/");
    let mut out = String::with_capacity(joined.len());
    let mut prev_slash = false;
    for c in joined.chars() {
        if c == '/' {
            if !prev_slash {
                out.push(c);
            }
            prev_slash = true;
        } else {
            out.push(c);
            prev_slash = false;
        }
    }
    out
}

/// Drop trailing slashes and ensure a leading one.
pub fn normalize_pathname(pathname: &str) -> String {
    let trimmed = pathname.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

/// Remove `basename` from the front of `pathname`.
///
/// The comparison is case-insensitive and the basename must end at a
/// segment boundary. Returns `None` when the pathname is outside the
/// basename.
pub fn strip_basename(pathname: &str, basename: &str) -> Option<String> {
    if basename.is_empty() || basename == "/" {
        return Some(pathname.to_string());
    }

    let basename = basename.trim_end_matches('/');
    if pathname.len() < basename.len()
        || !pathname.is_char_boundary(basename.len())
        || !pathname[..basename.len()].eq_ignore_ascii_case(basename)
    {
        return None;
    }

    let rest = &pathname[basename.len()..];
    if rest.is_empty() {
        Some("/".to_string())
    } else if rest.starts_with('/') {
        Some(rest.to_string())
    } else {
        None
    }
}

/// Ordered name/value pairs submitted with a navigation or fetcher.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormData(Vec<(String, String)>);

impl FormData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.append(name, value);
        self
    }

    /// First value for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.0
            .iter()
            .filter(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `application/x-www-form-urlencoded` encoding, without a leading `?`.
    pub fn to_query(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.0.iter())
            .finish()
    }

    /// Parse a search string (leading `?` optional).
    pub fn from_query(search: &str) -> Self {
        let query = search.strip_prefix('?').unwrap_or(search);
        Self(
            form_urlencoded::parse(query.as_bytes())
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect(),
        )
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FormData {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// True when the search string carries a bare `index` parameter.
pub fn has_index_param(search: &str) -> bool {
    FormData::from_query(search)
        .iter()
        .any(|(k, v)| k == "index" && v.is_empty())
}
