//! Path pattern compilation, matching and scoring.
//!
//! # Responsibilities
//! - Compile a pattern (`/todos/:id`, `files/*`, `:lang?/about`) into segments
//! - Match a pathname, extracting percent-decoded params
//! - Score patterns so the most specific one ranks first
//! - Interpolate params back into a pattern
//!
//! # Design Decisions
//! - Segment-wise comparison, no regex: O(segments) per match
//! - Static segments compare case-insensitively unless the pattern opts in
//! - Optional segments are exploded into plain alternatives up front; each
//!   alternative is scored on its own
//! - Trailing slashes on the pathname are ignored
//! - A splat captures the remainder, slashes included, under `*`

use std::borrow::Cow;
use std::collections::{BTreeMap, HashSet};

use percent_encoding::percent_decode_str;
use serde::Serialize;
use thiserror::Error;

/// Param key a splat segment is captured under.
pub const SPLAT_PARAM: &str = "*";

const STATIC_SEGMENT_VALUE: i32 = 10;
const DYNAMIC_SEGMENT_VALUE: i32 = 3;
const EMPTY_SEGMENT_VALUE: i32 = 1;
const INDEX_ROUTE_VALUE: i32 = 2;
const SPLAT_PENALTY: i32 = -2;

/// Errors raised while compiling or generating paths.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("pattern {pattern:?} declares param {name:?} more than once")]
    DuplicateParam { pattern: String, name: String },

    #[error("pattern {pattern:?} has a splat that is not the final segment")]
    SplatNotLast { pattern: String },

    #[error("pattern {pattern:?} has an invalid segment {segment:?}")]
    InvalidSegment { pattern: String, segment: String },

    #[error("missing param {name:?} for pattern {pattern:?}")]
    MissingParam { pattern: String, name: String },
}

/// One compiled segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Static(String),
    Dynamic(String),
    Splat,
}

/// Result of matching a pathname against a pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathMatch {
    /// Decoded param values by name; the splat is under [`SPLAT_PARAM`].
    pub params: BTreeMap<String, String>,
    /// Portion of the pathname the pattern consumed.
    pub pathname: String,
    /// `pathname` without the splat remainder; children resolve against it.
    pub pathname_base: String,
    pub pattern: String,
    pub score: i32,
}

/// Anything that can match a pathname.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    fn match_path(&self, pathname: &str) -> Option<PathMatch>;
}

/// A single pattern without optional segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    source: String,
    segments: Vec<Segment>,
    case_sensitive: bool,
    end: bool,
    score: i32,
}

impl PathPattern {
    /// Compile `pattern`. With `end = false` the pattern only has to match a
    /// prefix of the pathname (ending on a segment boundary).
    pub fn compile(pattern: &str, case_sensitive: bool, end: bool) -> Result<Self, PathError> {
        let raw: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
        let mut segments = Vec::with_capacity(raw.len());
        let mut names = HashSet::new();

        for (i, segment) in raw.iter().enumerate() {
            let compiled = if *segment == "*" {
                if i + 1 != raw.len() {
                    return Err(PathError::SplatNotLast {
                        pattern: pattern.to_string(),
                    });
                }
                Segment::Splat
            } else if let Some(name) = segment.strip_prefix(':') {
                if !is_param_name(name) {
                    return Err(invalid(pattern, segment));
                }
                if !names.insert(name.to_string()) {
                    return Err(PathError::DuplicateParam {
                        pattern: pattern.to_string(),
                        name: name.to_string(),
                    });
                }
                Segment::Dynamic(name.to_string())
            } else if segment.contains('*') || segment.ends_with('?') {
                return Err(invalid(pattern, segment));
            } else {
                Segment::Static(segment.to_string())
            };
            segments.push(compiled);
        }

        Ok(Self {
            source: pattern.to_string(),
            segments,
            case_sensitive,
            end,
            score: compute_score(pattern, false),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn score(&self) -> i32 {
        self.score
    }

    pub fn has_splat(&self) -> bool {
        matches!(self.segments.last(), Some(Segment::Splat))
    }

    /// Param names in declaration order; the splat is reported as `*`.
    pub fn param_names(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Dynamic(name) => Some(name.as_str()),
                Segment::Splat => Some(SPLAT_PARAM),
                Segment::Static(_) => None,
            })
            .collect()
    }
}

impl Matcher for PathPattern {
    fn match_path(&self, pathname: &str) -> Option<PathMatch> {
        let raw: Vec<&str> = pathname.split('/').filter(|s| !s.is_empty()).collect();
        let mut params = BTreeMap::new();
        let mut consumed = 0;

        for segment in &self.segments {
            match segment {
                Segment::Static(literal) => {
                    let value = *raw.get(consumed)?;
                    let actual = percent_decode_str(value)
                        .decode_utf8()
                        .unwrap_or(Cow::Borrowed(value));
                    let equal = if self.case_sensitive {
                        actual == literal.as_str()
                    } else {
                        actual.to_lowercase() == literal.to_lowercase()
                    };
                    if !equal {
                        return None;
                    }
                    consumed += 1;
                }
                Segment::Dynamic(name) => {
                    let value = *raw.get(consumed)?;
                    params.insert(name.clone(), decode_param(value, name).into_owned());
                    consumed += 1;
                }
                Segment::Splat => {
                    let base = join_segments(&raw[..consumed]);
                    let rest = raw[consumed..].join("/");
                    params.insert(
                        SPLAT_PARAM.to_string(),
                        decode_param(&rest, SPLAT_PARAM).into_owned(),
                    );
                    return Some(PathMatch {
                        params,
                        pathname: join_segments(&raw),
                        pathname_base: base,
                        pattern: self.source.clone(),
                        score: self.score,
                    });
                }
            }
        }

        if self.end && consumed != raw.len() {
            return None;
        }

        let matched = join_segments(&raw[..consumed]);
        Some(PathMatch {
            params,
            pathname: matched.clone(),
            pathname_base: matched,
            pattern: self.source.clone(),
            score: self.score,
        })
    }
}

/// A pattern that may contain optional segments, compiled to its
/// alternatives.
#[derive(Debug, Clone)]
pub struct PathMatcher {
    source: String,
    alternatives: Vec<PathPattern>,
}

impl PathMatcher {
    /// Compile a full-match pattern.
    pub fn compile(pattern: &str, case_sensitive: bool) -> Result<Self, PathError> {
        let mut alternatives = explode_optional_segments(pattern)
            .iter()
            .map(|alt| PathPattern::compile(alt, case_sensitive, true))
            .collect::<Result<Vec<_>, _>>()?;
        // stable: equal scores keep explosion order
        alternatives.sort_by(|a, b| b.score.cmp(&a.score));
        Ok(Self {
            source: pattern.to_string(),
            alternatives,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn alternatives(&self) -> &[PathPattern] {
        &self.alternatives
    }
}

impl Matcher for PathMatcher {
    fn match_path(&self, pathname: &str) -> Option<PathMatch> {
        self.alternatives.iter().find_map(|alt| {
            alt.match_path(pathname).map(|mut m| {
                m.pattern = self.source.clone();
                m
            })
        })
    }
}

/// Match `pathname` against a full pattern in one call.
pub fn match_path(pattern: &str, pathname: &str) -> Result<Option<PathMatch>, PathError> {
    Ok(PathMatcher::compile(pattern, false)?.match_path(pathname))
}

/// Rank weight of a (joined) pattern.
///
/// Each segment counts one, plus 10 for a static segment, 3 for a dynamic
/// one and 1 for an empty one. A splat costs 2 and an index route earns 2.
pub fn compute_score(pattern: &str, index: bool) -> i32 {
    let segments: Vec<&str> = pattern.split('/').collect();
    let mut score = segments.len() as i32;
    if segments.iter().any(|s| *s == "*") {
        score += SPLAT_PENALTY;
    }
    if index {
        score += INDEX_ROUTE_VALUE;
    }

    segments
        .iter()
        .filter(|s| **s != "*")
        .fold(score, |score, segment| {
            score
                + if segment.starts_with(':') {
                    DYNAMIC_SEGMENT_VALUE
                } else if segment.is_empty() {
                    EMPTY_SEGMENT_VALUE
                } else {
                    STATIC_SEGMENT_VALUE
                }
        })
}

/// Expand `a/:b?/c?` into every combination of present/absent optional
/// segments, the most complete first.
pub fn explode_optional_segments(pattern: &str) -> Vec<String> {
    let exploded = explode(&pattern.split('/').collect::<Vec<_>>());
    exploded
        .into_iter()
        .map(|alt| {
            if pattern.starts_with('/') && alt.is_empty() {
                "/".to_string()
            } else {
                alt
            }
        })
        .collect()
}

fn explode(segments: &[&str]) -> Vec<String> {
    let Some((first, rest)) = segments.split_first() else {
        return Vec::new();
    };
    let optional = first.ends_with('?');
    let required = first.trim_end_matches('?');

    if rest.is_empty() {
        return if optional {
            vec![required.to_string(), String::new()]
        } else {
            vec![required.to_string()]
        };
    }

    let rest_exploded = explode(rest);
    let mut result: Vec<String> = rest_exploded
        .iter()
        .map(|sub| {
            if sub.is_empty() {
                required.to_string()
            } else {
                format!("{required}/{sub}")
            }
        })
        .collect();
    if optional {
        result.extend(rest_exploded);
    }
    result
}

/// Interpolate `params` into `pattern`. Optional segments whose param is
/// absent are dropped; a missing required param is an error.
pub fn generate_path(
    pattern: &str,
    params: &BTreeMap<String, String>,
) -> Result<String, PathError> {
    let mut out: Vec<String> = Vec::new();

    for segment in pattern.split('/').filter(|s| !s.is_empty()) {
        if segment == "*" {
            if let Some(splat) = params.get(SPLAT_PARAM) {
                let splat = splat.trim_start_matches('/');
                if !splat.is_empty() {
                    out.push(splat.to_string());
                }
            }
        } else if let Some(name) = segment.strip_prefix(':') {
            let optional = name.ends_with('?');
            let name = name.trim_end_matches('?');
            match params.get(name) {
                Some(value) => out.push(value.clone()),
                None if optional => {}
                None => {
                    return Err(PathError::MissingParam {
                        pattern: pattern.to_string(),
                        name: name.to_string(),
                    })
                }
            }
        } else {
            out.push(segment.trim_end_matches('?').to_string());
        }
    }

    let joined = out.join("/");
    if pattern.starts_with('/') || joined.is_empty() {
        Ok(format!("/{joined}"))
    } else {
        Ok(joined)
    }
}

fn is_param_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_')
}

fn invalid(pattern: &str, segment: &str) -> PathError {
    PathError::InvalidSegment {
        pattern: pattern.to_string(),
        segment: segment.to_string(),
    }
}

fn join_segments(segments: &[&str]) -> String {
    format!("/{}", segments.join("/"))
}

fn decode_param<'a>(value: &'a str, name: &str) -> Cow<'a, str> {
    match percent_decode_str(value).decode_utf8() {
        Ok(decoded) => decoded,
        Err(error) => {
            tracing::warn!(
                param = %name,
                value = %value,
                error = %error,
                "Param value is not valid percent-encoded UTF-8, using it as-is"
            );
            Cow::Borrowed(value)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full(pattern: &str) -> PathPattern {
        PathPattern::compile(pattern, false, true).unwrap()
    }

    #[test]
    fn test_static_and_dynamic() {
        let m = full("/todos/:id").match_path("/todos/42").unwrap();
        assert_eq!(m.params.get("id").map(String::as_str), Some("42"));
        assert_eq!(m.pathname, "/todos/42");

        assert!(full("/todos/:id").match_path("/todos").is_none());
        assert!(full("/todos/:id").match_path("/todos/42/edit").is_none());
    }

    #[test]
    fn test_trailing_slash_ignored() {
        assert!(full("/todos").match_path("/todos/").is_some());
        assert!(full("/").match_path("/").is_some());
        assert!(full("/").match_path("/todos").is_none());
    }

    #[test]
    fn test_case_sensitivity() {
        assert!(full("/About").match_path("/about").is_some());
        let sensitive = PathPattern::compile("/About", true, true).unwrap();
        assert!(sensitive.match_path("/about").is_none());
        assert!(sensitive.match_path("/About").is_some());
    }

    #[test]
    fn test_splat_captures_remainder() {
        let m = full("/files/*").match_path("/files/a/b%20c.txt").unwrap();
        assert_eq!(m.params.get(SPLAT_PARAM).map(String::as_str), Some("a/b c.txt"));
        assert_eq!(m.pathname_base, "/files");
        assert_eq!(m.pathname, "/files/a/b%20c.txt");

        let empty = full("/files/*").match_path("/files").unwrap();
        assert_eq!(empty.params.get(SPLAT_PARAM).map(String::as_str), Some(""));
    }

    #[test]
    fn test_params_are_decoded_after_splitting() {
        let m = full("/users/:name").match_path("/users/a%2Fb").unwrap();
        assert_eq!(m.params.get("name").map(String::as_str), Some("a/b"));

        let bad = full("/users/:name").match_path("/users/%E0%A4%A").unwrap();
        assert_eq!(bad.params.get("name").map(String::as_str), Some("%E0%A4%A"));
    }

    #[test]
    fn test_prefix_match() {
        let parent = PathPattern::compile("/todos", false, false).unwrap();
        let m = parent.match_path("/todos/42").unwrap();
        assert_eq!(m.pathname, "/todos");
        assert!(parent.match_path("/todosx").is_none());
    }

    #[test]
    fn test_construction_errors() {
        assert!(matches!(
            PathPattern::compile("/a/:id/:id", false, true),
            Err(PathError::DuplicateParam { .. })
        ));
        assert!(matches!(
            PathPattern::compile("/a/*/b", false, true),
            Err(PathError::SplatNotLast { .. })
        ));
        assert!(matches!(
            PathPattern::compile("/a*", false, true),
            Err(PathError::InvalidSegment { .. })
        ));
    }

    #[test]
    fn test_scores_rank_specificity() {
        assert!(compute_score("/todos/junk", false) > compute_score("/todos/:id", false));
        assert!(compute_score("/todos/:id", false) > compute_score("/todos/*", false));
        assert!(compute_score("/todos", true) > compute_score("/todos", false));
        assert_eq!(compute_score("/todos/:id", false), 3 + 1 + 10 + 3);
    }

    #[test]
    fn test_optional_segments() {
        assert_eq!(
            explode_optional_segments("/:lang?/about"),
            vec!["/:lang/about".to_string(), "/about".to_string()]
        );
        assert_eq!(
            explode_optional_segments("/a?"),
            vec!["/a".to_string(), "/".to_string()]
        );

        let matcher = PathMatcher::compile("/:lang?/about", false).unwrap();
        let with = matcher.match_path("/en/about").unwrap();
        assert_eq!(with.params.get("lang").map(String::as_str), Some("en"));
        let without = matcher.match_path("/about").unwrap();
        assert!(without.params.is_empty());
        assert_eq!(without.pattern, "/:lang?/about");
    }

    #[test]
    fn test_generate_path() {
        let mut params = BTreeMap::new();
        params.insert("id".to_string(), "42".to_string());
        assert_eq!(generate_path("/todos/:id", &params).unwrap(), "/todos/42");
        assert_eq!(generate_path("/:lang?/todos/:id", &params).unwrap(), "/todos/42");
        assert!(matches!(
            generate_path("/users/:user", &params),
            Err(PathError::MissingParam { .. })
        ));

        params.insert(SPLAT_PARAM.to_string(), "a/b".to_string());
        assert_eq!(generate_path("/files/*", &params).unwrap(), "/files/a/b");
    }
}
