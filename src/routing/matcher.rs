//! Path template matching and route label derivation.
//!
//! # Responsibilities
//! - Parse path templates (`/api/v1/{org}/series`, `/files/{*rest}`)
//! - Match request paths against templates segment by segment
//! - Turn templates into low-cardinality metric label values
//!
//! # Design Decisions
//! - Path matching is case-sensitive
//! - `{name}` matches exactly one non-empty segment
//! - `{*name}` matches the remainder of the path and must come last
//! - No regex to guarantee O(n) matching

use std::fmt;

/// One parsed segment of a path template.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param,
    CatchAll,
}

/// A compiled path template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl PathTemplate {
    /// Compile a template. Templates are expected to start with `/`.
    pub fn parse(template: impl Into<String>) -> Self {
        let raw = template.into();
        let segments = split(&raw)
            .map(|s| {
                if s.starts_with("{*") && s.ends_with('}') {
                    Segment::CatchAll
                } else if s.starts_with('{') && s.ends_with('}') && s.len() > 2 {
                    Segment::Param
                } else {
                    Segment::Literal(s.to_owned())
                }
            })
            .collect();

        Self { raw, segments }
    }

    /// Returns true if the path matches this template.
    pub fn matches(&self, path: &str) -> bool {
        let mut parts = split(path);

        for segment in &self.segments {
            match segment {
                Segment::CatchAll => return true,
                Segment::Param => match parts.next() {
                    Some(part) if !part.is_empty() => {}
                    _ => return false,
                },
                Segment::Literal(literal) => match parts.next() {
                    Some(part) if part == literal => {}
                    _ => return false,
                },
            }
        }

        parts.next().is_none()
    }

    /// The template as registered.
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn split(path: &str) -> std::str::Split<'_, char> {
    path.strip_prefix('/').unwrap_or(path).split('/')
}

/// Converts a path template into a string suitable for use as a metric label
/// value.
///
/// Every run of non-alphanumeric characters becomes a single `_`, leading and
/// trailing underscores are trimmed and the result is lowercased, so
/// `/api/{org}/foo` becomes `api_org_foo`. An empty result is `root`.
pub fn make_label_value(template: &str) -> String {
    let mut label = String::with_capacity(template.len());
    let mut in_run = false;

    for c in template.chars() {
        if c.is_ascii_alphanumeric() {
            label.push(c.to_ascii_lowercase());
            in_run = false;
        } else if !in_run {
            label.push('_');
            in_run = true;
        }
    }

    let label = label.trim_matches('_');
    if label.is_empty() {
        "root".to_owned()
    } else {
        label.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_template() {
        let template = PathTemplate::parse("/api/v1/series");
        assert!(template.matches("/api/v1/series"));
        assert!(!template.matches("/api/v1/series/extra"));
        assert!(!template.matches("/api/v1"));
        assert!(!template.matches("/API/v1/series")); // Case sensitive
    }

    #[test]
    fn test_trailing_slash_is_significant() {
        let template = PathTemplate::parse("/intake/");
        assert!(template.matches("/intake/"));
        assert!(!template.matches("/intake"));
    }

    #[test]
    fn test_param_and_catch_all() {
        let param = PathTemplate::parse("/api/{org}/foo");
        assert!(param.matches("/api/42/foo"));
        assert!(!param.matches("/api//foo"));

        let rest = PathTemplate::parse("/files/{*path}");
        assert!(rest.matches("/files/a/b/c"));
        assert!(!rest.matches("/other/a"));
    }

    #[test]
    fn test_root_template() {
        let root = PathTemplate::parse("/");
        assert!(root.matches("/"));
        assert!(!root.matches("/x"));
    }

    #[test]
    fn test_make_label_value() {
        for (template, expected) in [
            ("/", "root"),
            ("", "root"),
            ("/api/v1/series", "api_v1_series"),
            ("/api/{org}/foo", "api_org_foo"),
            ("/intake/", "intake"),
            ("/API/Beta/Sketches", "api_beta_sketches"),
            ("//a--b//", "a_b"),
        ] {
            assert_eq!(make_label_value(template), expected, "template {template}");
        }
    }

    #[test]
    fn test_make_label_value_is_idempotent() {
        for template in ["/api/{org}/foo", "/", "/intake/", "/a.b-c"] {
            let once = make_label_value(template);
            assert_eq!(make_label_value(&once), once);
            assert_eq!(make_label_value(template), once);
        }
    }
}
