use std::collections::HashMap;

use crate::RouteError;

/// Canonical routing facts derived from an inbound request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteInfo {
    /// Lowercased regional shard identifier.
    pub region: String,
    /// Cleaned path to forward upstream, with a leading slash.
    pub upstream_path: String,
    /// Per-method limit scope key: `"<region>:<path-without-leading-slash>"`.
    pub bucket: String,
}

#[derive(Debug, Default)]
struct PatternNode {
    children: HashMap<String, PatternNode>,
    wildcard: Option<Box<PatternNode>>,
    pattern: Option<String>,
}

/// Parses `/{region}/rest/of/path` into validated, canonical routing info.
///
/// A table can carry templated method patterns such as
/// `/lol/match/v5/matches/{id}`; a path matching one buckets under the
/// pattern instead of its literal form, so every call to the same endpoint
/// shares one method scope. Segments wrapped in braces match any single
/// segment, with exact segments taking precedence.
#[derive(Debug, Default)]
pub struct RouteTable {
    root: PatternNode,
}

impl RouteTable {
    /// A table with no method patterns; every path buckets literally.
    pub fn new() -> Self {
        Self::default()
    }

    /// A table canonicalising paths that match any of `patterns`.
    pub fn with_patterns<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut table = Self::default();
        for pattern in patterns {
            table.insert(pattern.as_ref());
        }
        table
    }

    fn insert(&mut self, pattern: &str) {
        let mut node = &mut self.root;
        for segment in pattern.trim_start_matches('/').split('/') {
            let is_wildcard = segment.starts_with('{') && segment.ends_with('}');
            node = if is_wildcard {
                &mut **node.wildcard.get_or_insert_with(Box::default)
            } else {
                node.children.entry(segment.to_string()).or_default()
            };
        }
        node.pattern = Some(pattern.to_string());
    }

    fn match_pattern(&self, upstream_path: &str) -> Option<&str> {
        let path = upstream_path.trim_start_matches('/');
        if path.is_empty() {
            return None;
        }

        let mut node = &self.root;
        for segment in path.split('/') {
            node = match node.children.get(segment) {
                Some(next) => next,
                None => node.wildcard.as_deref()?,
            };
        }
        node.pattern.as_deref()
    }

    /// Splits and validates `/{region}/{upstream-path}`.
    ///
    /// Regions are lowercased and must be non-empty `[a-z0-9-]+`; the
    /// remainder is cleaned and must be non-empty.
    pub fn parse_path(&self, raw_path: &str) -> Result<RouteInfo, RouteError> {
        let trimmed = raw_path.trim().trim_start_matches('/');
        if trimmed.is_empty() {
            return Err(RouteError::MissingRegion);
        }

        let Some((region_part, rest)) = trimmed.split_once('/') else {
            return Err(RouteError::MissingRegion);
        };

        let region = region_part.trim().to_ascii_lowercase();
        if region.is_empty() || !region.bytes().all(is_region_byte) {
            return Err(RouteError::InvalidRegion);
        }

        let upstream_path = clean_path(rest.trim());
        if upstream_path == "/" {
            return Err(RouteError::MissingUpstreamPath);
        }

        let bucket_path = self.match_pattern(&upstream_path).unwrap_or(&upstream_path);
        let bucket = format!("{region}:{}", bucket_path.trim_start_matches('/'));

        Ok(RouteInfo {
            region,
            upstream_path,
            bucket,
        })
    }
}

fn is_region_byte(b: u8) -> bool {
    b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-'
}

/// Normalises a path: leading slash, collapsed empty segments, resolved `.`
/// and `..`.
fn clean_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", segments.join("/"))
    }
}
