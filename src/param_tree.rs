//! Axis VAPIX transport
//! Parameter tree parser for `param.cgi?action=list` dumps
//!
//! The device lists parameters as flat `root.Group.Sub.Leaf=value` lines.
//! This module rebuilds them into a nested tree, turning the literal tokens
//! `yes` and `no` into booleans. Malformed lines are skipped, not rejected;
//! the skipped line numbers are reported so the leniency stays observable.

use log::{ debug, warn };
use serde::{ Deserialize, Serialize };
use std::collections::BTreeMap;

/// Leading key segments dropped by default: the `root` namespace and the listed group
pub const DEFAULT_PREFIX_DEPTH: usize = 2;

/// A parameter leaf or a nested group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Text(String),
    Group(ParamTree),
}

impl ParamValue {
    fn from_raw(raw: &str) -> Self {
        match raw {
            "yes" => ParamValue::Bool(true),
            "no" => ParamValue::Bool(false),
            _ => ParamValue::Text(raw.to_string()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_group(&self) -> Option<&ParamTree> {
        match self {
            ParamValue::Group(tree) => Some(tree),
            _ => None,
        }
    }
}

impl From<&str> for ParamValue {
    fn from(text: &str) -> Self {
        ParamValue::Text(text.to_string())
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

/// Nested parameters keyed by segment name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamTree(BTreeMap<String, ParamValue>);

impl ParamTree {
    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.0.get(key)
    }

    /// Look up a dotted path such as `I0.Appearance.Resolution`
    pub fn get_path(&self, path: &str) -> Option<&ParamValue> {
        let mut segments = path.split('.');
        let mut current = self.0.get(segments.next()?)?;
        for segment in segments {
            current = current.as_group()?.get(segment)?;
        }
        Some(current)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Render back to `prefix.path=value` lines, booleans as `yes`/`no`
    pub fn flatten(&self, prefix: &str) -> Vec<String> {
        let mut lines = Vec::new();
        self.flatten_into(prefix, &mut lines);
        lines
    }

    pub fn to_flat_text(&self, prefix: &str) -> String {
        let mut text = self.flatten(prefix).join("\n");
        text.push('\n');
        text
    }

    fn flatten_into(&self, prefix: &str, lines: &mut Vec<String>) {
        for (key, value) in &self.0 {
            let path = if prefix.is_empty() { key.clone() } else { format!("{}.{}", prefix, key) };
            match value {
                ParamValue::Group(tree) => tree.flatten_into(&path, lines),
                ParamValue::Bool(true) => lines.push(format!("{}=yes", path)),
                ParamValue::Bool(false) => lines.push(format!("{}=no", path)),
                ParamValue::Text(text) => lines.push(format!("{}={}", path, text)),
            }
        }
    }

    /// Returns false when the path collides with an existing leaf or group
    fn insert(&mut self, segments: &[&str], value: ParamValue) -> bool {
        let Some((last, parents)) = segments.split_last() else {
            return false;
        };

        let mut node = &mut self.0;
        for segment in parents {
            let entry = node
                .entry(segment.to_string())
                .or_insert_with(|| ParamValue::Group(ParamTree::default()));
            match entry {
                ParamValue::Group(tree) => {
                    node = &mut tree.0;
                }
                _ => {
                    return false;
                }
            }
        }

        if let Some(ParamValue::Group(_)) = node.get(*last) {
            return false;
        }
        node.insert(last.to_string(), value);
        true
    }
}

/// Lines a parse passed over
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseReport {
    /// 1-based line numbers of malformed lines
    pub skipped: Vec<usize>,
}

impl ParseReport {
    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamTreeParser {
    prefix_depth: usize,
}

impl Default for ParamTreeParser {
    fn default() -> Self {
        Self { prefix_depth: DEFAULT_PREFIX_DEPTH }
    }
}

impl ParamTreeParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of leading key segments to discard
    pub fn with_prefix_depth(prefix_depth: usize) -> Self {
        Self { prefix_depth }
    }

    pub fn parse(&self, text: &str) -> ParamTree {
        let (tree, report) = self.parse_with_report(text);
        if report.skipped_count() > 0 {
            warn!("Skipped {} malformed parameter lines", report.skipped_count());
        }
        tree
    }

    pub fn parse_with_report(&self, text: &str) -> (ParamTree, ParseReport) {
        let mut tree = ParamTree::default();
        let mut report = ParseReport::default();

        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let accepted = match line.split_once('=') {
                Some((key, value)) if !value.contains('=') => {
                    let segments: Vec<&str> = key.trim().split('.').collect();
                    segments.len() > self.prefix_depth &&
                        segments.iter().all(|s| !s.is_empty()) &&
                        tree.insert(&segments[self.prefix_depth..], ParamValue::from_raw(value))
                }
                _ => false,
            };

            if !accepted {
                debug!("Skipping parameter line {}: {}", index + 1, line);
                report.skipped.push(index + 1);
            }
        }

        (tree, report)
    }
}

/// Parse with the default prefix depth
pub fn parse(text: &str) -> ParamTree {
    ParamTreeParser::default().parse(text)
}
