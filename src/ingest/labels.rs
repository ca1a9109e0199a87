//! Agent tag and metric naming mapped onto label-based storage.
//!
//! A "tag" is always an agent tag (`key:value` or a bare word) and a "label"
//! is always a storage label. Names are escaped so the original tag key can
//! be recovered from the label name.

use std::collections::BTreeMap;

const INTERNAL_PREFIX: &str = ".internal.";
const UNNAMED_PREFIX: &str = ".unnamed.";

/// Reserved label holding the metric name.
pub const METRIC_NAME_LABEL: &str = "__name__";

const METRIC_ESCAPES: &[(char, &str)] = &[('_', "__"), ('.', "_dot_")];
const TAG_ESCAPES: &[(char, &str)] = &[('_', "__"), ('.', "_dot_"), ('-', "_dsh_"), ('/', "_sls_")];

/// A single storage label.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Label {
    pub name: String,
    pub value: String,
}

impl Label {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Replace every byte not accepted by `valid` with `_`. Works on bytes, so a
/// multi-byte character becomes several underscores.
fn replace_invalid(input: &str, valid: impl Fn(u8) -> bool) -> String {
    input
        .bytes()
        .map(|b| if valid(b) { b as char } else { '_' })
        .collect()
}

fn is_word(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn valid_metric_byte(b: u8) -> bool {
    is_word(b) || b == b'.'
}

fn valid_tag_name_byte(b: u8) -> bool {
    is_word(b) || matches!(b, b'-' | b'/' | b'.')
}

fn valid_tag_value_byte(b: u8) -> bool {
    valid_tag_name_byte(b) || b == b':'
}

fn escape(input: &str, escapes: &[(char, &str)]) -> String {
    escapes
        .iter()
        .fold(input.to_owned(), |acc, (c, escaped)| acc.replace(*c, escaped))
}

/// Storage name of an agent metric name.
pub fn metric_to_label_value(name: &str) -> String {
    escape(&replace_invalid(name, valid_metric_byte), METRIC_ESCAPES)
}

/// Escape a tag key into a label name.
pub fn escape_label_name(name: &str) -> String {
    escape(
        &replace_invalid(&name.to_lowercase(), valid_tag_name_byte),
        TAG_ESCAPES,
    )
}

/// Label name that cannot collide with customer tags.
pub fn internal_label_name(name: &str) -> String {
    format!("{}{}", escape_label_name(INTERNAL_PREFIX), escape_label_name(name))
}

/// Label carrying the agent metric type (`gauge`, `rate`, `service_check`, ...).
pub fn dd_type_label() -> String {
    internal_label_name("dd_type")
}

/// Label holding every host tag of a host, as stored by the intake endpoint.
pub fn all_host_tags_label() -> String {
    internal_label_name("all_host_tags")
}

/// A parsed agent tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tag<'a> {
    Named { key: &'a str, value: &'a str },
    Unnamed(&'a str),
}

impl<'a> Tag<'a> {
    /// Split at the first colon; a tag without one is unnamed.
    pub fn parse(tag: &'a str) -> Self {
        match tag.split_once(':') {
            Some((key, value)) => Tag::Named { key, value },
            None => Tag::Unnamed(tag),
        }
    }

    pub fn is_unnamed(&self) -> bool {
        matches!(self, Tag::Unnamed(_))
    }

    pub fn label_name(&self) -> String {
        match self {
            Tag::Named { key, .. } => escape_label_name(key),
            Tag::Unnamed(tag) => escape_label_name(&format!("{UNNAMED_PREFIX}{tag}")),
        }
    }

    pub fn label_value(&self) -> String {
        let raw = match self {
            Tag::Named { value, .. } => value,
            Tag::Unnamed(tag) => tag,
        };
        replace_invalid(&raw.to_lowercase(), valid_tag_value_byte)
    }
}

#[derive(Debug, Clone)]
struct LabelValues {
    values: Vec<String>,
    unnamed: bool,
}

/// Labels built from agent tags. One key may collect several values.
#[derive(Debug, Clone, Default)]
pub struct LabelSet {
    labels: BTreeMap<String, LabelValues>,
}

impl LabelSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tags<'a>(tags: impl IntoIterator<Item = &'a str>) -> Self {
        let mut set = Self::new();
        for tag in tags {
            set.add_tag(tag);
        }
        set
    }

    /// Add a tag. Repeating a value, or an unnamed tag, is a no-op.
    pub fn add_tag(&mut self, tag: &str) {
        let tag = Tag::parse(tag);
        let name = tag.label_name();
        let value = tag.label_value();
        match self.labels.get_mut(&name) {
            Some(existing) => {
                if !existing.unnamed && !existing.values.contains(&value) {
                    existing.values.push(value);
                }
            }
            None => {
                self.labels.insert(
                    name,
                    LabelValues {
                        values: vec![value],
                        unnamed: tag.is_unnamed(),
                    },
                );
            }
        }
    }

    /// Add `key:value` unless a label for `key` already exists.
    pub fn set_if_absent(&mut self, key: &str, value: &str) {
        let tag = Tag::Named { key, value };
        self.labels
            .entry(tag.label_name())
            .or_insert_with(|| LabelValues {
                values: vec![tag.label_value()],
                unnamed: false,
            });
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Labels sorted by name, values sorted and joined as `'a','b'`.
    pub fn into_labels(self) -> Vec<Label> {
        self.labels
            .into_iter()
            .map(|(name, mut values)| {
                values.values.sort();
                let value = values
                    .values
                    .iter()
                    .map(|v| format!("'{v}'"))
                    .collect::<Vec<_>>()
                    .join(",");
                Label { name, value }
            })
            .collect()
    }
}

/// Encode host tags into the single all-host-tags label: lowercased,
/// sanitized, deduplicated, sorted and comma separated.
pub fn all_host_tags(tags: &[String]) -> Label {
    let mut escaped: Vec<String> = tags
        .iter()
        .map(|tag| replace_invalid(tag, valid_tag_value_byte).to_lowercase())
        .collect();
    escaped.sort();
    escaped.dedup();
    Label::new(all_host_tags_label(), escaped.join(","))
}

/// Decode the all-host-tags label value. Empty input yields no tags.
pub fn parse_all_host_tags(value: &str) -> Vec<String> {
    if value.is_empty() {
        return Vec::new();
    }
    value.split(',').map(str::to_owned).collect()
}
