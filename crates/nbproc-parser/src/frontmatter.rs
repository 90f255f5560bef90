//! Page front matter inferred from a notebook's own markdown.
//!
//! The grammar of a title cell is:
//!
//! ```text
//! # <title>
//! > <description>          (optional, may follow blank lines)
//! - <key>: <value>         (any number, anywhere in the cell)
//! ```
//!
//! Bullets without a colon, or with an empty key or value, are ignored.

use linked_hash_map::LinkedHashMap;
use regex::Regex;

use lazy_static::lazy_static;

/// Keys emitted into a front matter block, in emission order.
pub const DEFAULT_FM_KEYS: [&str; 7] = [
    "title",
    "description",
    "author",
    "image",
    "categories",
    "output-file",
    "aliases",
];

lazy_static! {
    static ref TITLE: Regex =
        Regex::new(r"(?m)^#+[ \t]+(\S.*?)[ \t]*(?:[\r\n]+|\z)(?:^>[ \t]+([^\r\n]*?)[ \t]*\r?$)?")
            .unwrap();
    static ref BULLET: Regex = Regex::new(r"(?m)^-[ \t]+(.*)$").unwrap();
    static ref BLOCK: Regex = Regex::new(r"(?s)\A\s*---.*\S.*---\s*\z").unwrap();
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrontMatter(LinkedHashMap<String, String>);

impl FrontMatter {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Renders a `---` block holding the entries named in `keys`, in that order. `None` when
    /// none of `keys` are present.
    pub fn render<S: AsRef<str>>(&self, keys: &[S]) -> Option<String> {
        let lines: Vec<String> = keys
            .iter()
            .filter_map(|k| {
                let k = k.as_ref();
                self.get(k).map(|v| format!("{}: {}", k, v))
            })
            .collect();

        if lines.is_empty() {
            None
        } else {
            Some(format!("---\n{}\n---", lines.join("\n")))
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FrontMatter {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        FrontMatter(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// `true` if the cell text is a complete front matter block.
pub fn is_frontmatter_block(source: &str) -> bool {
    BLOCK.is_match(source)
}

/// `true` if `source` contains a title heading.
pub fn has_title(source: &str) -> bool {
    TITLE.is_match(source)
}

/// Extracts title, description and bullet flags from a markdown cell. `None` if the cell has no
/// title heading. Title and description win over bullets of the same name.
pub fn extract_fields(source: &str) -> Option<FrontMatter> {
    let caps = TITLE.captures(source)?;

    let mut fm: FrontMatter = BULLET
        .captures_iter(source)
        .filter_map(|c| {
            let (k, v) = c[1].split_once(':')?;
            let (k, v) = (k.trim(), v.trim());
            (!k.is_empty() && !v.is_empty()).then(|| (k.to_string(), v.to_string()))
        })
        .collect();

    fm.insert("title", &caps[1]);
    if let Some(desc) = caps.get(2).map(|m| m.as_str()).filter(|d| !d.is_empty()) {
        fm.insert("description", desc);
    }

    Some(fm)
}
