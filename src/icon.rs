//! Icon tasks and the mapping table they are expanded from.
//!
//! A mapping table pairs an app package with the name of the drawable that
//! should represent it. Each pair becomes one [`IconTask`] once the
//! drawable is resolved to a vector file in the source directory.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::ConfigError;

/// One unit of work for the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IconTask {
    /// App package the icon is themed for (output directory name).
    pub package: String,
    /// Drawable (icon) identifier.
    pub icon: String,
    /// Vector source file for the drawable.
    pub source: PathBuf,
}

impl IconTask {
    pub fn new(package: impl Into<String>, icon: impl Into<String>, source: impl Into<PathBuf>) -> Self {
        Self {
            package: package.into(),
            icon: icon.into(),
            source: source.into(),
        }
    }
}

/// A single `(package, drawable)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingEntry {
    pub package: String,
    pub drawable: String,
}

/// Ordered `(package, drawable)` pairs, unique on package.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MappingTable {
    entries: Vec<MappingEntry>,
    index: HashMap<String, usize>,
}

impl MappingTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a table from pairs; a repeated package keeps its first
    /// position and takes the last drawable.
    pub fn from_pairs<I, P, D>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (P, D)>,
        P: Into<String>,
        D: Into<String>,
    {
        let mut table = Self::new();
        for (package, drawable) in pairs {
            table.insert(package, drawable);
        }
        table
    }

    /// Maps `package` to `drawable`, replacing any earlier drawable.
    ///
    /// Returns true if the package was not mapped before.
    pub fn insert(&mut self, package: impl Into<String>, drawable: impl Into<String>) -> bool {
        let package = package.into();
        let drawable = drawable.into();
        if let Some(&idx) = self.index.get(&package) {
            self.entries[idx].drawable = drawable;
            return false;
        }
        self.index.insert(package.clone(), self.entries.len());
        self.entries.push(MappingEntry { package, drawable });
        true
    }

    /// Applies `overrides` on top of this table.
    pub fn merge(&mut self, overrides: &MappingTable) {
        for entry in overrides {
            self.insert(entry.package.clone(), entry.drawable.clone());
        }
    }

    pub fn get(&self, package: &str) -> Option<&str> {
        self.index
            .get(package)
            .map(|&idx| self.entries[idx].drawable.as_str())
    }

    /// Returns the number of mapped packages.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the table contains no pairs.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns an iterator over the pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &MappingEntry> {
        self.entries.iter()
    }

    /// Expands the table into tasks sorted by package, resolving each
    /// drawable to `{source_dir}/{drawable}.{extension}`.
    ///
    /// Missing sources are not filtered out here; the scheduler reports
    /// them per task.
    pub fn tasks(&self, source_dir: &Path, extension: &str) -> Vec<IconTask> {
        let mut tasks: Vec<IconTask> = self
            .entries
            .iter()
            .map(|e| {
                let source = source_dir.join(format!("{}.{extension}", e.drawable));
                IconTask::new(e.package.clone(), e.drawable.clone(), source)
            })
            .collect();
        tasks.sort_by(|a, b| a.package.cmp(&b.package));
        tasks
    }

    /// Parses a mapping XML document.
    ///
    /// Every `<item>` element contributes one pair. The package comes from
    /// a `package` attribute, or is extracted from a launcher-style
    /// `component="ComponentInfo{package/activity}"` attribute. Items
    /// without both parts are ignored. A package listed twice keeps the
    /// drawable of its last item.
    pub fn parse_xml(xml: &str) -> Result<Self, String> {
        let mut reader = Reader::from_str(xml);
        let mut table = Self::new();

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.name().as_ref() == b"item" => {
                    if let Some((package, drawable)) = read_item(&e)? {
                        table.insert(package, drawable);
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => {
                    return Err(format!(
                        "at byte {}: {e}",
                        reader.error_position()
                    ));
                }
            }
        }

        Ok(table)
    }

    /// Reads and parses a mapping XML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let xml = fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::parse_xml(&xml).map_err(|msg| ConfigError::Mapping(path.to_path_buf(), msg))
    }
}

fn read_item(e: &BytesStart<'_>) -> Result<Option<(String, String)>, String> {
    let mut package = None;
    let mut component = None;
    let mut drawable = None;

    for attr in e.attributes() {
        let attr = attr.map_err(|e| e.to_string())?;
        let raw = std::str::from_utf8(&attr.value).map_err(|e| e.to_string())?;
        let value = quick_xml::escape::unescape(raw)
            .map_err(|e| e.to_string())?
            .into_owned();
        match attr.key.as_ref() {
            b"package" => package = Some(value),
            b"component" => component = Some(value),
            b"drawable" => drawable = Some(value),
            _ => {}
        }
    }

    let package = package.or_else(|| component.as_deref().and_then(package_from_component));
    Ok(match (package, drawable) {
        (Some(p), Some(d)) if !p.is_empty() && !d.is_empty() => Some((p, d)),
        _ => None,
    })
}

/// Extracts `package` from `ComponentInfo{package/activity}`.
pub fn package_from_component(component: &str) -> Option<String> {
    let inner = component
        .trim()
        .strip_prefix("ComponentInfo{")?
        .strip_suffix('}')?;
    let (package, _activity) = inner.split_once('/')?;
    (!package.is_empty()).then(|| package.to_string())
}

impl IntoIterator for MappingTable {
    type Item = MappingEntry;
    type IntoIter = std::vec::IntoIter<MappingEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a MappingTable {
    type Item = &'a MappingEntry;
    type IntoIter = std::slice::Iter<'a, MappingEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAPPER: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<resources>
    <item package="com.android.chrome" drawable="chrome" />
    <item component="ComponentInfo{com.android.vending/com.android.vending.AssetBrowserActivity}" drawable="play_store" />
    <item package="com.android.chrome" drawable="chrome_alt" />
    <item package="com.example.nodrawable" />
    <item package="org.a&amp;b" drawable="ab"></item>
</resources>"#;

    #[test]
    fn parse_mapping_xml() {
        let table = MappingTable::parse_xml(MAPPER).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.get("com.android.chrome"), Some("chrome_alt"));
        assert_eq!(table.get("com.android.vending"), Some("play_store"));
        assert_eq!(table.get("org.a&b"), Some("ab"));
        assert_eq!(table.get("com.example.nodrawable"), None);
    }

    #[test]
    fn parse_rejects_malformed_xml() {
        assert!(MappingTable::parse_xml("<resources><item package=\"x\" drawable=\"y\"></resources>").is_err());
    }

    #[test]
    fn component_info_extraction() {
        assert_eq!(
            package_from_component("ComponentInfo{com.a.b/com.a.b.Main}").as_deref(),
            Some("com.a.b")
        );
        assert_eq!(package_from_component("com.a.b/Main"), None);
        assert_eq!(package_from_component("ComponentInfo{/Main}"), None);
    }

    #[test]
    fn overrides_replace_and_append() {
        let mut table = MappingTable::from_pairs([("a", "one"), ("b", "two")]);
        let overrides = MappingTable::from_pairs([("b", "deux"), ("c", "trois")]);
        table.merge(&overrides);

        let pairs: Vec<_> = table
            .iter()
            .map(|e| (e.package.as_str(), e.drawable.as_str()))
            .collect();
        assert_eq!(pairs, [("a", "one"), ("b", "deux"), ("c", "trois")]);
    }

    #[test]
    fn repeated_component_keeps_last_drawable() {
        let xml = r#"<resources>
            <item component="ComponentInfo{com.a/com.a.Main}" drawable="old" />
            <item component="ComponentInfo{com.b/com.b.Main}" drawable="other" />
            <item component="ComponentInfo{com.a/com.a.Settings}" drawable="new" />
        </resources>"#;
        let table = MappingTable::parse_xml(xml).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get("com.a"), Some("new"));
        assert_eq!(table.iter().next().map(|e| e.package.as_str()), Some("com.a"));
    }

    #[test]
    fn tasks_are_sorted_by_package() {
        let table = MappingTable::from_pairs([("org.z", "zed"), ("com.b", "bee"), ("com.a", "ay")]);
        let packages: Vec<_> = table
            .tasks(Path::new("svgs"), "svg")
            .into_iter()
            .map(|t| t.package)
            .collect();
        assert_eq!(packages, ["com.a", "com.b", "org.z"]);
    }

    #[test]
    fn tasks_resolve_source_paths() {
        let table = MappingTable::from_pairs([("com.x", "phone")]);
        let tasks = table.tasks(Path::new("svgs"), "svg");
        assert_eq!(tasks, [IconTask::new("com.x", "phone", "svgs/phone.svg")]);
    }
}
