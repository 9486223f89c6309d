//! Semantic analysis: turns raw JSON items into typed [`Item`]s.
//!
//! An item's kind is inferred from the exact set of keys it carries. Each kind has
//! a required and an optional property set; an item belongs to a kind when the
//! Jaccard similarity between its non-optional keys and the required set is 1.0,
//! i.e. it carries every required key, any subset of the optional keys, and nothing else.
//!
//! String items of the form `file::id` are looked up in `<file>.json`, resolved
//! against the source's directory. Each referenced file is read once per render.
//!
//! Problems are collected across the whole document and reported together.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::RenderError;
use crate::models::{
    AnalyzedDocument, DocumentKind, Item, ItemKind, RawItem, RawProps, RawSection, Section,
    SourceDocument,
};

// ────────────────────────────────────────────────────────────────────────────
// Property sets
// ────────────────────────────────────────────────────────────────────────────

const PARAGRAPH: &str = "paragraph";
const CATEGORY: &str = "category";
const CONTENT: &str = "content";
const TITLE: &str = "title";
const SUBTITLE: &str = "subtitle";
const BTAG: &str = "btag";
const TTAG: &str = "ttag";
const LTAG: &str = "ltag";
const RTAG: &str = "rtag";
const DETAILS: &str = "details";
const LABELS: &str = "labels";

const STRING_PROPS: &[&str] = &[
    PARAGRAPH, CATEGORY, CONTENT, TITLE, SUBTITLE, BTAG, TTAG, LTAG, RTAG,
];
const LIST_PROPS: &[&str] = &[DETAILS];
const MAP_PROPS: &[&str] = &[LABELS];

struct PropSet {
    kind: ItemKind,
    required: &'static [&'static str],
    optional: &'static [&'static str],
}

const PROP_SETS: &[PropSet] = &[
    PropSet {
        kind: ItemKind::Paragraph,
        required: &[PARAGRAPH],
        optional: &[LABELS],
    },
    PropSet {
        kind: ItemKind::Skills,
        required: &[CATEGORY, CONTENT],
        optional: &[LABELS],
    },
    PropSet {
        kind: ItemKind::Entries,
        required: &[TITLE, SUBTITLE, BTAG, TTAG],
        optional: &[LABELS, DETAILS],
    },
    PropSet {
        kind: ItemKind::Honors,
        required: &[TITLE, SUBTITLE, LTAG, RTAG],
        optional: &[LABELS],
    },
];

fn is_known_prop(key: &str) -> bool {
    STRING_PROPS.contains(&key) || LIST_PROPS.contains(&key) || MAP_PROPS.contains(&key)
}

/// Jaccard similarity of `(props − optional)` against `required`.
fn similarity(props: &BTreeSet<&str>, set: &PropSet) -> f32 {
    let relevant: BTreeSet<&str> = props
        .iter()
        .copied()
        .filter(|p| !set.optional.contains(p))
        .collect();
    let required: BTreeSet<&str> = set.required.iter().copied().collect();

    let union = required.union(&relevant).count();
    if union == 0 {
        return 0.0;
    }
    required.intersection(&relevant).count() as f32 / union as f32
}

/// Returns the item kind whose property set the keys match exactly, if any.
pub fn classify(props: &BTreeSet<&str>) -> Option<ItemKind> {
    PROP_SETS
        .iter()
        .find(|set| similarity(props, set) >= 1.0)
        .map(|set| set.kind)
}

// ────────────────────────────────────────────────────────────────────────────
// Analysis
// ────────────────────────────────────────────────────────────────────────────

/// Analyzes a whole document, collecting every problem before failing.
///
/// `base_dir` is where `file::id` references are looked up.
pub fn analyze(
    source: SourceDocument,
    kind: DocumentKind,
    base_dir: &Path,
) -> Result<AnalyzedDocument, RenderError> {
    let mut analyzer = Analyzer::new(kind, base_dir);
    let sections = analyzer.analyze_sections(source.sections);

    if !analyzer.diagnostics.is_empty() {
        return Err(RenderError::Semantic(analyzer.diagnostics));
    }

    Ok(AnalyzedDocument {
        personal: source.personal,
        sections,
    })
}

/// Items of one referenced file keyed by id, or why the file is unusable.
type ReferencedFile = Result<HashMap<String, RawProps>, String>;

struct Analyzer {
    document: DocumentKind,
    base_dir: PathBuf,
    diagnostics: Vec<String>,
    /// Section name → kind accepted by the first valid item seen in it.
    registry: HashMap<String, ItemKind>,
    /// Referenced file name (without `.json`) → its parsed items.
    cache: HashMap<String, ReferencedFile>,
}

impl Analyzer {
    fn new(document: DocumentKind, base_dir: &Path) -> Self {
        Self {
            document,
            base_dir: base_dir.to_path_buf(),
            diagnostics: Vec::new(),
            registry: HashMap::new(),
            cache: HashMap::new(),
        }
    }

    fn error(&mut self, message: String) {
        self.diagnostics.push(message);
    }

    fn analyze_sections(&mut self, raw: Vec<RawSection>) -> Vec<Section> {
        let mut sections: Vec<Section> = Vec::new();

        for (section_index, raw_section) in raw.into_iter().enumerate() {
            if raw_section.name.trim().is_empty() {
                self.error(format!("section #{} has a blank name", section_index + 1));
                continue;
            }

            for (item_index, raw_item) in raw_section.items.iter().enumerate() {
                let location = format!("item #{} of section {:?}", item_index + 1, raw_section.name);
                let fetched;
                let props = match raw_item {
                    RawItem::Props(props) => props,
                    RawItem::Reference(reference) => match self.fetch(&location, reference) {
                        Some(props) => {
                            fetched = props;
                            &fetched
                        }
                        None => continue,
                    },
                };
                let Some(item) = self.analyze_item(&location, props) else {
                    continue;
                };
                if !self.register(&location, &raw_section.name, item.kind()) {
                    continue;
                }

                // Sections sharing a name are merged in first-seen order.
                match sections.iter_mut().find(|s| s.name == raw_section.name) {
                    Some(section) => section.items.push(item),
                    None => sections.push(Section {
                        name: raw_section.name.clone(),
                        kind: item.kind(),
                        items: vec![item],
                    }),
                }
            }
        }

        sections
    }

    fn register(&mut self, location: &str, section: &str, kind: ItemKind) -> bool {
        if self.document == DocumentKind::CoverLetter && kind != ItemKind::Paragraph {
            self.error(format!(
                "{location} is of type {kind}, but cover letters accept paragraph items only"
            ));
            return false;
        }

        match self.registry.get(section) {
            Some(existing) if *existing != kind => {
                let existing = *existing;
                self.error(format!(
                    "{location} is of type {kind}, but section {section:?} previously accepted items of type {existing}"
                ));
                false
            }
            _ => {
                self.registry.insert(section.to_string(), kind);
                true
            }
        }
    }

    /// Resolves a `file::id` reference through the per-render file cache.
    fn fetch(&mut self, location: &str, reference: &str) -> Option<RawProps> {
        let (file, id) = match reference.split("::").collect::<Vec<_>>().as_slice() {
            [file, id] if !file.trim().is_empty() && !id.trim().is_empty() => (*file, *id),
            _ => {
                self.error(format!(
                    "{location}: {reference:?} is not of the form \"<file>::<item id>\""
                ));
                return None;
            }
        };

        if self.cache.contains_key(file) {
            debug!(reference, "item file cache hit");
        } else {
            debug!(reference, "item file cache miss");
            let loaded = load_item_file(&self.base_dir.join(format!("{file}.json")));
            self.cache.insert(file.to_string(), loaded);
        }

        let found = match self.cache.get(file) {
            Some(Ok(items)) => items.get(id).cloned().ok_or_else(|| {
                format!("{location}: item {id:?} does not exist in referenced file \"{file}.json\"")
            }),
            Some(Err(reason)) => Err(format!("{location}: reference {reference:?} {reason}")),
            None => Err(format!("{location}: reference {reference:?} could not be loaded")),
        };
        match found {
            Ok(props) => Some(props),
            Err(message) => {
                self.error(message);
                None
            }
        }
    }

    fn analyze_item(&mut self, location: &str, raw: &RawProps) -> Option<Item> {
        let before = self.diagnostics.len();

        for (key, earlier) in &raw.duplicate_keys {
            self.error(format!(
                "{location} has a duplicate prop key {key:?}, previously found {earlier} other(s)"
            ));
        }

        let raw_props = &raw.props;
        // Keys with a null value are treated as absent.
        let mut present: BTreeSet<&str> = BTreeSet::new();
        for (key, value) in raw_props {
            if !is_known_prop(key) {
                self.error(format!("{location} has an invalid prop key {key:?}"));
                continue;
            }
            if value.is_null() {
                continue;
            }
            if self.check_value_type(location, key, value) {
                present.insert(key.as_str());
            }
        }

        let labels = self.analyze_labels(location, raw_props.get(LABELS), &raw.duplicate_labels);

        let kind = classify(&present);
        if kind.is_none() {
            let keys: Vec<&str> = present.iter().copied().collect();
            self.error(format!(
                "{location} has an undeterminable type due to an invalid combination of props [{}]",
                keys.join(", ")
            ));
        }

        if self.diagnostics.len() != before {
            return None;
        }

        let text = |key: &str| -> String {
            let value = raw_props.get(key).and_then(Value::as_str).unwrap_or_default();
            substitute_labels(value, &labels)
        };

        let item = match kind? {
            ItemKind::Paragraph => Item::Paragraph {
                text: text(PARAGRAPH),
            },
            ItemKind::Skills => Item::Skill {
                category: text(CATEGORY),
                content: text(CONTENT),
            },
            ItemKind::Entries => Item::Entry {
                title: text(TITLE),
                subtitle: text(SUBTITLE),
                btag: text(BTAG),
                ttag: text(TTAG),
                details: raw_props
                    .get(DETAILS)
                    .and_then(Value::as_array)
                    .map(|details| {
                        details
                            .iter()
                            .filter_map(Value::as_str)
                            .map(|d| substitute_labels(d, &labels))
                            .collect()
                    })
                    .unwrap_or_default(),
            },
            ItemKind::Honors => Item::Honor {
                title: text(TITLE),
                subtitle: text(SUBTITLE),
                ltag: text(LTAG),
                rtag: text(RTAG),
            },
        };
        Some(item)
    }

    fn check_value_type(&mut self, location: &str, key: &str, value: &Value) -> bool {
        let (ok, expected) = if STRING_PROPS.contains(&key) {
            (value.is_string(), "a string")
        } else if LIST_PROPS.contains(&key) {
            let ok = value
                .as_array()
                .is_some_and(|list| list.iter().all(Value::is_string));
            (ok, "a list of strings")
        } else {
            let ok = value
                .as_object()
                .is_some_and(|map| map.values().all(Value::is_string));
            (ok, "an object of strings")
        };

        if !ok {
            self.error(format!(
                "{location}: prop key {key:?} expected {expected}, found {}",
                json_type_name(value)
            ));
        }
        ok
    }

    fn analyze_labels(
        &mut self,
        location: &str,
        raw: Option<&Value>,
        duplicates: &[(String, usize)],
    ) -> Vec<(String, String)> {
        let Some(map) = raw.and_then(Value::as_object) else {
            return Vec::new();
        };

        for (key, earlier) in duplicates {
            self.error(format!(
                "{location} has a duplicate label {key:?}, previously found {earlier} other(s)"
            ));
        }

        let mut labels = Vec::with_capacity(map.len());
        for (key, value) in map {
            let Some(value) = value.as_str() else {
                continue;
            };
            if contains_invocation(key) {
                self.error(format!("{location}: label key {key:?} cannot contain an invocation"));
            }
            if contains_invocation(value) {
                self.error(format!("{location}: label value of {key:?} cannot contain an invocation"));
            }
            labels.push((key.clone(), value.to_string()));
        }
        labels
    }
}

fn load_item_file(path: &Path) -> ReferencedFile {
    if !path.is_file() {
        return Err(format!("does not point to an existing file ({})", path.display()));
    }
    let raw = fs::read_to_string(path)
        .map_err(|err| format!("points to an unreadable file ({}): {err}", path.display()))?;
    serde_json::from_str(&raw)
        .map_err(|err| format!("points to an invalid item file ({}): {err}", path.display()))
}

fn contains_invocation(s: &str) -> bool {
    s.contains("{{") || s.contains("}}")
}

/// Replaces `{{key}}` with the label's value. Unknown invocations are left untouched.
fn substitute_labels(text: &str, labels: &[(String, String)]) -> String {
    labels.iter().fold(text.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{{{key}}}}}"), value)
    })
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
