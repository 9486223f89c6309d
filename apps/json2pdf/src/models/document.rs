use std::collections::HashMap;
use std::fmt;

use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The kinds of document a run can compile. Each kind owns a distinct output file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DocumentKind {
    Cv,
    CoverLetter,
}

impl DocumentKind {
    /// Short identifier used in log fields and output file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Cv => "cv",
            DocumentKind::CoverLetter => "cl",
        }
    }

    pub fn output_file_name(&self) -> String {
        format!("{}.pdf", self.as_str())
    }

    /// Human-readable title, used as the PDF document title.
    pub fn title(&self) -> &'static str {
        match self {
            DocumentKind::Cv => "Curriculum Vitae",
            DocumentKind::CoverLetter => "Cover Letter",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Personal details shown in the document header and footer.
///
/// Appears both in the JSON source (`personal`) and as command-line overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonalFields {
    pub name: Option<String>,
    pub titles: Vec<String>,
    pub address: Option<String>,
    pub mobile: Option<String>,
    pub email: Option<String>,
    pub linkedin: Option<String>,
    pub github: Option<String>,
    pub website: Option<String>,
}

impl PersonalFields {
    /// Field-wise merge where `self` (the override) wins over `base`.
    pub fn overlay(&self, base: &PersonalFields) -> PersonalFields {
        PersonalFields {
            name: self.name.clone().or_else(|| base.name.clone()),
            titles: if self.titles.is_empty() {
                base.titles.clone()
            } else {
                self.titles.clone()
            },
            address: self.address.clone().or_else(|| base.address.clone()),
            mobile: self.mobile.clone().or_else(|| base.mobile.clone()),
            email: self.email.clone().or_else(|| base.email.clone()),
            linkedin: self.linkedin.clone().or_else(|| base.linkedin.clone()),
            github: self.github.clone().or_else(|| base.github.clone()),
            website: self.website.clone().or_else(|| base.website.clone()),
        }
    }

    /// Contact details in display order, skipping absent ones.
    pub fn contact_line(&self) -> Vec<&str> {
        [
            &self.address,
            &self.mobile,
            &self.email,
            &self.linkedin,
            &self.github,
            &self.website,
        ]
        .into_iter()
        .filter_map(|field| field.as_deref())
        .filter(|value| !value.trim().is_empty())
        .collect()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Raw JSON shape
// ────────────────────────────────────────────────────────────────────────────

/// A document exactly as read from disk, before semantic analysis.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceDocument {
    #[serde(default)]
    pub personal: PersonalFields,
    #[serde(default)]
    pub sections: Vec<RawSection>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawSection {
    pub name: String,
    #[serde(default)]
    pub items: Vec<RawItem>,
}

/// One entry of a section's `items`: an inline prop object, or a `"file::id"`
/// reference to an item stored in `<file>.json` next to the source.
#[derive(Debug, Clone, PartialEq)]
pub enum RawItem {
    Props(RawProps),
    Reference(String),
}

/// An item's props plus every key that was repeated inside it.
///
/// `serde_json` keeps only the last value of a repeated key, so repeats are
/// counted while the object is read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawProps {
    pub props: Map<String, Value>,
    /// `(key, occurrences seen before this one)` per repeated prop key.
    pub duplicate_keys: Vec<(String, usize)>,
    /// Same, for keys repeated inside the `labels` object.
    pub duplicate_labels: Vec<(String, usize)>,
}

impl<'de> Deserialize<'de> for RawItem {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ItemVisitor)
    }
}

impl<'de> Deserialize<'de> for RawProps {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(PropsVisitor)
    }
}

struct ItemVisitor;

impl<'de> Visitor<'de> for ItemVisitor {
    type Value = RawItem;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an item object or a \"file::id\" reference")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<RawItem, E> {
        Ok(RawItem::Reference(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<RawItem, E> {
        Ok(RawItem::Reference(v))
    }

    fn visit_map<A: MapAccess<'de>>(self, access: A) -> Result<RawItem, A::Error> {
        PropsVisitor.visit_map(access).map(RawItem::Props)
    }
}

struct PropsVisitor;

impl<'de> Visitor<'de> for PropsVisitor {
    type Value = RawProps;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an item object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<RawProps, A::Error> {
        let mut raw = RawProps::default();
        let mut seen = HashMap::new();

        while let Some(key) = access.next_key::<String>()? {
            let value = if key == "labels" {
                let labels: CountedValue = access.next_value()?;
                raw.duplicate_labels = labels.duplicates;
                labels.value
            } else {
                access.next_value::<Value>()?
            };
            note_repeat(&mut seen, &mut raw.duplicate_keys, &key);
            raw.props.insert(key, value);
        }

        Ok(raw)
    }
}

fn note_repeat(seen: &mut HashMap<String, usize>, repeats: &mut Vec<(String, usize)>, key: &str) {
    let count = seen.entry(key.to_string()).or_insert(0);
    if *count > 0 {
        repeats.push((key.to_string(), *count));
    }
    *count += 1;
}

/// Any JSON value. When it is an object, repeated keys are counted.
struct CountedValue {
    value: Value,
    duplicates: Vec<(String, usize)>,
}

impl From<Value> for CountedValue {
    fn from(value: Value) -> Self {
        Self {
            value,
            duplicates: Vec::new(),
        }
    }
}

impl<'de> Deserialize<'de> for CountedValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(CountedValueVisitor)
    }
}

struct CountedValueVisitor;

impl<'de> Visitor<'de> for CountedValueVisitor {
    type Value = CountedValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("any JSON value")
    }

    fn visit_unit<E: de::Error>(self) -> Result<CountedValue, E> {
        Ok(Value::Null.into())
    }

    fn visit_none<E: de::Error>(self) -> Result<CountedValue, E> {
        Ok(Value::Null.into())
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<CountedValue, D::Error> {
        CountedValue::deserialize(deserializer)
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<CountedValue, E> {
        Ok(Value::Bool(v).into())
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<CountedValue, E> {
        Ok(Value::from(v).into())
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<CountedValue, E> {
        Ok(Value::from(v).into())
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<CountedValue, E> {
        Ok(Value::from(v).into())
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<CountedValue, E> {
        Ok(Value::String(v.to_string()).into())
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<CountedValue, E> {
        Ok(Value::String(v).into())
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut access: A) -> Result<CountedValue, A::Error> {
        let mut list = Vec::new();
        while let Some(element) = access.next_element::<Value>()? {
            list.push(element);
        }
        Ok(Value::Array(list).into())
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<CountedValue, A::Error> {
        let mut map = Map::new();
        let mut seen = HashMap::new();
        let mut duplicates = Vec::new();

        while let Some(key) = access.next_key::<String>()? {
            let value = access.next_value::<Value>()?;
            note_repeat(&mut seen, &mut duplicates, &key);
            map.insert(key, value);
        }

        Ok(CountedValue {
            value: Value::Object(map),
            duplicates,
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Analyzed shape
// ────────────────────────────────────────────────────────────────────────────

/// Item type, determined from the exact set of properties an item carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemKind {
    Paragraph,
    Skills,
    Entries,
    Honors,
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ItemKind::Paragraph => "paragraph",
            ItemKind::Skills => "skills",
            ItemKind::Entries => "entries",
            ItemKind::Honors => "honors",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Paragraph {
        text: String,
    },
    Skill {
        category: String,
        content: String,
    },
    Entry {
        title: String,
        subtitle: String,
        btag: String,
        ttag: String,
        details: Vec<String>,
    },
    Honor {
        title: String,
        subtitle: String,
        ltag: String,
        rtag: String,
    },
}

impl Item {
    pub fn kind(&self) -> ItemKind {
        match self {
            Item::Paragraph { .. } => ItemKind::Paragraph,
            Item::Skill { .. } => ItemKind::Skills,
            Item::Entry { .. } => ItemKind::Entries,
            Item::Honor { .. } => ItemKind::Honors,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub name: String,
    pub kind: ItemKind,
    pub items: Vec<Item>,
}

/// A document that passed semantic analysis and is ready for layout.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzedDocument {
    pub personal: PersonalFields,
    pub sections: Vec<Section>,
}
