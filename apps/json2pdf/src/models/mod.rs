pub mod document;

pub use document::{
    AnalyzedDocument, DocumentKind, Item, ItemKind, PersonalFields, RawItem, RawProps, RawSection,
    Section, SourceDocument,
};
