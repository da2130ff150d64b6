//! Weighted, tag-annotated search documents.

use crate::filter::{exact_match, filter_search_string};
use crate::index::enrich::EnrichedEntry;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Names of the indexed fields.
pub mod fields {
    pub const EXACT_NAME: &str = "exact_name";
    pub const NAME: &str = "name";
    pub const SUMMARY: &str = "summary";
    pub const DESCRIPTION: &str = "description";
    pub const SUBPACKAGES: &str = "subpackages";
    pub const CATEGORY_TAGS: &str = "category_tags";
    pub const CMD: &str = "cmd";
    pub const TAG: &str = "tag";
}

pub const NAME_WEIGHT: f32 = 10.0;
pub const SUMMARY_WEIGHT: f32 = 1.0;
pub const DESCRIPTION_WEIGHT: f32 = 0.2;
pub const DEFAULT_WEIGHT: f32 = 1.0;

/// Value of the `tag` field on packages shipping a desktop entry.
pub const DESKTOP_TAG: &str = "desktop";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldAction {
    /// Tokenised free text, optionally stemmed for `language`.
    IndexFreetext,
    /// Whole value indexed as a single term.
    IndexExact,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    pub action: FieldAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl FieldSchema {
    fn freetext(name: &str, language: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            action: FieldAction::IndexFreetext,
            language: language.map(str::to_string),
        }
    }
}

/// Field layout every document conforms to.
///
/// Exact-match tokens share free-text fields with their plain counterparts
/// and are told apart by their sentinel markers, so `exact_name` and `cmd`
/// are not stemmed.
pub fn index_schema() -> Vec<FieldSchema> {
    vec![
        FieldSchema::freetext(fields::EXACT_NAME, None),
        FieldSchema::freetext(fields::NAME, Some("en")),
        FieldSchema::freetext(fields::SUMMARY, Some("en")),
        FieldSchema::freetext(fields::DESCRIPTION, Some("en")),
        FieldSchema::freetext(fields::SUBPACKAGES, Some("en")),
        FieldSchema::freetext(fields::CATEGORY_TAGS, Some("en")),
        FieldSchema::freetext(fields::CMD, None),
        FieldSchema {
            name: fields::TAG.to_string(),
            action: FieldAction::IndexExact,
            language: None,
        },
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub value: String,
    pub weight: f32,
}

impl Field {
    pub fn new(name: &str, value: impl Into<String>, weight: f32) -> Self {
        Self {
            name: name.to_string(),
            value: value.into(),
            weight,
        }
    }
}

/// A document ready for an [`IndexSink`](crate::traits::IndexSink).
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Base package name.
    pub id: String,
    pub fields: Vec<Field>,
    /// JSON-serialised [`PackageEntry`](crate::model::PackageEntry) with
    /// archive references removed.
    pub payload: Vec<u8>,
}

impl Document {
    pub fn values(&self, field: &str) -> impl Iterator<Item = &str> {
        let field = field.to_string();
        self.fields
            .iter()
            .filter(move |f| f.name == field)
            .map(|f| f.value.as_str())
    }
}

#[derive(Error, Debug)]
pub enum ProjectionError {
    #[error("Failed to serialize payload for '{package}': {source}")]
    Payload {
        package: String,
        source: serde_json::Error,
    },
}

/// Projects an enriched entry into a document.
///
/// Every free-text value goes through [`filter_search_string`]; exact-match
/// values are wrapped with [`exact_match`]. The output depends only on the
/// entry, so projecting the same entry twice yields identical documents.
pub fn project(enriched: EnrichedEntry) -> Result<Document, ProjectionError> {
    let EnrichedEntry { mut entry, facets } = enriched;
    entry.strip_archives();

    let name = filter_search_string(&entry.name);
    let mut doc_fields = vec![
        Field::new(fields::EXACT_NAME, exact_match(&name), NAME_WEIGHT),
        Field::new(fields::NAME, name, NAME_WEIGHT),
        Field::new(fields::SUMMARY, filter_search_string(&entry.summary), SUMMARY_WEIGHT),
        Field::new(
            fields::DESCRIPTION,
            filter_search_string(&entry.description),
            DESCRIPTION_WEIGHT,
        ),
    ];

    doc_fields.extend(
        entry
            .sub_pkgs
            .iter()
            .map(|sub| Field::new(fields::SUBPACKAGES, filter_search_string(&sub.name), DEFAULT_WEIGHT)),
    );
    doc_fields.extend(
        facets
            .category_tags
            .into_iter()
            .map(|tag| Field::new(fields::CATEGORY_TAGS, tag, DEFAULT_WEIGHT)),
    );
    doc_fields.extend(
        facets
            .commands
            .into_iter()
            .map(|cmd| Field::new(fields::CMD, cmd, DEFAULT_WEIGHT)),
    );
    if facets.desktop {
        doc_fields.push(Field::new(fields::TAG, DESKTOP_TAG, DEFAULT_WEIGHT));
    }

    let payload = serde_json::to_vec(&entry).map_err(|source| ProjectionError::Payload {
        package: entry.name.clone(),
        source,
    })?;

    Ok(Document {
        id: entry.name,
        fields: doc_fields,
        payload,
    })
}
