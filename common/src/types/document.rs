use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Broad dataset family a document belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetCategory {
    Agriculture,
    Climate,
}

impl FromStr for DatasetCategory {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "agriculture" => Ok(Self::Agriculture),
            "climate" => Ok(Self::Climate),
            other => Err(format!("unknown dataset category '{other}'")),
        }
    }
}

impl fmt::Display for DatasetCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Agriculture => "agriculture",
            Self::Climate => "climate",
        };
        f.write_str(label)
    }
}

/// Provenance attached to a retrievable document. Known fields are typed;
/// anything else the chunking layer wants to carry rides in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    #[serde(default)]
    pub category: Option<DatasetCategory>,
    #[serde(default)]
    pub dataset_id: Option<String>,
    #[serde(default)]
    pub dataset_name: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    /// Set on documents derived by the context compressor.
    #[serde(default)]
    pub compressed: bool,
    #[serde(default)]
    pub original_chars: Option<usize>,
    #[serde(default)]
    pub compressed_chars: Option<usize>,
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl DocumentMetadata {
    /// Case-insensitive term match against every textual metadata field.
    pub fn matches_term(&self, term: &str) -> bool {
        let term = term.to_ascii_lowercase();
        let fields = [
            self.dataset_id.as_deref(),
            self.dataset_name.as_deref(),
            self.source.as_deref(),
        ];

        if fields
            .iter()
            .flatten()
            .any(|value| value.to_ascii_lowercase().contains(&term))
        {
            return true;
        }

        if let Some(category) = self.category {
            if category.to_string().contains(&term) {
                return true;
            }
        }

        self.extra
            .values()
            .any(|value| value.to_ascii_lowercase().contains(&term))
    }
}

/// Immutable unit of retrievable content. Identity for deduplication is the
/// exact content string; there is no separate id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    #[serde(default)]
    pub metadata: DocumentMetadata,
}

impl Document {
    pub fn new(content: impl Into<String>, metadata: DocumentMetadata) -> Self {
        Self {
            content: content.into(),
            metadata,
        }
    }

    /// True when the term appears in the content or any metadata field.
    pub fn matches_term(&self, term: &str) -> bool {
        let term_lower = term.to_ascii_lowercase();
        self.content.to_ascii_lowercase().contains(&term_lower)
            || self.metadata.matches_term(&term_lower)
    }

    /// Derive a compressed copy, keeping category lineage and recording the
    /// original and compressed lengths.
    pub fn derive_compressed(&self, compressed_content: String) -> Self {
        let mut metadata = self.metadata.clone();
        metadata.compressed = true;
        metadata.original_chars = Some(self.content.chars().count());
        metadata.compressed_chars = Some(compressed_content.chars().count());
        Self {
            content: compressed_content,
            metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc_with_dataset(content: &str, dataset_name: &str) -> Document {
        Document::new(
            content,
            DocumentMetadata {
                dataset_name: Some(dataset_name.to_string()),
                ..Default::default()
            },
        )
    }

    #[test]
    fn term_matching_covers_content_and_metadata() {
        let doc = doc_with_dataset("Annual rainfall in Kerala was 3000mm", "Rainfall Data");

        assert!(doc.matches_term("KERALA"), "content match is case-insensitive");
        assert!(doc.matches_term("rainfall data"), "metadata match expected");
        assert!(!doc.matches_term("wheat"));
    }

    #[test]
    fn derived_compressed_copy_records_lengths() {
        let doc = doc_with_dataset("A long passage about wheat yields.", "Crop Production");
        let derived = doc.derive_compressed("wheat yields".to_string());

        assert!(derived.metadata.compressed);
        assert_eq!(
            derived.metadata.original_chars,
            Some(doc.content.chars().count())
        );
        assert_eq!(derived.metadata.compressed_chars, Some(12));
        assert_eq!(derived.metadata.dataset_name, doc.metadata.dataset_name);
    }

    #[test]
    fn category_round_trips_through_labels() {
        let parsed: DatasetCategory = "Climate".parse().expect("category should parse");
        assert_eq!(parsed, DatasetCategory::Climate);
        assert_eq!(parsed.to_string(), "climate");
        assert!("rainfall".parse::<DatasetCategory>().is_err());
    }
}
