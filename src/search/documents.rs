//! Document metadata and text lookup
//!
//! The engine never touches storage directly. Facets and filters read
//! per-document attributes through [`DocumentMetadataStore`]; the reranker
//! and snippet builder read text through [`DocumentTextSource`].
//! [`DocumentStore`] is the in-memory implementation of both.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SearchError};

/// Filterable, facetable attributes of one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Tag values grouped by field, e.g. `{"topic": ["ml", "nlp"]}`
    #[serde(default)]
    pub tags: BTreeMap<String, Vec<String>>,
    /// Classification codes
    #[serde(default)]
    pub classifications: Vec<String>,
    /// Quality score in [0.0, 1.0]
    #[serde(default)]
    pub quality: f64,
    /// Publication date
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
}

/// A corpus document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(flatten)]
    pub metadata: DocumentMetadata,
}

impl Document {
    /// Title and body joined, as fed to every encoder and the reranker.
    pub fn full_text(&self) -> String {
        if self.title.is_empty() {
            self.body.clone()
        } else if self.body.is_empty() {
            self.title.clone()
        } else {
            format!("{}\n{}", self.title, self.body)
        }
    }
}

/// Per-document attribute lookup used by filtering and faceting.
pub trait DocumentMetadataStore: Send + Sync {
    /// Attributes for the given ids. Unknown ids are simply absent.
    fn get_facet_values(&self, doc_ids: &[String]) -> HashMap<String, DocumentMetadata>;

    /// Every known document id, used by filters-only search.
    fn all_ids(&self) -> Vec<String>;
}

/// Document text lookup used by reranking and snippets.
pub trait DocumentTextSource: Send + Sync {
    fn document_text(&self, doc_id: &str) -> Option<String>;
}

/// In-memory document store.
#[derive(Debug, Clone, Default)]
pub struct DocumentStore {
    docs: HashMap<String, Document>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CorpusFile {
    List(Vec<Document>),
    Wrapped { documents: Vec<Document> },
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_documents(documents: impl IntoIterator<Item = Document>) -> Self {
        let mut store = Self::new();
        for doc in documents {
            store.insert(doc);
        }
        store
    }

    /// Load a JSON corpus: either an array of documents or
    /// `{"documents": [...]}`.
    pub fn load_json(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let documents = match serde_json::from_str::<CorpusFile>(raw)? {
            CorpusFile::List(docs) | CorpusFile::Wrapped { documents: docs } => docs,
        };
        if let Some(bad) = documents.iter().find(|d| d.id.trim().is_empty()) {
            return Err(SearchError::InvalidDocument(format!(
                "corpus document with empty id (title: {:?})",
                bad.title
            )));
        }
        Ok(Self::from_documents(documents))
    }

    /// Insert or replace a document.
    pub fn insert(&mut self, mut doc: Document) {
        doc.metadata.quality = doc.metadata.quality.clamp(0.0, 1.0);
        self.docs.insert(doc.id.clone(), doc);
    }

    pub fn get(&self, doc_id: &str) -> Option<&Document> {
        self.docs.get(doc_id)
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Documents in id order.
    pub fn documents(&self) -> Vec<&Document> {
        let mut docs: Vec<&Document> = self.docs.values().collect();
        docs.sort_by(|a, b| a.id.cmp(&b.id));
        docs
    }
}

impl DocumentMetadataStore for DocumentStore {
    fn get_facet_values(&self, doc_ids: &[String]) -> HashMap<String, DocumentMetadata> {
        doc_ids
            .iter()
            .filter_map(|id| {
                self.docs
                    .get(id)
                    .map(|doc| (id.clone(), doc.metadata.clone()))
            })
            .collect()
    }

    fn all_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.docs.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl DocumentTextSource for DocumentStore {
    fn document_text(&self, doc_id: &str) -> Option<String> {
        self.docs.get(doc_id).map(Document::full_text)
    }
}
