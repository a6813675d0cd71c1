use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::NaiveDate;
use tempfile::TempDir;

use crate::search::documents::{Document, DocumentMetadata, DocumentStore};

/// Test fixture providing an isolated filesystem environment.
pub struct UnitTestFixture {
    pub temp_dir: TempDir,
    pub data_path: PathBuf,
}

impl UnitTestFixture {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let data_path = temp_dir.path().to_path_buf();

        println!("[FIXTURE] Created temp directory: {data_path:?}");

        Self {
            temp_dir,
            data_path,
        }
    }

    /// Create a test file with content.
    pub fn create_file(&self, relative_path: &str, content: &str) -> PathBuf {
        let full_path = self.data_path.join(relative_path);
        if let Some(parent) = full_path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent dirs");
        }
        std::fs::write(&full_path, content).expect("Failed to write file");
        println!(
            "[FIXTURE] Created file: {:?} ({} bytes)",
            full_path,
            content.len()
        );
        full_path
    }

    /// Write [`sample_documents`] as a JSON corpus.
    pub fn create_corpus(&self) -> PathBuf {
        let json = serde_json::to_string_pretty(&sample_documents())
            .expect("Failed to serialize corpus");
        self.create_file("corpus.json", &json)
    }
}

impl Default for UnitTestFixture {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for UnitTestFixture {
    fn drop(&mut self) {
        println!("[FIXTURE] Cleaning up temp directory: {:?}", self.data_path);
    }
}

/// Build a document with one `topic` tag field.
pub fn document(
    id: &str,
    title: &str,
    body: &str,
    topics: &[&str],
    classes: &[&str],
    quality: f64,
    date: Option<(i32, u32, u32)>,
) -> Document {
    Document {
        id: id.to_string(),
        title: title.to_string(),
        body: body.to_string(),
        metadata: DocumentMetadata {
            tags: BTreeMap::from([(
                "topic".to_string(),
                topics.iter().map(|t| (*t).to_string()).collect(),
            )]),
            classifications: classes.iter().map(|c| (*c).to_string()).collect(),
            quality,
            date: date.and_then(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d)),
        },
    }
}

/// Small mixed-topic corpus used across unit and integration tests.
pub fn sample_documents() -> Vec<Document> {
    vec![
        document(
            "rrf-paper",
            "Reciprocal Rank Fusion",
            "Reciprocal rank fusion combines ranked lists from multiple retrieval systems \
             by summing reciprocal ranks.",
            &["ir", "fusion"],
            &["cs.IR"],
            0.9,
            Some((2009, 7, 19)),
        ),
        document(
            "bm25-notes",
            "BM25 keyword scoring",
            "Okapi BM25 ranks documents by term frequency and inverse document frequency.",
            &["ir", "keyword"],
            &["cs.IR"],
            0.7,
            Some((1994, 11, 1)),
        ),
        document(
            "dense-retrieval",
            "Dense passage retrieval",
            "Dense retrieval encodes queries and passages into embedding vectors and ranks \
             by cosine similarity.",
            &["ir", "neural"],
            &["cs.IR", "cs.CL"],
            0.8,
            Some((2020, 4, 10)),
        ),
        document(
            "splade",
            "SPLADE sparse retrieval",
            "Learned sparse retrieval expands queries into weighted vocabulary terms.",
            &["ir", "neural"],
            &["cs.IR"],
            0.6,
            Some((2021, 7, 12)),
        ),
        document(
            "cross-encoder",
            "Cross-encoder reranking",
            "A cross-encoder rescores query document pairs jointly for precise reranking.",
            &["ir", "rerank"],
            &["cs.CL"],
            0.75,
            Some((2019, 1, 14)),
        ),
        document(
            "protein-folding",
            "Protein folding",
            "Proteins fold into three dimensional structures determined by amino acid sequence.",
            &["biology"],
            &["q-bio"],
            0.5,
            None,
        ),
    ]
}

pub fn sample_store() -> DocumentStore {
    DocumentStore::from_documents(sample_documents())
}
