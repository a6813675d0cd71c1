//! Tantivy BM25 full-text search
//!
//! The keyword backend: a RAM-resident Tantivy index over document title
//! and body. Query text is parsed leniently, so stray operators or
//! unbalanced quotes never fail a search.

use async_trait::async_trait;
use parking_lot::Mutex;
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::{
    Field, IndexRecordOption, STORED, STRING, Schema, TextFieldIndexing, TextOptions, Value,
};
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, Searcher, TantivyDocument, Term};
use tracing::debug;

use crate::error::{Result, SearchError};
use crate::search::backend::{BackendKind, KeywordBackend, RankedList, search_blocking};
use crate::search::documents::{Document, DocumentStore};

/// BM25 search index using Tantivy
pub struct Bm25Index {
    index: Index,
    reader: IndexReader,
    writer: Mutex<IndexWriter>,
    fields: Bm25Fields,
}

/// Field handles for the BM25 schema
#[derive(Clone, Copy)]
struct Bm25Fields {
    id: Field,
    title: Field,
    body: Field,
}

impl Bm25Index {
    /// Open an empty in-memory index
    pub fn open_in_memory() -> Result<Self> {
        let schema = build_schema();
        let fields = extract_fields(&schema)?;

        let index = Index::create_in_ram(schema);
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;
        let writer = index.writer(15_000_000)?;

        Ok(Self {
            index,
            reader,
            writer: Mutex::new(writer),
            fields,
        })
    }

    /// Index every document in the store and commit.
    pub fn build(store: &DocumentStore) -> Result<Self> {
        let index = Self::open_in_memory()?;
        index.index_documents(store.documents())?;
        index.commit()?;
        debug!(docs = index.num_docs(), "bm25 index built");
        Ok(index)
    }

    /// Index a document, replacing any existing one with the same id
    pub fn index_document(&self, document: &Document) -> Result<()> {
        let mut doc = TantivyDocument::new();
        doc.add_text(self.fields.id, &document.id);
        doc.add_text(self.fields.title, &document.title);
        doc.add_text(self.fields.body, &document.body);

        let id_term = Term::from_field_text(self.fields.id, &document.id);

        let writer = self.writer.lock();
        writer.delete_term(id_term);
        writer.add_document(doc)?;
        Ok(())
    }

    /// Index multiple documents in a batch
    pub fn index_documents<'a>(
        &self,
        documents: impl IntoIterator<Item = &'a Document>,
    ) -> Result<usize> {
        let mut count = 0;
        for document in documents {
            self.index_document(document)?;
            count += 1;
        }
        Ok(count)
    }

    /// Commit pending changes and reload the reader
    pub fn commit(&self) -> Result<()> {
        let mut writer = self.writer.lock();
        writer.commit()?;
        drop(writer); // Release lock before reload

        self.reader.reload()?;
        Ok(())
    }

    /// Top `limit` `(doc_id, bm25_score)` pairs for the query text.
    pub fn top_k(&self, query: &str, limit: usize) -> Result<Vec<(String, f32)>> {
        top_k_in(&self.index, &self.reader.searcher(), self.fields, query, limit)
    }

    /// Get total number of indexed documents
    pub fn num_docs(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    /// Check if index is empty
    pub fn is_empty(&self) -> bool {
        self.num_docs() == 0
    }
}

#[async_trait]
impl KeywordBackend for Bm25Index {
    async fn search(&self, text: &str, k: usize) -> Result<RankedList> {
        // Index and Searcher are cheap handles over shared segments
        let index = self.index.clone();
        let searcher = self.reader.searcher();
        let fields = self.fields;
        let text = text.to_string();
        search_blocking(BackendKind::Keyword, move || {
            let hits = top_k_in(&index, &searcher, fields, &text, k)?;
            Ok(RankedList::from_scored(BackendKind::Keyword, hits))
        })
        .await
    }
}

fn top_k_in(
    index: &Index,
    searcher: &Searcher,
    fields: Bm25Fields,
    query: &str,
    limit: usize,
) -> Result<Vec<(String, f32)>> {
    if limit == 0 || query.trim().is_empty() {
        return Ok(Vec::new());
    }

    let query_parser = QueryParser::for_index(index, vec![fields.title, fields.body]);
    let (parsed_query, errors) = query_parser.parse_query_lenient(query);
    if !errors.is_empty() {
        debug!(errors = errors.len(), "lenient query parse dropped clauses");
    }

    let top_docs = searcher.search(&parsed_query, &TopDocs::with_limit(limit))?;

    let mut results = Vec::with_capacity(top_docs.len());
    for (score, doc_address) in top_docs {
        let doc: TantivyDocument = searcher.doc(doc_address)?;
        let doc_id = doc
            .get_first(fields.id)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        if !doc_id.is_empty() {
            results.push((doc_id, score));
        }
    }

    Ok(results)
}

/// Build the Tantivy schema
fn build_schema() -> Schema {
    let mut builder = Schema::builder();

    // positions enable phrase queries
    let text_options = TextOptions::default().set_indexing_options(
        TextFieldIndexing::default()
            .set_tokenizer("default")
            .set_index_option(IndexRecordOption::WithFreqsAndPositions),
    );

    builder.add_text_field("id", STRING | STORED);
    builder.add_text_field("title", text_options.clone());
    builder.add_text_field("body", text_options);

    builder.build()
}

fn extract_fields(schema: &Schema) -> Result<Bm25Fields> {
    let field = |name: &str| {
        schema.get_field(name).map_err(|_| {
            SearchError::Index(tantivy::TantivyError::SchemaError(format!(
                "missing {name} field"
            )))
        })
    };
    Ok(Bm25Fields {
        id: field("id")?,
        title: field("title")?,
        body: field("body")?,
    })
}
