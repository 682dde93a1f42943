//! Tantivy-backed [`LexicalIndex`].
//!
//! This module is only available when the `tantivy` feature is enabled.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, Occur, Query, QueryParser, TermSetQuery};
use tantivy::schema::{
    Field, IndexRecordOption, STORED, STRING, Schema, TextFieldIndexing, TextOptions, Value,
};
use tantivy::tokenizer::{Language, LowerCaser, RemoveLongFilter, SimpleTokenizer, Stemmer, TextAnalyzer};
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term, doc};
use tokio::sync::RwLock;
use tracing::debug;

use crate::document::{Chunk, ScoredChunk};
use crate::error::{RagError, Result};
use crate::filter::FilterSet;
use crate::lexical::LexicalIndex;

const BACKEND: &str = "tantivy";
const TOKENIZER: &str = "en_stem";
const WRITER_MEMORY_BUDGET: usize = 50_000_000;

fn index_error(e: impl std::fmt::Display) -> RagError {
    RagError::Index { backend: BACKEND.to_string(), message: e.to_string() }
}

#[derive(Clone, Copy)]
struct Fields {
    chunk_id: Field,
    document_id: Field,
    body: Field,
}

fn build_schema() -> (Schema, Fields) {
    let mut builder = Schema::builder();
    let chunk_id = builder.add_text_field("chunk_id", STRING | STORED);
    let document_id = builder.add_text_field("document_id", STRING | STORED);
    let body_opts = TextOptions::default().set_indexing_options(
        TextFieldIndexing::default()
            .set_tokenizer(TOKENIZER)
            .set_index_option(IndexRecordOption::WithFreqsAndPositions),
    );
    let body = builder.add_text_field("body", body_opts);
    (builder.build(), Fields { chunk_id, document_id, body })
}

/// BM25 keyword search over a RAM-resident Tantivy index.
///
/// Chunk bodies are indexed with an English stemming analyzer. Metadata
/// filtering resolves the admitted `chunk_id`s first and intersects them
/// with the text query through a `TermSetQuery`, so excluded chunks never
/// consume the result limit.
pub struct TantivyLexicalIndex {
    index: Index,
    reader: IndexReader,
    writer: Mutex<IndexWriter>,
    fields: Fields,
    chunks: RwLock<HashMap<String, Arc<Chunk>>>,
}

impl TantivyLexicalIndex {
    pub fn in_ram() -> Result<Self> {
        let (schema, fields) = build_schema();
        let index = Index::create_in_ram(schema);
        let analyzer = TextAnalyzer::builder(SimpleTokenizer::default())
            .filter(RemoveLongFilter::limit(40))
            .filter(LowerCaser)
            .filter(Stemmer::new(Language::English))
            .build();
        index.tokenizers().register(TOKENIZER, analyzer);

        let writer = index.writer(WRITER_MEMORY_BUDGET).map_err(index_error)?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(index_error)?;

        Ok(Self { index, reader, writer: Mutex::new(writer), fields, chunks: RwLock::new(HashMap::new()) })
    }

    fn commit(&self, apply: impl FnOnce(&IndexWriter) -> Result<()>) -> Result<()> {
        let mut writer = self.writer.lock().map_err(|_| index_error("index writer lock poisoned"))?;
        apply(&writer)?;
        writer.commit().map_err(index_error)?;
        self.reader.reload().map_err(index_error)
    }
}

#[async_trait]
impl LexicalIndex for TantivyLexicalIndex {
    fn name(&self) -> &str {
        BACKEND
    }

    async fn index(&self, chunks: &[Arc<Chunk>]) -> Result<()> {
        let f = self.fields;
        self.commit(|writer| {
            for chunk in chunks {
                writer.delete_term(Term::from_field_text(f.chunk_id, &chunk.chunk_id));
                writer
                    .add_document(doc!(
                        f.chunk_id => chunk.chunk_id.as_str(),
                        f.document_id => chunk.document_id.as_str(),
                        f.body => chunk.text.as_str(),
                    ))
                    .map_err(index_error)?;
            }
            Ok(())
        })?;

        let mut map = self.chunks.write().await;
        for chunk in chunks {
            map.insert(chunk.chunk_id.clone(), Arc::clone(chunk));
        }
        debug!(backend = BACKEND, count = chunks.len(), "indexed chunks");
        Ok(())
    }

    async fn delete_document(&self, document_id: &str) -> Result<usize> {
        let f = self.fields;
        self.commit(|writer| {
            writer.delete_term(Term::from_field_text(f.document_id, document_id));
            Ok(())
        })?;

        let mut map = self.chunks.write().await;
        let before = map.len();
        map.retain(|_, c| c.document_id != document_id);
        Ok(before - map.len())
    }

    async fn search(&self, query: &str, filters: &FilterSet, limit: usize) -> Result<Vec<ScoredChunk>> {
        if limit == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let f = self.fields;
        let chunks = self.chunks.read().await;

        let parser = QueryParser::for_index(&self.index, vec![f.body]);
        let (text_query, _errors) = parser.parse_query_lenient(query);

        let final_query: Box<dyn Query> = if filters.is_unfiltered() {
            text_query
        } else {
            let admitted: Vec<Term> = chunks
                .values()
                .filter(|c| filters.matches(c))
                .map(|c| Term::from_field_text(f.chunk_id, &c.chunk_id))
                .collect();
            if admitted.is_empty() {
                return Ok(Vec::new());
            }
            Box::new(BooleanQuery::new(vec![
                (Occur::Must, text_query),
                (Occur::Must, Box::new(TermSetQuery::new(admitted))),
            ]))
        };

        let searcher = self.reader.searcher();
        let top_docs = searcher.search(&final_query, &TopDocs::with_limit(limit)).map_err(index_error)?;

        let mut results = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let document: TantivyDocument = searcher.doc(address).map_err(index_error)?;
            let Some(chunk_id) = document.get_first(f.chunk_id).and_then(|v| v.as_str()) else {
                continue;
            };
            if let Some(chunk) = chunks.get(chunk_id) {
                results.push(ScoredChunk { chunk: Arc::clone(chunk), score });
            }
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::keys;

    #[tokio::test]
    async fn stems_and_filters() {
        let index = TantivyLexicalIndex::in_ram().unwrap();
        let invoice = Arc::new(
            Chunk::new("i", "d1", "Invoices were paid in March", 0)
                .with_metadata(keys::DOCUMENT_TYPE, "invoice"),
        );
        let memo = Arc::new(
            Chunk::new("m", "d2", "Memo about an invoice dispute", 0)
                .with_metadata(keys::DOCUMENT_TYPE, "memo"),
        );
        index.index(&[invoice, memo]).await.unwrap();

        let all = index.search("invoice", &FilterSet::new(), 10).await.unwrap();
        assert_eq!(all.len(), 2);

        let filtered = index
            .search("invoice", &FilterSet::new().with_document_type("invoice"), 10)
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].chunk.chunk_id, "i");
    }

    #[tokio::test]
    async fn delete_document_removes_hits() {
        let index = TantivyLexicalIndex::in_ram().unwrap();
        index.index(&[Arc::new(Chunk::new("a", "d1", "quarterly revenue", 0))]).await.unwrap();
        assert_eq!(index.delete_document("d1").await.unwrap(), 1);
        assert!(index.search("revenue", &FilterSet::new(), 5).await.unwrap().is_empty());
    }
}
