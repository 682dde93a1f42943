//! Property tests for in-memory index search ordering and filtering.

use std::collections::HashMap;
use std::sync::Arc;

use docmind_rag::document::{Chunk, keys};
use docmind_rag::filter::FilterSet;
use docmind_rag::lexical::{InMemoryLexicalIndex, LexicalIndex};
use docmind_rag::vector::{InMemoryVectorIndex, VectorIndex, cosine_similarity};
use proptest::prelude::*;

const DOCUMENT_TYPES: [&str; 3] = ["invoice", "contract", "memo"];

/// Generate a non-zero L2-normalized embedding of the given dimension.
fn arb_normalized_embedding(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-1.0f32..1.0f32, dim).prop_filter_map("non-zero embedding", |mut v| {
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm < 1e-8 {
            return None;
        }
        for val in &mut v {
            *val /= norm;
        }
        Some(v)
    })
}

/// Generate a typed chunk with a normalized embedding.
fn arb_chunk(dim: usize) -> impl Strategy<Value = Chunk> {
    ("[a-z]{3,8}", "[a-z ]{5,30}", arb_normalized_embedding(dim), 0usize..3).prop_map(
        |(id, text, embedding, type_idx)| {
            Chunk::new(id, "doc_1", text, 0)
                .with_embedding(embedding)
                .with_metadata(keys::DOCUMENT_TYPE, DOCUMENT_TYPES[type_idx])
        },
    )
}

fn dedup(chunks: &[Chunk]) -> Vec<Arc<Chunk>> {
    let mut deduped: HashMap<String, Chunk> = HashMap::new();
    for chunk in chunks {
        deduped.entry(chunk.chunk_id.clone()).or_insert_with(|| chunk.clone());
    }
    deduped.into_values().map(Arc::new).collect()
}

/// **Feature: docmind-rag, Property 1: Vector index search ordering**
/// *For any* set of chunks stored in an InMemoryVectorIndex, searching with a
/// query embedding SHALL return results ordered by descending cosine
/// similarity, at most `limit` of them, each scored with its true cosine.
mod prop_vector_search_ordering {
    use super::*;

    const DIM: usize = 16;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn results_ordered_descending_and_bounded_by_limit(
            chunks in proptest::collection::vec(arb_chunk(DIM), 1..20),
            query in arb_normalized_embedding(DIM),
            limit in 1usize..25,
        ) {
            let unique = dedup(&chunks);
            let unique_count = unique.len();
            let rt = tokio::runtime::Runtime::new().unwrap();
            let results = rt.block_on(async {
                let index = InMemoryVectorIndex::new();
                index.upsert(&unique).await.unwrap();
                index.search(&query, &FilterSet::new(), limit).await.unwrap()
            });

            prop_assert!(results.len() <= limit);
            prop_assert_eq!(results.len(), limit.min(unique_count));

            for window in results.windows(2) {
                prop_assert!(
                    window[0].score >= window[1].score,
                    "results not in descending order: {} < {}",
                    window[0].score,
                    window[1].score,
                );
            }

            for result in &results {
                let expected = cosine_similarity(&result.chunk.embedding, &query);
                prop_assert!((result.score - expected).abs() < 1e-5);
            }
        }
    }
}

/// **Feature: docmind-rag, Property 2: Filter-then-rank**
/// *For any* document-type filter, every result of both in-memory indexes
/// SHALL satisfy the filter, and the number of results SHALL equal
/// `min(limit, admitted)` for the vector index, so excluded chunks never
/// consume the result budget.
mod prop_filter_then_rank {
    use super::*;

    const DIM: usize = 8;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn filtered_results_only_contain_admitted_chunks(
            chunks in proptest::collection::vec(arb_chunk(DIM), 1..20),
            query in arb_normalized_embedding(DIM),
            type_idx in 0usize..3,
            limit in 1usize..10,
        ) {
            let unique = dedup(&chunks);
            let wanted = DOCUMENT_TYPES[type_idx];
            let admitted = unique.iter().filter(|c| c.document_type() == Some(wanted)).count();
            let filters = FilterSet::new().with_document_type(wanted);

            let rt = tokio::runtime::Runtime::new().unwrap();
            let (dense, lexical) = rt.block_on(async {
                let vector = InMemoryVectorIndex::new();
                vector.upsert(&unique).await.unwrap();
                let lexical = InMemoryLexicalIndex::new();
                lexical.index(&unique).await.unwrap();
                let terms: String = unique.iter().map(|c| c.text.as_str()).collect::<Vec<_>>().join(" ");
                (
                    vector.search(&query, &filters, limit).await.unwrap(),
                    lexical.search(&terms, &filters, limit).await.unwrap(),
                )
            });

            prop_assert_eq!(dense.len(), limit.min(admitted));
            prop_assert!(dense.iter().all(|r| r.chunk.document_type() == Some(wanted)));
            prop_assert!(lexical.len() <= limit);
            prop_assert!(lexical.iter().all(|r| r.chunk.document_type() == Some(wanted)));
        }
    }
}
