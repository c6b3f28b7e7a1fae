use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use crate::error::EvalError;

const KIND: &str = "run";

#[derive(Debug, Clone, PartialEq)]
pub struct RankedDocument {
    pub query_id: String,
    pub iteration: String,
    pub doc_id: String,
    pub rank: u32,
    pub score: f64,
    pub tag: String,
}

/// Ranked results of one run, grouped per query and ordered by rank.
#[derive(Debug, Clone, Default)]
pub struct RunTable {
    by_query: BTreeMap<String, Vec<RankedDocument>>,
    len: usize,
}

impl RunTable {
    /// Parses `query_id iteration doc_id rank score tag` lines. Columns are
    /// tab-separated; lines without a tab are split on whitespace.
    pub fn parse(text: &str, path: &Path) -> Result<Self, EvalError> {
        let mut by_query = BTreeMap::<String, Vec<RankedDocument>>::new();
        let mut seen_ranks = HashSet::<(String, u32)>::new();
        let mut len = 0_usize;

        for (index, line) in text.lines().enumerate() {
            let line_no = index + 1;
            if line.trim().is_empty() {
                continue;
            }

            let columns = if line.contains('\t') {
                line.split('\t').map(str::trim).collect::<Vec<&str>>()
            } else {
                line.split_whitespace().collect::<Vec<&str>>()
            };
            if columns.len() != 6 {
                return Err(EvalError::data_format(
                    KIND,
                    path,
                    line_no,
                    format!("expected 6 columns, found {}", columns.len()),
                ));
            }

            let rank = columns[3]
                .parse::<u32>()
                .ok()
                .filter(|rank| *rank >= 1)
                .ok_or_else(|| {
                    EvalError::data_format(
                        KIND,
                        path,
                        line_no,
                        format!("rank is not a positive integer: {}", columns[3]),
                    )
                })?;

            let score = columns[4]
                .parse::<f64>()
                .ok()
                .filter(|score| score.is_finite())
                .ok_or_else(|| {
                    EvalError::data_format(
                        KIND,
                        path,
                        line_no,
                        format!("score is not a finite number: {}", columns[4]),
                    )
                })?;

            let query_id = columns[0].to_string();
            if !seen_ranks.insert((query_id.clone(), rank)) {
                return Err(EvalError::data_format(
                    KIND,
                    path,
                    line_no,
                    format!("duplicate rank {rank} for query {query_id}"),
                ));
            }

            by_query
                .entry(query_id.clone())
                .or_default()
                .push(RankedDocument {
                    query_id,
                    iteration: columns[1].to_string(),
                    doc_id: columns[2].to_string(),
                    rank,
                    score,
                    tag: columns[5].to_string(),
                });
            len += 1;
        }

        for documents in by_query.values_mut() {
            documents.sort_by_key(|document| document.rank);
        }

        Ok(Self { by_query, len })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn query_ids(&self) -> impl Iterator<Item = &str> {
        self.by_query.keys().map(String::as_str)
    }

    /// Documents of one query in rank order; empty when the query is absent.
    pub fn ranking(&self, query_id: &str) -> &[RankedDocument] {
        self.by_query
            .get(query_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Evaluation order: score descending, ties broken by document id descending.
    pub fn by_score(&self, query_id: &str) -> Vec<&RankedDocument> {
        let mut documents = self.ranking(query_id).iter().collect::<Vec<&RankedDocument>>();
        documents.sort_by(|left, right| {
            right
                .score
                .total_cmp(&left.score)
                .then_with(|| right.doc_id.cmp(&left.doc_id))
        });
        documents
    }

    /// Document ids retrieved at rank `<= cutoff` for one query.
    pub fn top_documents(&self, query_id: &str, cutoff: u32) -> HashSet<&str> {
        self.ranking(query_id)
            .iter()
            .take_while(|document| document.rank <= cutoff)
            .map(|document| document.doc_id.as_str())
            .collect()
    }
}
