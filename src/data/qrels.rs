use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use crate::error::EvalError;

const KIND: &str = "qrels";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Judgment {
    pub query_id: String,
    pub iteration: String,
    pub doc_id: String,
    pub relevance: i32,
}

#[derive(Debug, Clone, Default)]
pub struct QrelsTable {
    judgments: Vec<Judgment>,
    by_query: BTreeMap<String, HashMap<String, i32>>,
}

impl QrelsTable {
    /// Parses `query_id iteration doc_id relevance` lines.
    pub fn parse(text: &str, path: &Path) -> Result<Self, EvalError> {
        let mut table = Self::default();

        for (index, line) in text.lines().enumerate() {
            let line_no = index + 1;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let columns = trimmed.split_whitespace().collect::<Vec<&str>>();
            if columns.len() != 4 {
                return Err(EvalError::data_format(
                    KIND,
                    path,
                    line_no,
                    format!("expected 4 columns, found {}", columns.len()),
                ));
            }

            let relevance = columns[3].parse::<i32>().map_err(|_| {
                EvalError::data_format(
                    KIND,
                    path,
                    line_no,
                    format!("relevance is not an integer: {}", columns[3]),
                )
            })?;

            let judgment = Judgment {
                query_id: columns[0].to_string(),
                iteration: columns[1].to_string(),
                doc_id: columns[2].to_string(),
                relevance,
            };

            let previous = table
                .by_query
                .entry(judgment.query_id.clone())
                .or_default()
                .insert(judgment.doc_id.clone(), relevance);
            if previous.is_some() {
                return Err(EvalError::data_format(
                    KIND,
                    path,
                    line_no,
                    format!(
                        "duplicate judgment for query {} document {}",
                        judgment.query_id, judgment.doc_id
                    ),
                ));
            }

            table.judgments.push(judgment);
        }

        Ok(table)
    }

    pub fn judgments(&self) -> &[Judgment] {
        &self.judgments
    }

    pub fn len(&self) -> usize {
        self.judgments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.judgments.is_empty()
    }

    pub fn query_ids(&self) -> impl Iterator<Item = &str> {
        self.by_query.keys().map(String::as_str)
    }

    pub fn query_count(&self) -> usize {
        self.by_query.len()
    }

    pub fn query_judgments(&self, query_id: &str) -> Option<&HashMap<String, i32>> {
        self.by_query.get(query_id)
    }

    pub fn relevance(&self, query_id: &str, doc_id: &str) -> Option<i32> {
        self.by_query
            .get(query_id)
            .and_then(|docs| docs.get(doc_id))
            .copied()
    }

    pub fn max_relevance(&self) -> Option<i32> {
        self.judgments.iter().map(|judgment| judgment.relevance).max()
    }

    /// Distinct relevance grades in ascending order.
    pub fn relevance_grades(&self) -> Vec<i32> {
        self.judgments
            .iter()
            .map(|judgment| judgment.relevance)
            .collect::<BTreeSet<i32>>()
            .into_iter()
            .collect()
    }
}
