use std::path::Path;

use regex::Regex;

use crate::error::EvalError;
use crate::util::normalize_whitespace;

const KIND: &str = "topics";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    pub query_id: String,
    pub text: String,
}

#[derive(Debug, Clone, Default)]
pub struct TopicsTable {
    topics: Vec<Topic>,
}

impl TopicsTable {
    /// Extracts `<topic number="...">` elements; the query text is the element's
    /// text content with nested markup removed.
    pub fn parse(text: &str, path: &Path) -> Result<Self, EvalError> {
        let topic_pattern = Regex::new(r"(?s)<topic\b([^>]*?)(/>|>(.*?)</topic\s*>)")
            .map_err(|error| EvalError::data_format(KIND, path, 0, error.to_string()))?;
        let number_pattern = Regex::new(r#"\bnumber\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
            .map_err(|error| EvalError::data_format(KIND, path, 0, error.to_string()))?;
        let tag_pattern = Regex::new(r"(?s)<[^>]*>")
            .map_err(|error| EvalError::data_format(KIND, path, 0, error.to_string()))?;

        let mut topics = Vec::new();
        for captures in topic_pattern.captures_iter(text) {
            let whole = captures.get(0).map(|m| m.start()).unwrap_or(0);
            let line_no = text[..whole].matches('\n').count() + 1;

            let attributes = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
            let number = number_pattern
                .captures(attributes)
                .and_then(|number| number.get(1).or_else(|| number.get(2)))
                .map(|m| m.as_str().trim().to_string())
                .filter(|number| !number.is_empty())
                .ok_or_else(|| {
                    EvalError::data_format(KIND, path, line_no, "topic without number attribute")
                })?;

            let body = captures.get(3).map(|m| m.as_str()).unwrap_or_default();
            let stripped = tag_pattern.replace_all(body, " ");
            topics.push(Topic {
                query_id: number,
                text: normalize_whitespace(&decode_entities(&stripped)),
            });
        }

        Ok(Self { topics })
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    pub fn text(&self, query_id: &str) -> Option<&str> {
        self.topics
            .iter()
            .find(|topic| topic.query_id == query_id)
            .map(|topic| topic.text.as_str())
    }
}

fn decode_entities(input: &str) -> String {
    input
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
