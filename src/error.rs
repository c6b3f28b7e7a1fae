use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Field-attributed parameter problems, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors {
    fields: BTreeMap<String, String>,
}

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.fields.entry(field.into()).or_insert_with(|| message.into());
    }

    pub fn extend_prefixed(&mut self, prefix: &str, other: FieldErrors) {
        for (field, message) in other.fields {
            self.add(format!("{prefix}.{field}"), message);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    #[cfg(test)]
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .map(|(field, message)| (field.as_str(), message.as_str()))
    }

    pub fn into_result(self) -> Result<(), EvalError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(EvalError::Validation(self))
        }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = self
            .iter()
            .map(|(field, message)| format!("{field}: {message}"))
            .collect::<Vec<String>>();
        f.write_str(&rendered.join("; "))
    }
}

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("invalid parameters: {0}")]
    Validation(FieldErrors),

    #[error("malformed {kind} file {}:{line}: {reason}", path.display())]
    DataFormat {
        kind: &'static str,
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("unsupported measure: {0}")]
    UnsupportedMeasure(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("failed to read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("storage failure")]
    Storage(#[from] rusqlite::Error),

    #[error("serialization failure")]
    Serialization(#[from] serde_json::Error),

    #[error("malformed serialized result: {0}")]
    MalformedResult(String),

    #[error("analysis {analysis} failed")]
    AnalysisFailed {
        analysis: String,
        #[source]
        source: Box<EvalError>,
    },
}

impl EvalError {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation(FieldErrors::single(field, message))
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn data_format(
        kind: &'static str,
        path: impl Into<PathBuf>,
        line: usize,
        reason: impl Into<String>,
    ) -> Self {
        Self::DataFormat {
            kind,
            path: path.into(),
            line,
            reason: reason.into(),
        }
    }

    /// Short machine-readable tag for progress/error notifications.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::DataFormat { .. } => "data_format",
            Self::UnsupportedMeasure(_) => "unsupported_measure",
            Self::NotFound { .. } => "not_found",
            Self::InsufficientData(_) => "insufficient_data",
            Self::Io { .. } => "io",
            Self::Storage(_) => "storage",
            Self::Serialization(_) => "serialization",
            Self::MalformedResult(_) => "malformed_result",
            Self::AnalysisFailed { source, .. } => source.kind(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{EvalError, FieldErrors};

    #[test]
    fn field_errors_render_sorted_and_keep_the_first_message() {
        let mut inner = FieldErrors::single("cutoff", "must be at least 1");
        inner.add("cutoff", "ignored");
        inner.add("baseline_run", "this field is required");

        let mut errors = FieldErrors::new();
        errors.extend_prefixed("retrieved_document_intersection", inner);
        let error = errors
            .into_result()
            .expect_err("non-empty field errors should fail");

        assert_eq!(
            error.to_string(),
            "invalid parameters: retrieved_document_intersection.baseline_run: this field is required; \
             retrieved_document_intersection.cutoff: must be at least 1"
        );
        assert_eq!(error.kind(), "validation");
        assert!(FieldErrors::new().into_result().is_ok());
        assert!(matches!(
            EvalError::invalid("parameters", "must be a JSON object"),
            EvalError::Validation(_)
        ));
    }
}
