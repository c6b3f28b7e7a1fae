use serde_json::{Map, Value, json};

use super::Scalar;
use crate::error::EvalError;

/// Row-labelled table with named columns; cells may mix numbers and text.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    index_name: String,
    columns: Vec<String>,
    index: Vec<String>,
    rows: Vec<Vec<Scalar>>,
}

impl Table {
    pub fn new<I, S>(index_name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            index_name: index_name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            index: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Appends a row. Short rows are padded with nulls and long rows truncated
    /// to the column count.
    pub fn push_row(&mut self, label: impl Into<String>, mut values: Vec<Scalar>) {
        values.resize(self.columns.len(), Scalar::Null);
        self.index.push(label.into());
        self.rows.push(values);
    }

    #[cfg(test)]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[cfg(test)]
    pub fn index(&self) -> &[String] {
        &self.index
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[cfg(test)]
    pub fn get(&self, row: &str, column: &str) -> Option<&Scalar> {
        let row = self.index.iter().position(|label| label == row)?;
        let column = self.columns.iter().position(|name| name == column)?;
        self.rows.get(row).and_then(|values| values.get(column))
    }

    /// Tight split form (`index`, `columns`, `data`, `index_names`,
    /// `column_names`) plus `data_with_index`, one object per row keyed by the
    /// index name and column names.
    pub fn to_json(&self) -> Value {
        let data = self
            .rows
            .iter()
            .map(|row| Value::Array(row.iter().map(Scalar::to_json).collect()))
            .collect::<Vec<Value>>();

        let data_with_index = self
            .index
            .iter()
            .zip(&self.rows)
            .map(|(label, row)| {
                let mut object = Map::new();
                object.insert(self.index_name.clone(), Value::String(label.clone()));
                for (column, cell) in self.columns.iter().zip(row) {
                    object.insert(column.clone(), cell.to_json());
                }
                Value::Object(object)
            })
            .collect::<Vec<Value>>();

        json!({
            "index": self.index,
            "columns": self.columns,
            "data": data,
            "index_names": [self.index_name],
            "column_names": [Value::Null],
            "data_with_index": data_with_index,
        })
    }

    pub fn from_json(value: &Value) -> Result<Self, EvalError> {
        let strings = |key: &str| -> Result<Vec<String>, EvalError> {
            value
                .get(key)
                .and_then(Value::as_array)
                .ok_or_else(|| EvalError::MalformedResult(format!("table without {key}")))?
                .iter()
                .map(|item| {
                    item.as_str().map(str::to_string).ok_or_else(|| {
                        EvalError::MalformedResult(format!("non-string entry in table {key}"))
                    })
                })
                .collect()
        };

        let columns = strings("columns")?;
        let index = strings("index")?;
        let index_name = strings("index_names")?.into_iter().next().unwrap_or_default();

        let data = value
            .get("data")
            .and_then(Value::as_array)
            .ok_or_else(|| EvalError::MalformedResult("table without data".to_string()))?;
        if data.len() != index.len() {
            return Err(EvalError::MalformedResult(format!(
                "table has {} rows but {} index labels",
                data.len(),
                index.len()
            )));
        }

        let mut rows = Vec::with_capacity(data.len());
        for row in data {
            let cells = row
                .as_array()
                .ok_or_else(|| EvalError::MalformedResult("table row is not a list".to_string()))?;
            if cells.len() != columns.len() {
                return Err(EvalError::MalformedResult(format!(
                    "table row has {} cells for {} columns",
                    cells.len(),
                    columns.len()
                )));
            }
            rows.push(cells.iter().map(Scalar::from_json).collect::<Result<_, _>>()?);
        }

        Ok(Self {
            index_name,
            columns,
            index,
            rows,
        })
    }
}
