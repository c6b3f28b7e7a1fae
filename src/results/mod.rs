use indexmap::IndexMap;
use serde::{Serialize, Serializer};
use serde_json::{Map, Number, Value, json};

use crate::error::EvalError;

mod plot;
mod table;

pub use plot::{Plot, bar_trace, heatmap_trace, line_trace};
pub use table::Table;

/// A single cell or value. Non-finite floats serialize as `null`.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Int(i64),
    Float(f64),
    Text(String),
    Null,
}

impl Scalar {
    pub fn to_json(&self) -> Value {
        match self {
            Self::Int(value) => Value::from(*value),
            Self::Float(value) => Number::from_f64(*value).map_or(Value::Null, Value::Number),
            Self::Text(value) => Value::String(value.clone()),
            Self::Null => Value::Null,
        }
    }

    #[cfg(test)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(value) => Some(*value),
            Self::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn from_json(value: &Value) -> Result<Self, EvalError> {
        match value {
            Value::Null => Ok(Self::Null),
            Value::String(text) => Ok(Self::Text(text.clone())),
            Value::Number(number) => match number.as_i64() {
                Some(int) => Ok(Self::Int(int)),
                None => number
                    .as_f64()
                    .map(Self::Float)
                    .ok_or_else(|| EvalError::MalformedResult(format!("number {number}"))),
            },
            other => Err(EvalError::MalformedResult(format!(
                "expected a scalar, found {other}"
            ))),
        }
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<Option<f64>> for Scalar {
    fn from(value: Option<f64>) -> Self {
        value.map_or(Self::Null, Self::Float)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<usize> for Scalar {
    fn from(value: usize) -> Self {
        i64::try_from(value).map_or(Self::Float(value as f64), Self::Int)
    }
}

impl From<i32> for Scalar {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl Serialize for Scalar {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// Builder for [`AnalysisOutput::Composite`]; children keep insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Composite {
    children: IndexMap<String, AnalysisOutput>,
}

impl Composite {
    pub fn with(mut self, label: impl Into<String>, child: impl Into<AnalysisOutput>) -> Self {
        self.children.insert(label.into(), child.into());
        self
    }
}

impl From<Composite> for AnalysisOutput {
    fn from(composite: Composite) -> Self {
        Self::Composite(composite.children)
    }
}

/// Output of one analysis. Serializes to `{"type": ..., "value": ...}`;
/// composites nest that shape per label.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutput {
    Value(Scalar),
    Table(Table),
    Plot(Plot),
    Composite(IndexMap<String, AnalysisOutput>),
}

impl AnalysisOutput {
    pub fn composite() -> Composite {
        Composite::default()
    }

    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::Value(_) => "value",
            Self::Table(_) => "table",
            Self::Plot(_) => "plot",
            Self::Composite(_) => "composite",
        }
    }

    #[cfg(test)]
    pub fn child(&self, label: &str) -> Option<&AnalysisOutput> {
        match self {
            Self::Composite(children) => children.get(label),
            _ => None,
        }
    }

    #[cfg(test)]
    pub fn as_table(&self) -> Option<&Table> {
        match self {
            Self::Table(table) => Some(table),
            _ => None,
        }
    }

    #[cfg(test)]
    pub fn as_plot(&self) -> Option<&Plot> {
        match self {
            Self::Plot(plot) => Some(plot),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        let value = match self {
            Self::Value(scalar) => scalar.to_json(),
            Self::Table(table) => table.to_json(),
            Self::Plot(plot) => plot.to_json(),
            Self::Composite(children) => Value::Object(
                children
                    .iter()
                    .map(|(label, child)| (label.clone(), child.to_json()))
                    .collect::<Map<String, Value>>(),
            ),
        };
        json!({ "type": self.type_tag(), "value": value })
    }

    pub fn from_json(value: &Value) -> Result<Self, EvalError> {
        let tag = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| EvalError::MalformedResult("missing type tag".to_string()))?;
        let inner = value
            .get("value")
            .ok_or_else(|| EvalError::MalformedResult(format!("{tag} without value")))?;

        match tag {
            "value" => Ok(Self::Value(Scalar::from_json(inner)?)),
            "table" => Ok(Self::Table(Table::from_json(inner)?)),
            "plot" => Ok(Self::Plot(Plot::from_json(inner)?)),
            "composite" => {
                let object = inner.as_object().ok_or_else(|| {
                    EvalError::MalformedResult("composite value is not an object".to_string())
                })?;
                let mut children = IndexMap::with_capacity(object.len());
                for (label, child) in object {
                    children.insert(label.clone(), Self::from_json(child)?);
                }
                Ok(Self::Composite(children))
            }
            other => Err(EvalError::MalformedResult(format!(
                "unknown result type {other}"
            ))),
        }
    }
}

impl Serialize for AnalysisOutput {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<Scalar> for AnalysisOutput {
    fn from(value: Scalar) -> Self {
        Self::Value(value)
    }
}

impl From<Table> for AnalysisOutput {
    fn from(value: Table) -> Self {
        Self::Table(value)
    }
}

impl From<Plot> for AnalysisOutput {
    fn from(value: Plot) -> Self {
        Self::Plot(value)
    }
}
