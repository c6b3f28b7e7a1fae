use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{EvalError, FieldErrors};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Choice {
    pub value: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldKind {
    Integer {
        min: Option<i64>,
        max: Option<i64>,
    },
    Float {
        min: Option<f64>,
        max: Option<f64>,
    },
    Choice {
        choices: Vec<Choice>,
    },
}

/// One form field: what it accepts and how it is presented.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldSpec {
    pub name: String,
    pub label: String,
    #[serde(flatten)]
    pub kind: FieldKind,
    pub initial: Option<Value>,
    pub disabled: bool,
}

impl FieldSpec {
    fn new(name: &str, label: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            kind,
            initial: None,
            disabled: false,
        }
    }

    pub fn integer(name: &str, label: &str, min: Option<i64>, max: Option<i64>) -> Self {
        Self::new(name, label, FieldKind::Integer { min, max })
    }

    pub fn float(name: &str, label: &str, min: Option<f64>, max: Option<f64>) -> Self {
        Self::new(name, label, FieldKind::Float { min, max })
    }

    pub fn choice(name: &str, label: &str, choices: Vec<Choice>) -> Self {
        Self::new(name, label, FieldKind::Choice { choices })
    }

    pub fn with_initial(mut self, initial: impl Into<Value>) -> Self {
        self.initial = Some(initial.into());
        self
    }

    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    fn check(&self, value: &Value) -> Result<Value, String> {
        match &self.kind {
            FieldKind::Integer { min, max } => {
                let number = value
                    .as_i64()
                    .ok_or_else(|| "enter a whole number".to_string())?;
                if let Some(min) = min.filter(|min| number < *min) {
                    return Err(format!("must be at least {min}"));
                }
                if let Some(max) = max.filter(|max| number > *max) {
                    return Err(format!("must be at most {max}"));
                }
                Ok(Value::from(number))
            }
            FieldKind::Float { min, max } => {
                let number = value
                    .as_f64()
                    .filter(|number| number.is_finite())
                    .ok_or_else(|| "enter a number".to_string())?;
                if let Some(min) = min.filter(|min| number < *min) {
                    return Err(format!("must be at least {min}"));
                }
                if let Some(max) = max.filter(|max| number > *max) {
                    return Err(format!("must be at most {max}"));
                }
                Ok(Value::from(number))
            }
            FieldKind::Choice { choices } => {
                let selected = value
                    .as_str()
                    .filter(|selected| choices.iter().any(|choice| choice.value == *selected))
                    .ok_or_else(|| {
                        format!("select a valid choice; {value} is not one of the available choices")
                    })?;
                Ok(Value::String(selected.to_string()))
            }
        }
    }
}

/// Ordered field declarations of one analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParameterSchema {
    pub fields: Vec<FieldSpec>,
}

impl ParameterSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Checks submitted parameters against the schema. `null` counts as an
    /// empty submission. Values are never coerced or clamped.
    pub fn validate(&self, submitted: &Value) -> Result<Parameters, FieldErrors> {
        let empty = Map::new();
        let object = match submitted {
            Value::Null => &empty,
            Value::Object(object) => object,
            _ => {
                return Err(FieldErrors::single(
                    "parameters",
                    "must be a JSON object",
                ));
            }
        };

        let mut errors = FieldErrors::new();
        for key in object.keys() {
            if self.get(key).is_none() {
                errors.add(key.clone(), "unknown field");
            }
        }

        let mut values = IndexMap::new();
        for field in &self.fields {
            let provided = object.get(&field.name).filter(|value| !value.is_null());
            let candidate = if field.disabled {
                field.initial.as_ref()
            } else {
                provided.or(field.initial.as_ref())
            };

            let Some(candidate) = candidate else {
                errors.add(field.name.clone(), "this field is required");
                continue;
            };
            match field.check(candidate) {
                Ok(value) => {
                    values.insert(field.name.clone(), value);
                }
                Err(message) => errors.add(field.name.clone(), message),
            }
        }

        if errors.is_empty() {
            Ok(Parameters { values })
        } else {
            Err(errors)
        }
    }
}

/// Validated parameter values in schema order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameters {
    values: IndexMap<String, Value>,
}

impl Parameters {
    pub fn integer(&self, name: &str) -> Result<i64, EvalError> {
        self.values
            .get(name)
            .and_then(Value::as_i64)
            .ok_or_else(|| EvalError::invalid(name, "expected a validated whole number"))
    }

    pub fn float(&self, name: &str) -> Result<f64, EvalError> {
        self.values
            .get(name)
            .and_then(Value::as_f64)
            .ok_or_else(|| EvalError::invalid(name, "expected a validated number"))
    }

    pub fn text(&self, name: &str) -> Result<&str, EvalError> {
        self.values
            .get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| EvalError::invalid(name, "expected a validated text value"))
    }

    pub fn to_json(&self) -> Value {
        Value::Object(
            self.values
                .iter()
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
        )
    }
}
