use serde_json::{Value, json};

use crate::error::EvalError;

/// Declarative chart: a list of traces plus a layout, in plotly's JSON shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Plot {
    data: Vec<Value>,
    layout: Value,
}

impl Default for Plot {
    fn default() -> Self {
        Self {
            data: Vec::new(),
            layout: json!({}),
        }
    }
}

impl Plot {
    pub fn new(title: &str, x_title: &str, y_title: &str) -> Self {
        Self {
            data: Vec::new(),
            layout: json!({
                "title": { "text": title },
                "xaxis": { "title": { "text": x_title } },
                "yaxis": { "title": { "text": y_title } },
            }),
        }
    }

    pub fn set_layout(&mut self, key: &str, value: Value) {
        if let Value::Object(layout) = &mut self.layout {
            layout.insert(key.to_string(), value);
        }
    }

    pub fn push_trace(&mut self, trace: Value) {
        self.data.push(trace);
    }

    #[cfg(test)]
    pub fn data(&self) -> &[Value] {
        &self.data
    }

    #[cfg(test)]
    pub fn layout(&self) -> &Value {
        &self.layout
    }

    pub fn to_json(&self) -> Value {
        json!({ "data": self.data, "layout": self.layout })
    }

    pub fn from_json(value: &Value) -> Result<Self, EvalError> {
        let data = value
            .get("data")
            .and_then(Value::as_array)
            .ok_or_else(|| EvalError::MalformedResult("plot without data".to_string()))?
            .clone();
        let layout = value
            .get("layout")
            .filter(|layout| layout.is_object())
            .ok_or_else(|| EvalError::MalformedResult("plot without layout".to_string()))?
            .clone();
        Ok(Self { data, layout })
    }
}

pub fn bar_trace(name: &str, x: Vec<Value>, y: Vec<Value>) -> Value {
    json!({ "type": "bar", "name": name, "x": x, "y": y })
}

pub fn line_trace(name: &str, x: &[f64], y: &[f64]) -> Value {
    json!({ "type": "scatter", "mode": "lines+markers", "name": name, "x": x, "y": y })
}

pub fn heatmap_trace(name: &str, x: Vec<Value>, y: Vec<Value>, z: Vec<Vec<Value>>) -> Value {
    json!({
        "type": "heatmap",
        "name": name,
        "x": x,
        "y": y,
        "z": z,
        "hoverongaps": false,
    })
}
