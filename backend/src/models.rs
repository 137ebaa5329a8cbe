use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Column order the model was trained with. Inputs are packed in this order.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] =
    ["sepal_length", "sepal_width", "petal_length", "petal_width"];

pub const FEATURE_COUNT: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictionRequest {
    pub sepal_length: f64,
    pub sepal_width: f64,
    pub petal_length: f64,
    pub petal_width: f64,
}

impl PredictionRequest {
    /// Decodes and validates a raw request body.
    pub fn parse(body: &[u8]) -> Result<Self, ValidationErrors> {
        let value: Value = serde_json::from_slice(body).map_err(|e| {
            ValidationErrors::single(FieldError::body(
                format!("invalid JSON body: {}", e),
                "value_error.jsondecode",
            ))
        })?;

        Self::from_value(&value)
    }

    /// Validates a decoded JSON document, collecting every field error.
    ///
    /// Numbers are accepted as-is and strings are accepted when they parse to
    /// a finite float. Unknown keys are ignored.
    pub fn from_value(value: &Value) -> Result<Self, ValidationErrors> {
        let object = value.as_object().ok_or_else(|| {
            let error = FieldError::body("value is not a valid dict", "type_error.dict");
            ValidationErrors::single(error)
        })?;

        let mut values = [0.0; FEATURE_COUNT];
        let mut errors = Vec::new();

        for (slot, name) in values.iter_mut().zip(FEATURE_NAMES) {
            match read_float(object, name) {
                Ok(v) => *slot = v,
                Err(e) => errors.push(e),
            }
        }

        if !errors.is_empty() {
            return Err(ValidationErrors { errors });
        }

        Ok(Self::from_array(values))
    }

    pub fn from_array(values: [f64; FEATURE_COUNT]) -> Self {
        let [sepal_length, sepal_width, petal_length, petal_width] = values;
        PredictionRequest {
            sepal_length,
            sepal_width,
            petal_length,
            petal_width,
        }
    }

    /// Features in [`FEATURE_NAMES`] order.
    pub fn to_array(&self) -> [f64; FEATURE_COUNT] {
        [
            self.sepal_length,
            self.sepal_width,
            self.petal_length,
            self.petal_width,
        ]
    }
}

fn read_float(object: &Map<String, Value>, name: &str) -> Result<f64, FieldError> {
    let not_a_float = || FieldError::field(name, "value is not a valid float", "type_error.float");

    match object.get(name) {
        None => Err(FieldError::field(name, "field required", "value_error.missing")),
        Some(Value::Number(n)) => n.as_f64().filter(|v| v.is_finite()).ok_or_else(not_a_float),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(not_a_float),
        Some(_) => Err(not_a_float()),
    }
}

/// One entry of a 422 response body.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub loc: Vec<String>,
    pub msg: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl FieldError {
    fn field(name: &str, msg: impl Into<String>, kind: &str) -> Self {
        FieldError {
            loc: vec!["body".to_string(), name.to_string()],
            msg: msg.into(),
            kind: kind.to_string(),
        }
    }

    fn body(msg: impl Into<String>, kind: &str) -> Self {
        FieldError {
            loc: vec!["body".to_string()],
            msg: msg.into(),
            kind: kind.to_string(),
        }
    }

    /// The offending field, if the error is attached to one.
    pub fn field_name(&self) -> Option<&str> {
        self.loc.get(1).map(String::as_str)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{count} validation error(s) in request body", count = .errors.len())]
pub struct ValidationErrors {
    pub errors: Vec<FieldError>,
}

impl ValidationErrors {
    fn single(error: FieldError) -> Self {
        ValidationErrors {
            errors: vec![error],
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PredictionResponse {
    pub predicted_class: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody<T> {
    pub detail: T,
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub model: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_canonical_setosa() {
        let body =
            br#"{"sepal_length":5.1,"sepal_width":3.5,"petal_length":1.4,"petal_width":0.2}"#;
        let req = PredictionRequest::parse(body).unwrap();
        assert_eq!(req.to_array(), [5.1, 3.5, 1.4, 0.2]);
    }

    #[test]
    fn integers_and_numeric_strings_are_coerced() {
        let value = json!({
            "sepal_length": 5,
            "sepal_width": " 3.5 ",
            "petal_length": "1.4",
            "petal_width": 0.2,
            "comment": "ignored"
        });
        let req = PredictionRequest::from_value(&value).unwrap();
        assert_eq!(req.to_array(), [5.0, 3.5, 1.4, 0.2]);
    }

    #[test]
    fn reports_every_missing_field() {
        let err = PredictionRequest::from_value(&json!({"sepal_length": 5.1})).unwrap_err();
        let fields: Vec<_> = err.errors.iter().filter_map(FieldError::field_name).collect();
        assert_eq!(fields, ["sepal_width", "petal_length", "petal_width"]);
        assert!(err.errors.iter().all(|e| e.kind == "value_error.missing"));
    }

    #[test]
    fn rejects_non_numeric_values() {
        let value = json!({
            "sepal_length": "abc",
            "sepal_width": true,
            "petal_length": null,
            "petal_width": [0.2]
        });
        let err = PredictionRequest::from_value(&value).unwrap_err();
        assert_eq!(err.errors.len(), 4);
        assert!(err.errors.iter().all(|e| e.kind == "type_error.float"));
    }

    #[test]
    fn rejects_non_finite_strings() {
        let value = json!({
            "sepal_length": "NaN",
            "sepal_width": "inf",
            "petal_length": 1.4,
            "petal_width": 0.2
        });
        let err = PredictionRequest::from_value(&value).unwrap_err();
        let fields: Vec<_> = err.errors.iter().filter_map(FieldError::field_name).collect();
        assert_eq!(fields, ["sepal_length", "sepal_width"]);
    }

    #[test]
    fn malformed_or_non_object_bodies_fail_at_body_level() {
        let err = PredictionRequest::parse(b"{not json").unwrap_err();
        assert_eq!(err.errors[0].loc, ["body"]);
        assert_eq!(err.errors[0].kind, "value_error.jsondecode");

        let err = PredictionRequest::parse(b"[5.1, 3.5, 1.4, 0.2]").unwrap_err();
        assert_eq!(err.errors[0].kind, "type_error.dict");
    }

    #[test]
    fn field_error_serializes_type_key() {
        let err = FieldError::field("petal_width", "field required", "value_error.missing");
        assert_eq!(
            serde_json::to_value(&err).unwrap(),
            json!({
                "loc": ["body", "petal_width"],
                "msg": "field required",
                "type": "value_error.missing"
            })
        );
    }
}
