#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use iris_backend::inference::{Classifier, InferenceError, ModelInfo, ModelInference};
use ndarray::ArrayView2;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id, Record};
use tracing::Subscriber;
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;

pub const IRIS_TREE: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/models/iris_tree.json");

pub const SETOSA: &str =
    r#"{"sepal_length":5.1,"sepal_width":3.5,"petal_length":1.4,"petal_width":0.2}"#;

pub fn iris_model() -> Arc<dyn Classifier> {
    Arc::new(ModelInference::load(IRIS_TREE).expect("bundled model loads"))
}

/// A span as seen when it closed.
#[derive(Debug, Clone, Default)]
pub struct ClosedSpan {
    pub name: String,
    pub fields: Vec<(String, String)>,
}

impl ClosedSpan {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Default)]
struct FieldValues(Vec<(String, String)>);

impl Visit for FieldValues {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.push((field.name().to_string(), value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.0.push((field.name().to_string(), format!("{:?}", value)));
    }
}

/// Layer collecting every span that closes under it.
#[derive(Clone, Default)]
pub struct SpanRecorder {
    closed: Arc<Mutex<Vec<ClosedSpan>>>,
}

impl SpanRecorder {
    pub fn closed(&self) -> Vec<ClosedSpan> {
        self.closed.lock().unwrap().clone()
    }

    pub fn named(&self, name: &str) -> Vec<ClosedSpan> {
        self.closed().into_iter().filter(|s| s.name == name).collect()
    }

    /// Installs the recorder as this thread's subscriber for as long as the
    /// guard lives.
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        tracing::subscriber::set_default(tracing_subscriber::registry().with(self.clone()))
    }
}

impl<S> Layer<S> for SpanRecorder
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let mut values = FieldValues::default();
        attrs.record(&mut values);
        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(values);
        }
    }

    fn on_record(&self, id: &Id, record: &Record<'_>, ctx: Context<'_, S>) {
        if let Some(span) = ctx.span(id) {
            if let Some(values) = span.extensions_mut().get_mut::<FieldValues>() {
                record.record(values);
            }
        }
    }

    fn on_close(&self, id: Id, ctx: Context<'_, S>) {
        if let Some(span) = ctx.span(&id) {
            let fields = span
                .extensions_mut()
                .remove::<FieldValues>()
                .map(|v| v.0)
                .unwrap_or_default();
            self.closed.lock().unwrap().push(ClosedSpan {
                name: span.name().to_string(),
                fields,
            });
        }
    }
}

/// Always fails, as a model would on input it cannot handle.
pub struct FailingModel;

impl Classifier for FailingModel {
    fn predict(&self, _input: ArrayView2<'_, f64>) -> Result<Vec<String>, InferenceError> {
        Err(InferenceError::Runtime("matrix is singular".to_string()))
    }

    fn info(&self) -> ModelInfo {
        stub_info("failing")
    }
}

/// Panics inside the inference call.
pub struct PanickingModel;

impl Classifier for PanickingModel {
    fn predict(&self, _input: ArrayView2<'_, f64>) -> Result<Vec<String>, InferenceError> {
        panic!("model blew up")
    }

    fn info(&self) -> ModelInfo {
        stub_info("panicking")
    }
}

/// Returns no labels at all.
pub struct SilentModel;

impl Classifier for SilentModel {
    fn predict(&self, _input: ArrayView2<'_, f64>) -> Result<Vec<String>, InferenceError> {
        Ok(Vec::new())
    }

    fn info(&self) -> ModelInfo {
        stub_info("silent")
    }
}

fn stub_info(name: &str) -> ModelInfo {
    ModelInfo {
        name: name.to_string(),
        version: "0.0.0".to_string(),
        kind: "stub".to_string(),
        feature_names: Vec::new(),
        classes: Vec::new(),
        loaded_at: String::new(),
    }
}
