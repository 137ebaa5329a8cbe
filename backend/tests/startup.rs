mod support;

use std::io::Write;
use std::path::Path;

use iris_backend::config::ServerConfig;
use iris_backend::inference::{ArtifactError, Classifier};
use iris_backend::{AppState, StartupError};
use tempfile::NamedTempFile;

fn config_for(model_path: &Path) -> ServerConfig {
    let path = model_path.to_string_lossy().into_owned();
    ServerConfig::from_lookup(|key| (key == "MODEL_PATH").then(|| path.clone()))
        .expect("config parses")
}

fn manifest_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn bundled_model_loads() {
    let state = AppState::load(&config_for(Path::new(support::IRIS_TREE))).unwrap();
    assert_eq!(state.model().info().name, "iris-decision-tree");
}

#[test]
fn missing_artifact_prevents_startup() {
    let err = AppState::load(&config_for(Path::new("/no/such/model.json"))).err().unwrap();
    assert!(matches!(err, StartupError::Model(ArtifactError::Io { .. })));
}

#[test]
fn corrupt_artifact_prevents_startup() {
    let file = manifest_file("this is not json");
    let err = AppState::load(&config_for(file.path())).err().unwrap();
    assert!(matches!(err, StartupError::Model(ArtifactError::Parse { .. })));
}

#[test]
fn reordered_feature_columns_prevent_startup() {
    let file = manifest_file(
        r#"{
            "format_version": 1,
            "name": "shuffled",
            "feature_names": ["sepal_width", "sepal_length", "petal_length", "petal_width"],
            "classes": ["setosa"],
            "estimator": {"kind": "decision_tree", "nodes": [{"class": 0}]}
        }"#,
    );
    let err = AppState::load(&config_for(file.path())).err().unwrap();
    assert!(matches!(err, StartupError::Model(ArtifactError::FeatureOrder { .. })));
}

#[test]
fn forest_manifest_loads_and_votes() {
    let file = manifest_file(
        r#"{
            "format_version": 1,
            "name": "iris-forest",
            "version": "2.1.0",
            "feature_names": ["sepal_length", "sepal_width", "petal_length", "petal_width"],
            "classes": ["setosa", "versicolor", "virginica"],
            "estimator": {
                "kind": "random_forest",
                "trees": [
                    [
                        {"feature": 2, "threshold": 2.45, "left": 1, "right": 2},
                        {"class": 0},
                        {"class": 1}
                    ],
                    [
                        {"feature": 3, "threshold": 0.8, "left": 1, "right": 2},
                        {"class": 0},
                        {"class": 2}
                    ],
                    [{"class": 2}]
                ]
            }
        }"#,
    );
    let state = AppState::load(&config_for(file.path())).unwrap();
    let model = state.model();
    assert_eq!(model.info().version, "2.1.0");

    let labels = model
        .predict(ndarray::arr2(&[[5.1, 3.5, 1.4, 0.2], [6.9, 3.1, 5.4, 2.1]]).view())
        .unwrap();
    assert_eq!(labels, ["setosa", "virginica"]);
}

#[test]
fn single_class_logistic_manifest_prevents_startup() {
    let file = manifest_file(
        r#"{
            "format_version": 1,
            "name": "one-class",
            "feature_names": ["sepal_length", "sepal_width", "petal_length", "petal_width"],
            "classes": ["only"],
            "estimator": {
                "kind": "logistic",
                "coefficients": [[1.0, 0.0, 0.0, 0.0]],
                "intercepts": [0.0]
            }
        }"#,
    );
    let err = AppState::load(&config_for(file.path())).err().unwrap();
    assert!(matches!(err, StartupError::Model(ArtifactError::Invalid(_))));
}

#[test]
fn binary_logistic_manifest_serves_both_labels() {
    let file = manifest_file(
        r#"{
            "format_version": 1,
            "name": "setosa-vs-rest",
            "feature_names": ["sepal_length", "sepal_width", "petal_length", "petal_width"],
            "classes": ["other", "setosa"],
            "estimator": {
                "kind": "logistic",
                "coefficients": [[0.0, 0.0, -1.0, 0.0]],
                "intercepts": [2.45]
            }
        }"#,
    );
    let state = AppState::load(&config_for(file.path())).unwrap();
    let labels = state
        .model()
        .predict(ndarray::arr2(&[[5.1, 3.5, 1.4, 0.2], [6.9, 3.1, 5.4, 2.1]]).view())
        .unwrap();
    assert_eq!(labels, ["setosa", "other"]);
}

#[test]
fn invalid_environment_is_a_config_error() {
    let err = ServerConfig::from_lookup(|key| (key == "PORT").then(|| "http".to_string()))
        .map_err(StartupError::from)
        .err()
        .unwrap();
    assert!(matches!(err, StartupError::Config(_)));
    assert!(err.to_string().starts_with("invalid server configuration"));
}
