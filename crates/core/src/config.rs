use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub artifacts: ArtifactConfig,
    #[serde(default)]
    pub classification: ClassificationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactConfig {
    /// Directory the relative artifact paths below are resolved against.
    #[serde(default = "default_artifact_dir")]
    pub dir: String,
    /// Linguistic model TOML. The bundled English model is used when unset.
    #[serde(default)]
    pub linguistic_model: Option<String>,
    #[serde(default = "default_vectorizer")]
    pub vectorizer: String,
    #[serde(default = "default_classifier")]
    pub classifier: String,
    /// Verify `manifest.json` digests when the file is present.
    #[serde(default = "default_true")]
    pub verify_manifest: bool,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            dir: default_artifact_dir(),
            linguistic_model: None,
            vectorizer: default_vectorizer(),
            classifier: default_classifier(),
            verify_manifest: true,
        }
    }
}

impl ArtifactConfig {
    pub fn with_dir(dir: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            ..Self::default()
        }
    }

    pub fn resolve(&self, name: &str) -> PathBuf {
        let path = PathBuf::from(name);
        if path.is_absolute() {
            path
        } else {
            PathBuf::from(&self.dir).join(path)
        }
    }

    pub fn vectorizer_path(&self) -> PathBuf {
        self.resolve(&self.vectorizer)
    }

    pub fn classifier_path(&self) -> PathBuf {
        self.resolve(&self.classifier)
    }

    pub fn linguistic_model_path(&self) -> Option<PathBuf> {
        self.linguistic_model.as_deref().map(|p| self.resolve(p))
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.resolve(crate::artifacts::MANIFEST_FILE)
    }
}

/// What to do when normalization leaves nothing to classify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyInputPolicy {
    /// Feed the all-zero vector to the classifier and return its label.
    #[default]
    Model,
    /// Fail with `ClassifyError::EmptyInput`.
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationConfig {
    /// Presentation-layer gate; the pipeline itself accepts any length.
    #[serde(default = "default_min_chars")]
    pub min_chars: usize,
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub empty_input: EmptyInputPolicy,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            min_chars: default_min_chars(),
            max_input_chars: default_max_input_chars(),
            timeout_ms: default_timeout_ms(),
            empty_input: EmptyInputPolicy::default(),
            concurrency: default_concurrency(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_filter")]
    pub filter: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
        }
    }
}

fn default_artifact_dir() -> String {
    "artifacts".to_string()
}

fn default_vectorizer() -> String {
    "vector.json".to_string()
}

fn default_classifier() -> String {
    "model.json".to_string()
}

fn default_true() -> bool {
    true
}

fn default_min_chars() -> usize {
    100
}

fn default_max_input_chars() -> usize {
    200_000
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_concurrency() -> usize {
    4
}

fn default_log_filter() -> String {
    "newscheck=info".to_string()
}

pub fn load(path: Option<&str>) -> anyhow::Result<AppConfig> {
    let mut settings = config::Config::builder();
    if let Some(p) = path {
        settings = settings.add_source(config::File::with_name(p));
    } else {
        settings = settings.add_source(config::File::with_name("config/default").required(false));
    }
    settings = settings.add_source(
        config::Environment::with_prefix("NEWSCHECK")
            .prefix_separator("__")
            .separator("__"),
    );
    let cfg = settings.build()?;
    Ok(cfg.try_deserialize()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn defaults_apply_to_sparse_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("newscheck.toml");
        fs::write(
            &path,
            r#"
            [artifacts]
            dir = "/opt/models"

            [classification]
            empty_input = "reject"
            "#,
        )
        .unwrap();

        let cfg = load(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(cfg.artifacts.dir, "/opt/models");
        assert_eq!(cfg.artifacts.vectorizer, "vector.json");
        assert_eq!(cfg.classification.empty_input, EmptyInputPolicy::Reject);
        assert_eq!(cfg.classification.min_chars, 100);
        assert!(!cfg.logging.json);
    }

    #[test]
    fn relative_paths_resolve_against_dir() {
        let cfg = ArtifactConfig::with_dir("models");
        assert_eq!(cfg.vectorizer_path(), PathBuf::from("models/vector.json"));
        assert!(cfg.linguistic_model_path().is_none());
    }
}
