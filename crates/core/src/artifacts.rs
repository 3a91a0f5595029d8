//! Loading, validating and writing the three frozen artifacts.

use crate::classifier::Classifier;
use crate::config::ArtifactConfig;
use crate::error::ArtifactError;
use crate::linguistic::LinguisticModel;
use crate::vectorizer::TfIdfVectorizer;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const VECTORIZER_FILE: &str = "vector.json";
pub const CLASSIFIER_FILE: &str = "model.json";

/// blake3 digests of artifact files, keyed by file name relative to the
/// artifact directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default = "default_manifest_version")]
    pub version: u32,
    pub files: BTreeMap<String, String>,
}

fn default_manifest_version() -> u32 {
    1
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self, ArtifactError> {
        let raw = read(path)?;
        serde_json::from_str(&raw).map_err(|e| ArtifactError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Recompute every listed digest under `dir` and compare.
    pub fn verify(&self, dir: &Path) -> Result<(), ArtifactError> {
        for (name, expected) in &self.files {
            let actual = digest_file(&dir.join(name))?;
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(ArtifactError::ChecksumMismatch {
                    name: name.clone(),
                    expected: expected.clone(),
                    actual,
                });
            }
            debug!("Verified {}", name);
        }
        Ok(())
    }
}

pub fn digest_file(path: &Path) -> Result<String, ArtifactError> {
    let bytes = fs::read(path).map_err(|source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

fn read(path: &Path) -> Result<String, ArtifactError> {
    fs::read_to_string(path).map_err(|source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// The immutable bundle a pipeline classifies with.
#[derive(Debug, Clone)]
pub struct ArtifactSet {
    linguistic: LinguisticModel,
    vectorizer: TfIdfVectorizer,
    classifier: Classifier,
    digests: BTreeMap<String, String>,
    source: Option<PathBuf>,
}

impl ArtifactSet {
    pub fn load(config: &ArtifactConfig) -> Result<Self, ArtifactError> {
        let linguistic = match config.linguistic_model_path() {
            Some(path) => LinguisticModel::load(&path)?,
            None => LinguisticModel::english()?,
        };
        let vectorizer_path = config.vectorizer_path();
        let classifier_path = config.classifier_path();

        let manifest_path = config.manifest_path();
        if config.verify_manifest && manifest_path.exists() {
            Manifest::load(&manifest_path)?.verify(Path::new(&config.dir))?;
            info!("Artifact manifest verified.");
        }

        let vectorizer = TfIdfVectorizer::load(&vectorizer_path)?;
        let classifier = Classifier::load(&classifier_path)?;

        let mut set = Self::from_parts(linguistic, vectorizer, classifier)?;
        set.digests.insert(
            config.vectorizer.clone(),
            digest_file(&vectorizer_path)?,
        );
        set.digests.insert(
            config.classifier.clone(),
            digest_file(&classifier_path)?,
        );
        set.source = Some(PathBuf::from(&config.dir));
        info!(
            "Loaded artifacts from {}: {} terms, {} classifier.",
            config.dir,
            set.vectorizer.dim(),
            set.classifier.kind()
        );
        Ok(set)
    }

    pub fn from_parts(
        linguistic: LinguisticModel,
        vectorizer: TfIdfVectorizer,
        classifier: Classifier,
    ) -> Result<Self, ArtifactError> {
        classifier.validate()?;
        match classifier.input_dim() {
            Some(dim) if dim == vectorizer.dim() => {}
            Some(dim) => {
                return Err(ArtifactError::Incompatible(format!(
                    "classifier expects {dim} features, vectorizer produces {}",
                    vectorizer.dim()
                )))
            }
            None => {
                return Err(ArtifactError::Incompatible(
                    "classifier has no input dimension".to_string(),
                ))
            }
        }
        Ok(Self {
            linguistic,
            vectorizer,
            classifier,
            digests: BTreeMap::new(),
            source: None,
        })
    }

    pub fn linguistic(&self) -> &LinguisticModel {
        &self.linguistic
    }

    pub fn vectorizer(&self) -> &TfIdfVectorizer {
        &self.vectorizer
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Digests of the files this set was loaded from; empty for in-memory sets.
    pub fn digests(&self) -> &BTreeMap<String, String> {
        &self.digests
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }
}

/// Write `vector.json`, `model.json` and a matching manifest into `dir`.
pub fn write_artifacts(
    dir: &Path,
    vectorizer: &TfIdfVectorizer,
    classifier: &Classifier,
) -> anyhow::Result<Manifest> {
    fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;

    let mut manifest = Manifest {
        version: default_manifest_version(),
        files: BTreeMap::new(),
    };
    for (name, body) in [
        (VECTORIZER_FILE, vectorizer.to_json()?),
        (CLASSIFIER_FILE, classifier.to_json()?),
    ] {
        let path = dir.join(name);
        fs::write(&path, body.as_bytes()).with_context(|| format!("write {}", path.display()))?;
        manifest
            .files
            .insert(name.to_string(), blake3::hash(body.as_bytes()).to_hex().to_string());
    }

    let path = dir.join(MANIFEST_FILE);
    fs::write(&path, serde_json::to_string_pretty(&manifest)?)
        .with_context(|| format!("write {}", path.display()))?;
    info!("Wrote artifacts to {}", dir.display());
    Ok(manifest)
}
