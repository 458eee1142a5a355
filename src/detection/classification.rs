// Copyright (c) 2026 OneNose Project
// Licensed under the MIT License. See LICENSE file in the project root.

//! Logistic-regression smell classifier loaded from a JSON artifact

use std::path::Path;
use std::str::FromStr;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::sensors::{ClimateReading, GasReading};

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("reading model: {0}")]
    Io(#[from] std::io::Error),

    #[error("parsing model: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("unknown feature '{0}'")]
    UnknownFeature(String),

    #[error("inconsistent model: {0}")]
    Shape(String),
}

/// On-disk model as exported by the training notebook
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub labels: Vec<String>,
    pub features: Vec<String>,
    #[serde(default)]
    pub mean: Option<Vec<f64>>,
    #[serde(default)]
    pub scale: Option<Vec<f64>>,
    pub coefficients: Vec<Vec<f64>>,
    pub intercepts: Vec<f64>,
}

/// One model input, resolved from its name once at load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    Temperature,
    Pressure,
    Humidity,
    GasResistance,
    /// 0-based sensor index
    Co2(usize),
    Tvoc(usize),
}

impl FromStr for Feature {
    type Err = ClassifierError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let unknown = || ClassifierError::UnknownFeature(name.to_string());
        match name {
            "temperature" => Ok(Feature::Temperature),
            "pressure" => Ok(Feature::Pressure),
            "humidity" => Ok(Feature::Humidity),
            "gas_resistance" => Ok(Feature::GasResistance),
            _ => {
                let rest = name.strip_prefix("sgp30_").ok_or_else(unknown)?;
                let (n, kind) = rest.split_once('_').ok_or_else(unknown)?;
                let n: usize = n.parse().map_err(|_| unknown())?;
                if n == 0 {
                    return Err(unknown());
                }
                match kind {
                    "co2" => Ok(Feature::Co2(n - 1)),
                    "tvoc" => Ok(Feature::Tvoc(n - 1)),
                    _ => Err(unknown()),
                }
            }
        }
    }
}

impl Feature {
    fn extract(self, climate: &ClimateReading, gas: &[GasReading]) -> Result<f64, String> {
        let gas_sample = |i: usize| {
            gas.get(i)
                .and_then(|r| r.sample)
                .ok_or_else(|| format!("SGP30_{} unavailable", i + 1))
        };
        match self {
            Feature::Temperature => climate.temperature_c.ok_or_else(|| "temperature unavailable".into()),
            Feature::Pressure => climate.pressure_hpa.ok_or_else(|| "pressure unavailable".into()),
            Feature::Humidity => climate.humidity_pct.ok_or_else(|| "humidity unavailable".into()),
            Feature::GasResistance => climate
                .gas_resistance_ohm
                .ok_or_else(|| "gas resistance not heat-stable".into()),
            Feature::Co2(i) => gas_sample(i).map(|s| s.co2_ppm as f64),
            Feature::Tvoc(i) => gas_sample(i).map(|s| s.tvoc_ppb as f64),
        }
    }
}

/// Result of classifying one cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClassificationOutcome {
    /// No model loaded
    Disabled,
    /// A required input was missing this cycle
    Unavailable(String),
    Label { label: String, confidence: f64 },
}

impl ClassificationOutcome {
    pub fn describe(&self) -> String {
        match self {
            ClassificationOutcome::Disabled => "disabled".to_string(),
            ClassificationOutcome::Unavailable(reason) => format!("unavailable ({})", reason),
            ClassificationOutcome::Label { label, confidence } => {
                format!("{} ({:.0}%)", label, confidence * 100.0)
            }
        }
    }
}

pub struct SmellClassifier {
    labels: Vec<String>,
    features: Vec<Feature>,
    mean: Vec<f64>,
    scale: Vec<f64>,
    coefficients: Vec<Vec<f64>>,
    intercepts: Vec<f64>,
}

impl SmellClassifier {
    pub fn from_artifact(artifact: ModelArtifact) -> Result<Self, ClassifierError> {
        let n = artifact.features.len();
        let features = artifact
            .features
            .iter()
            .map(|f| f.parse())
            .collect::<Result<Vec<Feature>, _>>()?;

        if artifact.labels.len() < 2 {
            return Err(ClassifierError::Shape("need at least two labels".into()));
        }
        let binary = artifact.labels.len() == 2 && artifact.coefficients.len() == 1;
        if !binary && artifact.coefficients.len() != artifact.labels.len() {
            return Err(ClassifierError::Shape(format!(
                "{} coefficient rows for {} labels",
                artifact.coefficients.len(),
                artifact.labels.len()
            )));
        }
        if artifact.intercepts.len() != artifact.coefficients.len() {
            return Err(ClassifierError::Shape("one intercept per coefficient row".into()));
        }
        if artifact.coefficients.iter().any(|row| row.len() != n) {
            return Err(ClassifierError::Shape(format!("coefficient rows must have {} entries", n)));
        }

        let mean = artifact.mean.unwrap_or_else(|| vec![0.0; n]);
        let scale = artifact.scale.unwrap_or_else(|| vec![1.0; n]);
        if mean.len() != n || scale.len() != n {
            return Err(ClassifierError::Shape("standardization length mismatch".into()));
        }
        if scale.iter().any(|&s| s == 0.0 || !s.is_finite()) {
            return Err(ClassifierError::Shape("scale must be finite and non-zero".into()));
        }

        Ok(Self {
            labels: artifact.labels,
            features,
            mean,
            scale,
            coefficients: artifact.coefficients,
            intercepts: artifact.intercepts,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ClassifierError> {
        let content = std::fs::read_to_string(path)?;
        let artifact: ModelArtifact = serde_json::from_str(&content)?;
        Self::from_artifact(artifact)
    }

    /// Load a model if one is configured. Any failure only disables
    /// classification.
    pub fn load_optional(path: Option<&Path>) -> Option<Self> {
        let path = path?;
        match Self::load(path) {
            Ok(model) => {
                info!("Loaded classifier {:?} ({} labels)", path, model.labels.len());
                Some(model)
            }
            Err(e) => {
                warn!("Classifier {:?} unusable, classification disabled: {}", path, e);
                None
            }
        }
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn feature_vector(&self, climate: &ClimateReading, gas: &[GasReading]) -> Result<Vec<f64>, String> {
        self.features
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(f, (m, s))| f.extract(climate, gas).map(|v| (v - m) / s))
            .collect()
    }

    /// Class probabilities for a standardized feature vector
    pub fn probabilities(&self, x: &[f64]) -> Vec<f64> {
        let logits: Vec<f64> = self
            .coefficients
            .iter()
            .zip(&self.intercepts)
            .map(|(row, b)| row.iter().zip(x).map(|(w, v)| w * v).sum::<f64>() + b)
            .collect();

        if logits.len() == 1 {
            let p = 1.0 / (1.0 + (-logits[0]).exp());
            return vec![1.0 - p, p];
        }

        let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let exps: Vec<f64> = logits.iter().map(|z| (z - max).exp()).collect();
        let total: f64 = exps.iter().sum();
        exps.into_iter().map(|e| e / total).collect()
    }

    pub fn classify(&self, climate: &ClimateReading, gas: &[GasReading]) -> ClassificationOutcome {
        let x = match self.feature_vector(climate, gas) {
            Ok(x) => x,
            Err(reason) => return ClassificationOutcome::Unavailable(reason),
        };
        let probs = self.probabilities(&x);
        let best = probs
            .iter()
            .enumerate()
            .fold(None, |best: Option<(usize, f64)>, (i, &p)| match best {
                Some((_, bp)) if bp >= p => best,
                _ => Some((i, p)),
            });
        match best {
            Some((i, confidence)) if confidence.is_finite() => ClassificationOutcome::Label {
                label: self.labels[i].clone(),
                confidence,
            },
            _ => ClassificationOutcome::Unavailable("model produced no finite score".into()),
        }
    }
}
