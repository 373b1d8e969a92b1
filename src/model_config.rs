// src/model_config.rs
use serde::Deserialize;
use std::collections::BTreeMap;

/// Side length of the square input the classifier was trained on.
pub const INPUT_SIZE: usize = 128;
pub const INPUT_CHANNELS: usize = 3;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClassLabel {
    #[serde(alias = "notumor", alias = "normal", alias = "no")]
    NoTumor,
    #[serde(alias = "yes")]
    Tumor,
}

/// `config.json` stored next to `model.onnx`.
#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    pub id2label: BTreeMap<usize, ClassLabel>,
    #[serde(default)]
    pub model_version: Option<String>,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum LabelMapError {
    #[error("label map must name exactly two classes, found {0}")]
    WrongClassCount(usize),
    #[error("label {0:?} is mapped more than once")]
    DuplicateLabel(ClassLabel),
}

/// Explicit index -> label mapping for the classifier's score vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMap {
    labels: BTreeMap<usize, ClassLabel>,
}

impl LabelMap {
    pub fn new(labels: BTreeMap<usize, ClassLabel>) -> Result<Self, LabelMapError> {
        if labels.len() != 2 {
            return Err(LabelMapError::WrongClassCount(labels.len()));
        }
        let tumor_count = labels.values().filter(|l| **l == ClassLabel::Tumor).count();
        if tumor_count != 1 {
            let duplicated = if tumor_count == 2 {
                ClassLabel::Tumor
            } else {
                ClassLabel::NoTumor
            };
            return Err(LabelMapError::DuplicateLabel(duplicated));
        }
        Ok(Self { labels })
    }

    pub fn label(&self, index: usize) -> Option<ClassLabel> {
        self.labels.get(&index).copied()
    }
}

impl Default for LabelMap {
    // Class ordering the shipped model was trained with.
    fn default() -> Self {
        Self {
            labels: BTreeMap::from([(0, ClassLabel::NoTumor), (1, ClassLabel::Tumor)]),
        }
    }
}
