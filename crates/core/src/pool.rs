//! Loading question pools from YAML.
//!
//! ```yaml
//! questions:
//!   - text: What is 2 + 2?
//!     difficulty: 1
//!     type: multiple-choice
//!     rightAnswer: 2
//!     answers: ["3", "4", "5"]
//!     allowedSeconds: 20
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::model::Question;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PoolError {
    #[error("reading question pool {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing question pool: {0}")]
    Parse(#[from] serde_yml::Error),
}

#[derive(Debug, Default, Deserialize)]
struct PoolDocument {
    #[serde(default)]
    questions: Vec<Question>,
}

/// Static collection of candidate questions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuestionPool {
    questions: Vec<Question>,
}

impl QuestionPool {
    #[must_use]
    pub fn new(questions: Vec<Question>) -> Self {
        Self { questions }
    }

    /// Parse a pool from YAML text.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::Parse` if the text is not a valid pool document.
    pub fn from_yaml(text: &str) -> Result<Self, PoolError> {
        let doc: PoolDocument = serde_yml::from_str(text)?;
        Ok(Self::new(doc.questions))
    }

    /// Read and parse a pool file.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::Read` if the file cannot be read, or `PoolError::Parse`.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PoolError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| PoolError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text)
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// Questions usable for quiz generation.
    #[must_use]
    pub fn valid(&self) -> Vec<Question> {
        self.questions.iter().filter(|q| q.is_valid()).cloned().collect()
    }

    /// Rejected questions with their 1-based position in the source.
    #[must_use]
    pub fn invalid(&self) -> Vec<(usize, &Question)> {
        self.questions
            .iter()
            .enumerate()
            .filter(|(_, q)| !q.is_valid())
            .map(|(i, q)| (i + 1, q))
            .collect()
    }

    /// Number of valid questions per difficulty.
    #[must_use]
    pub fn difficulty_histogram(&self) -> BTreeMap<i32, usize> {
        let mut histogram = BTreeMap::new();
        for q in self.questions.iter().filter(|q| q.is_valid()) {
            *histogram.entry(q.difficulty).or_insert(0) += 1;
        }
        histogram
    }
}
