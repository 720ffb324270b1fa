//! Balanced quiz generation.

use std::collections::{BTreeMap, VecDeque};

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{NewSessionQuestion, Question};
use crate::pool::QuestionPool;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SelectionError {
    #[error("not enough questions: requested {requested}, available {available}")]
    NotEnoughQuestions { requested: usize, available: usize },

    #[error("difficulty range is inverted: {min} > {max}")]
    InvertedRange { min: i32, max: i32 },

    #[error("a quiz needs at least one question")]
    EmptyQuiz,
}

/// Knobs for quiz generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizOptions {
    pub total_questions: usize,
    pub min_difficulty: i32,
    pub max_difficulty: i32,
    /// Applied to generated questions whose pool entry has no `allowedSeconds`.
    pub question_timeout_secs: u32,
}

impl Default for QuizOptions {
    fn default() -> Self {
        Self {
            total_questions: 15,
            min_difficulty: 1,
            max_difficulty: 10,
            question_timeout_secs: 30,
        }
    }
}

impl QuizOptions {
    /// # Errors
    ///
    /// Returns `SelectionError` for an empty quiz or an inverted difficulty range.
    pub fn validate(&self) -> Result<(), SelectionError> {
        if self.total_questions == 0 {
            return Err(SelectionError::EmptyQuiz);
        }
        if self.min_difficulty > self.max_difficulty {
            return Err(SelectionError::InvertedRange {
                min: self.min_difficulty,
                max: self.max_difficulty,
            });
        }
        Ok(())
    }
}

/// Generated questions in presentation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quiz {
    questions: Vec<Question>,
}

impl Quiz {
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

    /// Copies of the questions tagged with their 1-based presentation index.
    #[must_use]
    pub fn to_session_questions(&self) -> Vec<NewSessionQuestion> {
        (1..)
            .zip(&self.questions)
            .map(|(index, question)| NewSessionQuestion {
                index,
                question: question.clone(),
            })
            .collect()
    }
}

/// Keeps questions whose difficulty lies in `min..=max`.
#[must_use]
pub fn in_difficulty_range(questions: &[Question], min: i32, max: i32) -> Vec<Question> {
    questions
        .iter()
        .filter(|q| (min..=max).contains(&q.difficulty))
        .cloned()
        .collect()
}

/// Picks up to `limit` questions, cycling through difficulties in ascending order.
///
/// Each round takes the next question of every difficulty that still has one,
/// so scarce difficulties are represented before abundant ones fill the rest.
/// Within a difficulty the input order is kept.
#[must_use]
pub fn round_robin(questions: Vec<Question>, limit: usize) -> Vec<Question> {
    let mut groups: BTreeMap<i32, VecDeque<Question>> = BTreeMap::new();
    for q in questions {
        groups.entry(q.difficulty).or_default().push_back(q);
    }

    let mut picked = Vec::new();
    while picked.len() < limit {
        let before = picked.len();
        for group in groups.values_mut() {
            if picked.len() == limit {
                break;
            }
            if let Some(q) = group.pop_front() {
                picked.push(q);
            }
        }
        if picked.len() == before {
            break;
        }
    }
    picked
}

/// Stable sort by ascending difficulty.
pub fn order_by_difficulty(questions: &mut [Question]) {
    questions.sort_by_key(|q| q.difficulty);
}

/// Builds a quiz from a pool according to [`QuizOptions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuizGenerator {
    options: QuizOptions,
    shuffle: bool,
}

impl QuizGenerator {
    /// Shuffling is on by default so pool order does not bias the pick.
    #[must_use]
    pub fn new(options: QuizOptions) -> Self {
        Self {
            options,
            shuffle: true,
        }
    }

    #[must_use]
    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    #[must_use]
    pub fn options(&self) -> &QuizOptions {
        &self.options
    }

    /// Generate a quiz using the thread-local RNG.
    ///
    /// # Errors
    ///
    /// See [`QuizGenerator::generate_with_rng`].
    pub fn generate(&self, pool: &QuestionPool) -> Result<Quiz, SelectionError> {
        self.generate_with_rng(pool, &mut rand::rng())
    }

    /// Generate a quiz, shuffling candidates with `rng` when enabled.
    ///
    /// Invalid pool questions are always discarded first.
    ///
    /// # Errors
    ///
    /// Returns `SelectionError::NotEnoughQuestions` when fewer valid questions
    /// than requested fall in the difficulty range; no partial quiz is returned.
    pub fn generate_with_rng<R: Rng + ?Sized>(
        &self,
        pool: &QuestionPool,
        rng: &mut R,
    ) -> Result<Quiz, SelectionError> {
        self.options.validate()?;

        let mut candidates = in_difficulty_range(
            &pool.valid(),
            self.options.min_difficulty,
            self.options.max_difficulty,
        );
        if candidates.len() < self.options.total_questions {
            return Err(SelectionError::NotEnoughQuestions {
                requested: self.options.total_questions,
                available: candidates.len(),
            });
        }

        if self.shuffle {
            candidates.shuffle(rng);
        }

        let mut questions = round_robin(candidates, self.options.total_questions);
        order_by_difficulty(&mut questions);
        for q in &mut questions {
            if q.allowed_seconds == 0 {
                q.allowed_seconds = self.options.question_timeout_secs;
            }
        }

        Ok(Quiz { questions })
    }
}
