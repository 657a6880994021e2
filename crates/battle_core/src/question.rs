//! Quiz questions and the question-source seam.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::Difficulty;
use crate::error::{BattleError, Result};

/// Label of one of the four alternatives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AnswerLabel {
    A,
    B,
    C,
    D,
}

impl AnswerLabel {
    pub const ALL: [AnswerLabel; 4] = [AnswerLabel::A, AnswerLabel::B, AnswerLabel::C, AnswerLabel::D];

    pub fn index(&self) -> usize {
        match self {
            Self::A => 0,
            Self::B => 1,
            Self::C => 2,
            Self::D => 3,
        }
    }

    pub fn as_char(&self) -> char {
        match self {
            Self::A => 'A',
            Self::B => 'B',
            Self::C => 'C',
            Self::D => 'D',
        }
    }
}

impl fmt::Display for AnswerLabel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

impl FromStr for AnswerLabel {
    type Err = BattleError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "A" | "a" => Ok(Self::A),
            "B" | "b" => Ok(Self::B),
            "C" | "c" => Ok(Self::C),
            "D" | "d" => Ok(Self::D),
            other => Err(BattleError::Configuration(format!("Unknown answer label: {other}"))),
        }
    }
}

/// Immutable multiple-choice question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    pub prompt: String,
    /// Alternatives in label order (A, B, C, D)
    pub alternatives: [String; 4],
    pub correct_answer: AnswerLabel,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
}

impl Question {
    pub fn new(
        id: impl Into<String>,
        prompt: impl Into<String>,
        alternatives: [String; 4],
        correct_answer: AnswerLabel,
    ) -> Self {
        Self {
            id: id.into(),
            prompt: prompt.into(),
            alternatives,
            correct_answer,
            category: None,
            difficulty: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_difficulty(mut self, difficulty: Difficulty) -> Self {
        self.difficulty = Some(difficulty);
        self
    }

    pub fn alternative(&self, label: AnswerLabel) -> &str {
        &self.alternatives[label.index()]
    }

    pub fn is_correct(&self, label: AnswerLabel) -> bool {
        self.correct_answer == label
    }

    /// Labels of the three wrong alternatives
    pub fn wrong_labels(&self) -> Vec<AnswerLabel> {
        AnswerLabel::ALL.into_iter().filter(|label| *label != self.correct_answer).collect()
    }

    /// Category match is case-insensitive; an untagged difficulty matches any tier.
    pub fn matches(&self, category: &str, difficulty: Difficulty) -> bool {
        let category_ok = self
            .category
            .as_deref()
            .is_some_and(|c| c.trim().eq_ignore_ascii_case(category.trim()));
        let difficulty_ok = self.difficulty.map_or(true, |d| d == difficulty);
        category_ok && difficulty_ok
    }
}

/// Supplies the questions for a battle.
///
/// Implementations return exactly `count` questions or fail with
/// [`BattleError::InsufficientQuestions`]. Any other error is treated as a
/// source outage.
pub trait QuestionSource: Send + Sync {
    fn fetch_questions(
        &self,
        category: &str,
        difficulty: Difficulty,
        count: usize,
    ) -> Result<Vec<Question>>;
}
