//! In-memory question bank
//!
//! Loads from plain JSON or from a packed bank file:
//! MessagePack (named fields) → LZ4 (size prepended) → trailing SHA-256 of
//! the compressed payload.

use lz4_flex::{compress_prepend_size, decompress_size_prepended};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::Difficulty;
use crate::error::{BattleError, Result};
use crate::question::{Question, QuestionSource};

pub const BANK_VERSION: u32 = 1;

const CHECKSUM_LEN: usize = 32;

#[derive(Error, Debug)]
pub enum QuestionBankError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] rmp_serde::encode::Error),

    #[error("Deserialization error: {0}")]
    Deserialization(#[from] rmp_serde::decode::Error),

    #[error("Decompression error")]
    Decompression,

    #[error("Corrupted data")]
    Corrupted,

    #[error("Checksum mismatch")]
    ChecksumMismatch,

    #[error("Version mismatch: found {found}, expected {expected}")]
    VersionMismatch { found: u32, expected: u32 },

    #[error("Duplicate question id: {0}")]
    DuplicateId(String),
}

/// On-disk bank layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankFile {
    pub version: u32,
    pub questions: Vec<Question>,
}

/// Questions shared by every session that draws from this bank.
///
/// Selection is a random sample per fetch; seed the bank for reproducible
/// draws.
#[derive(Debug)]
pub struct QuestionBank {
    questions: Vec<Question>,
    rng: Mutex<ChaCha8Rng>,
}

impl QuestionBank {
    pub fn new(questions: Vec<Question>) -> std::result::Result<Self, QuestionBankError> {
        Self::with_rng(questions, ChaCha8Rng::from_entropy())
    }

    pub fn seeded(
        questions: Vec<Question>,
        seed: u64,
    ) -> std::result::Result<Self, QuestionBankError> {
        Self::with_rng(questions, ChaCha8Rng::seed_from_u64(seed))
    }

    fn with_rng(
        questions: Vec<Question>,
        rng: ChaCha8Rng,
    ) -> std::result::Result<Self, QuestionBankError> {
        let mut ids = std::collections::HashSet::new();
        for question in &questions {
            if !ids.insert(question.id.as_str()) {
                return Err(QuestionBankError::DuplicateId(question.id.clone()));
            }
        }
        Ok(Self { questions, rng: Mutex::new(rng) })
    }

    /// Parse a JSON array of questions
    pub fn from_json(json: &str) -> std::result::Result<Self, QuestionBankError> {
        let questions: Vec<Question> = serde_json::from_str(json)?;
        Self::new(questions)
    }

    /// Load a bank file, picking the format by extension (`.json` or packed).
    pub fn load(path: &Path) -> std::result::Result<Self, QuestionBankError> {
        let is_json = path.extension().and_then(|e| e.to_str()).is_some_and(|e| e == "json");
        let bank = if is_json {
            Self::from_json(&fs::read_to_string(path)?)?
        } else {
            let file = unpack(&fs::read(path)?)?;
            Self::new(file.questions)?
        };
        info!(path = %path.display(), questions = bank.len(), "Question bank loaded");
        Ok(bank)
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    /// Number of questions eligible for a category/difficulty pair
    pub fn available(&self, category: &str, difficulty: Difficulty) -> usize {
        self.questions.iter().filter(|q| q.matches(category, difficulty)).count()
    }

    pub fn to_bank_file(&self) -> BankFile {
        BankFile { version: BANK_VERSION, questions: self.questions.clone() }
    }
}

impl QuestionSource for QuestionBank {
    fn fetch_questions(
        &self,
        category: &str,
        difficulty: Difficulty,
        count: usize,
    ) -> Result<Vec<Question>> {
        let eligible: Vec<&Question> =
            self.questions.iter().filter(|q| q.matches(category, difficulty)).collect();

        if eligible.len() < count {
            return Err(BattleError::InsufficientQuestions {
                category: category.to_string(),
                difficulty,
                requested: count,
                available: eligible.len(),
            });
        }

        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let picked: Vec<Question> =
            eligible.choose_multiple(&mut *rng, count).map(|q| (*q).clone()).collect();

        debug!(category, %difficulty, count, eligible = eligible.len(), "Questions drawn");
        Ok(picked)
    }
}

/// Serialize, compress and checksum a bank
pub fn pack(file: &BankFile) -> std::result::Result<Vec<u8>, QuestionBankError> {
    // 1. MessagePack with field names
    let msgpack = rmp_serde::to_vec_named(file)?;

    // 2. LZ4 (size prepended)
    let compressed = compress_prepend_size(&msgpack);

    // 3. SHA256 of the compressed payload, appended
    let checksum = Sha256::digest(&compressed);

    let mut result = compressed;
    result.extend_from_slice(&checksum);
    Ok(result)
}

/// Verify, decompress and deserialize a packed bank
pub fn unpack(bytes: &[u8]) -> std::result::Result<BankFile, QuestionBankError> {
    if bytes.len() < 4 + CHECKSUM_LEN {
        return Err(QuestionBankError::Corrupted);
    }

    let (payload, checksum) = bytes.split_at(bytes.len() - CHECKSUM_LEN);
    if Sha256::digest(payload).as_slice() != checksum {
        return Err(QuestionBankError::ChecksumMismatch);
    }

    let msgpack =
        decompress_size_prepended(payload).map_err(|_| QuestionBankError::Decompression)?;
    let file: BankFile = rmp_serde::from_slice(&msgpack)?;

    if file.version > BANK_VERSION {
        return Err(QuestionBankError::VersionMismatch {
            found: file.version,
            expected: BANK_VERSION,
        });
    }

    Ok(file)
}

/// Hex SHA-256 of a packed bank (the whole file, trailer included)
pub fn checksum_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}
