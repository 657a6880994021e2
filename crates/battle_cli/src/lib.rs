//! Battle CLI Library
//!
//! Question bank packing (JSON → MessagePack → LZ4 → SHA256 trailer),
//! headless bot battles and reward previews.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use battle_core::bank::{self, BANK_VERSION};
use battle_core::{
    AnswerTiming, BattleConfig, BattleError, BattleRuntime, BattleStatus, BotSimulator,
    Difficulty, EngineSettings, JsonlSink, NullSink, QuestionBank, ResultSink, RewardCalculator,
    RewardPayload, Score, SessionController, SessionSnapshot, StreakState,
};

/// Packed bank metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankMetadata {
    pub bank_version: u32,
    pub question_count: usize,
    /// Distinct categories, sorted
    pub categories: Vec<String>,
    /// SHA256 of the whole packed file (hex)
    pub checksum: String,
    /// RFC3339
    pub created_at: String,
    pub original_size: u64,
    pub packed_size: u64,
    /// packed / original
    pub compression_ratio: f64,
}

/// Pack a JSON question array into the binary bank format
pub fn pack_bank(input_json: &Path, output: &Path) -> Result<BankMetadata> {
    let json_str = fs::read_to_string(input_json)
        .with_context(|| format!("Failed to read JSON file: {}", input_json.display()))?;
    let original_size = json_str.len() as u64;

    let bank = QuestionBank::from_json(&json_str).context("Failed to parse question bank")?;
    if bank.is_empty() {
        bail!("Question bank {} is empty", input_json.display());
    }

    let file = bank.to_bank_file();
    let packed = bank::pack(&file).context("Failed to pack question bank")?;
    let packed_size = packed.len() as u64;

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create output directory: {}", parent.display())
            })?;
        }
    }
    fs::write(output, &packed)
        .with_context(|| format!("Failed to write output file: {}", output.display()))?;

    let categories: BTreeSet<String> =
        file.questions.iter().filter_map(|q| q.category.clone()).collect();

    Ok(BankMetadata {
        bank_version: BANK_VERSION,
        question_count: file.questions.len(),
        categories: categories.into_iter().collect(),
        checksum: bank::checksum_hex(&packed),
        created_at: Utc::now().to_rfc3339(),
        original_size,
        packed_size,
        compression_ratio: packed_size as f64 / original_size as f64,
    })
}

/// Check a packed bank against an expected checksum and make sure it decodes
pub fn verify_bank(packed_file: &Path, expected_checksum: &str) -> Result<bool> {
    let bytes = fs::read(packed_file)
        .with_context(|| format!("Failed to read bank file: {}", packed_file.display()))?;

    if bank::checksum_hex(&bytes) != expected_checksum {
        return Ok(false);
    }
    bank::unpack(&bytes).context("Bank checksum matched but payload is unreadable")?;
    Ok(true)
}

pub fn save_metadata(path: &Path, meta: &BankMetadata) -> Result<()> {
    let metadata_json = serde_json::to_string_pretty(meta)?;
    fs::write(path, metadata_json)
        .with_context(|| format!("Failed to write metadata: {}", path.display()))?;
    Ok(())
}

/// Inputs for a headless bot battle
#[derive(Debug, Clone)]
pub struct SimulationOptions {
    pub bank: PathBuf,
    pub category: String,
    pub difficulty: Difficulty,
    pub questions: usize,
    pub time_per_question: u32,
    /// Chance the scripted player answers correctly
    pub accuracy: f64,
    /// Overrides `bot.base_accuracy` from the settings file
    pub bot_accuracy: Option<f64>,
    pub seed: Option<u64>,
    pub tick: Duration,
    pub streak: StreakState,
    /// JSON-lines file the result is appended to
    pub record: Option<PathBuf>,
}

/// Play one bot battle with a scripted player and return the final snapshot
pub async fn simulate(options: &SimulationOptions) -> Result<SessionSnapshot> {
    if !(0.0..=1.0).contains(&options.accuracy) {
        bail!("Player accuracy must be 0.0-1.0, got {}", options.accuracy);
    }

    let loaded = QuestionBank::load(&options.bank)
        .with_context(|| format!("Failed to load question bank: {}", options.bank.display()))?;
    let bank = Arc::new(match options.seed {
        Some(seed) => QuestionBank::seeded(loaded.questions().to_vec(), seed)?,
        None => loaded,
    });

    let mut settings = EngineSettings::from_env()?;
    if let Some(accuracy) = options.bot_accuracy {
        settings.bot.base_accuracy = accuracy;
        settings.validate()?;
    }

    let sink: Arc<dyn ResultSink> = match &options.record {
        Some(path) => Arc::new(JsonlSink::new(path)),
        None => Arc::new(NullSink),
    };

    let mut config = BattleConfig::bot(options.category.clone(), options.difficulty)
        .with_questions_per_battle(options.questions)
        .with_time_per_question(options.time_per_question);
    if let Some(seed) = options.seed {
        config = config.with_seed(seed);
    }

    let mut controller = SessionController::new(bank.clone())
        .with_settings(settings)
        .with_sink(sink)
        .with_streak(options.streak);
    controller.start(config)?;

    let handle = BattleRuntime::launch(controller, None, options.tick)?;
    info!(session_id = %handle.session_id(), "Simulated battle started");

    let player_seed = options
        .seed
        .map(|seed| seed.wrapping_add(1))
        .unwrap_or_else(|| Utc::now().timestamp_micros() as u64);
    let mut player = BotSimulator::new(options.accuracy, 1.0, player_seed);

    handle.ready().await?;

    let mut updates = handle.subscribe();
    loop {
        let snapshot = updates.borrow_and_update().clone();
        if snapshot.is_terminal() {
            break;
        }

        if snapshot.status == BattleStatus::Active && !snapshot.player_answered {
            let question = snapshot
                .current_question
                .as_ref()
                .and_then(|view| bank.questions().iter().find(|q| q.id == view.id));
            if let Some(question) = question {
                let planned = player.plan_round(question, options.time_per_question);
                match handle.submit_answer(planned.label).await {
                    Ok(outcome) => {
                        debug!(round = snapshot.current_index, label = %planned.label, ?outcome, "Player answered");
                    }
                    // Round closed between snapshot and submit
                    Err(BattleError::InvalidState { .. }) => {}
                    Err(err) => return Err(err.into()),
                }
            }
        }

        if updates.changed().await.is_err() {
            break;
        }
    }

    Ok(handle.join().await?)
}

/// Inputs for a reward preview
#[derive(Debug, Clone, Copy)]
pub struct RewardQuery {
    pub score: Score,
    pub questions: usize,
    pub streak: StreakState,
    pub total_secs: u32,
    pub per_question_limit: u32,
}

/// Rewards for a hypothetical result under the configured weights
pub fn preview_rewards(settings: &EngineSettings, query: &RewardQuery) -> RewardPayload {
    let timing = AnswerTiming {
        total_secs: query.total_secs,
        per_question_limit: query.per_question_limit,
    };
    RewardCalculator::new(settings.rewards.clone()).compute(
        query.score,
        query.questions,
        &query.streak,
        &timing,
    )
}
