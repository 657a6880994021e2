//! Battle CLI
//!
//! Question bank packer, headless bot battles and reward previews.
//! Log verbosity follows `RUST_LOG` (default `info`).

#[cfg(feature = "cli")]
use anyhow::Result;
#[cfg(feature = "cli")]
use clap::{Parser, Subcommand};
#[cfg(feature = "cli")]
use std::path::{Path, PathBuf};

#[cfg(feature = "cli")]
#[derive(Parser)]
#[command(name = "battle")]
#[command(about = "Quiz battle tools: pack question banks, simulate bot battles", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[cfg(feature = "cli")]
#[derive(Subcommand)]
enum Commands {
    /// Pack a JSON question array into a binary bank
    Pack {
        /// Input JSON file path
        #[arg(long)]
        r#in: PathBuf,

        /// Output bank file path
        #[arg(long)]
        out: PathBuf,

        /// Output metadata JSON file
        #[arg(long)]
        metadata: Option<PathBuf>,
    },

    /// Play a bot battle with a scripted player
    Simulate {
        /// Question bank (.json or packed)
        #[arg(long)]
        bank: PathBuf,

        #[arg(long)]
        category: String,

        /// easy | medium | hard
        #[arg(long, default_value = "medium")]
        difficulty: battle_core::Difficulty,

        #[arg(long, default_value_t = battle_core::config::DEFAULT_QUESTIONS_PER_BATTLE)]
        questions: usize,

        /// Seconds per question
        #[arg(long, default_value_t = battle_core::config::DEFAULT_TIME_PER_QUESTION)]
        time: u32,

        /// Scripted player's chance of a correct answer
        #[arg(long, default_value_t = 0.7)]
        accuracy: f64,

        /// Override the bot's base accuracy
        #[arg(long)]
        bot_accuracy: Option<f64>,

        #[arg(long)]
        seed: Option<u64>,

        /// Milliseconds per simulated second
        #[arg(long, default_value_t = 50)]
        tick_ms: u64,

        /// Current win streak going into the battle
        #[arg(long, default_value_t = 0)]
        streak: u32,

        /// Best win streak so far
        #[arg(long = "best", default_value_t = 0)]
        best_streak: u32,

        /// Append the result to this JSON-lines file
        #[arg(long)]
        record: Option<PathBuf>,
    },

    /// Preview rewards for a hypothetical result
    Rewards {
        #[arg(long)]
        player: u32,

        #[arg(long)]
        opponent: u32,

        #[arg(long, default_value_t = battle_core::config::DEFAULT_QUESTIONS_PER_BATTLE)]
        questions: usize,

        #[arg(long, default_value_t = 0)]
        streak: u32,

        #[arg(long = "best", default_value_t = 0)]
        best_streak: u32,

        /// Total seconds the player spent answering
        #[arg(long, default_value_t = 0)]
        seconds: u32,

        /// Per-question time limit in seconds
        #[arg(long, default_value_t = battle_core::config::DEFAULT_TIME_PER_QUESTION)]
        limit: u32,
    },
}

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> Result<()> {
    use battle_core::{EngineSettings, Score, StreakState};
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Pack { r#in, out, metadata } => {
            println!("Packing question bank...");
            println!("   Input:  {}", r#in.display());
            println!("   Output: {}", out.display());

            let meta = battle_cli::pack_bank(&r#in, &out)?;
            print_metadata(&meta);

            verify_bank_integrity(&out, &meta.checksum)?;

            if let Some(metadata_path) = metadata {
                battle_cli::save_metadata(&metadata_path, &meta)?;
                println!("\nMetadata saved to: {}", metadata_path.display());
            }
        }

        Commands::Simulate {
            bank,
            category,
            difficulty,
            questions,
            time,
            accuracy,
            bot_accuracy,
            seed,
            tick_ms,
            streak,
            best_streak,
            record,
        } => {
            let options = battle_cli::SimulationOptions {
                bank,
                category,
                difficulty,
                questions,
                time_per_question: time,
                accuracy,
                bot_accuracy,
                seed,
                tick: std::time::Duration::from_millis(tick_ms.max(1)),
                streak: StreakState::new(streak, best_streak),
                record,
            };

            let snapshot = battle_cli::simulate(&options).await?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
            if let Some(error) = &snapshot.error {
                anyhow::bail!("Battle ended in error: {} ({})", error.message, error.code);
            }
        }

        Commands::Rewards { player, opponent, questions, streak, best_streak, seconds, limit } => {
            let settings = EngineSettings::from_env()?;
            let query = battle_cli::RewardQuery {
                score: Score::new(player, opponent),
                questions,
                streak: StreakState::new(streak, best_streak),
                total_secs: seconds,
                per_question_limit: limit,
            };
            let rewards = battle_cli::preview_rewards(&settings, &query);
            println!("{}", serde_json::to_string_pretty(&rewards)?);
        }
    }

    Ok(())
}

#[cfg(feature = "cli")]
fn print_metadata(meta: &battle_cli::BankMetadata) {
    println!("\nBank packed successfully!");
    println!("   Questions:   {}", meta.question_count);
    println!("   Categories:  {}", meta.categories.join(", "));
    println!(
        "   Original:    {} bytes ({:.2} KB)",
        meta.original_size,
        meta.original_size as f64 / 1024.0
    );
    println!(
        "   Packed:      {} bytes ({:.2} KB)",
        meta.packed_size,
        meta.packed_size as f64 / 1024.0
    );
    println!("   Compression: {:.1}%", meta.compression_ratio * 100.0);
    println!("   Checksum:    {}", meta.checksum);
    println!("   Created:     {}", meta.created_at);
}

#[cfg(feature = "cli")]
fn verify_bank_integrity(bank_path: &Path, checksum: &str) -> Result<()> {
    println!("\nVerifying bank integrity...");
    if battle_cli::verify_bank(bank_path, checksum)? {
        println!("Bank verification passed");
        Ok(())
    } else {
        anyhow::bail!("Bank verification failed - checksum mismatch!")
    }
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("battle CLI is not available. Enable the 'cli' feature to use it.");
    std::process::exit(1);
}
