//! Opponent Resolver
//!
//! Supplies the opponent side of each round:
//! - [`BotSimulator`]: probability-driven answers, no network
//! - [`LiveLink`]: a human whose actions arrive over the realtime channel
//!
//! The resolver is built per session by the controller; nothing is shared
//! between sessions.

pub mod bot;
pub mod live;

pub use bot::{BotMove, BotSimulator};
pub use live::{EarlyAnswer, LiveLink, LiveSignal, Presence, RoundWindow};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::{BattleConfig, BotSettings};
use crate::session::SessionId;

/// Who the player is up against, fixed once matched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OpponentDescriptor {
    Bot { base_accuracy: f64, difficulty_multiplier: f64 },
    #[serde(rename_all = "camelCase")]
    Live { opponent_id: String, rating: u32 },
}

impl OpponentDescriptor {
    pub fn is_bot(&self) -> bool {
        matches!(self, Self::Bot { .. })
    }
}

/// Opponent side of one session
#[derive(Debug, Clone)]
pub enum OpponentResolver {
    Bot(BotSimulator),
    Live(LiveLink),
}

impl OpponentResolver {
    /// Build the resolver a battle config asks for
    pub fn for_config(
        config: &BattleConfig,
        bot_settings: &BotSettings,
        session_id: SessionId,
        reconnect_grace_secs: u32,
    ) -> Self {
        if config.is_bot {
            let seed = config.seed.unwrap_or_else(|| rand::thread_rng().gen());
            let bot = BotSimulator::new(
                bot_settings.base_accuracy,
                bot_settings.multiplier_for(config.difficulty),
                seed,
            )
            .with_think_window(bot_settings.think_min_fraction, bot_settings.think_max_fraction);
            Self::Bot(bot)
        } else {
            Self::Live(LiveLink::new(session_id, reconnect_grace_secs))
        }
    }

    pub fn is_bot(&self) -> bool {
        matches!(self, Self::Bot(_))
    }

    /// Bots are always ready; live opponents acknowledge over the channel.
    pub fn is_ready(&self) -> bool {
        match self {
            Self::Bot(_) => true,
            Self::Live(link) => link.is_ready(),
        }
    }

    /// Live opponents that are away forfeit every round they miss.
    pub fn is_present(&self) -> bool {
        match self {
            Self::Bot(_) => true,
            Self::Live(link) => link.is_connected(),
        }
    }

    /// Descriptor for a bot; live descriptors come from `match_found`.
    pub fn bot_descriptor(&self) -> Option<OpponentDescriptor> {
        match self {
            Self::Bot(bot) => Some(OpponentDescriptor::Bot {
                base_accuracy: bot.base_accuracy(),
                difficulty_multiplier: bot.difficulty_multiplier(),
            }),
            Self::Live(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Difficulty;

    #[test]
    fn test_bot_resolver_uses_difficulty_multiplier() {
        let config = BattleConfig::bot("torts", Difficulty::Hard).with_seed(1);
        let resolver =
            OpponentResolver::for_config(&config, &BotSettings::default(), SessionId::new(), 15);

        assert!(resolver.is_bot());
        assert!(resolver.is_ready());
        assert_eq!(
            resolver.bot_descriptor(),
            Some(OpponentDescriptor::Bot { base_accuracy: 0.6, difficulty_multiplier: 1.25 })
        );
    }

    #[test]
    fn test_live_resolver_waits_for_ready() {
        let config = BattleConfig::new("torts", Difficulty::Easy);
        let resolver =
            OpponentResolver::for_config(&config, &BotSettings::default(), SessionId::new(), 15);

        assert!(!resolver.is_bot());
        assert!(!resolver.is_ready());
        assert!(resolver.is_present());
        assert_eq!(resolver.bot_descriptor(), None);
    }

    #[test]
    fn test_descriptor_json_is_tagged() {
        let live = OpponentDescriptor::Live { opponent_id: "u-42".to_string(), rating: 1400 };
        let json = serde_json::to_value(&live).unwrap();
        assert_eq!(json["kind"], "live");
        assert_eq!(json["opponentId"], "u-42");
    }
}
