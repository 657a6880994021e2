// ============================================================================
// Battle Status FSM
// ============================================================================
//
// Valid Transition Diagram:
// ```
// Idle → Searching → Matched → Ready → Active ⇄ RoundResolved → Completed
//                                                               ↓
//                                               Victory | Defeat | Draw
//
// Any non-terminal status → Error
// ```
//
// Invalid Examples:
// - Active → Completed (the last round must resolve first)
// - Victory → Active (terminal statuses never move)
// - Matched → Searching (no back-edges)

use super::BattleStatus;

/// Validator for session status transitions
pub struct StatusValidator;

impl StatusValidator {
    /// Validate a status transition according to FSM rules
    ///
    /// # Returns
    /// * `Ok(())` if transition is valid
    /// * `Err(String)` with error message if transition is invalid
    ///
    /// # Examples
    /// ```
    /// use battle_core::session::{BattleStatus, StatusValidator};
    ///
    /// assert!(StatusValidator::validate_transition(
    ///     BattleStatus::Searching,
    ///     BattleStatus::Matched
    /// ).is_ok());
    ///
    /// assert!(StatusValidator::validate_transition(
    ///     BattleStatus::Victory,
    ///     BattleStatus::Active
    /// ).is_err());
    /// ```
    pub fn validate_transition(from: BattleStatus, to: BattleStatus) -> Result<(), String> {
        use BattleStatus::*;

        let valid = match (from, to) {
            (Idle, Searching) => true,
            (Searching, Matched) => true,
            (Matched, Ready) => true,
            (Ready, Active) => true,
            (Active, RoundResolved) => true,
            (RoundResolved, Active) => true,
            (RoundResolved, Completed) => true,
            (Completed, Victory | Defeat | Draw) => true,

            // Faults are allowed from anywhere that is still live
            (from, Error) => !from.is_terminal(),

            _ => false,
        };

        if !valid {
            return Err(format!("Invalid status transition: {} → {}", from, to));
        }

        Ok(())
    }

    /// Whether `sequence` is a path the FSM could have produced
    pub fn is_valid_path(sequence: &[BattleStatus]) -> bool {
        sequence.windows(2).all(|w| Self::validate_transition(w[0], w[1]).is_ok())
    }
}

// ============================================================================
// Tests
// ============================================================================
