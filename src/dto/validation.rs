//! Validation helpers for DTOs.

use validator::ValidationError;

/// Longest player name accepted, counted in characters after trimming.
pub const MAX_PLAYER_NAME_CHARS: usize = 24;

/// Validates that a player name is non-blank, short enough and free of control characters.
///
/// # Examples
///
/// ```ignore
/// validate_player_name("Quizzy McQuizface") // Ok
/// validate_player_name("   ")               // Err - blank
/// validate_player_name("tab\there")         // Err - control character
/// ```
pub fn validate_player_name(name: &str) -> Result<(), ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        let mut err = ValidationError::new("player_name_blank");
        err.message = Some("Player name must not be blank".into());
        return Err(err);
    }

    let length = trimmed.chars().count();
    if length > MAX_PLAYER_NAME_CHARS {
        let mut err = ValidationError::new("player_name_length");
        err.message = Some(
            format!("Player name must be at most {MAX_PLAYER_NAME_CHARS} characters (got {length})")
                .into(),
        );
        return Err(err);
    }

    if name.chars().any(char::is_control) {
        let mut err = ValidationError::new("player_name_format");
        err.message = Some("Player name must not contain control characters".into());
        return Err(err);
    }

    Ok(())
}
