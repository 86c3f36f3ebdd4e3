//! Validation helpers for DTOs.

use validator::ValidationError;

/// Validates that every submitted letter is exactly one character.
///
/// # Examples
///
/// ```ignore
/// validate_letters(&["A".into(), "B".into()]) // Ok
/// validate_letters(&["AB".into()])            // Err - two characters
/// validate_letters(&["".into()])              // Err - empty
/// ```
pub fn validate_letters(letters: &[String]) -> Result<(), ValidationError> {
    if let Some(position) = letters
        .iter()
        .position(|letter| letter.chars().count() != 1)
    {
        let mut err = ValidationError::new("letter_length");
        err.message = Some(
            format!("Letter at position {position} must be exactly one character").into(),
        );
        return Err(err);
    }

    Ok(())
}

/// Validates that an identifier carries no surrounding or embedded whitespace.
pub fn validate_identifier(id: &str) -> Result<(), ValidationError> {
    if id.chars().any(char::is_whitespace) {
        let mut err = ValidationError::new("identifier_format");
        err.message = Some("Identifier must not contain whitespace".into());
        return Err(err);
    }

    Ok(())
}
