use rand::{Rng, seq::SliceRandom};

use crate::error::ProtocolError;

/// Outcome for one submitted letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LetterMatch {
    /// Submitted letter.
    pub letter: char,
    /// True iff the target holds the same letter at the same position.
    pub is_matched: bool,
}

/// Result of checking a submission against its target word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    /// One entry per submitted letter.
    pub letters: Vec<LetterMatch>,
    /// Every position matched and the lengths are equal.
    pub is_correct: bool,
}

/// Compare `submitted` against `target` position by position.
///
/// Duplicate letters are not reconciled: each position is judged on its own.
/// Submissions longer than the target are rejected instead of truncated.
pub fn verify(target: &[char], submitted: &[char]) -> Result<Verification, ProtocolError> {
    if submitted.len() > target.len() {
        return Err(ProtocolError::SubmissionTooLong {
            expected: target.len(),
            submitted: submitted.len(),
        });
    }

    let letters = submitted
        .iter()
        .zip(target)
        .map(|(&letter, &expected)| LetterMatch {
            letter,
            is_matched: letter == expected,
        })
        .collect::<Vec<_>>();

    let is_correct =
        submitted.len() == target.len() && letters.iter().all(|letter| letter.is_matched);

    Ok(Verification {
        letters,
        is_correct,
    })
}

/// Permute the letters of `word`.
///
/// The result differs from the original ordering whenever another arrangement
/// exists; words made of a single repeated letter come back unchanged.
pub fn scramble<R: Rng + ?Sized>(word: &str, rng: &mut R) -> Vec<char> {
    let original: Vec<char> = word.chars().collect();
    let mut letters = original.clone();
    letters.shuffle(rng);

    // A one-step rotation only reproduces the input when every letter is the same.
    if letters.len() > 1 && letters == original {
        letters.rotate_left(1);
    }

    letters
}
