//! Game ratings conversion
//!
//! The game ratings optional header holds one byte per rating board. Each
//! byte is an index into a per-board table of minimum ages; unknown
//! indexes and boards without a table are dropped.

use crate::fields::{AGE_RATINGS_COUNT, AgeRatings, age_rating};

/// Rating bytes actually used in the 64-byte optional header
pub const RATING_BOARDS: usize = 14;

// Rating board order in the optional header
const BOARD_SLOT: [Option<usize>; RATING_BOARDS] = [
    Some(age_rating::USA),         // ESRB
    Some(age_rating::EUROPE),      // PEGI
    Some(age_rating::FINLAND),     // PEGI-FI
    Some(age_rating::PORTUGAL),    // PEGI-PT
    Some(age_rating::ENGLAND),     // BBFC
    Some(age_rating::JAPAN),       // CERO
    Some(age_rating::GERMANY),     // USK
    Some(age_rating::AUSTRALIA),   // OFLC (AU)
    None,                          // OFLC (NZ)
    Some(age_rating::SOUTH_KOREA), // KMRB
    None,                          // Brazil
    None,                          // FPB
    Some(age_rating::TAIWAN),
    None, // Singapore
];

const X: i8 = -1;

const BOARD_AGES: [[i8; 16]; RATING_BOARDS] = [
    [3, 6, 6, 10, 10, 13, 13, 17, 17, 18, 18, 18, 18, 18, 18, X],
    [3, 4, 4, 4, 4, 12, 12, 12, 12, 12, 16, 16, 16, 16, 18, X],
    [3, 7, 7, 7, 7, 11, 11, 11, 11, 15, 15, 15, 15, 18, 18, X],
    [4, 4, 6, 6, 12, 12, 12, 12, 12, 12, 16, 16, 16, 16, 18, X],
    [3, 3, 7, 7, 7, 7, 12, 12, 12, 12, 15, 15, 15, 16, 18, X],
    [0, 12, 12, 15, 15, 17, 17, 18, 18, X, X, X, X, X, X, X],
    [0, 6, 6, 12, 12, 16, 16, 18, 18, X, X, X, X, X, X, X],
    [0, 7, 7, 14, 14, 15, 15, X, X, X, X, X, X, X, X, X],
    [X; 16],
    [0, 12, 12, 15, 15, 18, 18, X, X, X, X, X, X, X, X, X],
    [X; 16],
    [X; 16],
    [X; 16],
    [X; 16],
];

/// Convert raw rating bytes to normalized age ratings
pub fn convert_game_ratings(ratings: &[u8; RATING_BOARDS]) -> AgeRatings {
    let mut out = [0u16; AGE_RATINGS_COUNT];
    for (board, &value) in ratings.iter().enumerate() {
        let Some(slot) = BOARD_SLOT[board] else {
            continue;
        };
        let Some(&age) = BOARD_AGES[board].get(usize::from(value)) else {
            continue;
        };
        if age < 0 {
            continue;
        }
        out[slot] = age as u16 | age_rating::ACTIVE;
    }
    out
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_convert() {
        let mut raw = [0xFFu8; RATING_BOARDS];
        raw[0] = 5; // ESRB T
        raw[1] = 14; // PEGI 18
        raw[5] = 2; // CERO B
        raw[8] = 0; // NZ is unsupported
        raw[12] = 0; // Taiwan table is empty
        let out = convert_game_ratings(&raw);
        assert_eq!(out[age_rating::USA], 13 | age_rating::ACTIVE);
        assert_eq!(out[age_rating::EUROPE], 18 | age_rating::ACTIVE);
        assert_eq!(out[age_rating::JAPAN], 12 | age_rating::ACTIVE);
        assert_eq!(out[age_rating::TAIWAN], 0);
        assert_eq!(out[age_rating::GERMANY], 0);
    }

    #[test]
    fn test_invalid_values_dropped() {
        let mut raw = [0u8; RATING_BOARDS];
        raw[0] = 15;
        raw[6] = 16;
        let out = convert_game_ratings(&raw);
        assert_eq!(out[age_rating::USA], 0);
        assert_eq!(out[age_rating::GERMANY], 0);
        assert_eq!(out[age_rating::FINLAND], 3 | age_rating::ACTIVE);
    }
}
