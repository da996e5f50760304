//! Speech duration estimate from katakana readings.

/// Small kana that merge with the preceding mora.
const SMALL_KANA: &str = "ャュョァィゥェォ";

/// Morae assumed for a token the tokenizer could not read.
pub const UNKNOWN_WORD_MORAE: usize = 4;

/// Seconds of speech per mora.
pub const DEFAULT_SECONDS_PER_MORA: f64 = 0.14;

/// Count the morae in a phonetic reading. An empty reading counts as
/// [`UNKNOWN_WORD_MORAE`].
pub fn count_mora(reading: &str) -> usize {
    if reading.is_empty() {
        return UNKNOWN_WORD_MORAE;
    }
    reading.chars().filter(|c| !SMALL_KANA.contains(*c)).count()
}

/// Elapsed seconds for `morae` at `seconds_per_mora`.
pub fn mora_to_seconds(morae: usize, seconds_per_mora: f64) -> f64 {
    morae as f64 * seconds_per_mora
}
