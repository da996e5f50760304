//! Small text helpers used when building reports, captions and speech input.

use regex::Regex;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Line and whitespace cleanup
// ---------------------------------------------------------------------------

pub fn remove_linebreaks(s: &str) -> String {
    s.replace('\n', " ")
}

static SPACES_RE: OnceLock<Regex> = OnceLock::new();

pub fn remove_successive_spaces(s: &str) -> String {
    let re = SPACES_RE.get_or_init(|| Regex::new(r"\s+").unwrap());
    re.replace_all(s, " ").into_owned()
}

static ANSI_RE: OnceLock<Regex> = OnceLock::new();

/// Strip ANSI colour sequences (`ESC [ ... m`).
pub fn remove_control_characters(s: &str) -> String {
    let re = ANSI_RE.get_or_init(|| Regex::new(r"\x1b\[[0-9;]*m").unwrap());
    re.replace_all(s, "").into_owned()
}

pub fn pick_first_row(s: &str) -> &str {
    s.split('\n').next().unwrap_or("")
}

/// Truncate to at most `max_chars` characters (not bytes).
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

// ---------------------------------------------------------------------------
// Emoji
// ---------------------------------------------------------------------------

static EMOJI_RE: OnceLock<Regex> = OnceLock::new();

/// Matches one emoji sequence: a regional-indicator flag, a keycap, or a
/// pictograph with its modifiers and ZWJ continuations. Pictographs that are
/// not emoji (`♪`) are left alone.
fn emoji_re() -> &'static Regex {
    EMOJI_RE.get_or_init(|| {
        Regex::new(concat!(
            r"[\x{1F1E6}-\x{1F1FF}]{2}",
            r"|[0-9#*]\x{FE0F}?\x{20E3}",
            r"|[\p{Emoji}&&\p{Extended_Pictographic}](?:\x{FE0F}|\p{Emoji_Modifier})*",
            r"(?:\x{200D}[\p{Emoji}&&\p{Extended_Pictographic}](?:\x{FE0F}|\p{Emoji_Modifier})*)*",
        ))
        .unwrap()
    })
}

pub fn remove_emojis(s: &str, replacement: &str) -> String {
    emoji_re().replace_all(s, replacement).into_owned()
}

pub fn extract_emojis(s: &str) -> Vec<&str> {
    emoji_re().find_iter(s).map(|m| m.as_str()).collect()
}

// ---------------------------------------------------------------------------
// Time expressions
// ---------------------------------------------------------------------------

/// Human-readable elapsed time: `45秒`, `2分`, `1時間1分`. Truncates, never rounds.
pub fn build_time_expression(secs: f64) -> String {
    let secs = if secs.is_finite() { secs.max(0.0) } else { 0.0 };
    if secs < 60.0 {
        format!("{}秒", secs as u64)
    } else if secs < 3600.0 {
        format!("{}分", (secs / 60.0) as u64)
    } else {
        let hours = (secs / 3600.0) as u64;
        let minutes = ((secs / 60.0) % 60.0) as u64;
        format!("{hours}時間{minutes}分")
    }
}

// ---------------------------------------------------------------------------
// Speech input
// ---------------------------------------------------------------------------

static JA_SPACE_RE: OnceLock<Regex> = OnceLock::new();

/// Prepare text for a TTS engine: no colour codes, no emoji, single spaces,
/// and a pause mark where a space follows Japanese text.
pub fn convert_text_for_speech(s: &str) -> String {
    let s = remove_control_characters(s);
    let s = remove_emojis(&s, " ");
    let s = remove_successive_spaces(&s);
    let re = JA_SPACE_RE.get_or_init(|| Regex::new(r"([ぁ-んァ-ン一-龥〜])\s").unwrap());
    re.replace_all(&s, "${1}、").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_expression_seconds() {
        assert_eq!(build_time_expression(45.0), "45秒");
        assert_eq!(build_time_expression(59.9), "59秒");
    }

    #[test]
    fn time_expression_minutes_truncate() {
        assert_eq!(build_time_expression(125.0), "2分");
        assert_eq!(build_time_expression(179.0), "2分");
    }

    #[test]
    fn time_expression_hours_and_minutes() {
        assert_eq!(build_time_expression(3700.0), "1時間1分");
        assert_eq!(build_time_expression(7199.0), "1時間59分");
    }

    #[test]
    fn time_expression_clamps_negative() {
        assert_eq!(build_time_expression(-3.0), "0秒");
    }

    #[test]
    fn linebreaks_become_spaces() {
        assert_eq!(remove_linebreaks("a\nb\nc"), "a b c");
    }

    #[test]
    fn truncation_counts_characters() {
        assert_eq!(truncate_chars("あいうえお", 3), "あいう");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }

    #[test]
    fn strips_ansi_colours() {
        assert_eq!(
            remove_control_characters("\x1b[32;1m> Final Answer\x1b[0m"),
            "> Final Answer"
        );
    }

    #[test]
    fn first_row_only() {
        assert_eq!(pick_first_row("one\ntwo"), "one");
        assert_eq!(pick_first_row(""), "");
    }

    #[test]
    fn emoji_removed_and_extracted() {
        let s = "やった😊ね👍🏽";
        assert_eq!(remove_emojis(s, ""), "やったね");
        assert_eq!(extract_emojis(s), vec!["😊", "👍🏽"]);
    }

    #[test]
    fn zwj_sequence_is_one_emoji() {
        assert_eq!(extract_emojis("👨\u{200D}👩\u{200D}👧").len(), 1);
    }

    #[test]
    fn plain_japanese_has_no_emoji() {
        assert!(extract_emojis("本を読んだ。ー♪").is_empty());
    }

    #[test]
    fn speech_text_gets_pause_marks() {
        assert_eq!(convert_text_for_speech("こんにちは  世界😊"), "こんにちは、世界、");
    }
}
