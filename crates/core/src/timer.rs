use std::sync::OnceLock;

use regex::Regex;

use crate::types::TimerReading;

static PATTERN: OnceLock<Regex> = OnceLock::new();

fn pattern() -> &'static Regex {
    PATTERN.get_or_init(|| {
        // Searched, not anchored: OCR often adds junk around the countdown.
        Regex::new(r"([0-9]+)\s*分\s*([0-9]+)\s*秒").unwrap()
    })
}

/// Full-width digits come out of the recognizer for some fonts.
fn normalize(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '０'..='９' => char::from(b'0' + (c as u32 - '０' as u32) as u8),
            _ => c,
        })
        .collect()
}

/// Extract `<minutes> 分 <seconds> 秒` from recognized text.
pub fn parse(text: &str) -> Option<TimerReading> {
    let text = normalize(text);
    let caps = pattern().captures(&text)?;
    let minutes: u32 = caps[1].parse().ok()?;
    let seconds: u32 = caps[2].parse().ok()?;
    if seconds > 59 {
        return None;
    }
    Some(TimerReading { minutes, seconds })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain() {
        assert_eq!(parse("3 分 25 秒"), Some(TimerReading::new(3, 25)));
        assert_eq!(parse("0 分 1 秒"), Some(TimerReading::new(0, 1)));
        assert_eq!(parse("12分05秒"), Some(TimerReading::new(12, 5)));
    }

    #[test]
    fn test_garbage() {
        assert_eq!(parse("garbage"), None);
        assert_eq!(parse(""), None);
        assert_eq!(parse("3 分"), None);
        assert_eq!(parse("25 秒"), None);
        assert_eq!(parse("分 秒"), None);
    }

    #[test]
    fn test_noise_and_whitespace() {
        assert_eq!(parse("剩余 0分\t1 秒。"), Some(TimerReading::new(0, 1)));
        assert_eq!(parse("~|2 分  2秒]"), Some(TimerReading::new(2, 2)));
    }

    #[test]
    fn test_full_width_digits() {
        assert_eq!(parse("０分１秒"), Some(TimerReading::new(0, 1)));
    }

    #[test]
    fn test_out_of_range() {
        assert_eq!(parse("1 分 75 秒"), None);
        assert_eq!(parse("99999999999 分 1 秒"), None);
    }

    #[test]
    fn test_idempotent() {
        for text in ["3 分 25 秒", "garbage", "0分1秒", "x 1分 2"] {
            assert_eq!(parse(text), parse(text));
        }
    }
}
