//! Translation direction from a CJK ideograph check.
//!
//! The relay and the popup both go through [`Direction::detect`], so the
//! trigger label can never announce one direction while the request asks for
//! the other. Kana and Hangul are not told apart from Chinese here; any text
//! with a CJK unified ideograph counts as Chinese.

use once_cell::sync::Lazy;
use regex::Regex;

static CJK_IDEOGRAPH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\u{4e00}-\u{9fa5}]").expect("valid CJK regex"));

pub fn contains_chinese(text: &str) -> bool {
    CJK_IDEOGRAPH.is_match(text)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Chinese source, English target.
    ToEnglish,
    /// Anything else, Chinese target.
    ToChinese,
}

impl Direction {
    pub fn detect(text: &str) -> Self {
        if contains_chinese(text) {
            Direction::ToEnglish
        } else {
            Direction::ToChinese
        }
    }

    pub fn target_language(self) -> &'static str {
        match self {
            Direction::ToEnglish => "English",
            Direction::ToChinese => "Simplified Chinese",
        }
    }

    pub fn system_prompt(self) -> String {
        let source = match self {
            Direction::ToEnglish => "Chinese",
            Direction::ToChinese => "the given",
        };
        format!(
            "You are a professional translator. Translate the user's {} text into {}. \
             Keep the meaning, tone and formatting. Respond ONLY with a JSON object of the form \
             {{\"translation\": \"<translated text>\"}} and nothing else.",
            source,
            self.target_language()
        )
    }

    pub fn trigger_label(self) -> &'static str {
        match self {
            Direction::ToEnglish => "译为英文",
            Direction::ToChinese => "译为中文",
        }
    }

    pub fn popup_title(self) -> &'static str {
        match self {
            Direction::ToEnglish => "中文 → English",
            Direction::ToChinese => "原文 → 中文",
        }
    }
}
