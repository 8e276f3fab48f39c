use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

const MAX_TOKEN_CHARS: usize = 32;

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[\[([^\[\]\n]{1,32})\]\]\s*").expect("tag pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Happy,
    Sad,
    Angry,
    Surprised,
    #[default]
    Neutral,
}

impl Emotion {
    /// Decodes a tag token. Unknown tokens are neutral.
    pub fn from_token(token: &str) -> Self {
        match fold_token(token).as_str() {
            "VUI" => Emotion::Happy,
            "BUON" => Emotion::Sad,
            "GIAN" => Emotion::Angry,
            "NGAC_NHIEN" => Emotion::Surprised,
            _ => Emotion::Neutral,
        }
    }

    #[cfg(test)]
    pub fn as_str(&self) -> &'static str {
        match self {
            Emotion::Happy => "happy",
            Emotion::Sad => "sad",
            Emotion::Angry => "angry",
            Emotion::Surprised => "surprised",
            Emotion::Neutral => "neutral",
        }
    }
}

impl std::str::FromStr for Emotion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "happy" => Ok(Emotion::Happy),
            "sad" => Ok(Emotion::Sad),
            "angry" => Ok(Emotion::Angry),
            "surprised" => Ok(Emotion::Surprised),
            "neutral" => Ok(Emotion::Neutral),
            other => Err(format!("unknown emotion: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReply {
    pub emotion: Option<Emotion>,
    pub clean_text: String,
}

/// Splits a leading `[[TOKEN]]` tag off accumulated response text.
///
/// Re-scans from the start on every call, so it can be fed a growing
/// prefix of the same response. Committing only the first detected
/// emotion is the caller's job.
pub fn parse_emotion_tag(text: &str) -> ParsedReply {
    match TAG_RE.captures(text) {
        Some(caps) => {
            let whole = caps.get(0).map(|m| m.end()).unwrap_or(0);
            let token = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            ParsedReply {
                emotion: Some(Emotion::from_token(token)),
                clean_text: text[whole..].to_string(),
            }
        }
        None => ParsedReply { emotion: None, clean_text: text.to_string() },
    }
}

/// True when `text` is an unfinished tag such as `[`, `[[VU` or `[[VUI]`.
pub fn is_partial_tag(text: &str) -> bool {
    let Some(rest) = text.strip_prefix('[') else { return false };
    if rest.is_empty() {
        return true;
    }
    let Some(inner) = rest.strip_prefix('[') else { return false };
    let valid_token = |t: &str| t.chars().count() <= MAX_TOKEN_CHARS && !t.contains(['[', '\n']);
    match inner.find(']') {
        None => valid_token(inner),
        Some(i) => {
            let token = &inner[..i];
            !token.is_empty() && valid_token(token) && &inner[i..] == "]"
        }
    }
}

// Models sometimes answer with the accented spelling used in the persona
// prompt (`BUỒN`, `GIẬN`); fold those to the ASCII tokens.
fn fold_token(token: &str) -> String {
    token
        .trim()
        .chars()
        .flat_map(char::to_uppercase)
        .map(|c| match c {
            'À' | 'Á' | 'Ả' | 'Ã' | 'Ạ' | 'Ă' | 'Ằ' | 'Ắ' | 'Ẳ' | 'Ẵ' | 'Ặ' | 'Â' | 'Ầ' | 'Ấ'
            | 'Ẩ' | 'Ẫ' | 'Ậ' => 'A',
            'È' | 'É' | 'Ẻ' | 'Ẽ' | 'Ẹ' | 'Ê' | 'Ề' | 'Ế' | 'Ể' | 'Ễ' | 'Ệ' => 'E',
            'Ì' | 'Í' | 'Ỉ' | 'Ĩ' | 'Ị' => 'I',
            'Ò' | 'Ó' | 'Ỏ' | 'Õ' | 'Ọ' | 'Ô' | 'Ồ' | 'Ố' | 'Ổ' | 'Ỗ' | 'Ộ' | 'Ơ' | 'Ờ' | 'Ớ'
            | 'Ở' | 'Ỡ' | 'Ợ' => 'O',
            'Ù' | 'Ú' | 'Ủ' | 'Ũ' | 'Ụ' | 'Ư' | 'Ừ' | 'Ứ' | 'Ử' | 'Ữ' | 'Ự' => 'U',
            'Ỳ' | 'Ý' | 'Ỷ' | 'Ỹ' | 'Ỵ' => 'Y',
            'Đ' => 'D',
            ' ' | '-' => '_',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognized_tokens_decode_and_strip() {
        let cases = [
            ("VUI", Emotion::Happy),
            ("BUON", Emotion::Sad),
            ("GIAN", Emotion::Angry),
            ("NGAC_NHIEN", Emotion::Surprised),
            ("BINH_THUONG", Emotion::Neutral),
        ];
        for (token, expected) in cases {
            let parsed = parse_emotion_tag(&format!("[[{token}]] rest"));
            assert_eq!(parsed.emotion, Some(expected), "token {token}");
            assert_eq!(parsed.clean_text, "rest");
        }
    }

    #[test]
    fn tokens_are_case_insensitive_and_accent_folded() {
        assert_eq!(parse_emotion_tag("[[vui]] hi").emotion, Some(Emotion::Happy));
        assert_eq!(parse_emotion_tag("[[BUỒN]] haizz").emotion, Some(Emotion::Sad));
        assert_eq!(parse_emotion_tag("[[GIẬN]] hỗn xược").emotion, Some(Emotion::Angry));
        assert_eq!(parse_emotion_tag("[[ngạc nhiên]] ồ").emotion, Some(Emotion::Surprised));
    }

    #[test]
    fn text_without_tag_is_returned_unchanged() {
        let text = "Chào tiểu hữu [[VUI]]";
        let parsed = parse_emotion_tag(text);
        assert_eq!(parsed.emotion, None);
        assert_eq!(parsed.clean_text, text);
        assert_eq!(parse_emotion_tag("").clean_text, "");
    }

    #[test]
    fn unknown_token_is_stripped_as_neutral() {
        let parsed = parse_emotion_tag("[[MET]]   Hộc hộc...");
        assert_eq!(parsed.emotion, Some(Emotion::Neutral));
        assert_eq!(parsed.clean_text, "Hộc hộc...");
    }

    #[test]
    fn parsing_is_idempotent() {
        let text = "[[NGAC_NHIEN]]\nLạ thay!";
        assert_eq!(parse_emotion_tag(text), parse_emotion_tag(text));
        assert_eq!(parse_emotion_tag(text).clean_text, "Lạ thay!");
    }

    #[test]
    fn growing_prefix_finds_tag_once_complete() {
        let full = "[[VUI]] Chào";
        let mut seen = Vec::new();
        for end in 1..=full.len() {
            if full.is_char_boundary(end) {
                seen.push(parse_emotion_tag(&full[..end]).emotion);
            }
        }
        assert!(seen[..6].iter().all(Option::is_none));
        assert!(seen[6..].iter().all(|e| *e == Some(Emotion::Happy)));
    }

    #[test]
    fn partial_tags_are_detected() {
        for text in ["[", "[[", "[[VU", "[[VUI]"] {
            assert!(is_partial_tag(text), "{text}");
        }
        for text in ["", "Chào", "[x", "[[VUI]]", "[[VUI] x", "[[]"] {
            assert!(!is_partial_tag(text), "{text}");
        }
    }

    #[test]
    fn emotion_names_round_trip_through_from_str() {
        for e in [Emotion::Happy, Emotion::Sad, Emotion::Angry, Emotion::Surprised, Emotion::Neutral] {
            assert_eq!(e.as_str().parse::<Emotion>().unwrap(), e);
        }
        assert!("grumpy".parse::<Emotion>().is_err());
    }
}
