//! Unicode script detection shared by the Anchor Selector's cultural
//! filter (§4.7) and the language/script penalty it applies: a track
//! whose artist name is written in a non-Latin script, with no matching
//! region indicator in the prompt, has its score halved.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    Latin,
    Cjk,
    Arabic,
    Hebrew,
    Thai,
    Cyrillic,
}

impl Script {
    /// The region-indicator keywords that, if present in the mood prompt,
    /// count as the user acknowledging this script's region (spec §4.7:
    /// "no indicator of that region").
    pub fn region_keywords(self) -> &'static [&'static str] {
        match self {
            Script::Cjk => &["korean", "k-pop", "kpop", "japanese", "j-pop", "jpop", "chinese", "mandarin", "cantopop"],
            Script::Arabic => &["arabic", "arab", "khaleeji", "maghreb"],
            Script::Hebrew => &["hebrew", "israeli"],
            Script::Thai => &["thai", "thailand"],
            Script::Cyrillic => &["russian", "russia", "ukrainian", "slavic"],
            Script::Latin => &[],
        }
    }
}

/// Dominant non-Latin script detected in `text`, or `None` for Latin-only
/// (or script-free, e.g. purely numeric) text.
pub fn detect_script(text: &str) -> Option<Script> {
    for ch in text.chars() {
        let code = ch as u32;
        if (0x4E00..=0x9FFF).contains(&code)
            || (0x3040..=0x30FF).contains(&code)
            || (0xAC00..=0xD7A3).contains(&code)
        {
            return Some(Script::Cjk);
        }
        if (0x0600..=0x06FF).contains(&code) {
            return Some(Script::Arabic);
        }
        if (0x0590..=0x05FF).contains(&code) {
            return Some(Script::Hebrew);
        }
        if (0x0E00..=0x0E7F).contains(&code) {
            return Some(Script::Thai);
        }
        if (0x0400..=0x04FF).contains(&code) {
            return Some(Script::Cyrillic);
        }
    }
    None
}

/// `true` when `text` is in a non-Latin script with no matching region
/// indicator anywhere in `prompt` (case-insensitive) — the condition spec
/// §4.7 halves a genre anchor's score on.
pub fn needs_script_penalty(text: &str, prompt: &str) -> bool {
    let Some(script) = detect_script(text) else {
        return false;
    };
    let prompt_lower = prompt.to_lowercase();
    !script.region_keywords().iter().any(|keyword| prompt_lower.contains(keyword))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latin_text_detects_no_script() {
        assert_eq!(detect_script("Daft Punk"), None);
    }

    #[test]
    fn korean_text_detects_cjk() {
        assert_eq!(detect_script("블랙핑크"), Some(Script::Cjk));
    }

    #[test]
    fn penalty_applies_without_region_indicator() {
        assert!(needs_script_penalty("블랙핑크", "chill evening vibes"));
    }

    #[test]
    fn penalty_skipped_with_region_indicator() {
        assert!(!needs_script_penalty("블랙핑크", "I love k-pop tonight"));
    }
}
