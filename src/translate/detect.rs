//! Source language detection for `auto` source mode.

/// Detects the dominant language of `text` using whatlang.
/// Returns an ISO 639-1 code where one is mapped, otherwise whatlang's ISO 639-3 code.
/// None if detection is unreliable.
pub fn detect_language(text: &str) -> Option<String> {
    let info = whatlang::detect(text)?;
    if !info.is_reliable() {
        return None;
    }
    Some(lang_to_code(info.lang()).to_string())
}

fn lang_to_code(lang: whatlang::Lang) -> &'static str {
    use whatlang::Lang::*;
    match lang {
        Eng => "en",
        Cmn => "zh",
        Jpn => "ja",
        Kor => "ko",
        Fra => "fr",
        Deu => "de",
        Spa => "es",
        Rus => "ru",
        Por => "pt",
        Ita => "it",
        Ara => "ar",
        Hin => "hi",
        Tur => "tr",
        Vie => "vi",
        Tha => "th",
        Nld => "nl",
        Pol => "pl",
        Ukr => "uk",
        other => other.code(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_long_english_sentence() {
        let text = "The quick brown fox jumps over the lazy dog while the children watch from the window.";
        assert_eq!(detect_language(text).as_deref(), Some("en"));
    }

    #[test]
    fn unmapped_languages_keep_their_own_code() {
        assert_eq!(lang_to_code(whatlang::Lang::Epo), "epo");
        assert_eq!(lang_to_code(whatlang::Lang::Heb), "heb");
        assert_ne!(lang_to_code(whatlang::Lang::Epo), lang_to_code(whatlang::Lang::Heb));
        assert_eq!(lang_to_code(whatlang::Lang::Por), "pt");
    }

    #[test]
    fn empty_text_is_undetected() {
        assert!(detect_language("").is_none());
    }
}
