//! Text sanitation shared by the extractor and the repair passes
//!
//! The supplier embeds store hours, contact blocks and "find similar"
//! widgets inside description containers; these helpers strip that noise,
//! normalize whitespace and casing, clamp sentence counts and parse prices
//! out of currency text. Every function here is idempotent: applying it
//! twice gives the same result as applying it once.

use once_cell::sync::Lazy;
use regex::Regex;

/// Marketplace boilerplate that must never survive into a description or a
/// spec value. Patterns with a trailing `.*` cut everything from the marker
/// onwards, since those blocks run to the end of their container.
static DROP_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)Найти\s+похож[иы]е",
        r"(?is)Сообщить\s+о\s+неточности.*",
        r"(?is)Магазин\s+и\s+адрес.*",
        r"(?is)Режим\s+работы.*",
        r"(?is)Телефон.*",
        r"(?is)Доступность.*",
        r"(?is)Склад.*",
        r"(?is)Комплекс-?Бар.*",
        r"(?is)Под\s+заказ.*",
        r"(?is)По\s+вашему\s+запросу.*",
        r"(?is)Двигайте\s+карту.*",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("noise pattern"))
    .collect()
});

static ABBREV_SVCH: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bсвч\b").expect("свч"));
static ABBREV_PMM: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bпмм\b").expect("пмм"));
static DIGIT_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("digits"));

/// Collapse every whitespace run (including NBSP) into a single space and
/// trim the ends.
pub fn collapse_ws(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = true; // leading whitespace is dropped
    for c in text.chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push(' ');
                in_space = true;
            }
        } else {
            out.push(c);
            in_space = false;
        }
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}

/// Convert ALL-CAPS source strings to title case, preserving the household
/// appliance abbreviations (СВЧ, ПММ) the spec tables use. Mixed-case input
/// passes through unchanged.
pub fn normalize_case(text: &str) -> String {
    let t = collapse_ws(text);
    if t.is_empty() {
        return t;
    }
    let has_letters = t.chars().any(|c| c.is_alphabetic());
    let is_all_caps = has_letters && t == t.to_uppercase();
    if !is_all_caps {
        return t;
    }

    let lowered = t.to_lowercase();
    let titled = lowered
        .split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ");

    let titled = ABBREV_SVCH.replace_all(&titled, "СВЧ");
    ABBREV_PMM.replace_all(&titled, "ПММ").into_owned()
}

/// Full sanitation: drop boilerplate, collapse whitespace, normalize case.
pub fn sanitize_text(text: &str) -> String {
    let mut t = collapse_ws(text);
    for pattern in DROP_PATTERNS.iter() {
        if pattern.is_match(&t) {
            t = pattern.replace_all(&t, "").into_owned();
        }
    }
    normalize_case(&collapse_ws(&t))
}

/// Keep at most `max` sentences. A sentence ends at `.`, `!` or `?`
/// followed by whitespace, so decimal numbers and dimensions survive.
pub fn clamp_sentences(text: &str, max: usize) -> String {
    let collapsed = collapse_ws(text);
    let mut sentences: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut chars = collapsed.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') {
            let at_boundary = chars.peek().map(|n| n.is_whitespace()).unwrap_or(true);
            if at_boundary {
                let sentence = current.trim().to_string();
                if !sentence.is_empty() {
                    sentences.push(sentence);
                }
                current.clear();
                while chars.peek().map(|n| n.is_whitespace()).unwrap_or(false) {
                    chars.next();
                }
                if sentences.len() == max {
                    return sentences.join(" ");
                }
            }
        }
    }

    let tail = current.trim();
    if !tail.is_empty() && sentences.len() < max {
        sentences.push(tail.to_string());
    }
    sentences.truncate(max);
    sentences.join(" ")
}

/// Extract a price amount from noisy currency text. `"12 500 ₸"` parses to
/// `12500`; text without a positive digit run ("Цена по запросу") yields
/// `None`; unknown is never coerced to zero.
pub fn parse_price(text: &str) -> Option<u64> {
    let squeezed: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    DIGIT_RUN
        .find(&squeezed)
        .and_then(|m| m.as_str().parse::<u64>().ok())
        .filter(|amount| *amount > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapse_ws_handles_nbsp_and_runs() {
        assert_eq!(collapse_ws("a\u{a0}\u{a0}b   c\n\td"), "a b c d");
        assert_eq!(collapse_ws("   "), "");
    }

    #[test]
    fn price_parses_grouped_digits() {
        assert_eq!(parse_price("12 500 ₸"), Some(12500));
        assert_eq!(parse_price("1\u{a0}990 тг."), Some(1990));
        assert_eq!(parse_price("Цена по запросу"), None);
        assert_eq!(parse_price(""), None);
        assert_eq!(parse_price("0 ₸"), None);
    }

    #[test]
    fn sanitize_strips_marketplace_noise() {
        let input = "Тарелка фарфоровая. Найти похожие Режим работы: пн-пт 9-18";
        let out = sanitize_text(input);
        assert!(out.starts_with("Тарелка фарфоровая."));
        assert!(!out.contains("Найти"));
        assert!(!out.contains("Режим работы"));
    }

    #[test]
    fn sanitize_is_idempotent() {
        let inputs = [
            "ТАРЕЛКА ДЛЯ СВЧ И ПММ",
            "Бокал  с   пробелами. Телефон +7 777",
            "Обычный текст без шума.",
            "",
        ];
        for input in inputs {
            let once = sanitize_text(input);
            assert_eq!(sanitize_text(&once), once, "not idempotent for {input:?}");
        }
    }

    #[test]
    fn normalize_case_preserves_abbreviations() {
        assert_eq!(normalize_case("ПОДХОДИТ ДЛЯ СВЧ"), "Подходит Для СВЧ");
        assert_eq!(normalize_case("Уже нормальный текст"), "Уже нормальный текст");
    }

    #[test]
    fn clamp_keeps_decimal_points_intact() {
        let text = "Объём 0.5 л. Высота 7.5 см. Третье предложение! Четвёртое? Пятое.";
        let clamped = clamp_sentences(text, 4);
        assert_eq!(
            clamped,
            "Объём 0.5 л. Высота 7.5 см. Третье предложение! Четвёртое?"
        );
    }

    #[test]
    fn clamp_is_idempotent() {
        let text = "Раз. Два. Три. Четыре. Пять.";
        let once = clamp_sentences(text, 4);
        assert_eq!(clamp_sentences(&once, 4), once);
    }
}
