//! Deterministic slug derivation from product titles
//!
//! Slugs are the primary dedup key and double as the on-disk image directory
//! name, so they must be lowercase, ASCII-safe and stable across runs.

/// Transliterate a single Cyrillic character into its ASCII form.
///
/// Returns `None` for characters that carry no sound on their own
/// (hard/soft signs), which are dropped entirely.
fn transliterate(c: char) -> Option<&'static str> {
    let mapped = match c {
        'а' => "a",
        'б' => "b",
        'в' => "v",
        'г' => "g",
        'д' => "d",
        'е' | 'ё' | 'э' => "e",
        'ж' => "zh",
        'з' => "z",
        'и' => "i",
        'й' => "y",
        'к' => "k",
        'л' => "l",
        'м' => "m",
        'н' => "n",
        'о' => "o",
        'п' => "p",
        'р' => "r",
        'с' => "s",
        'т' => "t",
        'у' => "u",
        'ф' => "f",
        'х' => "h",
        'ц' => "ts",
        'ч' => "ch",
        'ш' => "sh",
        'щ' => "shch",
        'ы' => "y",
        'ю' => "yu",
        'я' => "ya",
        'ъ' | 'ь' => return None,
        _ => return None,
    };
    Some(mapped)
}

/// Derive a URL-safe slug from a display title.
///
/// Lowercases, transliterates Cyrillic, keeps ASCII alphanumerics, folds
/// every other run of characters into a single hyphen and trims hyphens at
/// both ends. Pure function: equal inputs always produce equal slugs.
pub fn slugify(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut pending_hyphen = false;

    for c in title.chars().flat_map(|c| c.to_lowercase()) {
        let piece: Option<String> = if c.is_ascii_alphanumeric() {
            Some(c.to_string())
        } else if let Some(t) = transliterate(c) {
            Some(t.to_string())
        } else if c == 'ъ' || c == 'ь' {
            None
        } else {
            // separator run: emit at most one hyphen, and only between words
            if !out.is_empty() {
                pending_hyphen = true;
            }
            None
        };

        if let Some(piece) = piece {
            if pending_hyphen {
                out.push('-');
                pending_hyphen = false;
            }
            out.push_str(&piece);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_is_lowercase_ascii_hyphenated() {
        assert_eq!(slugify("Тарелка глубокая 25 см"), "tarelka-glubokaya-25-sm");
        assert_eq!(slugify("Бокал для вина"), "bokal-dlya-vina");
        assert_eq!(slugify("Plate  White"), "plate-white");
    }

    #[test]
    fn slugify_trims_and_collapses_hyphens() {
        assert_eq!(slugify("  Кружка -- 300 мл  "), "kruzhka-300-ml");
        assert_eq!(slugify("...точки..."), "tochki");
        assert!(!slugify("-- края --").starts_with('-'));
        assert!(!slugify("-- края --").ends_with('-'));
    }

    #[test]
    fn slugify_is_deterministic() {
        let title = "Салатник фарфоровый Ø 18 см";
        assert_eq!(slugify(title), slugify(title));
    }

    #[test]
    fn slugify_drops_signs_and_maps_digraphs() {
        assert_eq!(slugify("Щипцы"), "shchiptsy");
        assert_eq!(slugify("Объём"), "obem");
    }

    #[test]
    fn slugify_empty_and_symbol_only_inputs() {
        assert_eq!(slugify(""), "");
        assert_eq!(slugify("₸₸₸"), "");
    }
}
