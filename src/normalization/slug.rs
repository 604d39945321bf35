/// Derive a URL-safe taxonomy slug from a display name.
///
/// Normalization steps:
/// - transliterate Latin letters and a few symbols to ASCII (`ą` to `a`, `&` to `and`,
///   `®` to `r`, `™` to `tm`)
/// - drop every character that is not an ASCII letter, digit or whitespace
///   (so `Co-op` and `Coop` both become `coop`)
/// - join the remaining words with `-` and lowercase
pub fn slugify(name: &str) -> String {
    let mut cleaned = String::with_capacity(name.len());
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() || ch.is_whitespace() {
            cleaned.push(ch);
        } else if let Some(folded) = transliterate(ch) {
            cleaned.push_str(folded);
        }
    }
    cleaned
        .split_whitespace()
        .map(str::to_ascii_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

/// Game records keep the storefront slug with underscores instead of hyphens.
pub fn game_slug(source_slug: &str) -> String {
    source_slug.trim().replace('-', "_")
}

/// ASCII spelling of a Latin-1 / Latin Extended-A letter or a named symbol. Output is only
/// letters, since anything else is stripped afterwards.
fn transliterate(ch: char) -> Option<&'static str> {
    let folded = match ch {
        'À' | 'Á' | 'Â' | 'Ã' | 'Ä' | 'Å' | 'Ā' | 'Ă' | 'Ą' => "A",
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => "a",
        'Æ' => "AE",
        'æ' => "ae",
        'Ç' | 'Ć' | 'Ĉ' | 'Ċ' | 'Č' => "C",
        'ç' | 'ć' | 'ĉ' | 'ċ' | 'č' => "c",
        'Ð' | 'Ď' => "D",
        'ð' | 'ď' => "d",
        'Đ' => "DJ",
        'đ' => "dj",
        'È' | 'É' | 'Ê' | 'Ë' | 'Ē' | 'Ĕ' | 'Ė' | 'Ę' | 'Ě' | 'Ə' => "E",
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ĕ' | 'ė' | 'ę' | 'ě' | 'ə' => "e",
        'ƒ' => "f",
        'Ĝ' | 'Ğ' | 'Ġ' | 'Ģ' => "G",
        'ĝ' | 'ğ' | 'ġ' | 'ģ' => "g",
        'Ĥ' | 'Ħ' => "H",
        'ĥ' | 'ħ' => "h",
        'Ì' | 'Í' | 'Î' | 'Ï' | 'Ĩ' | 'Ī' | 'Ĭ' | 'Į' | 'İ' => "I",
        'ì' | 'í' | 'î' | 'ï' | 'ĩ' | 'ī' | 'ĭ' | 'į' | 'ı' => "i",
        'Ĳ' => "IJ",
        'ĳ' => "ij",
        'Ĵ' => "J",
        'ĵ' => "j",
        'Ķ' => "K",
        'ķ' | 'ĸ' => "k",
        'Ĺ' | 'Ļ' | 'Ľ' | 'Ŀ' | 'Ł' => "L",
        'ĺ' | 'ļ' | 'ľ' | 'ŀ' | 'ł' => "l",
        'Ñ' | 'Ń' | 'Ņ' | 'Ň' | 'Ŋ' => "N",
        'ñ' | 'ń' | 'ņ' | 'ň' | 'ŉ' | 'ŋ' => "n",
        'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ö' | 'Ø' | 'Ō' | 'Ŏ' | 'Ő' | 'Ơ' => "O",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ŏ' | 'ő' | 'ơ' => "o",
        'Œ' => "OE",
        'œ' => "oe",
        'Ŕ' | 'Ŗ' | 'Ř' => "R",
        'ŕ' | 'ŗ' | 'ř' => "r",
        'Ś' | 'Ŝ' | 'Ş' | 'Š' | 'Ș' => "S",
        'ś' | 'ŝ' | 'ş' | 'š' | 'ș' | 'ſ' => "s",
        'ß' => "ss",
        'Ţ' | 'Ť' | 'Ŧ' | 'Ț' => "T",
        'ţ' | 'ť' | 'ŧ' | 'ț' => "t",
        'Þ' => "TH",
        'þ' => "th",
        'Ù' | 'Ú' | 'Û' | 'Ü' | 'Ũ' | 'Ū' | 'Ŭ' | 'Ů' | 'Ű' | 'Ų' | 'Ư' => "U",
        'ù' | 'ú' | 'û' | 'ü' | 'ũ' | 'ū' | 'ŭ' | 'ů' | 'ű' | 'ų' | 'ư' => "u",
        'Ŵ' => "W",
        'ŵ' => "w",
        'Ý' | 'Ÿ' | 'Ŷ' => "Y",
        'ý' | 'ÿ' | 'ŷ' => "y",
        'Ź' | 'Ż' | 'Ž' => "Z",
        'ź' | 'ż' | 'ž' => "z",
        '&' => "and",
        '©' => "c",
        '®' => "r",
        '™' => "tm",
        '$' => "dollar",
        '%' => "percent",
        '<' => "less",
        '>' => "greater",
        '|' => "or",
        '¢' => "cent",
        '£' => "pound",
        '¤' => "currency",
        '¥' => "yen",
        '€' => "euro",
        '∞' => "infinity",
        '♥' => "love",
        _ => return None,
    };
    Some(folded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn words_are_hyphen_joined_and_lowercased() {
        assert_eq!(slugify("CD PROJEKT RED"), "cd-projekt-red");
        assert_eq!(slugify("  Devolver   Digital, Inc. "), "devolver-digital-inc");
        assert_eq!(slugify("Windows"), "windows");
    }

    #[test]
    fn punctuation_inside_words_is_dropped() {
        assert_eq!(slugify("Co-op"), "coop");
        assert_eq!(slugify("Coop"), "coop");
        assert_eq!(slugify("Bits & Pieces"), "bits-and-pieces");
    }

    #[test]
    fn accents_are_folded() {
        assert_eq!(slugify("Pokémon Café"), "pokemon-cafe");
        assert_eq!(slugify("Straße"), "strasse");
    }

    #[test]
    fn latin_extended_letters_are_transliterated_not_dropped() {
        assert_eq!(slugify("Ząbek"), "zabek");
        assert_eq!(slugify("Şahin Ğüneş"), "sahin-gunes");
        assert_eq!(slugify("Ștefan Țara"), "stefan-tara");
        assert_eq!(slugify("Erdős Szűcs"), "erdos-szucs");
        assert_eq!(slugify("Ďábel Ťava"), "dabel-tava");
        assert_eq!(slugify("Işık"), "isik");
        assert_eq!(slugify("Þór Đorđe"), "thor-djordje");
    }

    #[test]
    fn named_symbols_are_spelled_out() {
        assert_eq!(slugify("Ubisoft®"), "ubisoftr");
        assert_eq!(slugify("Games™"), "gamestm");
        assert_eq!(slugify("© Acme"), "c-acme");
        assert_eq!(slugify("A&B"), "aandb");
        assert_eq!(slugify("100% Orange"), "100percent-orange");
    }

    #[test]
    fn slugs_are_deterministic_lowercase_and_whitespace_free() {
        for name in ["Action", "Role-playing", "Mac OS X", "Point & Click", "Ärger\tIm Büro"] {
            let a = slugify(name);
            let b = slugify(name);
            assert_eq!(a, b);
            assert_eq!(a, a.to_lowercase());
            assert!(!a.chars().any(char::is_whitespace), "{a:?}");
        }
    }

    #[test]
    fn game_slug_swaps_hyphens_for_underscores() {
        assert_eq!(game_slug("foo-bar"), "foo_bar");
        assert_eq!(game_slug("the-witcher-3-wild-hunt"), "the_witcher_3_wild_hunt");
    }
}
