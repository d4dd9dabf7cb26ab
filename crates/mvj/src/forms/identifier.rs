//! Slug identifiers for sections, fields, and field types.

/// Identifier length used for every slug column.
pub const IDENTIFIER_MAX_LENGTH: usize = 50;

/// Lowercase ASCII slug. Nordic letters are transliterated and every other run of
/// characters collapses into a single `-`.
pub fn slugify(source: &str) -> String {
    let mut slug = String::with_capacity(source.len());
    let mut pending_dash = false;
    for ch in source.chars().flat_map(char::to_lowercase) {
        let mapped = match ch {
            'ä' | 'å' | 'á' | 'à' | 'â' => Some('a'),
            'ö' | 'ó' | 'ò' | 'ô' | 'ø' => Some('o'),
            'é' | 'è' | 'ê' | 'ë' => Some('e'),
            'ü' | 'ú' | 'ù' => Some('u'),
            'í' | 'ì' | 'ï' => Some('i'),
            c if c.is_ascii_alphanumeric() => Some(c),
            _ => None,
        };
        match mapped {
            Some(c) => {
                if pending_dash && !slug.is_empty() {
                    slug.push('-');
                }
                pending_dash = false;
                slug.push(c);
            }
            None => pending_dash = true,
        }
    }
    slug
}

fn truncate(slug: &str, max_length: usize) -> &str {
    slug[..slug.len().min(max_length)].trim_end_matches('-')
}

/// Slug of `source` that `taken` does not report as used.
///
/// The slug is cut to `max_length`; collisions get `-1`, `-2`, ... appended, shortening the
/// base so the result stays within `max_length`.
pub fn generate_unique_identifier(
    source: &str,
    max_length: usize,
    taken: impl Fn(&str) -> bool,
) -> String {
    let slug = slugify(source);
    let base = truncate(&slug, max_length);
    if !base.is_empty() && !taken(base) {
        return base.to_string();
    }

    (1u32..)
        .map(|counter| {
            let suffix = format!("-{counter}");
            let head = truncate(base, max_length.saturating_sub(suffix.len()));
            if head.is_empty() {
                counter.to_string()
            } else {
                format!("{head}{suffix}")
            }
        })
        .find(|candidate| !taken(candidate))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn slugs_transliterate_and_collapse() {
        assert_eq!(slugify("Hakijan tiedot"), "hakijan-tiedot");
        assert_eq!(slugify("  Yrityksen  nimi / Företag "), "yrityksen-nimi-foretag");
        assert_eq!(slugify("Pääkäyttäjä"), "paakayttaja");
        assert_eq!(slugify("Åland!"), "aland");
    }

    #[test]
    fn collisions_get_numbered_suffixes() {
        let taken: HashSet<&str> = ["hakija", "hakija-1"].into_iter().collect();
        assert_eq!(
            generate_unique_identifier("Hakija", 50, |candidate| taken.contains(candidate)),
            "hakija-2"
        );
        assert_eq!(
            generate_unique_identifier("Osoite", 50, |candidate| taken.contains(candidate)),
            "osoite"
        );
    }

    #[test]
    fn suffixed_identifiers_respect_max_length() {
        let taken: HashSet<&str> = ["abcdefgh"].into_iter().collect();
        let identifier =
            generate_unique_identifier("abcdefghij", 8, |candidate| taken.contains(candidate));
        assert_eq!(identifier, "abcdef-1");
        assert!(identifier.len() <= 8);
    }

    #[test]
    fn empty_sources_fall_back_to_numbers() {
        assert_eq!(generate_unique_identifier("!!!", 50, |_| false), "1");
    }
}
