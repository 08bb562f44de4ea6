//! Per-field-class text formatting applied before values are written to the CRM.

/// Formatting class of a text field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldClass {
    /// Person names: title case with surname-prefix handling.
    Name,
    /// Phone numbers: `(AAA) BBB-CCCC` when 10 (or 1 + 10) digits.
    Phone,
    /// Lower-cased.
    Email,
    /// Relation-role labels: title case.
    Relation,
    /// Street lines: known abbreviations upper-cased, shouting words title-cased.
    Address,
    /// Codes such as state or street suffix: upper-cased.
    Upper,
    /// Everything else: title case only when the whole value is shouting.
    General,
}

/// Prefixes whose following letter is always capitalized ("mcdowell" → "McDowell").
const ALWAYS_CAMEL_PREFIXES: &[&str] = &["Mc", "O'"];

/// Prefixes whose following capital is kept only when the input already had it
/// ("DeAngelo" stays, "Dennis" is not turned into "DeNnis").
const PRESERVED_CAMEL_PREFIXES: &[&str] = &["Mac", "De", "Van", "Von", "La", "Le"];

const STREET_ABBREVIATIONS: &[&str] = &[
    "ST", "AVE", "RD", "DR", "LN", "CT", "PL", "WAY", "BLVD", "N", "S", "E", "W", "NE", "NW",
    "SE", "SW", "US", "RT", "HWY",
];

pub fn format_text(text: &str, class: FieldClass) -> String {
    if class == FieldClass::Phone {
        return format_phone(text);
    }

    let text = text.trim();
    match class {
        FieldClass::Name => title_case_name(text),
        FieldClass::Email => text.to_lowercase(),
        FieldClass::Relation => title_case(text),
        FieldClass::Address => title_case_address(text),
        FieldClass::Upper => text.to_uppercase(),
        FieldClass::General => {
            if is_shouting(text) && text.chars().count() > 2 {
                title_case(text)
            } else {
                text.to_string()
            }
        }
        FieldClass::Phone => unreachable!("handled above"),
    }
}

/// Word-initial letters upper-cased, all other letters lower-cased. A "word"
/// starts after any non-letter, so "o'connor" becomes "O'Connor".
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev_letter = false;
    for c in text.chars() {
        if c.is_alphabetic() {
            if prev_letter {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_letter = true;
        } else {
            out.push(c);
            prev_letter = false;
        }
    }
    out
}

pub fn title_case_name(name: &str) -> String {
    let raw = name.trim();
    let mut titled = title_case(raw);

    for prefix in ALWAYS_CAMEL_PREFIXES {
        if let Some(rest) = titled.strip_prefix(prefix) {
            titled = format!("{prefix}{}", capitalize_first(rest));
        }
    }

    let shouting = is_shouting(raw);
    for prefix in PRESERVED_CAMEL_PREFIXES {
        let Some(rest) = titled.strip_prefix(prefix) else {
            continue;
        };
        let raw_next = raw.chars().nth(prefix.chars().count());
        if !shouting && raw_next.is_some_and(char::is_uppercase) {
            titled = format!("{prefix}{}", capitalize_first(rest));
        }
    }

    titled
}

pub fn title_case_address(address: &str) -> String {
    address
        .split_whitespace()
        .map(|word| {
            let upper = word.to_uppercase();
            if STREET_ABBREVIATIONS.contains(&upper.as_str()) {
                upper
            } else if is_shouting(word) && word.chars().count() > 1 {
                title_case(word)
            } else {
                word.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Digits only; 10 digits (or 11 with a leading 1) become `(AAA) BBB-CCCC`.
/// Anything else is returned unchanged.
pub fn format_phone(phone: &str) -> String {
    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
    let ten = match digits.len() {
        10 => digits.as_str(),
        11 if digits.starts_with('1') => &digits[1..],
        _ => return phone.to_string(),
    };
    format!("({}) {}-{}", &ten[..3], &ten[3..6], &ten[6..])
}

/// At least one cased letter and no lower-case letters.
fn is_shouting(text: &str) -> bool {
    text.chars().any(char::is_uppercase) && !text.chars().any(char::is_lowercase)
}

fn capitalize_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_prefixes() {
        assert_eq!(title_case_name("mcdowell"), "McDowell");
        assert_eq!(title_case_name("MCDOWELL"), "McDowell");
        assert_eq!(title_case_name("o'connor"), "O'Connor");
        assert_eq!(title_case_name("DeAngelo"), "DeAngelo");
        assert_eq!(title_case_name("VanBuren"), "VanBuren");
        assert_eq!(title_case_name("dennis"), "Dennis");
        assert_eq!(title_case_name("LEONARD"), "Leonard");
        assert_eq!(title_case_name("vanessa"), "Vanessa");
        assert_eq!(title_case_name("  walter "), "Walter");
        assert_eq!(title_case_name("mary-kate"), "Mary-Kate");
    }

    #[test]
    fn phone_formats() {
        assert_eq!(format_phone("5551234567"), "(555) 123-4567");
        assert_eq!(format_phone("1-555-123-4567"), "(555) 123-4567");
        assert_eq!(format_phone("555.123.4567"), "(555) 123-4567");
        assert_eq!(format_phone("2-555-123-4567"), "2-555-123-4567");
        assert_eq!(format_phone("12345"), "12345");
    }

    #[test]
    fn general_only_fixes_shouting() {
        assert_eq!(format_text("ACME HOLDINGS", FieldClass::General), "Acme Holdings");
        assert_eq!(format_text("JR", FieldClass::General), "JR");
        assert_eq!(format_text("eBay Inc", FieldClass::General), "eBay Inc");
    }

    #[test]
    fn email_relation_upper() {
        assert_eq!(format_text(" John@Example.COM ", FieldClass::Email), "john@example.com");
        assert_eq!(format_text("likely SPOUSE", FieldClass::Relation), "Likely Spouse");
        assert_eq!(format_text("ga", FieldClass::Upper), "GA");
    }

    #[test]
    fn address_keeps_abbreviations() {
        assert_eq!(title_case_address("123 MAIN ST NW"), "123 Main ST NW");
        assert_eq!(title_case_address("45 Oak Hwy"), "45 Oak HWY");
        assert_eq!(title_case_address("9 PEACHTREE   WAY"), "9 Peachtree WAY");
    }
}
