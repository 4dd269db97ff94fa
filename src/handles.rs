//! Contact handle normalization.
//!
//! Source exports store the same person under inconsistently formatted
//! identifiers ("+1 (555) 123-4567", "5551234567", "Foo@Bar.com"). This
//! module canonicalizes a raw handle into a comparable form and expands it
//! into ordered lookup variants for fuzzy matching.

/// Canonicalize a raw handle value.
///
/// Emails (anything containing `@`) are lowercased. Phone-like values are
/// stripped to digits; an 11-digit value starting with `1` (US country code)
/// drops the leading digit. A trimmed value with no digits and no `@` is
/// returned as-is so lookups still have a key.
///
/// Returns `None` for `None` or whitespace-only input.
#[must_use]
pub fn normalize_handle(raw: Option<&str>) -> Option<String> {
    let trimmed = raw?.trim();
    if trimmed.is_empty() {
        return None;
    }

    if trimmed.contains('@') {
        return Some(trimmed.to_lowercase());
    }

    let digits: String = trimmed.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return Some(trimmed.to_string());
    }

    if digits.len() == 11 && digits.starts_with('1') {
        return Some(digits[1..].to_string());
    }

    Some(digits)
}

/// Expand a raw handle into ordered lookup variants.
///
/// The raw value always comes first and is preserved unchanged. Emails add
/// the lowercased form; phone-like values add the full digits-only form,
/// the last-10-digits form, and a `+1`-prefixed 10-digit form when the
/// value has at least ten digits. Duplicates are dropped, first occurrence
/// wins and order is preserved.
#[must_use]
pub fn normalize_handle_variants(raw: Option<&str>) -> Vec<String> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    let mut variants: Vec<String> = vec![trimmed.to_string()];
    let mut push_unique = |variants: &mut Vec<String>, value: String| {
        if !value.is_empty() && !variants.contains(&value) {
            variants.push(value);
        }
    };

    if trimmed.contains('@') {
        push_unique(&mut variants, trimmed.to_lowercase());
        return variants;
    }

    let digits: String = trimmed.chars().filter(char::is_ascii_digit).collect();
    push_unique(&mut variants, digits.clone());

    if digits.len() >= 10 {
        let last_ten = digits[digits.len() - 10..].to_string();
        push_unique(&mut variants, last_ten.clone());
        push_unique(&mut variants, format!("+1{last_ten}"));
    }

    variants
}
