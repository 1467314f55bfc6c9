//! Path and table naming helpers
//!
//! A model called `SecretWidget` is stored in, and served from,
//! `secret_widgets`. These helpers are pure string derivations.

use crate::core::model::Model;

/// Irregular nouns that the suffix rules below get wrong
const IRREGULAR: &[(&str, &str)] = &[
    ("person", "people"),
    ("child", "children"),
    ("man", "men"),
    ("woman", "women"),
    ("mouse", "mice"),
    ("datum", "data"),
];

/// Nouns whose plural is identical to the singular
const UNCOUNTABLE: &[&str] = &["equipment", "information", "series", "species", "sheep", "fish"];

/// Convert a CamelCase or mixedCase identifier to snake_case
///
/// Runs of capitals are treated as one word, so `HTTPServer` becomes
/// `http_server`.
///
/// ```
/// use grapi::core::naming::snake_case;
///
/// assert_eq!(snake_case("PrivateWidget"), "private_widget");
/// assert_eq!(snake_case("HTTPServer"), "http_server");
/// ```
pub fn snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let prev_lower = i > 0 && (chars[i - 1].is_lowercase() || chars[i - 1].is_ascii_digit());
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            let prev_upper = i > 0 && chars[i - 1].is_uppercase();
            if i > 0 && (prev_lower || (prev_upper && next_lower)) && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }

    out
}

/// Plural form of an English noun
///
/// Only the last word of a snake_case name is pluralized.
///
/// ```
/// use grapi::core::naming::pluralize;
///
/// assert_eq!(pluralize("company"), "companies");
/// assert_eq!(pluralize("user_type"), "user_types");
/// assert_eq!(pluralize("person"), "people");
/// ```
pub fn pluralize(word: &str) -> String {
    if word.is_empty() {
        return String::new();
    }

    let (head, last) = match word.rfind('_') {
        Some(idx) => word.split_at(idx + 1),
        None => ("", word),
    };

    format!("{}{}", head, pluralize_word(last))
}

fn pluralize_word(word: &str) -> String {
    if UNCOUNTABLE.contains(&word) {
        return word.to_string();
    }
    if let Some((_, plural)) = IRREGULAR.iter().find(|(singular, _)| *singular == word) {
        return plural.to_string();
    }

    let stem = |n: usize| &word[..word.len() - n];
    let before_last = word.chars().rev().nth(1);
    let is_vowel = |c: Option<char>| matches!(c, Some('a' | 'e' | 'i' | 'o' | 'u'));

    if word.ends_with('y') && word.len() > 1 && !is_vowel(before_last) {
        format!("{}ies", stem(1))
    } else if ["s", "sh", "ch", "x", "z"].iter().any(|s| word.ends_with(s)) {
        format!("{}es", word)
    } else if word.ends_with("fe") && word.len() > 2 {
        format!("{}ves", stem(2))
    } else if word.ends_with('f') && !word.ends_with("ff") && word.len() > 1 {
        format!("{}ves", stem(1))
    } else if word.ends_with('o') && word.len() > 1 && !is_vowel(before_last) {
        match word {
            "photo" | "piano" | "halo" | "memo" | "logo" => format!("{}s", word),
            _ => format!("{}es", word),
        }
    } else {
        format!("{}s", word)
    }
}

/// Table (and default path segment) for a model: plural snake_case of its name
pub fn table_name<T: Model>() -> String {
    pluralize(&snake_case(T::model_name()))
}

/// Normalize a URL prefix: empty means `/api`, one leading slash, no trailing slash
pub fn normalize_prefix(prefix: &str) -> String {
    if prefix.is_empty() {
        return "/api".to_string();
    }
    let trimmed = prefix.strip_suffix('/').unwrap_or(prefix);
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

/// Translate a route path into axum's template syntax
///
/// `:name` segments become `{name}`; `{name}` segments are kept. Returns the
/// reason as `Err` when a segment is empty, is a catch-all, holds a stray
/// brace or colon, or repeats a parameter name.
///
/// ```
/// use grapi::core::naming::route_template;
///
/// assert_eq!(
///     route_template("/api/dept/:dept_id/widgets/{id}").as_deref(),
///     Ok("/api/dept/{dept_id}/widgets/{id}")
/// );
/// assert!(route_template("/api/user/{id}/widgets/{id}").is_err());
/// ```
pub fn route_template(path: &str) -> Result<String, String> {
    let Some(rest) = path.strip_prefix('/') else {
        return Err("path must start with '/'".to_string());
    };

    let mut params: Vec<&str> = Vec::new();
    let mut out = String::with_capacity(path.len() + 4);
    for segment in rest.split('/') {
        let name = if let Some(name) = segment.strip_prefix(':') {
            Some(name)
        } else if let Some(inner) = segment.strip_prefix('{') {
            Some(inner.strip_suffix('}').unwrap_or("}"))
        } else {
            None
        };

        match name {
            Some(name) => {
                if !is_param_name(name) {
                    return Err(format!("invalid path parameter in segment '{}'", segment));
                }
                if params.contains(&name) {
                    return Err(format!("path parameter '{}' appears twice", name));
                }
                params.push(name);
                out.push_str("/{");
                out.push_str(name);
                out.push('}');
            }
            None if segment.is_empty() => return Err("empty path segment".to_string()),
            None if segment.contains(['{', '}', ':', '*']) => {
                return Err(format!("unsupported path segment '{}'", segment));
            }
            None => {
                out.push('/');
                out.push_str(segment);
            }
        }
    }
    Ok(out)
}

fn is_param_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Whether two route templates name different parameters at the first
/// position where they differ
///
/// The router cannot hold both `/api/user/{user_id}/widgets` and
/// `/api/user/{uid}/gadgets`.
pub fn params_clash(a: &str, b: &str) -> bool {
    let is_param = |segment: &str| segment.starts_with('{');
    for (x, y) in a.split('/').zip(b.split('/')) {
        if x != y {
            return is_param(x) && is_param(y);
        }
    }
    false
}
