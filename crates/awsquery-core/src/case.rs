//! Case transformation for AWS identifiers.
//!
//! Action names arrive as kebab-case, snake_case, or CamelCase and must all
//! map to the same canonical form. The conversions are algorithmic and
//! acronym-preserving (`VPCId` -> `vpc_id`, `HTTPSListener` -> `https_listener`)
//! rather than dictionary-driven.

use std::sync::OnceLock;

use regex::Regex;

fn acronym_boundary() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([A-Z]+)([A-Z][a-z])").expect("static pattern compiles"))
}

fn camel_boundary() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([a-z0-9])([A-Z])").expect("static pattern compiles"))
}

/// Converts any supported format (PascalCase, camelCase, kebab-case) to snake_case.
pub fn to_snake_case(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    if text.contains('-') {
        return text.replace('-', "_").to_ascii_lowercase();
    }
    let split_acronyms = acronym_boundary().replace_all(text, "${1}_${2}");
    let split_camel = camel_boundary().replace_all(&split_acronyms, "${1}_${2}");
    split_camel.to_ascii_lowercase()
}

/// Converts snake_case or kebab-case to PascalCase; existing PascalCase input
/// passes through unchanged so canonical operation names survive a round trip.
pub fn to_pascal_case(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    if !text.contains('_') && !text.contains('-') && text.starts_with(|c: char| c.is_ascii_uppercase())
    {
        return text.to_string();
    }
    text.replace('-', "_")
        .split('_')
        .filter(|word| !word.is_empty())
        .map(capitalize)
        .collect()
}

/// Converts PascalCase to kebab-case for display.
pub fn to_kebab_case(text: &str) -> String {
    to_snake_case(text).replace('_', "-")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase(),
        None => String::new(),
    }
}

/// Returns the last non-numeric segment of a dotted path.
///
/// `Instances.0.NetworkInterfaces.0.SubnetId` simplifies to `SubnetId`,
/// `clusters.1` to `clusters`.
pub fn simplify_key(path: &str) -> &str {
    path.rsplit('.')
        .find(|segment| !segment.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or(path)
}

/// Reduces a plural resource word to its singular form.
pub fn singularize(word: &str) -> String {
    let lower = word.to_ascii_lowercase();
    if let Some(stem) = lower.strip_suffix("ies") {
        return format!("{stem}y");
    }
    for suffix in ["shes", "ches", "xes", "zes", "sses"] {
        if let Some(stem) = lower.strip_suffix(suffix) {
            return format!("{stem}{}", &suffix[..suffix.len() - 2]);
        }
    }
    if lower.ends_with("ss") {
        return lower;
    }
    lower.strip_suffix('s').map(str::to_string).unwrap_or(lower)
}

/// Strips shell-hazard characters and surrounding whitespace from a CLI token.
pub fn sanitize_token(raw: &str) -> String {
    raw.chars()
        .filter(|c| !matches!(c, '|' | ';' | '&' | '`' | '$' | '(' | ')' | '[' | ']' | '{' | '}'))
        .collect::<String>()
        .trim()
        .to_string()
}
