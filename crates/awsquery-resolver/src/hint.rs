//! Resolution hints: the `-i source:field:limit` triple.
//!
//! Each component is optional: `list-clus:cluster`, `:username`, `::5`,
//! `desc-load:arn:3`. The source narrows candidate listing operations by
//! substring, the field steers value harvesting, and the limit caps fan-out.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HintParseError {
    #[error("invalid hint limit '{raw}': expected a positive integer")]
    BadLimit { raw: String },
    #[error("hint '{raw}' has too many components: expected source:field:limit")]
    TooManyComponents { raw: String },
}

/// Parsed `-i` hint steering one parameter's resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionHint {
    pub source: Option<String>,
    pub field: Option<String>,
    pub limit: Option<usize>,
}

impl ResolutionHint {
    /// Parses `source:field:limit` with any component empty or absent.
    pub fn parse(raw: &str) -> Result<Self, HintParseError> {
        let components: Vec<&str> = raw.split(':').collect();
        if components.len() > 3 {
            return Err(HintParseError::TooManyComponents {
                raw: raw.to_string(),
            });
        }
        let component = |index: usize| {
            components
                .get(index)
                .map(|text| text.trim())
                .filter(|text| !text.is_empty())
                .map(|text| text.to_string())
        };
        let limit = match component(2) {
            None => None,
            Some(text) => Some(text.parse::<usize>().ok().filter(|&limit| limit > 0).ok_or(
                HintParseError::BadLimit {
                    raw: raw.to_string(),
                },
            )?),
        };
        Ok(Self {
            source: component(0),
            field: component(1),
            limit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_hint_parses_all_components() {
        let hint = ResolutionHint::parse("desc-load:arn:3").expect("parses");
        assert_eq!(hint.source.as_deref(), Some("desc-load"));
        assert_eq!(hint.field.as_deref(), Some("arn"));
        assert_eq!(hint.limit, Some(3));
    }

    #[test]
    fn each_component_may_be_omitted() {
        let source_only = ResolutionHint::parse("list-clus").expect("parses");
        assert_eq!(source_only.source.as_deref(), Some("list-clus"));
        assert_eq!(source_only.field, None);
        assert_eq!(source_only.limit, None);

        let field_only = ResolutionHint::parse(":username").expect("parses");
        assert_eq!(field_only.source, None);
        assert_eq!(field_only.field.as_deref(), Some("username"));

        let limit_only = ResolutionHint::parse("::5").expect("parses");
        assert_eq!(limit_only, ResolutionHint { source: None, field: None, limit: Some(5) });

        let source_and_field = ResolutionHint::parse("list-clus:cluster").expect("parses");
        assert_eq!(source_and_field.source.as_deref(), Some("list-clus"));
        assert_eq!(source_and_field.field.as_deref(), Some("cluster"));
    }

    #[test]
    fn empty_hint_is_all_defaults() {
        assert_eq!(ResolutionHint::parse("").expect("parses"), ResolutionHint::default());
        assert_eq!(ResolutionHint::parse("::").expect("parses"), ResolutionHint::default());
    }

    #[test]
    fn bad_limits_and_extra_components_are_rejected() {
        assert!(matches!(
            ResolutionHint::parse("::abc"),
            Err(HintParseError::BadLimit { .. })
        ));
        assert!(matches!(
            ResolutionHint::parse("::0"),
            Err(HintParseError::BadLimit { .. })
        ));
        assert!(matches!(
            ResolutionHint::parse("a:b:1:extra"),
            Err(HintParseError::TooManyComponents { .. })
        ));
    }
}
