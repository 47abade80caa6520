//! Pattern segment classification.

/// One `/`-delimited piece of a route pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Fixed text, matched case-insensitively.
    Literal(String),
    /// `[name]` - binds exactly one pathname segment.
    Param(String),
    /// `[...name]` - binds one or more trailing segments.
    CatchAll(String),
    /// `[[...name]]` - binds zero or more trailing segments.
    OptionalCatchAll(String),
}

impl Segment {
    /// Classify a raw pattern segment.
    ///
    /// Anything that does not parse as one of the bracket forms is treated
    /// as a literal, including unbalanced brackets.
    pub fn classify(raw: &str) -> Segment {
        if let Some(name) = raw
            .strip_prefix("[[...")
            .and_then(|rest| rest.strip_suffix("]]"))
        {
            if !name.is_empty() {
                return Segment::OptionalCatchAll(name.to_string());
            }
        }
        if let Some(name) = raw
            .strip_prefix("[...")
            .and_then(|rest| rest.strip_suffix(']'))
        {
            if !name.is_empty() && !name.ends_with(']') {
                return Segment::CatchAll(name.to_string());
            }
        }
        if let Some(name) = raw.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')) {
            if !name.is_empty() && !name.starts_with('[') && !name.ends_with(']') {
                return Segment::Param(name.to_string());
            }
        }
        Segment::Literal(raw.to_string())
    }

    /// True for the two trailing-wildcard forms, which must end a pattern.
    pub fn is_tail(&self) -> bool {
        matches!(self, Segment::CatchAll(_) | Segment::OptionalCatchAll(_))
    }
}

/// Split a pattern or pathname into non-empty segments.
///
/// Leading, trailing, and doubled slashes are ignored, so `""`, `"/"`, and
/// `"//"` all produce an empty list (the root).
pub fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_literal() {
        assert_eq!(
            Segment::classify("products"),
            Segment::Literal("products".into())
        );
        // Unbalanced brackets fall back to literal
        assert_eq!(Segment::classify("[id"), Segment::Literal("[id".into()));
        assert_eq!(Segment::classify("id]"), Segment::Literal("id]".into()));
        assert_eq!(Segment::classify("[]"), Segment::Literal("[]".into()));
    }

    #[test]
    fn test_classify_param() {
        assert_eq!(Segment::classify("[id]"), Segment::Param("id".into()));
        assert_eq!(
            Segment::classify("[userId]"),
            Segment::Param("userId".into())
        );
    }

    #[test]
    fn test_classify_catch_all() {
        assert_eq!(
            Segment::classify("[...slug]"),
            Segment::CatchAll("slug".into())
        );
        assert_eq!(
            Segment::classify("[[...slug]]"),
            Segment::OptionalCatchAll("slug".into())
        );
        assert!(Segment::classify("[...slug]").is_tail());
        assert!(Segment::classify("[[...slug]]").is_tail());
        assert!(!Segment::classify("[slug]").is_tail());
    }

    #[test]
    fn test_split_path() {
        assert_eq!(split_path("/a/b/c"), vec!["a", "b", "c"]);
        assert_eq!(split_path("a/b/"), vec!["a", "b"]);
        assert_eq!(split_path("//a//b"), vec!["a", "b"]);
        assert!(split_path("/").is_empty());
        assert!(split_path("").is_empty());
    }
}
