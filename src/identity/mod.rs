//! Match identity strings.
//!
//! # Responsibilities
//! - Compute a deterministic cache key for a route + parameters + loader
//!   dependency values
//! - Parse a key back into its components for cache tooling
//!
//! # Design Decisions
//! - Parameters serialize from a `BTreeMap`, so key order is canonical and
//!   insertion order never leaks into the identity
//! - Dependency values are whatever the route's deps function derived from
//!   the search object; search keys it never read cannot affect the string
//! - `parse` is opportunistic: any structural or JSON failure is `None`,
//!   never an error, because cache tooling probes arbitrary strings

use std::collections::BTreeMap;

use serde_json::Value;

use crate::matcher::ParamValue;

/// Canonical parameter mapping. The `BTreeMap` keeps keys sorted, which is
/// what makes [`compute`] deterministic.
pub type ParamMap = BTreeMap<String, ParamValue>;

/// The components of a match identity string.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchKey {
    /// The route's virtual path.
    pub route_id: String,
    /// Bound route parameters.
    pub params: ParamMap,
    /// Values the route's deps function derived from the search object.
    pub deps: Vec<Value>,
}

/// Build the identity string `<routeId>:<sortedParamsJson>:<depsJson>`.
///
/// Identical inputs always produce byte-identical output.
pub fn compute(route_id: &str, params: &ParamMap, deps: &[Value]) -> String {
    let params_json =
        serde_json::to_string(params).expect("param map serializes");
    let deps_json = serde_json::to_string(deps).expect("deps array serializes");
    format!("{route_id}:{params_json}:{deps_json}")
}

/// Split an identity string back into its components.
///
/// The route id is everything before the first `:{` and the deps array is
/// everything after the last `:[`; the parameter object sits between them.
/// Returns `None` for anything that does not decode cleanly.
pub fn parse(id: &str) -> Option<MatchKey> {
    let brace = id.find(":{")?;
    let bracket = id.rfind(":[")?;
    if bracket <= brace {
        return None;
    }

    let route_id = &id[..brace];
    let params_json = &id[brace + 1..bracket];
    let deps_json = &id[bracket + 1..];

    let params: ParamMap = serde_json::from_str(params_json).ok()?;
    let deps: Vec<Value> = serde_json::from_str(deps_json).ok()?;

    Some(MatchKey {
        route_id: route_id.to_string(),
        params,
        deps,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(entries: &[(&str, ParamValue)]) -> ParamMap {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_compute_shape() {
        let p = params(&[("id", ParamValue::Single("123".into()))]);
        let id = compute("__app/products/[id]", &p, &[json!("en")]);
        assert_eq!(id, r#"__app/products/[id]:{"id":"123"}:["en"]"#);
    }

    #[test]
    fn test_compute_is_key_order_invariant() {
        // BTreeMap sorts on insert, so reversed insertion yields the same
        // serialized form.
        let forward = params(&[
            ("a", ParamValue::Single("1".into())),
            ("b", ParamValue::Single("2".into())),
        ]);
        let mut reverse = ParamMap::new();
        reverse.insert("b".into(), ParamValue::Single("2".into()));
        reverse.insert("a".into(), ParamValue::Single("1".into()));

        assert_eq!(
            compute("/r", &forward, &[]),
            compute("/r", &reverse, &[])
        );
    }

    #[test]
    fn test_round_trip() {
        let p = params(&[
            ("id", ParamValue::Single("7".into())),
            (
                "slug",
                ParamValue::Many(vec!["a".into(), "b".into()]),
            ),
        ]);
        let deps = vec![json!("en"), json!(42)];
        let id = compute("__app/docs/[...slug]", &p, &deps);

        let key = parse(&id).expect("well-formed identity parses");
        assert_eq!(key.route_id, "__app/docs/[...slug]");
        assert_eq!(key.params, p);
        assert_eq!(key.deps, deps);
    }

    #[test]
    fn test_round_trip_empty_params_and_deps() {
        let id = compute("__app", &ParamMap::new(), &[]);
        assert_eq!(id, "__app:{}:[]");

        let key = parse(&id).unwrap();
        assert!(key.params.is_empty());
        assert!(key.deps.is_empty());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse("").is_none());
        assert!(parse("no-delimiters-here").is_none());
        assert!(parse("route:{}").is_none());
        assert!(parse("route:[]").is_none());
        // Delimiters in the wrong order.
        assert!(parse("route:[1]:{}").is_none());
        // Structurally right, JSON wrong.
        assert!(parse("route:{not json}:[]").is_none());
        assert!(parse("route:{}:[not json]").is_none());
    }

    #[test]
    fn test_parse_never_panics_on_multibyte() {
        // Probing arbitrary cache keys must stay total.
        assert!(parse("r\u{00e9}sum\u{00e9}:{}:[]").is_some());
        assert!(parse(":{}:[]").is_some());
    }
}
