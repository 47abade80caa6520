//! Radix tree insert and lookup.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::matcher::segment::{split_path, Segment};

/// A bound route parameter: one segment, or the trailing segments captured
/// by a catch-all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Single(String),
    Many(Vec<String>),
}

impl ParamValue {
    /// The single-segment form, if this is one.
    pub fn as_single(&self) -> Option<&str> {
        match self {
            ParamValue::Single(s) => Some(s),
            ParamValue::Many(_) => None,
        }
    }

    /// The multi-segment form, if this is one.
    pub fn as_many(&self) -> Option<&[String]> {
        match self {
            ParamValue::Single(_) => None,
            ParamValue::Many(v) => Some(v),
        }
    }
}

/// Child slot for a dynamic `[name]` segment. One per node; the parameter
/// name is fixed by the first registration that created the slot.
#[derive(Debug)]
struct ParamChild<T> {
    name: String,
    node: Box<TrieNode<T>>,
}

/// Synthesized terminal for `[...name]` / `[[...name]]`. Wildcards end a
/// pattern, so the payload hangs directly off the slot with no subtree.
#[derive(Debug)]
struct TailChild<T> {
    name: String,
    payload: T,
}

#[derive(Debug)]
struct TrieNode<T> {
    literals: HashMap<String, TrieNode<T>>,
    param: Option<ParamChild<T>>,
    catch_all: Option<TailChild<T>>,
    optional_catch_all: Option<TailChild<T>>,
    payload: Option<T>,
}

impl<T> Default for TrieNode<T> {
    fn default() -> Self {
        Self {
            literals: HashMap::new(),
            param: None,
            catch_all: None,
            optional_catch_all: None,
            payload: None,
        }
    }
}

/// A successful lookup.
#[derive(Debug)]
pub struct TrieMatch<'t, T> {
    /// Payload attached at the matched terminal.
    pub payload: &'t T,
    /// Bound parameters in match order.
    pub params: Vec<(String, ParamValue)>,
    /// The pathname rebuilt from matched segments: literals case-folded,
    /// parameter and catch-all segments exactly as the caller sent them.
    pub normalized: String,
}

/// Priority-ordered path tree.
///
/// Insertion splits a pattern into segments and stores literals case-folded.
/// Lookup walks the tree depth-first, trying at every node, in order:
/// literal child, dynamic child, catch-all, optional catch-all - and
/// backtracks to the next branch class when a deeper match fails.
#[derive(Debug, Default)]
pub struct PathTrie<T> {
    root: TrieNode<T>,
}

impl<T> PathTrie<T> {
    pub fn new() -> Self {
        Self {
            root: TrieNode::default(),
        }
    }

    /// Register a pattern. Returns the payload previously stored at the same
    /// terminal, if any (last registration wins).
    ///
    /// Wildcard segments terminate the pattern: anything following one is
    /// ignored. Two dynamic registrations at the same position share one
    /// slot; a divergent parameter name keeps the slot's original name and
    /// is reported as a registration conflict.
    pub fn insert(&mut self, pattern: &str, payload: T) -> Option<T> {
        let segments = split_path(pattern);
        let mut node = &mut self.root;

        for (idx, raw) in segments.iter().enumerate() {
            match Segment::classify(raw) {
                Segment::Literal(lit) => {
                    node = node.literals.entry(lit.to_lowercase()).or_default();
                }
                Segment::Param(name) => {
                    let slot = node.param.get_or_insert_with(|| ParamChild {
                        name: name.clone(),
                        node: Box::default(),
                    });
                    if slot.name != name {
                        tracing::warn!(
                            pattern = %pattern,
                            kept = %slot.name,
                            ignored = %name,
                            "conflicting dynamic parameter names at one position; first registration wins"
                        );
                    }
                    node = &mut slot.node;
                }
                Segment::CatchAll(name) => {
                    if idx + 1 < segments.len() {
                        tracing::warn!(
                            pattern = %pattern,
                            "segments after a catch-all are unreachable and were dropped"
                        );
                    }
                    let old = node.catch_all.replace(TailChild { name, payload });
                    return old.map(|t| t.payload);
                }
                Segment::OptionalCatchAll(name) => {
                    if idx + 1 < segments.len() {
                        tracing::warn!(
                            pattern = %pattern,
                            "segments after an optional catch-all are unreachable and were dropped"
                        );
                    }
                    let old = node.optional_catch_all.replace(TailChild { name, payload });
                    return old.map(|t| t.payload);
                }
            }
        }

        node.payload.replace(payload)
    }

    /// Look up a pathname. `None` means no route matched.
    pub fn find<'t>(&'t self, pathname: &str) -> Option<TrieMatch<'t, T>> {
        let segments = split_path(pathname);
        // One accumulator pair reused across every backtracked branch;
        // failed attempts truncate back to their entry length.
        let mut params: Vec<(String, ParamValue)> = Vec::new();
        let mut normalized: Vec<String> = Vec::with_capacity(segments.len());

        let payload = descend(&self.root, &segments, 0, &mut params, &mut normalized)?;

        let mut rebuilt = String::with_capacity(pathname.len());
        if normalized.is_empty() {
            rebuilt.push('/');
        } else {
            for seg in &normalized {
                rebuilt.push('/');
                rebuilt.push_str(seg);
            }
        }

        Some(TrieMatch {
            payload,
            params,
            normalized: rebuilt,
        })
    }
}

fn descend<'t, T>(
    node: &'t TrieNode<T>,
    segments: &[&str],
    idx: usize,
    params: &mut Vec<(String, ParamValue)>,
    normalized: &mut Vec<String>,
) -> Option<&'t T> {
    if idx == segments.len() {
        // Out of input: a terminal here wins; otherwise an optional
        // catch-all may bind the empty tail.
        if let Some(payload) = node.payload.as_ref() {
            return Some(payload);
        }
        if let Some(tail) = node.optional_catch_all.as_ref() {
            params.push((tail.name.clone(), ParamValue::Many(Vec::new())));
            return Some(&tail.payload);
        }
        return None;
    }

    let segment = segments[idx];

    // 1. literal, via case-folded lookup
    if let Some(child) = node.literals.get(&segment.to_lowercase()) {
        let params_mark = params.len();
        let norm_mark = normalized.len();
        normalized.push(segment.to_lowercase());
        if let Some(payload) = descend(child, segments, idx + 1, params, normalized) {
            return Some(payload);
        }
        params.truncate(params_mark);
        normalized.truncate(norm_mark);
    }

    // 2. dynamic parameter, binding the raw segment
    if let Some(slot) = node.param.as_ref() {
        let params_mark = params.len();
        let norm_mark = normalized.len();
        params.push((slot.name.clone(), ParamValue::Single(segment.to_string())));
        normalized.push(segment.to_string());
        if let Some(payload) = descend(&slot.node, segments, idx + 1, params, normalized) {
            return Some(payload);
        }
        params.truncate(params_mark);
        normalized.truncate(norm_mark);
    }

    // 3. catch-all consumes everything left (idx < len, so at least one)
    if let Some(tail) = node.catch_all.as_ref() {
        let rest: Vec<String> = segments[idx..].iter().map(|s| s.to_string()).collect();
        params.push((tail.name.clone(), ParamValue::Many(rest.clone())));
        normalized.extend(rest);
        return Some(&tail.payload);
    }

    // 4. optional catch-all, same tail binding
    if let Some(tail) = node.optional_catch_all.as_ref() {
        let rest: Vec<String> = segments[idx..].iter().map(|s| s.to_string()).collect();
        params.push((tail.name.clone(), ParamValue::Many(rest.clone())));
        normalized.extend(rest);
        return Some(&tail.payload);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params_of<T>(m: &TrieMatch<'_, T>) -> Vec<(String, ParamValue)> {
        m.params.clone()
    }

    #[test]
    fn test_literal_beats_param() {
        let mut trie = PathTrie::new();
        trie.insert("/products/featured", 1);
        trie.insert("/products/[id]", 2);

        let m = trie.find("/products/featured").unwrap();
        assert_eq!(*m.payload, 1);
        assert!(m.params.is_empty());

        let m = trie.find("/products/123").unwrap();
        assert_eq!(*m.payload, 2);
        assert_eq!(
            params_of(&m),
            vec![("id".to_string(), ParamValue::Single("123".to_string()))]
        );
    }

    #[test]
    fn test_param_beats_catch_all() {
        let mut trie = PathTrie::new();
        trie.insert("/docs/[page]", 1);
        trie.insert("/docs/[...slug]", 2);

        let m = trie.find("/docs/intro").unwrap();
        assert_eq!(*m.payload, 1);

        // Two segments cannot be a single [page], so the catch-all wins.
        let m = trie.find("/docs/a/b").unwrap();
        assert_eq!(*m.payload, 2);
        assert_eq!(
            params_of(&m),
            vec![(
                "slug".to_string(),
                ParamValue::Many(vec!["a".to_string(), "b".to_string()])
            )]
        );
    }

    #[test]
    fn test_catch_all_needs_a_segment() {
        let mut trie = PathTrie::new();
        trie.insert("/docs/[...slug]", 1);

        assert!(trie.find("/docs").is_none());
        assert!(trie.find("/docs/a").is_some());
        assert!(trie.find("/docs/a/b").is_some());
    }

    #[test]
    fn test_optional_catch_all_matches_zero() {
        let mut trie = PathTrie::new();
        trie.insert("/files/[[...path]]", 1);

        let m = trie.find("/files").unwrap();
        assert_eq!(*m.payload, 1);
        assert_eq!(
            params_of(&m),
            vec![("path".to_string(), ParamValue::Many(vec![]))]
        );

        let m = trie.find("/files/a/b/c").unwrap();
        assert_eq!(
            params_of(&m),
            vec![(
                "path".to_string(),
                ParamValue::Many(vec!["a".into(), "b".into(), "c".into()])
            )]
        );
    }

    #[test]
    fn test_catch_all_beats_optional() {
        let mut trie = PathTrie::new();
        trie.insert("/x/[[...rest]]", 1);
        trie.insert("/x/[...rest]", 2);

        // With segments remaining, the required catch-all is tried first.
        let m = trie.find("/x/a").unwrap();
        assert_eq!(*m.payload, 2);

        // With nothing remaining only the optional form can bind.
        let m = trie.find("/x").unwrap();
        assert_eq!(*m.payload, 1);
    }

    #[test]
    fn test_backtracking_out_of_a_dead_literal() {
        let mut trie = PathTrie::new();
        trie.insert("/a/b/c", 1);
        trie.insert("/a/[x]/d", 2);

        // "/a/b/d" enters the literal "b" branch, dies at "d", and must
        // back out to bind b as [x].
        let m = trie.find("/a/b/d").unwrap();
        assert_eq!(*m.payload, 2);
        assert_eq!(
            params_of(&m),
            vec![("x".to_string(), ParamValue::Single("b".to_string()))]
        );
    }

    #[test]
    fn test_normalized_pathname_case() {
        let mut trie = PathTrie::new();
        trie.insert("/Products/[id]", 1);

        let m = trie.find("/PRODUCTS/AbC").unwrap();
        // Literal folded, parameter preserved.
        assert_eq!(m.normalized, "/products/AbC");
        assert_eq!(
            params_of(&m),
            vec![("id".to_string(), ParamValue::Single("AbC".to_string()))]
        );
    }

    #[test]
    fn test_root_pattern() {
        let mut trie = PathTrie::new();
        trie.insert("", 1);
        assert_eq!(*trie.find("/").unwrap().payload, 1);
        assert_eq!(trie.find("/").unwrap().normalized, "/");
        assert!(trie.find("/nope").is_none());
    }

    #[test]
    fn test_no_match_is_none() {
        let mut trie: PathTrie<u8> = PathTrie::new();
        trie.insert("/a", 1);
        assert!(trie.find("/b").is_none());
        assert!(trie.find("/a/b").is_none());
    }

    #[test]
    fn test_dynamic_name_conflict_keeps_first() {
        let mut trie = PathTrie::new();
        trie.insert("/a/[id]", 1);
        // Same slot, different name: slot name stays "id", payload at the
        // shared terminal is replaced.
        let displaced = trie.insert("/a/[slug]", 2);
        assert_eq!(displaced, Some(1));

        let m = trie.find("/a/7").unwrap();
        assert_eq!(*m.payload, 2);
        assert_eq!(
            params_of(&m),
            vec![("id".to_string(), ParamValue::Single("7".to_string()))]
        );
    }

    #[test]
    fn test_deep_priority_on_shared_prefix() {
        let mut trie = PathTrie::new();
        trie.insert("/shop/cart", 1);
        trie.insert("/shop/[section]", 2);
        trie.insert("/shop/[...rest]", 3);

        assert_eq!(*trie.find("/shop/cart").unwrap().payload, 1);
        assert_eq!(*trie.find("/shop/shoes").unwrap().payload, 2);
        assert_eq!(*trie.find("/shop/shoes/41").unwrap().payload, 3);
    }
}
