//! Subset matching of fixture patterns against request parameters
//!
//! A fixture declares only the parameters it cares about. Every declared key
//! must be present in the request and satisfy the value rule; extra request
//! keys are ignored. Lists compare as sets, and a scalar matches a list by
//! membership in either direction.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value as Json;

use super::value::ParamValue;

/// Compare one declared value against one actual value.
fn values_match(pattern: &ParamValue, actual: &ParamValue) -> bool {
    use ParamValue::{Int, IntList, Str, StrList};
    match (pattern, actual) {
        // both lists: order-independent, duplicates collapse
        (IntList(p), IntList(a)) => {
            p.iter().collect::<BTreeSet<_>>() == a.iter().collect::<BTreeSet<_>>()
        }
        (StrList(p), StrList(a)) => {
            p.iter().collect::<BTreeSet<_>>() == a.iter().collect::<BTreeSet<_>>()
        }
        // pattern list, actual scalar: membership
        (IntList(p), Int(a)) => p.contains(a),
        (StrList(p), Str(a)) => p.contains(a),
        // pattern scalar, actual list: membership
        (Int(p), IntList(a)) => a.contains(p),
        (Str(p), StrList(a)) => a.contains(p),
        // both scalar: exact equality
        (Int(p), Int(a)) => p == a,
        (Str(p), Str(a)) => p == a,
        // shape or element-type mismatch
        _ => false,
    }
}

/// Decide whether `pattern` (a fixture's declared request) is satisfied by
/// the normalized request parameters. An empty pattern matches anything.
#[must_use]
pub fn params_match(
    pattern: &serde_json::Map<String, Json>,
    request: &BTreeMap<String, ParamValue>,
) -> bool {
    pattern.iter().all(|(key, declared)| {
        request
            .get(key)
            .is_some_and(|actual| values_match(&ParamValue::from_json(declared), actual))
    })
}
