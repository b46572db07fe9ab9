//! Package exports/imports field evaluation.
//!
//! Supports:
//! - String shorthand and explicit `"."` root exports
//! - Subpath keys (`"./feature"`)
//! - Pattern keys with a single `*` wildcard (most specific key wins)
//! - Condition objects resolved against the active condition set
//!   (first matching key in map order wins; `default` always matches)
//! - Array targets (first resolvable entry wins)
//! - `imports` field for `#`-prefixed package-internal specifiers
//!
//! Requires `serde_json/preserve_order`: condition precedence follows the
//! map's insertion order, not alphabetical order.

use serde_json::Value;

/// Outcome of consulting an exports map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportsLookup {
    /// Map produced a `./`-relative target for the subpath.
    Target(String),
    /// Map exists but defines nothing for this subpath (not-exported).
    NoMatch,
    /// No exports field present; caller falls back to legacy resolution.
    NoMap,
}

/// Resolve a subpath (`"."` or `"./feature"`) against a package.json value.
#[must_use]
pub fn resolve_exports(pkg_json: &Value, subpath: &str, conditions: &[String]) -> ExportsLookup {
    let Some(exports) = pkg_json.get("exports") else {
        return ExportsLookup::NoMap;
    };

    // String shorthand and bare condition objects only describe the root.
    if let Some(s) = exports.as_str() {
        return if subpath == "." {
            validate_target(s).map_or(ExportsLookup::NoMatch, ExportsLookup::Target)
        } else {
            ExportsLookup::NoMatch
        };
    }

    let Some(obj) = exports.as_object() else {
        return ExportsLookup::NoMatch;
    };

    if has_subpath_keys(obj) {
        // Exact key first, then pattern keys.
        if let Some(target) = obj.get(subpath) {
            return resolve_target(target, conditions)
                .map_or(ExportsLookup::NoMatch, ExportsLookup::Target);
        }
        return resolve_pattern(obj, subpath, conditions);
    }

    // Conditions object at the top level describes the root export.
    if subpath == "." {
        return resolve_target(exports, conditions)
            .map_or(ExportsLookup::NoMatch, ExportsLookup::Target);
    }

    ExportsLookup::NoMatch
}

/// Resolve a `#`-prefixed specifier against a package.json `imports` field.
#[must_use]
pub fn resolve_imports(pkg_json: &Value, specifier: &str, conditions: &[String]) -> Option<String> {
    let imports = pkg_json.get("imports")?.as_object()?;

    if let Some(target) = imports.get(specifier) {
        return resolve_target(target, conditions);
    }

    // Pattern keys ("#internal/*")
    let mut matches: Vec<(&str, &Value, String)> = Vec::new();
    for (key, value) in imports {
        if key.chars().filter(|&c| c == '*').count() != 1 {
            continue;
        }
        if let Some(star) = match_pattern(key, specifier) {
            matches.push((key.as_str(), value, star));
        }
    }
    pick_most_specific(&mut matches);
    let (_, target_value, star) = matches.first()?;
    let target = resolve_target(target_value, conditions)?;
    substitute_star(&target, star)
}

/// Whether any key is a subpath key (starts with `.`).
fn has_subpath_keys(obj: &serde_json::Map<String, Value>) -> bool {
    obj.keys().any(|k| k.starts_with('.'))
}

/// Resolve pattern keys against a subpath.
fn resolve_pattern(
    obj: &serde_json::Map<String, Value>,
    subpath: &str,
    conditions: &[String],
) -> ExportsLookup {
    let mut matches: Vec<(&str, &Value, String)> = Vec::new();

    for (key, value) in obj {
        if !key.starts_with("./") {
            continue;
        }
        if key.chars().filter(|&c| c == '*').count() != 1 {
            continue;
        }
        if let Some(star) = match_pattern(key, subpath) {
            matches.push((key.as_str(), value, star));
        }
    }

    if matches.is_empty() {
        return ExportsLookup::NoMatch;
    }
    pick_most_specific(&mut matches);

    let (_, target_value, star) = &matches[0];
    let Some(target) = resolve_target(target_value, conditions) else {
        return ExportsLookup::NoMatch;
    };
    substitute_star(&target, star).map_or(ExportsLookup::NoMatch, ExportsLookup::Target)
}

/// Sort pattern matches: longest key first, lexicographic for ties.
fn pick_most_specific(matches: &mut [(&str, &Value, String)]) {
    matches.sort_by(|a, b| {
        let len_cmp = b.0.len().cmp(&a.0.len());
        if len_cmp == std::cmp::Ordering::Equal {
            a.0.cmp(b.0)
        } else {
            len_cmp
        }
    });
}

/// Resolve a target value: string, condition object, or fallback array.
fn resolve_target(value: &Value, conditions: &[String]) -> Option<String> {
    match value {
        Value::String(s) => validate_target(s),

        // Condition object: first key in map order that is `default` or in
        // the active condition set wins.
        Value::Object(map) => {
            for (key, nested) in map {
                if key == "default" || conditions.iter().any(|c| c == key) {
                    if let Some(target) = resolve_target(nested, conditions) {
                        return Some(target);
                    }
                }
            }
            None
        }

        // Fallback array: first entry that resolves.
        Value::Array(entries) => entries
            .iter()
            .find_map(|entry| resolve_target(entry, conditions)),

        // null blocks the subpath
        _ => None,
    }
}

/// Validate a target path: must be `./`-relative with no traversal.
fn validate_target(target: &str) -> Option<String> {
    if !target.starts_with("./") {
        return None;
    }
    if target.split('/').any(|seg| seg == "..") {
        return None;
    }
    Some(target.to_string())
}

/// Match a single-`*` pattern key against a subpath, returning the `*` value.
fn match_pattern(pattern: &str, subpath: &str) -> Option<String> {
    let star_pos = pattern.find('*')?;
    let prefix = &pattern[..star_pos];
    let suffix = &pattern[star_pos + 1..];

    if !subpath.starts_with(prefix) {
        return None;
    }
    if !suffix.is_empty() && !subpath.ends_with(suffix) {
        return None;
    }

    let start = prefix.len();
    let end = subpath.len().checked_sub(suffix.len())?;
    if start > end {
        return None;
    }

    let star_value = &subpath[start..end];
    if star_value.is_empty() {
        return None;
    }
    Some(star_value.to_string())
}

/// Substitute `*` in the target with the matched value.
fn substitute_star(target: &str, star_value: &str) -> Option<String> {
    if target.chars().filter(|&c| c == '*').count() != 1 {
        return None;
    }
    let result = target.replace('*', star_value);
    validate_target(&result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn conditions(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_string_shorthand_root() {
        let pkg = json!({"exports": "./dist/index.js"});
        assert_eq!(
            resolve_exports(&pkg, ".", &conditions(&["import"])),
            ExportsLookup::Target("./dist/index.js".to_string())
        );
        assert_eq!(
            resolve_exports(&pkg, "./sub", &conditions(&["import"])),
            ExportsLookup::NoMatch
        );
    }

    #[test]
    fn test_no_exports_field() {
        let pkg = json!({"main": "index.js"});
        assert_eq!(
            resolve_exports(&pkg, ".", &conditions(&["import"])),
            ExportsLookup::NoMap
        );
    }

    #[test]
    fn test_conditional_root() {
        let pkg = json!({
            "exports": {
                "import": "./esm.mjs",
                "require": "./cjs.cjs",
                "default": "./fallback.js"
            }
        });
        assert_eq!(
            resolve_exports(&pkg, ".", &conditions(&["import", "node", "default"])),
            ExportsLookup::Target("./esm.mjs".to_string())
        );
        assert_eq!(
            resolve_exports(&pkg, ".", &conditions(&["require", "node", "default"])),
            ExportsLookup::Target("./cjs.cjs".to_string())
        );
        // No kind condition: first matching key is `default`
        assert_eq!(
            resolve_exports(&pkg, ".", &conditions(&[])),
            ExportsLookup::Target("./fallback.js".to_string())
        );
    }

    #[test]
    fn test_first_matching_condition_wins_in_key_order() {
        // Both conditions active; map order decides.
        let pkg = json!({
            "exports": {
                "node": "./node.js",
                "import": "./esm.mjs"
            }
        });
        assert_eq!(
            resolve_exports(&pkg, ".", &conditions(&["import", "node"])),
            ExportsLookup::Target("./node.js".to_string())
        );
    }

    #[test]
    fn test_subpath_keys() {
        let pkg = json!({
            "exports": {
                ".": "./index.js",
                "./feature": {
                    "import": "./feature.mjs",
                    "require": "./feature.cjs"
                }
            }
        });
        assert_eq!(
            resolve_exports(&pkg, "./feature", &conditions(&["require", "default"])),
            ExportsLookup::Target("./feature.cjs".to_string())
        );
        assert_eq!(
            resolve_exports(&pkg, "./other", &conditions(&["require"])),
            ExportsLookup::NoMatch
        );
    }

    #[test]
    fn test_pattern_keys_most_specific_wins() {
        let pkg = json!({
            "exports": {
                "./*": "./dist/*.js",
                "./features/*": "./dist/features/*.mjs"
            }
        });
        assert_eq!(
            resolve_exports(&pkg, "./features/x", &conditions(&["default"])),
            ExportsLookup::Target("./dist/features/x.mjs".to_string())
        );
        assert_eq!(
            resolve_exports(&pkg, "./util", &conditions(&["default"])),
            ExportsLookup::Target("./dist/util.js".to_string())
        );
    }

    #[test]
    fn test_null_blocks_subpath() {
        let pkg = json!({
            "exports": {
                ".": "./index.js",
                "./internal": null
            }
        });
        assert_eq!(
            resolve_exports(&pkg, "./internal", &conditions(&["import"])),
            ExportsLookup::NoMatch
        );
    }

    #[test]
    fn test_array_fallback() {
        let pkg = json!({
            "exports": {
                ".": ["bad-target", "./good.js"]
            }
        });
        assert_eq!(
            resolve_exports(&pkg, ".", &conditions(&["import"])),
            ExportsLookup::Target("./good.js".to_string())
        );
    }

    #[test]
    fn test_traversal_rejected() {
        let pkg = json!({"exports": "./../escape.js"});
        assert_eq!(
            resolve_exports(&pkg, ".", &conditions(&["import"])),
            ExportsLookup::NoMatch
        );

        let pkg = json!({"exports": {"./*": "./dist/*"}});
        assert_eq!(
            resolve_exports(&pkg, "./../../etc/passwd", &conditions(&["import"])),
            ExportsLookup::NoMatch
        );
    }

    #[test]
    fn test_imports_map() {
        let pkg = json!({
            "imports": {
                "#internal/util": "./src/util.js",
                "#dep": {
                    "node": "./src/dep-node.js",
                    "default": "./src/dep.js"
                },
                "#shims/*": "./shims/*.js"
            }
        });
        assert_eq!(
            resolve_imports(&pkg, "#internal/util", &conditions(&["import"])),
            Some("./src/util.js".to_string())
        );
        assert_eq!(
            resolve_imports(&pkg, "#dep", &conditions(&["node"])),
            Some("./src/dep-node.js".to_string())
        );
        assert_eq!(
            resolve_imports(&pkg, "#shims/fetch", &conditions(&[])),
            Some("./shims/fetch.js".to_string())
        );
        assert_eq!(resolve_imports(&pkg, "#missing", &conditions(&[])), None);
    }

    #[test]
    fn test_nested_conditions() {
        let pkg = json!({
            "exports": {
                ".": {
                    "node": {
                        "import": "./node-esm.mjs",
                        "require": "./node-cjs.cjs"
                    },
                    "default": "./browser.js"
                }
            }
        });
        assert_eq!(
            resolve_exports(&pkg, ".", &conditions(&["import", "node"])),
            ExportsLookup::Target("./node-esm.mjs".to_string())
        );
    }
}
