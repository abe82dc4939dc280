//! Built-in predicate functions and the function registry.
//!
//! Matcher expressions call predicates by name; the registry maps names
//! to pure implementations, so hosts extend the library by registration
//! rather than by implementing a trait. All built-ins take two string
//! arguments and return a boolean.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use regex::Regex;

use crate::error::{EngineError, EngineResult};

use super::ast::Value;

/// A predicate callable from a matcher expression.
pub type MatchFn = Arc<dyn Fn(&[Value]) -> EngineResult<Value> + Send + Sync>;

/// Name-to-predicate registry resolved by the evaluator.
#[derive(Clone)]
pub struct FunctionMap {
    inner: HashMap<String, MatchFn>,
}

impl std::fmt::Debug for FunctionMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.inner.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("FunctionMap").field("names", &names).finish()
    }
}

impl Default for FunctionMap {
    fn default() -> Self {
        let mut fm = Self {
            inner: HashMap::new(),
        };
        fm.add_string_predicate("keyMatch", key_match);
        fm.add_string_predicate("keyMatch2", key_match2);
        fm.add_string_predicate("keyMatch3", key_match3);
        fm.add_string_predicate("regexMatch", regex_match);
        fm.add_string_predicate("globMatch", glob_match);
        fm.add_string_predicate("ipMatch", ip_match);
        fm
    }
}

impl FunctionMap {
    /// Registers (or replaces) a predicate under `name`.
    pub fn add_function(&mut self, name: impl Into<String>, f: MatchFn) {
        self.inner.insert(name.into(), f);
    }

    pub fn get(&self, name: &str) -> Option<&MatchFn> {
        self.inner.get(name)
    }

    fn add_string_predicate(
        &mut self,
        name: &str,
        f: fn(&str, &str) -> EngineResult<bool>,
    ) {
        let owned = name.to_string();
        self.add_function(
            name,
            Arc::new(move |args: &[Value]| {
                if args.len() != 2 {
                    return Err(EngineError::ExpressionEvaluation {
                        message: format!(
                            "{owned}() expects 2 arguments, got {}",
                            args.len()
                        ),
                    });
                }
                let key1 = args[0].to_text();
                let key2 = args[1].to_text();
                Ok(Value::Bool(f(&key1, &key2)?))
            }),
        );
    }
}

/// Resource-hierarchy match: `key2` may end in `*`, which matches any
/// suffix of `key1`. `keyMatch("/foo/bar", "/foo/*")` is true.
pub fn key_match(key1: &str, key2: &str) -> EngineResult<bool> {
    Ok(match key2.find('*') {
        None => key1 == key2,
        Some(i) => {
            if key1.len() > i {
                key1.get(..i).is_some_and(|prefix| prefix == &key2[..i])
            } else {
                key1 == &key2[..i]
            }
        }
    })
}

/// Keyed match: `:name` segments in `key2` match one path segment.
/// `keyMatch2("/resource1", "/:resource")` is true.
pub fn key_match2(key1: &str, key2: &str) -> EngineResult<bool> {
    static PARAM: OnceLock<Regex> = OnceLock::new();
    let param = PARAM.get_or_init(|| {
        Regex::new(r":[^/]+").expect("segment pattern is valid")
    });
    let pattern = key2.replace("/*", "/.*");
    let pattern = param.replace_all(&pattern, "[^/]+");
    Ok(cached_regex(&format!("^{pattern}$"))?.is_match(key1))
}

/// Keyed match with `{name}` placeholders.
/// `keyMatch3("/res/123", "/res/{id}")` is true.
pub fn key_match3(key1: &str, key2: &str) -> EngineResult<bool> {
    static PARAM: OnceLock<Regex> = OnceLock::new();
    let param = PARAM.get_or_init(|| {
        Regex::new(r"\{[^/]+\}").expect("placeholder pattern is valid")
    });
    let pattern = key2.replace("/*", "/.*");
    let pattern = param.replace_all(&pattern, "[^/]+");
    Ok(cached_regex(&format!("^{pattern}$"))?.is_match(key1))
}

/// Unanchored regular-expression match of `key1` against `key2`.
pub fn regex_match(key1: &str, key2: &str) -> EngineResult<bool> {
    Ok(cached_regex(key2)?.is_match(key1))
}

/// Shell-style glob match (`*`, `?`, `[...]`).
pub fn glob_match(key1: &str, key2: &str) -> EngineResult<bool> {
    let pattern = glob::Pattern::new(key2).map_err(|e| EngineError::ExpressionEvaluation {
        message: format!("invalid glob pattern `{key2}`: {e}"),
    })?;
    Ok(pattern.matches(key1))
}

/// IP equality or CIDR containment. `key2` is either a single address or
/// `addr/prefix`; v4 and v6 both supported, mixed families never match.
pub fn ip_match(key1: &str, key2: &str) -> EngineResult<bool> {
    let ip1: IpAddr = key1.trim().parse().map_err(|_| EngineError::ExpressionEvaluation {
        message: format!("ipMatch: `{key1}` is not an IP address"),
    })?;

    let Some((base, prefix)) = key2.split_once('/') else {
        let ip2: IpAddr = key2.trim().parse().map_err(|_| EngineError::ExpressionEvaluation {
            message: format!("ipMatch: `{key2}` is not an IP address"),
        })?;
        return Ok(ip1 == ip2);
    };

    let ip2: IpAddr = base.trim().parse().map_err(|_| EngineError::ExpressionEvaluation {
        message: format!("ipMatch: `{key2}` has an invalid network address"),
    })?;
    let prefix: u32 = prefix.trim().parse().map_err(|_| EngineError::ExpressionEvaluation {
        message: format!("ipMatch: `{key2}` has an invalid prefix length"),
    })?;

    match (ip1, ip2) {
        (IpAddr::V4(a), IpAddr::V4(b)) => {
            if prefix > 32 {
                return Err(EngineError::ExpressionEvaluation {
                    message: format!("ipMatch: prefix /{prefix} out of range for IPv4"),
                });
            }
            if prefix == 0 {
                return Ok(true);
            }
            let mask = u32::MAX << (32 - prefix);
            Ok((u32::from(a) & mask) == (u32::from(b) & mask))
        }
        (IpAddr::V6(a), IpAddr::V6(b)) => {
            if prefix > 128 {
                return Err(EngineError::ExpressionEvaluation {
                    message: format!("ipMatch: prefix /{prefix} out of range for IPv6"),
                });
            }
            if prefix == 0 {
                return Ok(true);
            }
            let mask = u128::MAX << (128 - prefix);
            Ok((u128::from(a) & mask) == (u128::from(b) & mask))
        }
        _ => Ok(false),
    }
}

/// Process-wide regex memo. Patterns come from policy rows and matcher
/// text, so the working set is small and rebuilding per call would
/// dominate evaluation cost.
fn cached_regex(pattern: &str) -> EngineResult<Regex> {
    static CACHE: OnceLock<DashMap<String, Regex>> = OnceLock::new();
    let cache = CACHE.get_or_init(DashMap::new);
    if let Some(re) = cache.get(pattern) {
        return Ok(re.clone());
    }
    let re = Regex::new(pattern).map_err(|e| EngineError::ExpressionEvaluation {
        message: format!("invalid regex `{pattern}`: {e}"),
    })?;
    cache.insert(pattern.to_string(), re.clone());
    Ok(re)
}
