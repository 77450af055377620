//! Built-in matcher functions
//!
//! - `keyMatch(key, pattern)` - `*` matches any run of characters, including `/`
//! - `keyMatch2(key, pattern)` - `:name` matches one path segment, `*` anything
//! - `keyMatch3(key, pattern)` - `{name}` matches one path segment, `*` anything
//! - `regexMatch(key, regex)` - regular expression search
//! - `globMatch(key, pattern)` - `*` / `?` within a segment, `**` across segments
//! - `ipMatch(ip, cidr)` - address inside a CIDR block (or equal to an address)
//!
//! Compiled regexes are kept in an LRU cache shared by the regex-backed functions.

use super::Value;
use lru::LruCache;
use parking_lot::Mutex;
use regex::Regex;
use std::collections::HashMap;
use std::net::IpAddr;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// A matcher function: receives evaluated arguments, returns a value or an error message
pub type MatchFunction =
    Arc<dyn Fn(&[Value<'_>]) -> Result<Value<'static>, String> + Send + Sync>;

const REGEX_CACHE_CAPACITY: usize = 256;

/// Named functions available to matcher expressions
#[derive(Clone)]
pub struct FunctionMap {
    functions: HashMap<String, MatchFunction>,
}

impl FunctionMap {
    /// Empty map with no built-ins
    pub fn empty() -> Self {
        FunctionMap {
            functions: HashMap::new(),
        }
    }

    /// Map pre-populated with the built-in match functions
    pub fn with_builtins() -> Self {
        let mut map = Self::empty();
        let cache = Arc::new(RegexCache::new(REGEX_CACHE_CAPACITY));

        map.insert("keyMatch", string_predicate("keyMatch", |k, p| Ok(key_match(k, p))));
        map.insert("globMatch", string_predicate("globMatch", |k, p| Ok(glob_match(k, p))));
        map.insert("ipMatch", string_predicate("ipMatch", ip_match));

        let regexes = Arc::clone(&cache);
        map.insert(
            "regexMatch",
            string_predicate("regexMatch", move |k, p| regexes.is_match(p, k)),
        );

        let regexes = Arc::clone(&cache);
        map.insert(
            "keyMatch2",
            string_predicate("keyMatch2", move |k, p| {
                regexes.is_match(&key_match2_pattern(p), k)
            }),
        );

        let regexes = cache;
        map.insert(
            "keyMatch3",
            string_predicate("keyMatch3", move |k, p| {
                regexes.is_match(&key_match3_pattern(p), k)
            }),
        );

        map
    }

    /// Register (or replace) a function
    pub fn insert(&mut self, name: impl Into<String>, function: MatchFunction) {
        self.functions.insert(name.into(), function);
    }

    pub fn get(&self, name: &str) -> Option<&MatchFunction> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }
}

impl Default for FunctionMap {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl std::fmt::Debug for FunctionMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("FunctionMap").field("functions", &names).finish()
    }
}

/// Wrap a closure as a [`MatchFunction`]
pub fn match_function<F>(f: F) -> MatchFunction
where
    F: Fn(&[Value<'_>]) -> Result<Value<'static>, String> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Adapt a `(key, pattern) -> bool` predicate into a [`MatchFunction`]
fn string_predicate<F>(name: &'static str, predicate: F) -> MatchFunction
where
    F: Fn(&str, &str) -> Result<bool, String> + Send + Sync + 'static,
{
    Arc::new(move |args: &[Value<'_>]| {
        if args.len() != 2 {
            return Err(format!("{} expects 2 arguments, got {}", name, args.len()));
        }
        let key = args[0]
            .as_str()
            .ok_or_else(|| format!("{} expects string arguments", name))?;
        let pattern = args[1]
            .as_str()
            .ok_or_else(|| format!("{} expects string arguments", name))?;
        predicate(key, pattern).map(Value::Bool)
    })
}

/// LRU cache of compiled regular expressions
pub struct RegexCache {
    cache: Mutex<LruCache<String, Regex>>,
}

impl RegexCache {
    pub fn new(capacity: usize) -> Self {
        RegexCache {
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
        }
    }

    /// Compile (or reuse) `pattern` and test it against `text`
    pub fn is_match(&self, pattern: &str, text: &str) -> Result<bool, String> {
        let mut cache = self.cache.lock();
        if let Some(regex) = cache.get(pattern) {
            return Ok(regex.is_match(text));
        }

        let regex = Regex::new(pattern).map_err(|e| format!("invalid regex '{}': {}", pattern, e))?;
        let matched = regex.is_match(text);
        cache.put(pattern.to_string(), regex);
        Ok(matched)
    }

    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }
}

/// `*` in `pattern` matches any (possibly empty) run of characters
///
/// # Examples
///
/// ```
/// use tollgate::matcher::key_match;
///
/// assert!(key_match("/foo/bar", "/foo/*"));
/// assert!(key_match("/foo/bar/baz", "/foo/*"));
/// assert!(!key_match("/bar/foo", "/foo/*"));
/// ```
pub fn key_match(key: &str, pattern: &str) -> bool {
    if !pattern.contains('*') {
        return key == pattern;
    }

    let parts: Vec<&str> = pattern.split('*').collect();
    let first = parts[0];
    let last = parts[parts.len() - 1];

    // Must start with first part
    if !key.starts_with(first) {
        return false;
    }

    // Must end with last part, without overlapping the prefix
    if !key.ends_with(last) || key.len() < first.len() + last.len() {
        return false;
    }

    // Middle parts appear in order, between prefix and suffix
    let end = key.len() - last.len();
    let mut pos = first.len();
    for part in &parts[1..parts.len() - 1] {
        if part.is_empty() {
            continue;
        }
        match key[pos..end].find(part) {
            Some(found) => pos += found + part.len(),
            None => return false,
        }
    }

    true
}

/// Regex equivalent of a `keyMatch2` pattern (`/users/:id/*`)
pub fn key_match2_pattern(pattern: &str) -> String {
    segment_regex(pattern, |segment| {
        segment
            .strip_prefix(':')
            .filter(|name| !name.is_empty())
            .map(|_| "[^/]+".to_string())
    })
}

/// Regex equivalent of a `keyMatch3` pattern (`/users/{id}/*`)
pub fn key_match3_pattern(pattern: &str) -> String {
    segment_regex(pattern, |segment| {
        if !segment.contains('{') {
            return None;
        }
        let mut out = String::new();
        let mut rest = segment;
        while let Some(open) = rest.find('{') {
            let close = match rest[open..].find('}') {
                Some(close) => open + close,
                None => break,
            };
            out.push_str(&escape_with_star(&rest[..open]));
            out.push_str("[^/]+");
            rest = &rest[close + 1..];
        }
        out.push_str(&escape_with_star(rest));
        Some(out)
    })
}

/// Uncached `keyMatch2`
pub fn key_match2(key: &str, pattern: &str) -> bool {
    Regex::new(&key_match2_pattern(pattern))
        .map(|re| re.is_match(key))
        .unwrap_or(false)
}

/// Uncached `keyMatch3`
pub fn key_match3(key: &str, pattern: &str) -> bool {
    Regex::new(&key_match3_pattern(pattern))
        .map(|re| re.is_match(key))
        .unwrap_or(false)
}

/// Uncached `regexMatch`
pub fn regex_match(key: &str, pattern: &str) -> Result<bool, regex::Error> {
    Ok(Regex::new(pattern)?.is_match(key))
}

fn segment_regex<F>(pattern: &str, placeholder: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let segments: Vec<String> = pattern
        .split('/')
        .map(|segment| placeholder(segment).unwrap_or_else(|| escape_with_star(segment)))
        .collect();
    format!("^{}$", segments.join("/"))
}

/// Escape regex metacharacters, turning `*` into `.*`
fn escape_with_star(text: &str) -> String {
    text.split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*")
}

/// Path glob match
///
/// - `**` matches any number of segments (including none)
/// - `*` matches any run of characters within one segment
/// - `?` matches one character within a segment
///
/// # Examples
///
/// ```
/// use tollgate::matcher::glob_match;
///
/// assert!(glob_match("/users/alice", "/users/*"));
/// assert!(glob_match("/admin/users/bob", "/admin/**"));
/// assert!(!glob_match("/users/alice/profile", "/users/*"));
/// ```
pub fn glob_match(key: &str, pattern: &str) -> bool {
    if key == pattern {
        return true;
    }
    if !pattern.contains(['*', '?']) {
        return false;
    }

    let pattern_parts: Vec<&str> = pattern.split('/').collect();
    let key_parts: Vec<&str> = key.split('/').collect();

    match_parts(&pattern_parts, &key_parts, 0, 0)
}

/// Recursively match pattern segments against key segments
fn match_parts(pattern: &[&str], key: &[&str], pat_idx: usize, key_idx: usize) -> bool {
    // Both exhausted - match
    if pat_idx >= pattern.len() && key_idx >= key.len() {
        return true;
    }

    // Pattern exhausted but key remains - no match
    if pat_idx >= pattern.len() {
        return false;
    }

    // Key exhausted - only matches if remaining pattern is all **
    if key_idx >= key.len() {
        return pattern[pat_idx..].iter().all(|&p| p == "**");
    }

    match pattern[pat_idx] {
        // ** consumes 0, 1, 2, ... segments
        "**" => (0..=(key.len() - key_idx))
            .any(|skip| match_parts(pattern, key, pat_idx + 1, key_idx + skip)),
        segment => {
            match_segment(segment, key[key_idx])
                && match_parts(pattern, key, pat_idx + 1, key_idx + 1)
        }
    }
}

/// Wildcard match of a single segment (`*`, `?`), iterative with one backtrack point
fn match_segment(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((star_pi, star_ti)) = star {
            pi = star_pi + 1;
            ti = star_ti + 1;
            star = Some((star_pi, star_ti + 1));
        } else {
            return false;
        }
    }

    p[pi..].iter().all(|&c| c == '*')
}

/// `ip` equals `pattern`, or lies inside it when `pattern` is a CIDR block
pub fn ip_match(ip: &str, pattern: &str) -> Result<bool, String> {
    let addr: IpAddr = ip
        .trim()
        .parse()
        .map_err(|_| format!("ipMatch: invalid address '{}'", ip))?;

    let (network, prefix) = match pattern.split_once('/') {
        Some((network, prefix)) => {
            let prefix: u32 = prefix
                .parse()
                .map_err(|_| format!("ipMatch: invalid prefix in '{}'", pattern))?;
            (network, Some(prefix))
        }
        None => (pattern, None),
    };
    let network: IpAddr = network
        .trim()
        .parse()
        .map_err(|_| format!("ipMatch: invalid network '{}'", pattern))?;

    let (addr_bits, net_bits, width) = match (addr, network) {
        (IpAddr::V4(a), IpAddr::V4(n)) => (u32::from(a) as u128, u32::from(n) as u128, 32),
        (IpAddr::V6(a), IpAddr::V6(n)) => (u128::from(a), u128::from(n), 128),
        _ => return Ok(false),
    };

    let prefix = prefix.unwrap_or(width);
    if prefix > width {
        return Err(format!("ipMatch: prefix /{} too long", prefix));
    }
    if prefix == 0 {
        return Ok(true);
    }

    let shift = width - prefix;
    Ok(addr_bits >> shift == net_bits >> shift)
}
