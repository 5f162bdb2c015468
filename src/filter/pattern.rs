use crate::core::{RegistryError, Result};
use lru::LruCache;
use regex::Regex;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

lazy_static::lazy_static! {
    static ref REGEX_LRU_CACHE: Mutex<LruCache<String, Arc<Regex>>> =
        Mutex::new(LruCache::new(NonZeroUsize::new(200).unwrap_or(NonZeroUsize::MIN)));
}

/// Translates a LIKE pattern (`%`, `_`, `\` escape) into an anchored regex.
#[inline]
fn like_to_regex(pattern: &str) -> String {
    let mut regex = String::with_capacity(pattern.len() + 2);
    regex.push('^');

    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => regex.push_str(".*"),
            '_' => regex.push('.'),
            '\\' => match chars.next() {
                Some(escaped) => regex.push_str(&regex::escape(&escaped.to_string())),
                None => regex.push_str(r"\\"),
            },
            c => regex.push_str(&regex::escape(&c.to_string())),
        }
    }

    regex.push('$');
    regex
}

/// Answers simple patterns without compiling a regex.
#[inline]
fn fast_path_like(text: &str, pattern: &str) -> Option<bool> {
    if pattern.contains('_') || pattern.contains('\\') {
        return None;
    }

    let wildcards = pattern.matches('%').count();
    match wildcards {
        0 => Some(text == pattern),
        1 if pattern.ends_with('%') => Some(text.starts_with(&pattern[..pattern.len() - 1])),
        1 if pattern.starts_with('%') => Some(text.ends_with(&pattern[1..])),
        2 if pattern.len() >= 2 && pattern.starts_with('%') && pattern.ends_with('%') => {
            Some(text.contains(&pattern[1..pattern.len() - 1]))
        }
        _ => None,
    }
}

fn get_or_compile_regex(pattern: &str) -> Result<Arc<Regex>> {
    if let Ok(mut cache) = REGEX_LRU_CACHE.lock() {
        if let Some(regex) = cache.get(pattern) {
            return Ok(Arc::clone(regex));
        }
    }

    let compiled = Regex::new(&like_to_regex(pattern)).map_err(|e| {
        RegistryError::Validation(format!("Invalid LIKE pattern '{}': {}", pattern, e))
    })?;
    let compiled = Arc::new(compiled);

    // A poisoned cache only costs a recompile.
    if let Ok(mut cache) = REGEX_LRU_CACHE.lock() {
        cache.put(pattern.to_string(), Arc::clone(&compiled));
    }

    Ok(compiled)
}

/// Case-sensitive SQL LIKE.
pub fn eval_like(text: &str, pattern: &str) -> Result<bool> {
    if let Some(result) = fast_path_like(text, pattern) {
        return Ok(result);
    }
    let regex = get_or_compile_regex(pattern)?;
    Ok(regex.is_match(text))
}

/// Compiles the pattern ahead of evaluation so malformed input fails early.
pub fn check_like(pattern: &str) -> Result<()> {
    if fast_path_like("", pattern).is_some() {
        return Ok(());
    }
    get_or_compile_regex(pattern).map(|_| ())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextMatch {
    Contains,
    StartsWith,
    EndsWith,
}

/// Case-insensitive substring, prefix or suffix test.
pub fn matches_ignore_case(text: &str, needle: &str, mode: TextMatch) -> bool {
    let text = text.to_lowercase();
    let needle = needle.to_lowercase();
    match mode {
        TextMatch::Contains => text.contains(&needle),
        TextMatch::StartsWith => text.starts_with(&needle),
        TextMatch::EndsWith => text.ends_with(&needle),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_fast_paths() {
        assert!(eval_like("Acme Bank", "Acme%").unwrap());
        assert!(eval_like("Acme Bank", "%Bank").unwrap());
        assert!(eval_like("Acme Bank", "%me B%").unwrap());
        assert!(!eval_like("Acme Bank", "acme%").unwrap());
        assert!(eval_like("Acme", "Acme").unwrap());
    }

    #[test]
    fn test_like_regex_path_escapes_metacharacters() {
        assert!(eval_like("a.c", "a_c").unwrap());
        assert!(eval_like("(x)+1", "(x)+_").unwrap());
        assert!(eval_like("50%", "50\\%").unwrap());
        assert!(!eval_like("500", "50\\%").unwrap());
        assert!(eval_like("abXcdYef", "ab%cd%ef").unwrap());
    }

    #[test]
    fn test_text_matches_ignore_case() {
        assert!(matches_ignore_case("Main Branch", "main", TextMatch::StartsWith));
        assert!(matches_ignore_case("Main Branch", "BRANCH", TextMatch::EndsWith));
        assert!(matches_ignore_case("Main Branch", "n b", TextMatch::Contains));
        assert!(!matches_ignore_case("Main", "x", TextMatch::Contains));
    }
}
