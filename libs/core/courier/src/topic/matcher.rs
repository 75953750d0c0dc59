//! Wildcard matching of queue-name remainders against topics, with
//! memoization.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use regex::Regex;

use crate::config::TopicRouting;

/// Compiled matching state for one queue-name remainder.
enum Pattern {
    /// No wildcard: matches only the identical literal.
    Literal,
    /// Wildcard remainder compiled to a regex.
    Wildcard(Regex),
}

struct CacheEntry {
    pattern: Pattern,
    /// Match outcome per topic already asked about.
    outcomes: HashMap<String, bool>,
}

/// Memoizing matcher for emulated-topic publishing.
///
/// Keyed first by remainder, then by topic: the same pairs recur on every
/// publish in steady state, so both the compiled pattern (including the
/// "literal, matches nothing else" case) and each outcome are computed once.
pub struct MatchCache {
    routing: TopicRouting,
    entries: Mutex<HashMap<String, CacheEntry>>,
    compilations: AtomicUsize,
}

impl MatchCache {
    /// Create a cache for the given routing convention.
    pub fn new(routing: TopicRouting) -> Self {
        Self {
            routing,
            entries: Mutex::new(HashMap::new()),
            compilations: AtomicUsize::new(0),
        }
    }

    /// Whether a queue-name remainder matches a topic: exact equality fast
    /// path, else the remainder's wildcard pattern.
    pub fn matches(&self, remainder: &str, topic: &str) -> bool {
        if remainder == topic {
            return true;
        }

        let mut entries = self.entries.lock().expect("match cache poisoned");
        if !entries.contains_key(remainder) {
            let pattern = self.compile(remainder);
            self.compilations.fetch_add(1, Ordering::SeqCst);
            entries.insert(
                remainder.to_string(),
                CacheEntry {
                    pattern,
                    outcomes: HashMap::new(),
                },
            );
        }
        let entry = entries.get_mut(remainder).expect("entry just ensured");

        if let Some(&outcome) = entry.outcomes.get(topic) {
            return outcome;
        }

        let outcome = match &entry.pattern {
            Pattern::Literal => false, // equality already ruled out
            Pattern::Wildcard(regex) => regex.is_match(topic),
        };
        entry.outcomes.insert(topic.to_string(), outcome);
        outcome
    }

    /// How many patterns have been compiled. Diagnostic for the
    /// regex-generation path.
    pub fn compilations(&self) -> usize {
        self.compilations.load(Ordering::SeqCst)
    }

    fn compile(&self, remainder: &str) -> Pattern {
        if !remainder.contains(&self.routing.wildcard) {
            return Pattern::Literal;
        }

        let mut source = String::from("^");
        for part in split_keep_token(remainder, &self.routing.wildcard) {
            match part {
                Part::Token => source.push_str(".*"),
                Part::Text(text) => source.push_str(&regex::escape(text)),
            }
        }
        source.push('$');

        match Regex::new(&source) {
            Ok(regex) => Pattern::Wildcard(regex),
            // Unreachable with escaped input; treat as a literal that can
            // only match itself.
            Err(_) => Pattern::Literal,
        }
    }
}

enum Part<'a> {
    Token,
    Text(&'a str),
}

fn split_keep_token<'a>(input: &'a str, token: &str) -> Vec<Part<'a>> {
    let mut parts = Vec::new();
    let mut rest = input;
    while let Some(at) = rest.find(token) {
        if at > 0 {
            parts.push(Part::Text(&rest[..at]));
        }
        parts.push(Part::Token);
        rest = &rest[at + token.len()..];
    }
    if !rest.is_empty() {
        parts.push(Part::Text(rest));
    }
    parts
}
