//! Full-text index: token-based text search.
//!
//! Tokenizes indexed string properties on non-alphanumeric boundaries,
//! lowercases tokens, and optionally folds common Latin diacritics.
//! Queries use AND semantics across tokens; no ranking.

use crate::value::Value;
use std::collections::{BTreeSet, HashMap, HashSet};

/// A full-text index over one or more string property paths.
pub(crate) struct FtsIndex {
    paths: Vec<String>,
    ignore_accents: bool,
    /// token -> ids of documents containing it.
    inverted: HashMap<String, BTreeSet<String>>,
    /// id -> tokens the document contributed, for removal.
    forward: HashMap<String, HashSet<String>>,
}

impl FtsIndex {
    pub(crate) fn new(paths: Vec<String>, ignore_accents: bool) -> Self {
        Self {
            paths,
            ignore_accents,
            inverted: HashMap::new(),
            forward: HashMap::new(),
        }
    }

    /// Updates the index for a document write; `None` removes the entry.
    pub(crate) fn update(&mut self, doc_id: &str, body: Option<&Value>) {
        if let Some(old_tokens) = self.forward.remove(doc_id) {
            for token in old_tokens {
                if let Some(ids) = self.inverted.get_mut(&token) {
                    ids.remove(doc_id);
                    if ids.is_empty() {
                        self.inverted.remove(&token);
                    }
                }
            }
        }

        let Some(body) = body else { return };
        let mut tokens = HashSet::new();
        for path in &self.paths {
            if let Some(Value::String(text)) = body.at_path(path) {
                tokens.extend(tokenize(text, self.ignore_accents));
            }
        }
        if tokens.is_empty() {
            return;
        }
        for token in &tokens {
            self.inverted
                .entry(token.clone())
                .or_default()
                .insert(doc_id.to_string());
        }
        self.forward.insert(doc_id.to_string(), tokens);
    }

    /// Document ids matching every token of `query`, in id order.
    pub(crate) fn search(&self, query: &str) -> Vec<String> {
        let tokens = tokenize(query, self.ignore_accents);
        if tokens.is_empty() {
            return Vec::new();
        }
        let mut result: Option<BTreeSet<String>> = None;
        for token in tokens {
            let ids = match self.inverted.get(&token) {
                Some(ids) => ids,
                None => return Vec::new(),
            };
            result = Some(match result {
                None => ids.clone(),
                Some(acc) => acc.intersection(ids).cloned().collect(),
            });
        }
        result.map(|s| s.into_iter().collect()).unwrap_or_default()
    }

    /// Total number of indexed documents.
    pub(crate) fn len(&self) -> usize {
        self.forward.len()
    }
}

/// Splits text into lowercase alphanumeric tokens.
fn tokenize(text: &str, ignore_accents: bool) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        if ch.is_alphanumeric() {
            let lowered = ch.to_lowercase();
            for lc in lowered {
                if ignore_accents {
                    current.push(fold_accent(lc));
                } else {
                    current.push(lc);
                }
            }
        } else if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Maps common Latin diacritics to their base letter. Other characters
/// pass through unchanged.
fn fold_accent(ch: char) -> char {
    match ch {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => 'a',
        'ç' => 'c',
        'è' | 'é' | 'ê' | 'ë' => 'e',
        'ì' | 'í' | 'î' | 'ï' => 'i',
        'ñ' => 'n',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' => 'o',
        'ù' | 'ú' | 'û' | 'ü' => 'u',
        'ý' | 'ÿ' => 'y',
        other => other,
    }
}
