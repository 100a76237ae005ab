use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::WordId;

/// Three orderings a vocabulary can expose over its interned words,
/// per `spec.md` §4.1 / §9 ("three sort flavors").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortType {
    None,
    ById,
    ByStr,
    ByFlt,
}

/// A bijection between interned strings and 64-bit word IDs for one
/// (or several, see `IndexVoc`) index keys, plus per-word document
/// frequency — read by peripheral, non-core callers (autocomplete,
/// IDF-style scoring), not used by anything in this crate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WordVoc {
    word_to_id: HashMap<String, WordId>,
    words: Vec<String>,
    doc_freq: Vec<u64>,
    /// `words` indices sorted lexicographically, kept incrementally.
    by_str_order: Vec<u64>,
    /// (parsed f64, word id) pairs for words that parse as a number,
    /// sorted by the float value.
    by_flt_order: Vec<(f64, u64)>,
}

impl WordVoc {
    pub fn new() -> Self {
        WordVoc::default()
    }

    /// Idempotent intern: returns the existing id and bumps its
    /// document-frequency counter, or allocates a new one.
    pub fn add(&mut self, word: &str) -> WordId {
        if let Some(&id) = self.word_to_id.get(word) {
            self.doc_freq[id.0 as usize] += 1;
            return id;
        }

        let id = WordId(self.words.len() as u64);
        self.words.push(word.to_string());
        self.doc_freq.push(1);
        self.word_to_id.insert(word.to_string(), id);

        let ord = self
            .by_str_order
            .binary_search_by(|&i| self.words[i as usize].as_str().cmp(word))
            .unwrap_or_else(|i| i);
        self.by_str_order.insert(ord, id.0);

        if let Ok(v) = word.parse::<f64>() {
            let ord = self
                .by_flt_order
                .binary_search_by(|probe| probe.0.partial_cmp(&v).unwrap())
                .unwrap_or_else(|i| i);
            self.by_flt_order.insert(ord, (v, id.0));
        }

        id
    }

    pub fn lookup_exact(&self, word: &str) -> Option<WordId> {
        self.word_to_id.get(word).copied()
    }

    pub fn word(&self, id: WordId) -> Option<&str> {
        self.words.get(id.0 as usize).map(|s| s.as_str())
    }

    pub fn doc_freq(&self, id: WordId) -> u64 {
        self.doc_freq.get(id.0 as usize).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Glob match over `*` (any run) and `?` (single char).
    pub fn lookup_wildcard(&self, pattern: &str) -> Result<Vec<WordId>> {
        let mut regex_pattern = String::from("^");
        for ch in pattern.chars() {
            match ch {
                '*' => regex_pattern.push_str(".*"),
                '?' => regex_pattern.push('.'),
                c => regex_pattern.push_str(&regex::escape(&c.to_string())),
            }
        }
        regex_pattern.push('$');
        let re = Regex::new(&regex_pattern)?;

        Ok(self
            .words
            .iter()
            .enumerate()
            .filter(|(_, w)| re.is_match(w))
            .map(|(i, _)| WordId(i as u64))
            .collect())
    }

    /// All words strictly greater than `id` under the given ordering.
    pub fn greater_than(&self, id: WordId, sort: SortType) -> Result<Vec<WordId>> {
        match sort {
            SortType::None => Err(Error::new(ErrorKind::InvalidSortType, "key has no declared sort order")),
            SortType::ById => Ok((id.0 + 1..self.words.len() as u64).map(WordId).collect()),
            SortType::ByStr => {
                let word = self.word(id).ok_or_else(|| unknown_word(id))?.to_string();
                let pos = self
                    .by_str_order
                    .binary_search_by(|&i| self.words[i as usize].as_str().cmp(&word))
                    .unwrap_or_else(|i| i);
                let start = skip_ties(&self.by_str_order, pos, |i| self.words[i as usize] == word);
                Ok(self.by_str_order[start..].iter().map(|&i| WordId(i)).collect())
            }
            SortType::ByFlt => {
                let word = self.word(id).ok_or_else(|| unknown_word(id))?;
                let v = word
                    .parse::<f64>()
                    .map_err(|_| Error::new(ErrorKind::UnorderedLeaf, "word is not numeric under ByFlt order"))?;
                let pos = self
                    .by_flt_order
                    .binary_search_by(|probe| probe.0.partial_cmp(&v).unwrap())
                    .unwrap_or_else(|i| i);
                let start = skip_ties(&self.by_flt_order.iter().map(|p| p.1).collect::<Vec<_>>(), pos, |i| {
                    self.words[i as usize] == word
                });
                Ok(self.by_flt_order[start..].iter().map(|p| WordId(p.1)).collect())
            }
        }
    }

    /// All words strictly less than `id` under the given ordering.
    pub fn less_than(&self, id: WordId, sort: SortType) -> Result<Vec<WordId>> {
        match sort {
            SortType::None => Err(Error::new(ErrorKind::InvalidSortType, "key has no declared sort order")),
            SortType::ById => Ok((0..id.0).map(WordId).collect()),
            SortType::ByStr => {
                let word = self.word(id).ok_or_else(|| unknown_word(id))?.to_string();
                let pos = self
                    .by_str_order
                    .binary_search_by(|&i| self.words[i as usize].as_str().cmp(&word))
                    .unwrap_or_else(|i| i);
                Ok(self.by_str_order[..pos].iter().map(|&i| WordId(i)).collect())
            }
            SortType::ByFlt => {
                let word = self.word(id).ok_or_else(|| unknown_word(id))?;
                let v = word
                    .parse::<f64>()
                    .map_err(|_| Error::new(ErrorKind::UnorderedLeaf, "word is not numeric under ByFlt order"))?;
                let pos = self
                    .by_flt_order
                    .binary_search_by(|probe| probe.0.partial_cmp(&v).unwrap())
                    .unwrap_or_else(|i| i);
                Ok(self.by_flt_order[..pos].iter().map(|p| WordId(p.1)).collect())
            }
        }
    }
}

fn unknown_word(id: WordId) -> Error {
    Error::new(ErrorKind::UnknownKey, format!("word id {} not in vocabulary", id.0))
}

/// Advance `pos` over entries satisfying `eq` (ties at the search point),
/// so the ranges used by `greater_than` exclude the pivot itself.
fn skip_ties(order: &[u64], mut pos: usize, eq: impl Fn(u64) -> bool) -> usize {
    while pos < order.len() && eq(order[pos]) {
        pos += 1;
    }
    pos
}
