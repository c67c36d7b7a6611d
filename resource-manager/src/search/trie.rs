//! A prefix trie over lowercased words, used for O(prefix length) prefix
//! search.

use std::collections::{BTreeSet, HashMap};

#[derive(Default)]
struct Node {
    children: HashMap<char, Node>,
    ids: BTreeSet<String>,
}

/// Maps words to the set of resource ids whose indexed text contains a word
/// with that word as a prefix.
#[derive(Default)]
pub struct PrefixTrie {
    root: Node,
}

impl PrefixTrie {
    /// An empty trie.
    pub fn new() -> Self {
        PrefixTrie::default()
    }

    /// Index every whitespace-separated word of `text` against `id`.
    pub fn insert_text(&mut self, id: &str, text: &str) {
        for word in text.split_whitespace() {
            self.insert_word(id, word);
        }
    }

    fn insert_word(&mut self, id: &str, word: &str) {
        let mut node = &mut self.root;
        for ch in word.chars() {
            node = node.children.entry(ch).or_default();
            node.ids.insert(id.to_owned());
        }
    }

    /// Ids of every word indexed with `prefix` as a prefix.
    pub fn search_prefix(&self, prefix: &str) -> BTreeSet<String> {
        let mut node = &self.root;
        for ch in prefix.chars() {
            match node.children.get(&ch) {
                Some(next) => node = next,
                None => return BTreeSet::new(),
            }
        }
        node.ids.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_ids_by_word_prefix() {
        let mut trie = PrefixTrie::new();
        trie.insert_text("architect", "architect mcp architecture design");
        trie.insert_text("reviewer", "reviewer code review");

        assert_eq!(
            trie.search_prefix("arch"),
            BTreeSet::from(["architect".to_owned()])
        );
        assert_eq!(trie.search_prefix("xyz"), BTreeSet::new());
    }

    #[test]
    fn shared_prefixes_match_multiple_ids() {
        let mut trie = PrefixTrie::new();
        trie.insert_text("a", "design pattern");
        trie.insert_text("b", "designer tool");

        assert_eq!(trie.search_prefix("desig").len(), 2);
    }
}
