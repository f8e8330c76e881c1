use std::sync::{Arc, RwLock};

/// Operator-maintained extra words, shared between the remote and local filters.
///
/// Words are stored lowercase and deduplicated.
#[derive(Debug, Clone, Default)]
pub struct CustomWords {
    inner: Arc<RwLock<Vec<String>>>,
}

impl CustomWords {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the word was already present.
    pub fn add(&self, word: &str) -> bool {
        let word = word.trim().to_lowercase();
        if word.is_empty() {
            return false;
        }
        let mut words = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if words.contains(&word) {
            return false;
        }
        words.push(word);
        true
    }

    /// Returns false if the word was not present.
    pub fn remove(&self, word: &str) -> bool {
        let word = word.trim().to_lowercase();
        let mut words = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let before = words.len();
        words.retain(|w| *w != word);
        words.len() != before
    }

    pub fn list(&self) -> Vec<String> {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn clear(&self) {
        self.inner.write().unwrap_or_else(|e| e.into_inner()).clear();
    }

    /// Comma-joined list as expected by the service's `add` parameter.
    pub fn joined(&self) -> String {
        self.list().join(",")
    }
}

impl FromIterator<String> for CustomWords {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        let words = Self::new();
        for word in iter {
            words.add(&word);
        }
        words
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_is_case_insensitive_and_deduplicated() {
        let words = CustomWords::new();
        assert!(words.add("Heck"));
        assert!(!words.add("heck"));
        assert!(!words.add("   "));
        assert_eq!(words.list(), vec!["heck"]);
    }

    #[test]
    fn remove_and_clear() {
        let words: CustomWords = ["a".to_string(), "b".to_string()].into_iter().collect();
        assert_eq!(words.joined(), "a,b");
        assert!(words.remove("A"));
        assert!(!words.remove("a"));
        words.clear();
        assert!(words.list().is_empty());
    }

    #[test]
    fn clones_share_state() {
        let words = CustomWords::new();
        let other = words.clone();
        other.add("darn");
        assert_eq!(words.list(), vec!["darn"]);
    }
}
