use dashmap::DashSet;

/// Client keys that bypass detection. Entries never expire.
pub struct Allowlist {
    entries: DashSet<String>,
}

impl Allowlist {
    pub fn new() -> Self {
        Self {
            entries: DashSet::new(),
        }
    }

    /// Add a key. Returns `false` if it was already present.
    pub fn insert(&self, key: &str) -> bool {
        self.entries.insert(key.to_string())
    }

    /// Remove a key. Returns `false` if it was not present.
    pub fn remove(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries, sorted.
    pub fn entries(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.iter().map(|k| k.key().clone()).collect();
        keys.sort();
        keys
    }
}

impl Default for Allowlist {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: AsRef<str>> FromIterator<S> for Allowlist {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let list = Self::new();
        for key in iter {
            list.insert(key.as_ref());
        }
        list
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_is_idempotent() {
        let list = Allowlist::new();
        assert!(list.insert("10.0.0.1"));
        assert!(!list.insert("10.0.0.1"));
        assert_eq!(list.len(), 1);
        assert!(list.contains("10.0.0.1"));
    }

    #[test]
    fn remove_entry() {
        let list: Allowlist = ["10.0.0.1", "10.0.0.2"].into_iter().collect();
        assert!(list.remove("10.0.0.1"));
        assert!(!list.remove("10.0.0.1"));
        assert_eq!(list.entries(), vec!["10.0.0.2".to_string()]);
    }
}
