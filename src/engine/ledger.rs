use ahash::AHashMap;

/// Commit counts per author of one file.
#[derive(Debug, Clone, Default)]
pub struct AuthorLedger {
    counts: AHashMap<String, u64>,
}

impl AuthorLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&mut self, author: &str) {
        if let Some(count) = self.counts.get_mut(author) {
            *count += 1;
        } else {
            self.counts.insert(author.to_string(), 1);
        }
    }

    /// Sum of all counts.
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    /// Largest single-author count, 0 when empty.
    pub fn max_count(&self) -> u64 {
        self.counts.values().copied().max().unwrap_or(0)
    }

    /// Number of distinct authors.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.counts.iter().map(|(author, count)| (author.as_str(), *count))
    }

    pub fn clear(&mut self) {
        self.counts.clear();
    }
}
