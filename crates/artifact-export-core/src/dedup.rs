use std::collections::HashSet;

use crate::document::PushKey;

/// Keys already delivered by one reporter during this session.
///
/// Keys only join the set after a flush in which every document succeeded.
#[derive(Debug, Default)]
pub struct DedupSet {
    keys: HashSet<PushKey>,
}

impl DedupSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &PushKey) -> bool {
        self.keys.contains(key)
    }

    pub fn mark_all<I>(&mut self, keys: I)
    where
        I: IntoIterator<Item = PushKey>,
    {
        self.keys.extend(keys);
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn clear(&mut self) {
        self.keys.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marks_and_checks_keys() {
        let mut set = DedupSet::new();
        let a = PushKey::from_fields(&["a"]);
        let b = PushKey::from_fields(&["b"]);
        assert!(set.is_empty());

        set.mark_all([a, a]);
        assert!(set.contains(&a));
        assert!(!set.contains(&b));
        assert_eq!(set.len(), 1);

        set.clear();
        assert!(!set.contains(&a));
    }
}
