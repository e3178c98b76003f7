use std::cell::RefCell;
use std::collections::BTreeMap;

/// Memo table invalidated wholesale by bumping a generation counter.
///
/// Entries computed under an older generation are treated as missing.
#[derive(Debug, Default)]
pub(crate) struct GenerationCache<V> {
    entries: RefCell<BTreeMap<String, (u64, V)>>,
}

impl<V: Clone> GenerationCache<V> {
    pub(crate) fn new() -> Self {
        Self {
            entries: RefCell::new(BTreeMap::new()),
        }
    }

    /// Returns the cached value for `key`, computing it if stale.
    ///
    /// No borrow is held while `compute` runs, so it may consult the cache.
    pub(crate) fn get_or_compute(
        &self,
        key: &str,
        generation: u64,
        compute: impl FnOnce() -> V,
    ) -> V {
        if let Some((stamp, value)) = self.entries.borrow().get(key) {
            if *stamp == generation {
                return value.clone();
            }
        }
        let value = compute();
        self.entries
            .borrow_mut()
            .insert(key.to_owned(), (generation, value.clone()));
        value
    }

    pub(crate) fn clear(&self) {
        self.entries.borrow_mut().clear();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    #[test]
    fn recomputes_only_after_generation_changes() {
        let cache = GenerationCache::new();
        let calls = Cell::new(0);
        let compute = || {
            calls.set(calls.get() + 1);
            7
        };
        assert_eq!(cache.get_or_compute("a", 1, compute), 7);
        assert_eq!(cache.get_or_compute("a", 1, compute), 7);
        assert_eq!(calls.get(), 1);
        assert_eq!(cache.get_or_compute("a", 2, compute), 7);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn nested_lookups_do_not_conflict() {
        let cache: GenerationCache<i32> = GenerationCache::new();
        let outer = cache.get_or_compute("outer", 0, || cache.get_or_compute("inner", 0, || 2) + 1);
        assert_eq!(outer, 3);
    }
}
