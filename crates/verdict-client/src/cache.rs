//! Byte-keyed response cache.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use bytes::Bytes;

/// Size-bounded cache mapping marshaled requests to marshaled responses.
///
/// Entries are evicted in insertion order once the byte budget is
/// exceeded; the budget counts both keys and values.
#[derive(Debug)]
pub(crate) struct ResponseCache {
    inner: Mutex<CacheInner>,
    max_bytes: usize,
}

#[derive(Debug, Default)]
struct CacheInner {
    map: HashMap<Bytes, Bytes>,
    order: VecDeque<Bytes>,
    bytes: usize,
}

impl ResponseCache {
    pub(crate) fn new(max_bytes: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner::default()),
            max_bytes,
        }
    }

    pub(crate) fn get(&self, key: &Bytes) -> Option<Bytes> {
        let inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.map.get(key).cloned()
    }

    pub(crate) fn put(&self, key: Bytes, value: Bytes) {
        let entry_size = key.len() + value.len();
        if entry_size > self.max_bytes {
            return;
        }

        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if let Some(old) = inner.map.insert(key.clone(), value) {
            inner.bytes -= old.len();
            inner.bytes += entry_size - key.len();
        } else {
            inner.order.push_back(key);
            inner.bytes += entry_size;
        }

        while inner.bytes > self.max_bytes {
            let Some(oldest) = inner.order.pop_front() else {
                break;
            };
            if let Some(value) = inner.map.remove(&oldest) {
                inner.bytes -= oldest.len() + value.len();
            }
        }
    }

    pub(crate) fn clear(&self) {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.map.clear();
        inner.order.clear();
        inner.bytes = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    #[test]
    fn stores_and_retrieves() {
        let cache = ResponseCache::new(1024);
        cache.put(b("req"), b("resp"));
        assert_eq!(cache.get(&b("req")), Some(b("resp")));
        assert_eq!(cache.get(&b("other")), None);
    }

    #[test]
    fn evicts_in_insertion_order() {
        let cache = ResponseCache::new(16);
        cache.put(b("aaaa"), b("1111"));
        cache.put(b("bbbb"), b("2222"));
        // Third entry pushes the budget over; the oldest goes first.
        cache.put(b("cccc"), b("3333"));

        assert_eq!(cache.get(&b("aaaa")), None);
        assert_eq!(cache.get(&b("bbbb")), Some(b("2222")));
        assert_eq!(cache.get(&b("cccc")), Some(b("3333")));
    }

    #[test]
    fn oversized_entries_are_skipped() {
        let cache = ResponseCache::new(4);
        cache.put(b("toolarge"), b("value"));
        assert_eq!(cache.get(&b("toolarge")), None);
    }

    #[test]
    fn replacement_updates_budget() {
        let cache = ResponseCache::new(64);
        cache.put(b("k"), b("first"));
        cache.put(b("k"), b("second"));
        assert_eq!(cache.get(&b("k")), Some(b("second")));
    }

    #[test]
    fn clear_empties_everything() {
        let cache = ResponseCache::new(64);
        cache.put(b("k"), b("v"));
        cache.clear();
        assert_eq!(cache.get(&b("k")), None);
    }
}
