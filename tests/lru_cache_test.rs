//! Integration tests for the LRU cache

use std::collections::VecDeque;

use heapstore::buffer::LruCache;
use rand::Rng;

#[test]
fn test_lru_cache_keeps_most_recent_keys() {
    let mut cache = LruCache::new(5).unwrap();
    for i in 0..20 {
        cache.put(i, i.to_string());
    }

    assert_eq!(cache.len(), 5);
    for i in 0..15 {
        assert!(!cache.contains(&i));
    }
    for i in 15..20 {
        assert_eq!(cache.peek(&i), Some(&i.to_string()));
    }
}

#[test]
fn test_lru_cache_accessed_key_survives() {
    let mut cache = LruCache::new(3).unwrap();
    cache.put(1, 'a');
    cache.put(2, 'b');
    cache.put(3, 'c');

    assert_eq!(cache.get(&1), Some(&'a'));
    cache.put(4, 'd');
    cache.put(5, 'e');

    assert!(cache.contains(&1));
    assert!(!cache.contains(&2));
    assert!(!cache.contains(&3));
}

#[test]
fn test_lru_cache_abc_scenario() {
    let mut cache = LruCache::new(2).unwrap();
    cache.put("A", 1);
    cache.put("B", 2);
    assert_eq!(cache.get(&"A"), Some(&1));
    cache.put("C", 3);

    assert_eq!(cache.get(&"B"), None);
    assert_eq!(cache.get(&"A"), Some(&1));
    assert_eq!(cache.get(&"C"), Some(&3));
}

#[test]
fn test_lru_cache_iterates_in_recency_order() {
    let mut cache = LruCache::new(4).unwrap();
    for i in 0..4 {
        cache.put(i, ());
    }
    cache.get(&1);
    cache.put(2, ());

    let order: Vec<_> = cache.iter().map(|(k, _)| *k).collect();
    assert_eq!(order, vec![2, 1, 3, 0]);
}

#[test]
fn test_lru_cache_random_workload() {
    let capacity = 16;
    let mut cache = LruCache::new(capacity).unwrap();
    // Reference model: most recently used at the front
    let mut model: VecDeque<(u32, u32)> = VecDeque::new();
    let mut rng = rand::thread_rng();

    for step in 0..5000u32 {
        let key = rng.gen_range(0..40);
        match rng.gen_range(0..4) {
            0 | 1 => {
                let old = cache.put(key, step);
                let expected = model.iter().position(|(k, _)| *k == key).map(|pos| {
                    let (_, v) = model.remove(pos).unwrap();
                    v
                });
                if expected.is_none() && model.len() == capacity {
                    model.pop_back();
                }
                model.push_front((key, step));
                assert_eq!(old, expected);
            }
            2 => {
                let got = cache.get(&key).copied();
                let expected = model.iter().position(|(k, _)| *k == key).map(|pos| {
                    let entry = model.remove(pos).unwrap();
                    model.push_front(entry);
                    entry.1
                });
                assert_eq!(got, expected);
            }
            _ => {
                let got = cache.remove(&key);
                let expected = model
                    .iter()
                    .position(|(k, _)| *k == key)
                    .and_then(|pos| model.remove(pos))
                    .map(|(_, v)| v);
                assert_eq!(got, expected);
            }
        }

        assert_eq!(cache.len(), model.len());
        assert!(cache.len() <= capacity);
    }

    let order: Vec<_> = cache.iter().map(|(k, v)| (*k, *v)).collect();
    let expected: Vec<_> = model.into_iter().collect();
    assert_eq!(order, expected);
}
