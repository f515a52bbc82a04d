use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ma_collection_cache::CompiledCache;

fn cache(capacity: usize) -> CompiledCache<String, String> {
    CompiledCache::new(NonZeroUsize::new(capacity).unwrap())
}

fn compile(path: &String) -> Result<String, String> {
    if path.is_empty() {
        Err("empty path".to_string())
    } else {
        Ok(path.to_uppercase())
    }
}

#[test]
fn hit_returns_the_same_compiled_value() {
    let cache = cache(4);
    let first = cache.get_or_compile("a.b".to_string(), compile).unwrap();
    let second = cache.get_or_compile("a.b".to_string(), compile).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(*first, "A.B");
}

#[test]
fn compile_errors_are_not_cached() {
    let cache = cache(4);
    assert_eq!(
        cache.get_or_compile(String::new(), compile),
        Err("empty path".to_string())
    );
    assert_eq!(cache.len_strong(), 0);
    assert_eq!(cache.len_weak(), 0);
    assert!(cache.get(&String::new()).is_none());
}

#[test]
fn lru_eviction_keeps_values_held_elsewhere() {
    let cache = cache(1);
    let held = cache.get_or_compile("x".to_string(), compile).unwrap();
    cache.get_or_compile("y".to_string(), compile).unwrap();
    assert_eq!(cache.len_strong(), 1);
    assert_eq!(cache.len_weak(), 2);

    let again = cache.get(&"x".to_string()).unwrap();
    assert!(Arc::ptr_eq(&held, &again));
}

#[test]
fn dropped_values_are_compiled_again() {
    let cache = cache(1);
    let calls = AtomicUsize::new(0);
    let counting = |path: &String| {
        calls.fetch_add(1, Ordering::SeqCst);
        compile(path)
    };
    drop(cache.get_or_compile("x".to_string(), counting).unwrap());
    drop(cache.get_or_compile("y".to_string(), counting).unwrap());
    assert!(cache.get(&"x".to_string()).is_none());
    cache.get_or_compile("x".to_string(), counting).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[test]
fn concurrent_misses_compile_once() {
    let cache = cache(8);
    let calls = AtomicUsize::new(0);
    std::thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|| {
                let value = cache
                    .get_or_compile("shared".to_string(), |path| {
                        calls.fetch_add(1, Ordering::SeqCst);
                        compile(path)
                    })
                    .unwrap();
                assert_eq!(*value, "SHARED");
            });
        }
    });
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn clear_empties_both_tiers() {
    let cache = cache(2);
    let _held = cache.get_or_compile("x".to_string(), compile).unwrap();
    cache.clear();
    assert_eq!(cache.len_strong(), 0);
    assert_eq!(cache.len_weak(), 0);
}
