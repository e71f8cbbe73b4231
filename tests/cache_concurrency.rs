// ==============================================
// INTEGRITY CACHE CONCURRENCY TESTS (integration)
// ==============================================
//
// Shared-cache behavior under parallel readers and writers: bookkeeping
// stays consistent, capacity holds, and write-once races surface exactly
// one conflict.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use ftlcache::args;
use ftlcache::args::ArgBag;
use ftlcache::builder::CacheBuilder;
use ftlcache::bundle::CachedFormatter;
use ftlcache::error::{CacheError, FormatError, ResolutionError};
use ftlcache::key::{CacheKey, normalize};
use ftlcache::store::{ErrorCategory, ErrorRecord};

fn key(message_id: &str, n: i64) -> CacheKey {
    normalize(message_id, None, &args! { "n" => n }).unwrap()
}

// ==============================================
// Shared get/put
// ==============================================

mod shared_access {
    use super::*;

    #[test]
    fn parallel_get_put_keeps_bookkeeping_consistent() {
        let capacity = 64;
        let cache = Arc::new(CacheBuilder::new(capacity).audit(true).build());
        let threads = 8;
        let ops = 500;
        let barrier = Arc::new(Barrier::new(threads));

        let handles: Vec<_> = (0..threads)
            .map(|t| {
                let cache = Arc::clone(&cache);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    for i in 0..ops {
                        let k = key("msg", ((t * 31 + i) % 200) as i64);
                        match cache.get(&k).unwrap() {
                            Some(entry) => assert!(entry.verify()),
                            None => cache
                                .put(k.clone(), format!("value {}", k.fingerprint()), Vec::new())
                                .unwrap(),
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        cache.check_invariants().unwrap();
        let stats = cache.stats();
        assert!(cache.len() <= capacity, "len {} > capacity", cache.len());
        assert_eq!(stats.size, cache.len());
        assert_eq!(stats.lookups(), (threads * ops) as u64);
        assert_eq!(stats.corruption_detected, 0);
        assert!(stats.evictions > 0, "workload should overflow capacity");
    }

    #[test]
    fn concurrent_identical_puts_are_idempotent() {
        let cache = Arc::new(CacheBuilder::new(8).write_once(true).build());
        let threads = 6;
        let barrier = Arc::new(Barrier::new(threads));
        let errors = vec![ErrorRecord::new(ErrorCategory::Reference, "unknown $x")];

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let barrier = Arc::clone(&barrier);
                let errors = errors.clone();
                thread::spawn(move || {
                    barrier.wait();
                    cache.put(key("same", 1), "same text".into(), errors)
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        let stats = cache.stats();
        assert_eq!(cache.len(), 1);
        assert_eq!(stats.puts, 1);
        assert_eq!(stats.idempotent_writes, (threads - 1) as u64);
        assert_eq!(stats.write_conflicts, 0);
        cache.check_invariants().unwrap();
    }

    #[test]
    fn clear_during_traffic_leaves_cache_usable() {
        let cache = Arc::new(CacheBuilder::new(32).build());
        let barrier = Arc::new(Barrier::new(5));

        let mut handles: Vec<_> = (0..4)
            .map(|t| {
                let cache = Arc::clone(&cache);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    for i in 0..300 {
                        let k = key("busy", (t * 1000 + i) as i64);
                        cache.put(k.clone(), "x".into(), Vec::new()).unwrap();
                        let _ = cache.get(&k).unwrap();
                    }
                })
            })
            .collect();
        handles.push({
            let cache = Arc::clone(&cache);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..20 {
                    cache.clear();
                    thread::yield_now();
                }
            })
        });
        for handle in handles {
            handle.join().unwrap();
        }

        cache.check_invariants().unwrap();
        assert!(cache.len() <= 32);
        cache.put(key("after", 0), "ok".into(), Vec::new()).unwrap();
        assert!(cache.contains(&key("after", 0)).unwrap());
    }
}

// ==============================================
// Formatter races
// ==============================================

mod formatter_races {
    use super::*;

    #[test]
    fn write_once_race_reports_exactly_one_conflict() {
        let barrier = Barrier::new(2);
        let resolver = |id: &str, _args: &ArgBag, _attr: Option<&str>| {
            // Both callers miss before either stores.
            barrier.wait();
            Ok::<_, ResolutionError>((
                format!("{id} from {:?}", thread::current().id()),
                Vec::<ErrorRecord>::new(),
            ))
        };
        let formatter = CachedFormatter::new(resolver, CacheBuilder::new(8).write_once(true).build());

        let results: Vec<_> = thread::scope(|scope| {
            let handles: Vec<_> = (0..2)
                .map(|_| scope.spawn(|| formatter.format("greeting", &ArgBag::new(), None)))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(FormatError::Cache(CacheError::WriteConflict { .. }))))
            .count();
        let successes = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(conflicts, 1, "results: {results:?}");
        assert_eq!(successes, 1, "results: {results:?}");

        let cache = formatter.cache().unwrap();
        assert_eq!(cache.stats().write_conflicts, 1);
        assert_eq!(cache.len(), 1);

        // The stored value is the winner's.
        let winner = results.into_iter().find_map(Result::ok).unwrap();
        let cached = cache
            .get(&normalize("greeting", None, &ArgBag::new()).unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(cached.formatted(), winner.0);
    }

    #[test]
    fn deterministic_resolver_shares_cached_results() {
        let calls = AtomicUsize::new(0);
        let resolver = |id: &str, args: &ArgBag, _attr: Option<&str>| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ResolutionError>((format!("{id}/{}", args.len()), Vec::<ErrorRecord>::new()))
        };
        let formatter = CachedFormatter::new(resolver, CacheBuilder::new(16).write_once(true).build());

        thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for i in 0..50 {
                        let bag = args! { "i" => (i % 5) as i64 };
                        let (text, errors) = formatter.format("item", &bag, None).unwrap();
                        assert_eq!(text, "item/1");
                        assert!(errors.is_empty());
                    }
                });
            }
        });

        let stats = formatter.cache().unwrap().stats();
        assert_eq!(stats.write_conflicts, 0);
        assert_eq!(formatter.cache().unwrap().len(), 5);
        assert!(calls.load(Ordering::SeqCst) < 200, "cache never hit");
    }
}
