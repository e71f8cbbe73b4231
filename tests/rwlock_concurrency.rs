// ==============================================
// RWLOCK CONCURRENCY TESTS (integration)
// ==============================================
//
// Multi-threaded behavior of the reader-writer lock: real reader overlap,
// writer preference, timeout accounting and mutual exclusion.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use ftlcache::sync::{LockSnapshot, LockStatus, RwLock};

fn wait_for(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(1));
    }
}

// ==============================================
// Readers overlap
// ==============================================

mod reader_overlap {
    use super::*;

    #[test]
    fn concurrent_readers_are_active_together() {
        let readers = 4;
        let lock = Arc::new(RwLock::new(()));
        let active = Arc::new(AtomicUsize::new(0));
        let max_active = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(readers));

        let handles: Vec<_> = (0..readers)
            .map(|_| {
                let lock = Arc::clone(&lock);
                let active = Arc::clone(&active);
                let max_active = Arc::clone(&max_active);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    let _guard = lock.read(None).unwrap();
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    max_active.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(50));
                    active.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert!(
            max_active.load(Ordering::SeqCst) >= 2,
            "readers were serialized"
        );
        assert_eq!(lock.status(), LockStatus::Free);
    }
}

// ==============================================
// Writer preference
// ==============================================

mod writer_preference {
    use super::*;

    #[test]
    fn waiting_writer_is_served_before_later_readers() {
        let lock = Arc::new(RwLock::new(()));
        let order = Arc::new(Mutex::new(Vec::new()));

        let held = lock.read(None).unwrap();

        let writer = {
            let lock = Arc::clone(&lock);
            let order = Arc::clone(&order);
            thread::spawn(move || {
                let _guard = lock.write(None).unwrap();
                order.lock().unwrap().push("writer");
                thread::sleep(Duration::from_millis(20));
            })
        };
        wait_for(|| lock.snapshot().waiting_writers == 1);

        let reader = {
            let lock = Arc::clone(&lock);
            let order = Arc::clone(&order);
            thread::spawn(move || {
                let _guard = lock.read(None).unwrap();
                order.lock().unwrap().push("reader");
            })
        };
        thread::sleep(Duration::from_millis(30));
        assert_eq!(
            lock.status(),
            LockStatus::Reading(1),
            "late reader must not join while a writer waits"
        );

        drop(held);
        writer.join().unwrap();
        reader.join().unwrap();

        assert_eq!(*order.lock().unwrap(), vec!["writer", "reader"]);
    }

    #[test]
    fn reentrant_read_is_granted_while_writer_waits() {
        let lock = Arc::new(RwLock::new(()));
        let outer = lock.read(None).unwrap();

        let writer = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || {
                drop(lock.write(None).unwrap());
            })
        };
        wait_for(|| lock.snapshot().waiting_writers == 1);

        let inner = lock.read(Some(Duration::ZERO)).unwrap();
        drop(inner);
        drop(outer);
        writer.join().unwrap();
    }

    #[test]
    fn waiting_writer_is_not_starved_by_reader_stream() {
        let lock = Arc::new(RwLock::new(()));
        let stop = Arc::new(AtomicBool::new(false));

        let first_writer = lock.write(None).unwrap();

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let lock = Arc::clone(&lock);
                let stop = Arc::clone(&stop);
                thread::spawn(move || {
                    while !stop.load(Ordering::Relaxed) {
                        if let Ok(_guard) = lock.read(Some(Duration::from_millis(5))) {
                            thread::sleep(Duration::from_millis(1));
                        }
                    }
                })
            })
            .collect();

        let second_writer = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || {
                let started = Instant::now();
                let _guard = lock.write(None).unwrap();
                started.elapsed()
            })
        };
        wait_for(|| lock.snapshot().waiting_writers == 1);

        thread::sleep(Duration::from_millis(20));
        drop(first_writer);

        let waited = second_writer.join().unwrap();
        stop.store(true, Ordering::Relaxed);
        for reader in readers {
            reader.join().unwrap();
        }

        assert!(
            waited < Duration::from_secs(2),
            "waiting writer starved for {waited:?}"
        );
    }
}

// ==============================================
// Timeout accounting
// ==============================================

mod timeouts {
    use super::*;

    #[test]
    fn timed_out_writers_do_not_leak_waiting_count() {
        let lock = Arc::new(RwLock::new(()));
        let held = lock.read(None).unwrap();
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lock = Arc::clone(&lock);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    for _ in 0..25 {
                        let err = lock.write(Some(Duration::from_millis(1))).unwrap_err();
                        assert!(err.is_timeout());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(
            lock.snapshot(),
            LockSnapshot {
                active_readers: 1,
                writer_active: false,
                waiting_writers: 0,
            }
        );
        drop(held);
        drop(lock.write(Some(Duration::ZERO)).unwrap());
    }

    #[test]
    fn readers_resume_after_waiting_writer_times_out() {
        let lock = Arc::new(RwLock::new(()));
        let held = lock.read(None).unwrap();

        let writer = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || lock.write(Some(Duration::from_millis(100))).is_err())
        };
        wait_for(|| lock.snapshot().waiting_writers == 1);

        // Blocked behind the waiting writer until it gives up.
        let reader = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || lock.read(Some(Duration::from_secs(5))).is_ok())
        };

        assert!(writer.join().unwrap(), "writer should have timed out");
        assert!(reader.join().unwrap(), "reader should proceed after timeout");
        drop(held);
        assert_eq!(lock.snapshot(), LockSnapshot::default());
    }

    #[test]
    fn negative_timeout_fails_before_touching_state() {
        let lock = RwLock::new(());
        assert!(lock.write_secs(-1.0).is_err());
        assert!(lock.read_secs(-0.5).is_err());
        assert_eq!(lock.snapshot(), LockSnapshot::default());
        drop(lock.write(None).unwrap());
    }
}

// ==============================================
// Mutual exclusion
// ==============================================

mod exclusion {
    use super::*;

    #[test]
    fn readers_never_observe_half_written_state() {
        let lock = Arc::new(RwLock::new([0u64; 2]));
        let writers = 4;
        let readers = 4;
        let iterations = 500;
        let barrier = Arc::new(Barrier::new(writers + readers));

        let mut handles = Vec::new();
        for _ in 0..writers {
            let lock = Arc::clone(&lock);
            let barrier = Arc::clone(&barrier);
            handles.push(thread::spawn(move || {
                barrier.wait();
                for _ in 0..iterations {
                    let mut guard = lock.write(None).unwrap();
                    guard[0] += 1;
                    thread::yield_now();
                    guard[1] += 1;
                }
            }));
        }
        for _ in 0..readers {
            let lock = Arc::clone(&lock);
            let barrier = Arc::clone(&barrier);
            handles.push(thread::spawn(move || {
                barrier.wait();
                for _ in 0..iterations {
                    let guard = lock.read(None).unwrap();
                    assert_eq!(guard[0], guard[1], "torn read");
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let total = (writers * iterations) as u64;
        assert_eq!(*lock.read(None).unwrap(), [total, total]);
        assert_eq!(lock.snapshot(), LockSnapshot::default());
    }

    #[test]
    fn status_never_shows_reader_and_writer_together() {
        let lock = Arc::new(RwLock::new(()));
        let stop = Arc::new(AtomicBool::new(false));

        let workers: Vec<_> = (0..4)
            .map(|i| {
                let lock = Arc::clone(&lock);
                let stop = Arc::clone(&stop);
                thread::spawn(move || {
                    while !stop.load(Ordering::Relaxed) {
                        if i % 2 == 0 {
                            drop(lock.write(None).unwrap());
                        } else {
                            drop(lock.read(None).unwrap());
                        }
                    }
                })
            })
            .collect();

        for _ in 0..2000 {
            let snap = lock.snapshot();
            assert!(
                !(snap.writer_active && snap.active_readers > 0),
                "reader and writer active together: {snap:?}"
            );
        }
        stop.store(true, Ordering::Relaxed);
        for worker in workers {
            worker.join().unwrap();
        }
    }
}
