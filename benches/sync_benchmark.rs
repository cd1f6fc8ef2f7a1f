/*!
 * Synchronization Primitives Benchmarks
 *
 * Uncontended fast paths and contended handoff throughput of the queued locks
 */

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use qlock_sync::{FastLock, QueuedMutex, QueuedRWLock, SyncConfig, SyncContext, WaitCondition};
use std::sync::Arc;
use std::thread;

fn bench_uncontended(c: &mut Criterion) {
    let mut group = c.benchmark_group("uncontended");
    let ctx = SyncContext::new(SyncConfig::default());

    let fast = FastLock::new(0u64);
    group.bench_function("fast_lock", |b| {
        b.iter(|| {
            *fast.lock() += 1;
        });
    });

    let mutex = QueuedMutex::new(ctx.clone());
    group.bench_function("queued_mutex", |b| {
        b.iter(|| {
            mutex.lock();
            black_box(&mutex);
            mutex.unlock();
        });
    });

    let rwlock = QueuedRWLock::new(ctx.clone());
    group.bench_function("rwlock_read", |b| {
        b.iter(|| {
            rwlock.read_lock();
            black_box(&rwlock);
            rwlock.read_unlock();
        });
    });
    group.bench_function("rwlock_write", |b| {
        b.iter(|| {
            rwlock.write_lock();
            black_box(&rwlock);
            rwlock.write_unlock();
        });
    });

    group.finish();
}

fn bench_contended_mutex(c: &mut Criterion) {
    let mut group = c.benchmark_group("contended_mutex");
    group.sample_size(20);

    for threads in [2, 4, 8] {
        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, &threads| {
            let mutex = Arc::new(QueuedMutex::new(SyncContext::new(SyncConfig::default())));
            b.iter(|| {
                let handles: Vec<_> = (0..threads)
                    .map(|_| {
                        let mutex = mutex.clone();
                        thread::spawn(move || {
                            for _ in 0..100 {
                                mutex.lock();
                                black_box(&mutex);
                                mutex.unlock();
                            }
                        })
                    })
                    .collect();
                for handle in handles {
                    handle.join().unwrap();
                }
            });
        });
    }

    group.finish();
}

fn bench_contended_fast_lock(c: &mut Criterion) {
    let mut group = c.benchmark_group("contended_fast_lock");
    group.sample_size(20);

    for threads in [2, 4, 8] {
        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, &threads| {
            let lock = Arc::new(FastLock::new(0u64));
            b.iter(|| {
                let handles: Vec<_> = (0..threads)
                    .map(|_| {
                        let lock = lock.clone();
                        thread::spawn(move || {
                            for _ in 0..100 {
                                *lock.lock() += 1;
                            }
                        })
                    })
                    .collect();
                for handle in handles {
                    handle.join().unwrap();
                }
            });
        });
    }

    group.finish();
}

fn bench_rwlock_mixed(c: &mut Criterion) {
    let mut group = c.benchmark_group("rwlock_mixed");
    group.sample_size(20);

    // Writers per 8 threads
    for writers in [1, 4] {
        group.bench_with_input(BenchmarkId::from_parameter(writers), &writers, |b, &writers| {
            let lock = Arc::new(QueuedRWLock::new(SyncContext::new(SyncConfig::default())));
            b.iter(|| {
                let handles: Vec<_> = (0..8)
                    .map(|i| {
                        let lock = lock.clone();
                        thread::spawn(move || {
                            for _ in 0..50 {
                                if i < writers {
                                    lock.write_lock();
                                    lock.write_unlock();
                                } else {
                                    lock.read_lock();
                                    lock.read_unlock();
                                }
                            }
                        })
                    })
                    .collect();
                for handle in handles {
                    handle.join().unwrap();
                }
            });
        });
    }

    group.finish();
}

fn bench_condition_ping_pong(c: &mut Criterion) {
    let mut group = c.benchmark_group("condition");
    group.sample_size(20);

    group.bench_function("ping_pong", |b| {
        let mutex = Arc::new(QueuedMutex::new(SyncContext::new(SyncConfig::default())));
        let cond = Arc::new(WaitCondition::new(mutex.clone()));
        b.iter(|| {
            let cond_clone = cond.clone();
            mutex.lock();
            let sleeper = thread::spawn(move || {
                cond_clone.mutex().lock();
                cond_clone.wait();
                cond_clone.mutex().unlock();
            });
            mutex.unlock();
            loop {
                mutex.lock();
                if cond.wake_one() == 1 {
                    mutex.unlock();
                    break;
                }
                mutex.unlock();
                thread::yield_now();
            }
            sleeper.join().unwrap();
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_uncontended,
    bench_contended_mutex,
    bench_contended_fast_lock,
    bench_rwlock_mixed,
    bench_condition_ping_pong
);
criterion_main!(benches);
