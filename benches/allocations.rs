//! Allocation tracking for the registry read and write paths.
//!
//! Every buffer a call allocates must be released on every exit, including
//! the error paths. These benches count allocations per call and report any
//! bytes still held after the loop.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use registry_bridge::prelude::*;
use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Counts allocations and bytes passing through the system allocator.
struct TrackingAllocator {
    allocations: AtomicUsize,
    bytes_allocated: AtomicUsize,
    bytes_deallocated: AtomicUsize,
}

impl TrackingAllocator {
    const fn new() -> Self {
        Self {
            allocations: AtomicUsize::new(0),
            bytes_allocated: AtomicUsize::new(0),
            bytes_deallocated: AtomicUsize::new(0),
        }
    }

    fn reset(&self) {
        self.allocations.store(0, Ordering::SeqCst);
        self.bytes_allocated.store(0, Ordering::SeqCst);
        self.bytes_deallocated.store(0, Ordering::SeqCst);
    }

    fn allocations(&self) -> usize {
        self.allocations.load(Ordering::SeqCst)
    }

    fn held_bytes(&self) -> usize {
        self.bytes_allocated
            .load(Ordering::SeqCst)
            .saturating_sub(self.bytes_deallocated.load(Ordering::SeqCst))
    }
}

unsafe impl GlobalAlloc for TrackingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = System.alloc(layout);
        if !ptr.is_null() {
            self.allocations.fetch_add(1, Ordering::SeqCst);
            self.bytes_allocated.fetch_add(layout.size(), Ordering::SeqCst);
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        self.bytes_deallocated.fetch_add(layout.size(), Ordering::SeqCst);
        System.dealloc(ptr, layout)
    }
}

#[global_allocator]
static ALLOCATOR: TrackingAllocator = TrackingAllocator::new();

/// Runs `op` `iters` times and reports allocations and held bytes.
fn tracked(label: &str, iters: u64, mut op: impl FnMut()) -> std::time::Duration {
    ALLOCATOR.reset();
    let start = std::time::Instant::now();
    for _ in 0..iters {
        op();
    }
    let elapsed = start.elapsed();

    if iters == 1 {
        eprintln!("\n{}: {} allocs per call", label, ALLOCATOR.allocations());
    }
    let held = ALLOCATOR.held_bytes();
    if held > 0 && iters > 0 {
        eprintln!(
            "\nWARNING: {} held {} bytes after {} iterations",
            label, held, iters
        );
    }
    elapsed
}

fn fixture() -> RegistryKey {
    let hkcu = RegistryKey::root(Arc::new(MemoryRegistry::new()), Predefined::CurrentUser);
    let key = hkcu.create_subkey("Alloc", None, Access::ALL).unwrap();
    key.set_registry_value(&RegistryValue::string("Name", "Alice")).unwrap();
    key.set_registry_value(&RegistryValue::multi_string("Tags", ["a", "", "bb"]))
        .unwrap();
    key.set_registry_value(&RegistryValue::dword("Count", 0)).unwrap();
    key
}

fn bench_read_paths(c: &mut Criterion) {
    let mut group = c.benchmark_group("read_allocations");
    let key = fixture();

    group.bench_function("string_read", |b| {
        b.iter_custom(|iters| {
            tracked("string read", iters, || {
                black_box(key.get_string_value("Name").unwrap());
            })
        });
    });

    group.bench_function("multi_string_read", |b| {
        b.iter_custom(|iters| {
            tracked("multi-string read", iters, || {
                black_box(key.get_value("Tags").unwrap());
            })
        });
    });

    group.bench_function("enumeration", |b| {
        b.iter_custom(|iters| {
            tracked("enumeration", iters, || {
                for name in key.values().unwrap() {
                    black_box(name.unwrap());
                }
            })
        });
    });

    group.finish();
}

fn bench_error_paths(c: &mut Criterion) {
    let mut group = c.benchmark_group("error_path_leaks");
    let key = fixture();

    group.bench_function("missing_value", |b| {
        b.iter_custom(|iters| {
            tracked("missing value", iters, || {
                black_box(key.get_string_value("Missing").unwrap_err());
            })
        });
    });

    group.bench_function("type_mismatch", |b| {
        b.iter_custom(|iters| {
            tracked("type mismatch", iters, || {
                black_box(key.get_string_value("Count").unwrap_err());
            })
        });
    });

    group.bench_function("unsupported_write", |b| {
        let value = RegistryValue::new("Typed", ValueKind::String).unwrap();
        b.iter_custom(|iters| {
            tracked("write without data", iters, || {
                black_box(key.set_registry_value(&value).unwrap_err());
            })
        });
    });

    group.finish();
}

criterion_group!(benches, bench_read_paths, bench_error_paths);
criterion_main!(benches);
