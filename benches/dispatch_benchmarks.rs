//! Dispatch benchmarks.
//!
//! Measures the paths a call can take through an overload set:
//! - single overload (no hashing)
//! - cache hit after the first resolution
//! - cache miss degrading to a linear scan
//! - proxy identity lookups for reference results
//!
//! ## Profiling with Puffin
//!
//! ```bash
//! cargo bench --features profile-with-puffin -- --profile-time 5
//! ```

#[path = "../tests/common/mod.rs"]
mod common;

use std::hint::black_box;
use std::sync::Arc;

use common::{MockReflection, alloc};
use criterion::{Criterion, criterion_group, criterion_main};
use crossbind::prelude::*;
use crossbind_core::SlotValue;

#[cfg(feature = "profile-with-puffin")]
static FRAME_VIEW: std::sync::OnceLock<puffin::GlobalFrameView> = std::sync::OnceLock::new();

#[cfg(feature = "profile-with-puffin")]
fn setup_profiler() {
    puffin::set_scopes_on(true);
    FRAME_VIEW.get_or_init(puffin::GlobalFrameView::default);
}

#[cfg(not(feature = "profile-with-puffin"))]
fn setup_profiler() {}

#[cfg(feature = "profile-with-puffin")]
fn end_profiling_frame() {
    puffin::GlobalProfiler::lock().new_frame();
}

#[cfg(not(feature = "profile-with-puffin"))]
fn end_profiling_frame() {}

fn setup() -> (Bridge, ScopeId, ScopeId) {
    let mock = Arc::new(MockReflection::new());
    mock.class("std::string", 16);
    let lib = mock.namespace("lib");
    mock.method(lib, "single", "int", &["int"], |_, args| {
        Some(SlotValue::Int32(args[0].value.as_i128().unwrap_or(0) as i32))
    });
    for (arg, tag) in [("int", 1), ("double", 2), ("const std::string&", 3), ("bool", 4)] {
        mock.method(lib, "f", "int", &[arg], move |_, _| Some(SlotValue::Int32(tag)));
    }
    let node = mock.class("Node", 16);
    mock.constructor(node, &[], |_, _| Some(SlotValue::Address(alloc(16))));
    mock.method(node, "self_ref", "Node&", &[], |this, _| Some(SlotValue::Address(this)));
    (Bridge::new(mock, BridgeConfig::default()), lib, node)
}

fn dispatch_benchmarks(c: &mut Criterion) {
    setup_profiler();
    let (bridge, lib, _) = setup();
    let mut group = c.benchmark_group("dispatch");

    group.bench_function("single_overload", |b| {
        let args = [Value::Int(7)];
        b.iter(|| {
            let result = bridge.call(lib, "single", None, black_box(&args)).unwrap();
            end_profiling_frame();
            black_box(result)
        });
    });

    group.bench_function("cache_hit", |b| {
        let args = [Value::from("cached")];
        bridge.call(lib, "f", None, &args).unwrap();
        b.iter(|| {
            let result = bridge.call(lib, "f", None, black_box(&args)).unwrap();
            end_profiling_frame();
            black_box(result)
        });
    });

    group.bench_function("linear_scan", |b| {
        let set = bridge.lookup_overload(lib, "f").unwrap();
        let args = [Value::from("scan")];
        b.iter(|| {
            // a fresh set per iteration never has a cached resolution
            let fresh = OverloadSet::new("f", set.callables(), set.flags(), MemoryPolicy::Heuristics);
            let result = fresh.call(bridge.runtime(), None, black_box(&args)).unwrap();
            end_profiling_frame();
            black_box(result)
        });
    });

    group.finish();
}

fn identity_benchmarks(c: &mut Criterion) {
    setup_profiler();
    let (bridge, _, node) = setup();
    let object = bridge.construct(node, &[]).unwrap().as_object().unwrap();
    let mut group = c.benchmark_group("identity");

    group.bench_function("reference_result", |b| {
        b.iter(|| {
            let result = bridge.call_method(black_box(object), "self_ref", &[]).unwrap();
            end_profiling_frame();
            black_box(result)
        });
    });

    group.bench_function("retrieve_or_create", |b| {
        let native = bridge.space().get_object(object).unwrap();
        b.iter(|| black_box(bridge.retrieve_or_create(black_box(native), node)));
    });

    group.finish();
}

criterion_group!(benches, dispatch_benchmarks, identity_benchmarks);
criterion_main!(benches);
