//! The crash-context writers must not touch the heap once the session is open.
//!
//! A counting global allocator tallies every allocation made by the current
//! thread while a closure runs. Other test threads are not counted.

#![cfg(target_os = "linux")]

use std::alloc::{GlobalAlloc, Layout, System};
use std::cell::Cell;
use std::hint::black_box;

use crashsym_core::{Address, FrameBuffer, SessionStatus, StackTraceBuffer, SymbolicationConfig, Symbolicator};

struct CountingAllocator;

thread_local! {
    static COUNT: Cell<Option<usize>> = const { Cell::new(None) };
}

fn record()
{
    let _ = COUNT.try_with(|count| {
        if let Some(n) = count.get() {
            count.set(Some(n + 1));
        }
    });
}

unsafe impl GlobalAlloc for CountingAllocator
{
    unsafe fn alloc(&self, layout: Layout) -> *mut u8
    {
        record();
        unsafe { System.alloc(layout) }
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8
    {
        record();
        unsafe { System.alloc_zeroed(layout) }
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8
    {
        record();
        unsafe { System.realloc(ptr, layout, new_size) }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout)
    {
        unsafe { System.dealloc(ptr, layout) }
    }
}

#[global_allocator]
static ALLOCATOR: CountingAllocator = CountingAllocator;

fn allocations_during<R>(f: impl FnOnce() -> R) -> (usize, R)
{
    COUNT.with(|count| count.set(Some(0)));
    let result = f();
    let counted = COUNT.with(|count| count.replace(None)).unwrap_or(0);
    (counted, result)
}

#[inline(never)]
fn resolved_target() -> u32
{
    black_box(7)
}

#[inline(never)]
fn warm_up_target() -> u32
{
    black_box(9)
}

fn open_symbolicator() -> Symbolicator
{
    let symbolicator = Symbolicator::new(SymbolicationConfig::default());
    assert_eq!(symbolicator.init(), SessionStatus::Ready);

    // First hits register tracing callsites and fault in dladdr's state.
    for address in [warm_up_target as usize, resolved_target as usize] {
        let mut out = FrameBuffer::<512>::new();
        symbolicator.write_frame_line(&mut out, address).unwrap();
        let mut buffer = StackTraceBuffer::<2048>::new();
        symbolicator.append_stack_line(&mut buffer, address);
    }
    symbolicator
}

#[test]
fn test_frame_line_does_not_allocate()
{
    let symbolicator = open_symbolicator();
    let address = Address::from(resolved_target as usize);
    let mut out = FrameBuffer::<512>::new();

    let (allocations, written) = allocations_during(|| symbolicator.write_frame_line(&mut out, address));
    written.unwrap();

    assert_eq!(allocations, 0, "write_frame_line allocated: {}", out.as_str());
    assert!(out.as_str().contains("resolved_target"), "{}", out.as_str());
    assert!(out.as_str().contains("allocation.rs:"), "{}", out.as_str());
}

#[test]
fn test_stack_line_does_not_allocate()
{
    let symbolicator = open_symbolicator();
    let address = Address::from(resolved_target as usize);
    let mut buffer = StackTraceBuffer::<2048>::new();

    let (allocations, pushed) = allocations_during(|| symbolicator.append_stack_line(&mut buffer, address));

    assert!(pushed);
    assert_eq!(allocations, 0, "append_stack_line allocated: {}", buffer.as_str());
    assert!(buffer.as_str().contains("resolved_target + some bytes ["), "{}", buffer.as_str());
}

#[test]
fn test_counter_sees_allocations()
{
    let (allocations, text) = allocations_during(|| black_box(String::from("heap")));
    assert!(allocations >= 1);
    assert_eq!(text, "heap");
}
