//! Cycle collection via synchronous trial deletion
//!
//! Every decrement that leaves an object alive buffers it as a possible root
//! of a garbage cycle. A collection then runs four walks over the strong
//! edges reachable from the buffered roots:
//! 1. Mark: grey every object, trial-decrementing its children
//! 2. Scan: objects with shared references left, or held by a memo, are
//!    reached again; the rest turn white
//! 3. Reach: restore counts below reached objects, colouring them black
//! 4. Collect: detach the edges of white objects and destroy them
//!
//! Based on Bacon and Rajan's synchronous cycle collector. The subgraph
//! reachable from this thread's candidates must not be mutated by other
//! threads during a collection.

use super::{Color, GC_STATE};
use crate::logging::{debug, log_gc_mark, log_gc_start, log_gc_sweep, perf, trace};
use crate::object::ObjectHeader;
use crate::visit::{Edge, Visitor};
use core::cell::{Cell, RefCell};
use core::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

type Node = NonNull<ObjectHeader>;

/// Candidate roots of this thread, each pinned through a memo-key count
struct Candidates {
    roots: Vec<Node>,
}

impl Candidates {
    const fn new() -> Self {
        Self { roots: Vec::new() }
    }
}

impl Drop for Candidates {
    fn drop(&mut self) {
        unpin(core::mem::take(&mut self.roots));
    }
}

thread_local! {
    static CANDIDATES: RefCell<Candidates> = const { RefCell::new(Candidates::new()) };
    static COLLECTING: Cell<bool> = const { Cell::new(false) };
}

/// Process-wide totals
pub(super) struct CollectorTotals {
    pub candidates_scanned: AtomicUsize,
    pub objects_collected: AtomicUsize,
    pub candidates_purged: AtomicUsize,
}

pub(super) static TOTALS: CollectorTotals = CollectorTotals {
    candidates_scanned: AtomicUsize::new(0),
    objects_collected: AtomicUsize::new(0),
    candidates_purged: AtomicUsize::new(0),
};

fn unpin(roots: Vec<Node>) {
    for root in roots {
        let header = unsafe { root.as_ref() };
        header.clear_buffered();
        header.dec_memo_key();
    }
}

/// Buffer `header` as a possible cycle root (at most once)
pub fn register_candidate(header: &ObjectHeader) {
    if !header.try_buffer() {
        return;
    }
    header.inc_memo_key();
    let node = header.as_ptr();
    let buffered = CANDIDATES
        .try_with(|candidates| {
            let mut candidates = candidates.borrow_mut();
            candidates.roots.push(node);
            candidates.roots.len()
        })
        .ok();

    let Some(buffered) = buffered else {
        // Thread teardown: nowhere to buffer
        header.clear_buffered();
        header.dec_memo_key();
        return;
    };
    trace!(event = "gc_candidate", class = header.class_name(), buffered);

    let threshold = GC_STATE.threshold();
    if GC_STATE.auto_collect() {
        if buffered >= threshold {
            super::maybe_collect();
        }
    } else if buffered % threshold == 0 {
        // Live candidates survive a purge; retry after another batch
        purge();
    }
}

/// Candidates buffered on this thread
pub fn candidate_count() -> usize {
    CANDIDATES
        .try_with(|candidates| candidates.borrow().roots.len())
        .unwrap_or(0)
}

fn take_candidates() -> Vec<Node> {
    CANDIDATES
        .try_with(|candidates| core::mem::take(&mut candidates.borrow_mut().roots))
        .unwrap_or_default()
}

/// A buffered root is only interesting while it is shared-reachable
#[inline]
fn is_live_root(header: &ObjectHeader) -> bool {
    !header.is_destroyed() && header.shared_count() > 0
}

/// Drop candidates that can no longer root a cycle
pub fn purge() {
    let roots = take_candidates();
    let before = roots.len();
    let (live, dead): (Vec<Node>, Vec<Node>) = roots
        .into_iter()
        .partition(|root| is_live_root(unsafe { root.as_ref() }));
    let purged = dead.len();
    // Put the live ones back before releasing, which may buffer new candidates
    let _ = CANDIDATES.try_with(|candidates| candidates.borrow_mut().roots.extend(live));
    unpin(dead);
    TOTALS.candidates_purged.fetch_add(purged, Ordering::Relaxed);
    debug!(before, purged, "purged cycle candidates");
}

/// Unpin every buffered candidate without collecting
pub fn clear_candidates() {
    unpin(take_candidates());
}

/// Collect garbage cycles rooted at this thread's candidates.
///
/// Returns the number of objects destroyed. Re-entrant calls (from
/// destructors running inside a collection) return zero.
pub fn collect_cycles() -> usize {
    if COLLECTING.try_with(|flag| flag.replace(true)).unwrap_or(true) {
        return 0;
    }
    let _timer = perf::track("collect_cycles");

    let roots = take_candidates();
    log_gc_start(roots.len());
    TOTALS.candidates_scanned.fetch_add(roots.len(), Ordering::Relaxed);

    let live: Vec<Node> = roots
        .iter()
        .copied()
        .filter(|root| is_live_root(unsafe { root.as_ref() }))
        .collect();

    let mut marked = 0;
    for &root in &live {
        marked += mark_gray(root);
    }
    log_gc_mark(marked);

    for &root in &live {
        scan(root);
    }

    let mut whites = Vec::new();
    let mut releases = Vec::new();
    for &root in &live {
        collect_white(root, &mut whites, &mut releases);
    }

    for white in &whites {
        unsafe { white.as_ref() }.collect_garbage();
    }
    for target in releases {
        unsafe { target.as_ref() }.dec_shared();
    }
    unpin(roots);

    let collected = whites.len();
    log_gc_sweep(collected);
    TOTALS.objects_collected.fetch_add(collected, Ordering::Relaxed);
    let _ = COLLECTING.try_with(|flag| flag.set(false));
    collected
}

// ===== Mark =====

struct Marker<'a> {
    stack: &'a mut Vec<Node>,
}

impl Visitor for Marker<'_> {
    fn visit(&mut self, edge: &dyn Edge) {
        if !edge.is_strong() {
            return;
        }
        if let Some(target) = edge.target() {
            unsafe { target.as_ref() }.trial_dec();
            self.stack.push(target);
        }
    }
}

fn mark_gray(root: Node) -> usize {
    let mut marked = 0;
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        let header = unsafe { node.as_ref() };
        if header.color() == Color::Gray {
            continue;
        }
        header.set_color(Color::Gray);
        header.accept(&mut Marker { stack: &mut stack });
        marked += 1;
    }
    marked
}

// ===== Scan / reach =====

struct Scanner<'a> {
    stack: &'a mut Vec<Node>,
}

impl Visitor for Scanner<'_> {
    fn visit(&mut self, edge: &dyn Edge) {
        if !edge.is_strong() {
            return;
        }
        if let Some(target) = edge.target() {
            self.stack.push(target);
        }
    }
}

/// Still referenced from outside the candidate subgraph
#[inline]
fn is_externally_held(header: &ObjectHeader) -> bool {
    header.shared_count() > 0 || header.memo_value_count() > 1
}

fn scan(root: Node) {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        let header = unsafe { node.as_ref() };
        if header.color() != Color::Gray {
            continue;
        }
        if is_externally_held(header) {
            reach(node);
        } else {
            header.set_color(Color::White);
            header.accept(&mut Scanner { stack: &mut stack });
        }
    }
}

struct Reacher<'a> {
    stack: &'a mut Vec<Node>,
}

impl Visitor for Reacher<'_> {
    fn visit(&mut self, edge: &dyn Edge) {
        if !edge.is_strong() {
            return;
        }
        if let Some(target) = edge.target() {
            let header = unsafe { target.as_ref() };
            header.trial_inc();
            if header.color() != Color::Black {
                header.set_color(Color::Black);
                self.stack.push(target);
            }
        }
    }
}

fn reach(node: Node) {
    unsafe { node.as_ref() }.set_color(Color::Black);
    let mut stack = vec![node];
    while let Some(node) = stack.pop() {
        unsafe { node.as_ref() }.accept(&mut Reacher { stack: &mut stack });
    }
}

// ===== Collect =====

/// Detaches the strong edges of a white object. White targets lose the
/// edge without a decrement (their count was consumed by marking); other
/// targets get their count back and are released once whites are gone.
struct Collector<'a> {
    stack: &'a mut Vec<Node>,
    releases: &'a mut Vec<Node>,
}

impl Visitor for Collector<'_> {
    fn visit(&mut self, edge: &dyn Edge) {
        if !edge.is_strong() {
            return;
        }
        let Some(target) = edge.detach() else {
            return;
        };
        let header = unsafe { target.as_ref() };
        match header.color() {
            // Gray marks whites already queued for collection
            Color::White | Color::Gray => self.stack.push(target),
            Color::Black => {
                header.trial_inc();
                self.releases.push(target);
            }
        }
    }
}

fn collect_white(root: Node, whites: &mut Vec<Node>, releases: &mut Vec<Node>) {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        let header = unsafe { node.as_ref() };
        if header.color() != Color::White {
            continue;
        }
        header.set_color(Color::Gray);
        whites.push(node);
        header.accept(&mut Collector {
            stack: &mut stack,
            releases,
        });
    }
}
