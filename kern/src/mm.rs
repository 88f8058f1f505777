//! Physical memory.
//!
//! Frames come from a [`FramePool`] and are handed out as [`Page`]s. A
//! [`Page`] is a counted reference: cloning it adds a reference and dropping
//! the last one returns the frame to its pool. Every mapping of a frame in
//! any address space holds one reference, so the reference count of a frame
//! is the number of places it is mapped.

use abyss::addressing::{PAGE_SIZE, Pa};
use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

const FIRST_FRAME: usize = 0x0010_0000;

thread_local! {
    static LIVE: Cell<isize> = const { Cell::new(0) };
    static BASELINE: Cell<Option<isize>> = const { Cell::new(None) };
}

/// Start counting frame allocations on this thread.
pub fn track_alloc() {
    BASELINE.with(|b| b.set(Some(LIVE.with(Cell::get))));
}

/// Assert that every frame allocated on this thread since [`track_alloc`]
/// was released.
pub fn validate_alloc() {
    if let Some(baseline) = BASELINE.with(Cell::take) {
        let now = LIVE.with(Cell::get);
        assert_eq!(
            now,
            baseline,
            "{} physical page(s) are not released.",
            now - baseline
        );
    }
}

struct PoolInner {
    free: RefCell<Vec<Pa>>,
    next: Cell<usize>,
    live: Cell<usize>,
    limit: Option<usize>,
}

/// A pool of physical frames.
#[derive(Clone)]
pub struct FramePool(Rc<PoolInner>);

impl FramePool {
    /// Create a pool holding at most `limit` live frames.
    pub fn new(limit: Option<usize>) -> Self {
        Self(Rc::new(PoolInner {
            free: RefCell::new(Vec::new()),
            next: Cell::new(FIRST_FRAME),
            live: Cell::new(0),
            limit,
        }))
    }

    /// Allocate a zero-filled page.
    ///
    /// # Returns
    /// - `Some(Page)` on success.
    /// - `None` if the pool is exhausted.
    pub fn alloc(&self) -> Option<Page> {
        let pool = &self.0;
        if pool.limit.is_some_and(|limit| pool.live.get() >= limit) {
            return None;
        }
        let pa = match pool.free.borrow_mut().pop() {
            Some(pa) => pa,
            None => {
                let pa = Pa::new(pool.next.get())?;
                pool.next.set(pa.into_usize() + PAGE_SIZE);
                pa
            }
        };
        pool.live.set(pool.live.get() + 1);
        LIVE.with(|l| l.set(l.get() + 1));
        Some(Page(Rc::new(Frame {
            pa,
            data: RefCell::new(vec![0; PAGE_SIZE].into_boxed_slice()),
            pool: self.0.clone(),
        })))
    }

    /// Number of frames currently allocated.
    pub fn live(&self) -> usize {
        self.0.live.get()
    }
}

struct Frame {
    pa: Pa,
    data: RefCell<Box<[u8]>>,
    pool: Rc<PoolInner>,
}

impl Drop for Frame {
    fn drop(&mut self) {
        self.pool.free.borrow_mut().push(self.pa);
        self.pool.live.set(self.pool.live.get() - 1);
        LIVE.with(|l| l.set(l.get() - 1));
    }
}

/// A reference to a physical page.
#[derive(Clone)]
pub struct Page(Rc<Frame>);

impl Page {
    /// Physical address of the page.
    #[inline]
    pub fn pa(&self) -> Pa {
        self.0.pa
    }

    /// Number of references to this page.
    #[inline]
    pub fn ref_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }

    /// Run `f` on the contents of the page.
    pub fn with<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        f(&self.0.data.borrow())
    }

    /// Run `f` on the mutable contents of the page.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        f(&mut self.0.data.borrow_mut())
    }
}

impl core::fmt::Debug for Page {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Page({:?}, refs: {})", self.pa(), self.ref_count())
    }
}
