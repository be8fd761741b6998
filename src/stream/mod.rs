//! View Stream Engine
//!
//! Drives one draw-and-readback per view and hands the read-back pixels to a
//! consumer. GPU work always runs on the calling thread in ascending view
//! order; only CPU-side consumption is ever moved to other threads.
//!
//! ```text
//!   Sequential                     Parallel { max_running_threads: M }
//!   ──────────                     ───────────────────────────────────
//!   for view in 0..N:              for view in 0..N:
//!     clear / draw / readback        gate.admit()          (blocks at M)
//!     consumer(frame)                clear / draw / readback
//!                                    spawn worker ──► consumer(frame)
//!                                                      drop frame, permit
//!                                  join all workers    (barrier)
//! ```
//!
//! A stream borrows its render target and draw step for its whole lifetime.
//! Mode switches ([`ViewStream::sequential`], [`ViewStream::parallel`]) share
//! that source, so a stream and the streams derived from it are all usable,
//! one at a time.

pub mod gate;
pub mod pool;
pub mod target;

use std::borrow::Cow;
use std::cell::RefCell;
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;

use parking_lot::Mutex;

use crate::errors::{Result, SheenError};
use crate::settings::StreamSettings;

pub use gate::{AdmissionGate, Permit};
pub use pool::{BufferGroup, PixelBuffer, PixelBufferPool, PooledGroup};
pub use target::RenderTarget;

/// Per-view draw step. Receives the render target and the view index.
pub type DrawStep<'a, T> = Box<dyn FnMut(&mut T, usize) -> Result<()> + 'a>;

type Consumer<'c> = dyn Fn(&ViewFrame<'_>) -> Result<()> + Sync + 'c;

// ─── Mode ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    Sequential,
    Parallel { max_running_threads: NonZeroUsize },
}

impl StreamMode {
    #[must_use]
    pub fn parallel(max_running_threads: usize) -> Self {
        Self::Parallel {
            max_running_threads: NonZeroUsize::new(max_running_threads)
                .unwrap_or(NonZeroUsize::MIN),
        }
    }

    /// Number of buffer groups a pass in this mode keeps in flight.
    #[must_use]
    pub fn pool_capacity(self) -> usize {
        match self {
            Self::Sequential => 1,
            Self::Parallel {
                max_running_threads,
            } => max_running_threads.get(),
        }
    }
}

// ─── ViewFrame ───────────────────────────────────────────────────────────────

/// The read-back attachments of one view, tagged with its index.
pub struct ViewFrame<'p> {
    index: usize,
    buffers: PooledGroup<'p>,
}

impl ViewFrame<'_> {
    #[inline]
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    #[must_use]
    pub fn buffers(&self) -> &BufferGroup {
        &self.buffers
    }

    /// Attachment `i` of this view.
    ///
    /// # Panics
    /// Panics if `i` is not a streamed attachment.
    #[inline]
    #[must_use]
    pub fn attachment(&self, i: usize) -> &PixelBuffer {
        &self.buffers[i]
    }

    /// The first attachment, for single-attachment streams.
    #[inline]
    #[must_use]
    pub fn single(&self) -> &PixelBuffer {
        &self.buffers[0]
    }
}

// ─── ViewStream ──────────────────────────────────────────────────────────────

struct StreamSource<'a, T> {
    target: &'a mut T,
    draw: DrawStep<'a, T>,
    attachment_count: usize,
    view_count: usize,
    pool: Option<PixelBufferPool>,
}

pub struct ViewStream<'a, T> {
    source: Rc<RefCell<StreamSource<'a, T>>>,
    mode: StreamMode,
}

impl<T> Clone for ViewStream<'_, T> {
    fn clone(&self) -> Self {
        Self {
            source: Rc::clone(&self.source),
            mode: self.mode,
        }
    }
}

impl<'a, T: RenderTarget> ViewStream<'a, T> {
    /// Creates a sequential stream over `view_count` views that reads back
    /// the first `attachment_count` attachments of `target`.
    pub fn new(
        view_count: usize,
        draw: impl FnMut(&mut T, usize) -> Result<()> + 'a,
        target: &'a mut T,
        attachment_count: usize,
    ) -> Result<Self> {
        let available = target.attachment_count();
        if attachment_count == 0 || attachment_count > available {
            return Err(SheenError::AttachmentMismatch {
                expected: available,
                actual: attachment_count,
            });
        }

        Ok(Self {
            source: Rc::new(RefCell::new(StreamSource {
                target,
                draw: Box::new(draw),
                attachment_count,
                view_count,
                pool: None,
            })),
            mode: StreamMode::Sequential,
        })
    }

    #[must_use]
    pub fn with_mode(mut self, mode: StreamMode) -> Self {
        self.mode = mode;
        self
    }

    #[inline]
    #[must_use]
    pub fn mode(&self) -> StreamMode {
        self.mode
    }

    #[must_use]
    pub fn view_count(&self) -> usize {
        self.source.borrow().view_count
    }

    #[must_use]
    pub fn attachment_count(&self) -> usize {
        self.source.borrow().attachment_count
    }

    /// A sequential stream over the same views.
    #[must_use]
    pub fn sequential(&self) -> Cow<'_, Self> {
        self.switch(StreamMode::Sequential)
    }

    /// A parallel stream with at most `max_running_threads` consumers in
    /// flight. Zero is treated as one.
    #[must_use]
    pub fn parallel(&self, max_running_threads: usize) -> Cow<'_, Self> {
        self.switch(StreamMode::parallel(max_running_threads))
    }

    /// A parallel stream bounded by the default thread budget.
    #[must_use]
    pub fn parallel_default(&self) -> Cow<'_, Self> {
        self.parallel_with(&StreamSettings::default())
    }

    /// A parallel stream bounded by `settings.max_running_threads`.
    #[must_use]
    pub fn parallel_with(&self, settings: &StreamSettings) -> Cow<'_, Self> {
        self.parallel(settings.bound().get())
    }

    fn switch(&self, mode: StreamMode) -> Cow<'_, Self> {
        if self.mode == mode {
            Cow::Borrowed(self)
        } else {
            Cow::Owned(Self {
                source: Rc::clone(&self.source),
                mode,
            })
        }
    }

    /// Runs the pass, calling `consumer` once per view.
    pub fn for_each<F>(&self, consumer: F) -> Result<()>
    where
        F: Fn(&ViewFrame<'_>) -> Result<()> + Sync,
    {
        self.run(&consumer)
    }

    /// Composes `f` after each produced frame.
    pub fn map<O, F>(&self, f: F) -> MappedStream<'a, T, O>
    where
        F: Fn(&ViewFrame<'_>) -> O + Send + Sync + 'a,
    {
        MappedStream {
            base: self.clone(),
            f: Arc::new(f),
        }
    }

    /// Mutable reduction. `supplier` runs once and accumulation is
    /// serialized.
    pub fn collect<R, S, A>(&self, supplier: S, accumulator: A) -> Result<R>
    where
        R: Send,
        S: FnOnce() -> R,
        A: Fn(&mut R, &ViewFrame<'_>) + Sync,
    {
        let result = Mutex::new(supplier());
        self.for_each(|frame| {
            accumulator(&mut result.lock(), frame);
            Ok(())
        })?;
        Ok(result.into_inner())
    }

    /// Mutable reduction with per-view partial results merged by `combiner`.
    pub fn collect_with<R, S, A, C>(&self, supplier: S, accumulator: A, combiner: C) -> Result<R>
    where
        R: Send,
        S: Fn() -> R + Sync,
        A: Fn(&mut R, &ViewFrame<'_>) + Sync,
        C: Fn(&mut R, R) + Sync,
    {
        let result = Mutex::new(supplier());
        self.for_each(|frame| {
            let mut partial = supplier();
            accumulator(&mut partial, frame);
            combiner(&mut result.lock(), partial);
            Ok(())
        })?;
        Ok(result.into_inner())
    }

    /// Runs the pass and returns the number of views consumed.
    pub fn count(&self) -> Result<usize> {
        let seen = AtomicUsize::new(0);
        self.for_each(|_| {
            seen.fetch_add(1, Ordering::Relaxed);
            Ok(())
        })?;
        Ok(seen.into_inner())
    }

    fn run(&self, consumer: &Consumer<'_>) -> Result<()> {
        let mut source = self
            .source
            .try_borrow_mut()
            .map_err(|_| SheenError::StreamBusy)?;
        let StreamSource {
            target,
            draw,
            attachment_count,
            view_count,
            pool,
        } = &mut *source;

        let (width, height) = target.size();
        let formats: Vec<_> = (0..*attachment_count)
            .map(|i| target.attachment_format(i))
            .collect();
        let capacity = self.mode.pool_capacity();

        let reusable = pool
            .as_ref()
            .is_some_and(|p| p.capacity() == capacity && p.matches(&formats, width, height));
        if !reusable {
            *pool = Some(PixelBufferPool::preallocate(capacity, &formats, width, height)?);
        }
        let pool = pool.as_ref().ok_or(SheenError::PoolClosed)?;

        let mut gpu = GpuHalf {
            target: &mut **target,
            draw,
            attachment_count: *attachment_count,
        };

        log::debug!("Streaming {view_count} view(s) in {:?} mode", self.mode);

        match self.mode {
            StreamMode::Sequential => run_sequential(&mut gpu, pool, *view_count, consumer),
            StreamMode::Parallel {
                max_running_threads,
            } => run_parallel(&mut gpu, pool, *view_count, max_running_threads, consumer),
        }
    }
}

// ─── Pass drivers ────────────────────────────────────────────────────────────

/// The part of a pass that touches the render target.
struct GpuHalf<'s, 'a, T> {
    target: &'s mut T,
    draw: &'s mut DrawStep<'a, T>,
    attachment_count: usize,
}

impl<T: RenderTarget> GpuHalf<'_, '_, T> {
    fn render(&mut self, index: usize, group: &mut BufferGroup) -> Result<()> {
        self.target.clear_all_attachments(wgpu::Color::TRANSPARENT)?;
        (self.draw)(&mut *self.target, index)?;
        for i in 0..self.attachment_count {
            self.target.read_attachment(i, group[i].as_mut_bytes())?;
        }
        Ok(())
    }
}

fn run_sequential<T: RenderTarget>(
    gpu: &mut GpuHalf<'_, '_, T>,
    pool: &PixelBufferPool,
    view_count: usize,
    consumer: &Consumer<'_>,
) -> Result<()> {
    for index in 0..view_count {
        let mut buffers = pool.acquire()?;
        gpu.render(index, &mut buffers)
            .map_err(|e| e.for_view(index))?;
        let frame = ViewFrame { index, buffers };
        consumer(&frame).map_err(|e| e.for_view(index))?;
    }
    Ok(())
}

fn run_parallel<T: RenderTarget>(
    gpu: &mut GpuHalf<'_, '_, T>,
    pool: &PixelBufferPool,
    view_count: usize,
    max_running_threads: NonZeroUsize,
    consumer: &Consumer<'_>,
) -> Result<()> {
    let gate = AdmissionGate::new(max_running_threads.get());
    let failed = AtomicBool::new(false);
    let first_error: Mutex<Option<SheenError>> = Mutex::new(None);

    let record = |err: SheenError| {
        let mut slot = first_error.lock();
        if slot.is_none() {
            *slot = Some(err);
        }
    };

    let gpu_result = thread::scope(|scope| {
        let mut workers = Vec::with_capacity(view_count);
        let mut gpu_error = None;

        for index in 0..view_count {
            let permit = gate.admit();
            if failed.load(Ordering::Acquire) {
                log::debug!("Stopping admission at view {index} after a consumer failure");
                break;
            }

            let mut buffers = match pool.acquire() {
                Ok(buffers) => buffers,
                Err(err) => {
                    gpu_error = Some(err);
                    break;
                }
            };
            if let Err(err) = gpu.render(index, &mut buffers) {
                gpu_error = Some(err.for_view(index));
                break;
            }

            let frame = ViewFrame { index, buffers };
            let failed = &failed;
            let record = &record;
            let spawned = thread::Builder::new()
                .name(format!("sheen-view-{index}"))
                .spawn_scoped(scope, move || {
                    // A panicking consumer stops admission like a failing one.
                    let result = panic::catch_unwind(AssertUnwindSafe(|| consumer(&frame)))
                        .unwrap_or(Err(SheenError::WorkerPanicked(index)));
                    // The group goes back before the permit so an admitted
                    // view always finds a free group.
                    drop(frame);
                    if let Err(err) = result {
                        let err = err.for_view(index);
                        log::error!("{err}");
                        failed.store(true, Ordering::Release);
                        record(err);
                    }
                    drop(permit);
                });

            match spawned {
                Ok(handle) => workers.push((index, handle)),
                Err(err) => {
                    gpu_error = Some(SheenError::IoError(err).for_view(index));
                    break;
                }
            }
        }

        for (index, handle) in workers {
            if handle.join().is_err() {
                log::error!("Worker for view {index} panicked");
                record(SheenError::WorkerPanicked(index));
            }
        }

        gpu_error
    });

    debug_assert_eq!(pool.outstanding(), 0);
    log::debug!(
        "Parallel pass done, peak concurrency {} of {}",
        gate.peak(),
        gate.limit()
    );

    match (gpu_result, first_error.into_inner()) {
        (Some(err), _) | (None, Some(err)) => Err(err),
        (None, None) => Ok(()),
    }
}

// ─── MappedStream ────────────────────────────────────────────────────────────

/// A [`ViewStream`] with a transform applied to every frame.
///
/// The transform runs wherever the consumer would: inline for sequential
/// streams, on the worker thread for parallel ones.
pub struct MappedStream<'a, T, O> {
    base: ViewStream<'a, T>,
    f: Arc<dyn Fn(&ViewFrame<'_>) -> O + Send + Sync + 'a>,
}

impl<T, O> Clone for MappedStream<'_, T, O> {
    fn clone(&self) -> Self {
        Self {
            base: self.base.clone(),
            f: Arc::clone(&self.f),
        }
    }
}

impl<'a, T: RenderTarget, O: 'a> MappedStream<'a, T, O> {
    #[inline]
    #[must_use]
    pub fn mode(&self) -> StreamMode {
        self.base.mode
    }

    #[must_use]
    pub fn view_count(&self) -> usize {
        self.base.view_count()
    }

    #[must_use]
    pub fn sequential(&self) -> Cow<'_, Self> {
        self.switch(StreamMode::Sequential)
    }

    #[must_use]
    pub fn parallel(&self, max_running_threads: usize) -> Cow<'_, Self> {
        self.switch(StreamMode::parallel(max_running_threads))
    }

    fn switch(&self, mode: StreamMode) -> Cow<'_, Self> {
        if self.base.mode == mode {
            Cow::Borrowed(self)
        } else {
            Cow::Owned(Self {
                base: ViewStream {
                    source: Rc::clone(&self.base.source),
                    mode,
                },
                f: Arc::clone(&self.f),
            })
        }
    }

    pub fn for_each<F>(&self, consumer: F) -> Result<()>
    where
        F: Fn(O) -> Result<()> + Sync,
    {
        let f = &self.f;
        self.base.run(&|frame| consumer(f(frame)))
    }

    pub fn map<P, G>(&self, g: G) -> MappedStream<'a, T, P>
    where
        G: Fn(O) -> P + Send + Sync + 'a,
    {
        let f = Arc::clone(&self.f);
        MappedStream {
            base: self.base.clone(),
            f: Arc::new(move |frame: &ViewFrame<'_>| g(f(frame))),
        }
    }

    pub fn collect<R, S, A>(&self, supplier: S, accumulator: A) -> Result<R>
    where
        R: Send,
        S: FnOnce() -> R,
        A: Fn(&mut R, O) + Sync,
    {
        let result = Mutex::new(supplier());
        self.for_each(|item| {
            accumulator(&mut result.lock(), item);
            Ok(())
        })?;
        Ok(result.into_inner())
    }

    pub fn collect_with<R, S, A, C>(&self, supplier: S, accumulator: A, combiner: C) -> Result<R>
    where
        R: Send,
        S: Fn() -> R + Sync,
        A: Fn(&mut R, O) + Sync,
        C: Fn(&mut R, R) + Sync,
    {
        let result = Mutex::new(supplier());
        self.for_each(|item| {
            let mut partial = supplier();
            accumulator(&mut partial, item);
            combiner(&mut result.lock(), partial);
            Ok(())
        })?;
        Ok(result.into_inner())
    }

    /// Runs the pass and gathers every mapped item, in completion order.
    pub fn to_vec(&self) -> Result<Vec<O>>
    where
        O: Send,
    {
        self.collect(Vec::new, |items, item| items.push(item))
    }
}
