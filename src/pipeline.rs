//! The concurrency substrate: a fixed worker pool, a job queue, and the
//! scheduler front-end.
//!
//! Jobs come in two scheduling *methods*. `Managed` jobs go through the
//! shared FIFO and are drained by the fixed pool; they are leaf work such
//! as command execution. `Unbound` jobs each get a fresh detached thread;
//! dependency builds use this path because their fan-out is unbounded in
//! depth, and a bundle of deep builds sharing the fixed pool could consume
//! every worker while still needing workers to resolve their own children.
//!
//! Either method runs under one of two *topographies*: `Sequential`
//! dispatches one job at a time and aborts the remainder on the first
//! error; `Parallel` dispatches everything at once and awaits all of it.

use std::collections::VecDeque;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use parking_lot::Mutex;

/// The synchronization core every job shares: a one-shot completion
/// signal plus the error and abort flags.
pub struct JobState {
    done_tx: Sender<()>,
    done_rx: Receiver<()>,
    error: AtomicBool,
    aborted: AtomicBool,
}

impl Default for JobState {
    fn default() -> Self {
        Self::new()
    }
}

impl JobState {
    pub fn new() -> Self {
        let (done_tx, done_rx) = bounded(1);
        JobState {
            done_tx,
            done_rx,
            error: AtomicBool::new(false),
            aborted: AtomicBool::new(false),
        }
    }

    /// Block until the job's completion signal is released.
    pub fn await_completion(&self) {
        let _ = self.done_rx.recv();
    }

    /// Release the completion signal. Releasing twice is harmless; the
    /// buffered slot absorbs the first and the second is dropped.
    pub fn release(&self) {
        let _ = self.done_tx.try_send(());
    }

    pub fn report_error(&self) {
        self.error.store(true, Ordering::SeqCst);
    }

    pub fn had_error(&self) -> bool {
        self.error.load(Ordering::SeqCst)
    }

    pub fn mark_aborted(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }

    pub fn was_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }
}

/// An opaque unit of work.
pub trait PipelineJob: Send + Sync {
    /// Do the work. Must not panic; failures are reported through
    /// [`JobState::report_error`].
    fn compute(&self);
    fn state(&self) -> &JobState;
}

/// The shared worker pool and job queue.
pub struct Pipeline {
    queue: Mutex<VecDeque<Arc<dyn PipelineJob>>>,
    ready_tx: Sender<()>,
    ready_rx: Receiver<()>,
    stop: AtomicBool,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Pipeline {
    /// Start the pool with `threads` workers.
    pub fn new(threads: usize) -> Arc<Pipeline> {
        let (ready_tx, ready_rx) = unbounded();
        let pipeline = Arc::new(Pipeline {
            queue: Mutex::new(VecDeque::new()),
            ready_tx,
            ready_rx,
            stop: AtomicBool::new(false),
            workers: Mutex::new(Vec::new()),
        });
        let mut workers = pipeline.workers.lock();
        for _ in 0..threads.max(1) {
            let pipeline = Arc::clone(&pipeline);
            workers.push(std::thread::spawn(move || pipeline.pool_loop()));
        }
        drop(workers);
        pipeline
    }

    /// Queue a managed job. The channel send doubles as the counting
    /// semaphore release.
    pub fn push_to_queue(&self, job: Arc<dyn PipelineJob>) {
        self.queue.lock().push_back(job);
        let _ = self.ready_tx.send(());
    }

    /// Run a job on a fresh detached thread.
    pub fn execute_unbound(&self, job: Arc<dyn PipelineJob>) {
        std::thread::spawn(move || Self::job_compute(&job));
    }

    fn job_compute(job: &Arc<dyn PipelineJob>) {
        job.compute();
        job.state().release();
    }

    fn pool_loop(&self) {
        loop {
            let _ = self.ready_rx.recv();
            if self.stop.load(Ordering::SeqCst) {
                // pass the stop signal onto the next worker.
                let _ = self.ready_tx.send(());
                return;
            }
            let job = self.queue.lock().pop_front();
            let Some(job) = job else { continue };

            if !job.state().was_aborted() {
                Self::job_compute(&job);
            }
            if job.state().had_error() {
                self.abort_queued();
            }
        }
    }

    /// Mark every job still in the queue aborted and release its
    /// completion signal so waiting clients return.
    pub fn abort_queued(&self) {
        for job in self.queue.lock().iter() {
            job.state().mark_aborted();
            job.state().release();
        }
    }

    /// Stop and join all workers.
    pub fn stop_sync(&self) {
        self.stop.store(true, Ordering::SeqCst);
        let _ = self.ready_tx.send(());
        let handles: Vec<_> = self.workers.lock().drain(..).collect();
        for handle in handles {
            let _ = handle.join();
        }
    }

    /// Stop without waiting for the workers to exit.
    pub fn stop_async(&self) {
        self.stop.store(true, Ordering::SeqCst);
        let _ = self.ready_tx.send(());
    }
}

/// Sequential: jobs complete in scheduling order, first error aborts the
/// remainder. Parallel: all jobs dispatched together, all awaited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topography {
    Sequential,
    Parallel,
}

/// How a scheduler hands jobs to the pipeline.
pub trait SchedulingMethod {
    fn dispatch(pipeline: &Pipeline, job: Arc<dyn PipelineJob>);
}

/// Submit to the fixed worker pool.
pub struct Managed;

/// Spawn a fresh detached thread per job.
pub struct Unbound;

impl SchedulingMethod for Managed {
    fn dispatch(pipeline: &Pipeline, job: Arc<dyn PipelineJob>) {
        pipeline.push_to_queue(job);
    }
}

impl SchedulingMethod for Unbound {
    fn dispatch(pipeline: &Pipeline, job: Arc<dyn PipelineJob>) {
        pipeline.execute_unbound(job);
    }
}

/// Collects jobs, then dispatches and awaits them under the chosen
/// topography.
pub struct PipelineScheduler<M: SchedulingMethod> {
    pipeline: Arc<Pipeline>,
    topography: Topography,
    buffer: Vec<Arc<dyn PipelineJob>>,
    _method: PhantomData<M>,
}

impl<M: SchedulingMethod> PipelineScheduler<M> {
    pub fn new(pipeline: Arc<Pipeline>, topography: Topography) -> Self {
        PipelineScheduler {
            pipeline,
            topography,
            buffer: Vec::new(),
            _method: PhantomData,
        }
    }

    pub fn schedule_job(&mut self, job: Arc<dyn PipelineJob>) {
        self.buffer.push(job);
    }

    /// Dispatch everything scheduled and block until all jobs finished or
    /// were marked aborted.
    pub fn send_and_await(&self) {
        match self.topography {
            Topography::Sequential => {
                for (position, job) in self.buffer.iter().enumerate() {
                    M::dispatch(&self.pipeline, Arc::clone(job));
                    job.state().await_completion();
                    if job.state().had_error() {
                        // the remainder never runs; mark it aborted so
                        // clients observing the buffer see a settled state.
                        for rest in &self.buffer[position + 1..] {
                            rest.state().mark_aborted();
                            rest.state().release();
                        }
                        return;
                    }
                }
            }
            Topography::Parallel => {
                for job in &self.buffer {
                    M::dispatch(&self.pipeline, Arc::clone(job));
                }
                for job in &self.buffer {
                    job.state().await_completion();
                }
            }
        }
    }

    pub fn had_errors(&self) -> bool {
        self.buffer.iter().any(|job| job.state().had_error())
    }

    pub fn was_aborted(&self) -> bool {
        self.buffer.iter().any(|job| job.state().was_aborted())
    }
}
