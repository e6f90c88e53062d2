//! Fixed pool of background hydration workers.
//!
//! The pool owns a bounded crossbeam channel and a fixed number of named
//! threads (`fetch-worker-N`) draining it. A search calls
//! [`FetchPool::submit`] with its ranked page:
//!
//! 1. With a zero budget the whole page is hydrated on the caller.
//! 2. Otherwise an [`initial_window`] of hits is hydrated on the caller,
//!    and the remainder is queued.
//! 3. A worker picks the payload up and appends the remaining entities in
//!    rank order, then marks the result finished.
//!
//! A full or closed queue never drops work: the payload is hydrated on the
//! calling thread instead. Shutting the pool down closes the queue, lets
//! running payloads complete and finishes queued ones without hydrating
//! them further, so no waiter blocks forever.
//!
//! # Example
//!
//! ```no_run
//! use taxis::fetch::FetchPool;
//!
//! # fn main() -> taxis::error::Result<()> {
//! // Two workers, up to 64 queued searches, at least 20 hits up front.
//! let pool = FetchPool::new(2, 64, 20)?;
//! assert_eq!(pool.pending(), 0);
//! pool.shutdown();
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::error::{Result, TaxisError};
use crate::fetch::initial_window;
use crate::fetch::payload::FetchPayload;

/// Workers draining one bounded queue of [`FetchPayload`]s.
///
/// Closing the queue stops the workers once it is drained. After
/// [`shutdown`](FetchPool::shutdown) queued payloads are marked finished
/// without being hydrated further.
#[derive(Debug)]
pub struct FetchPool {
    sender: Mutex<Option<Sender<FetchPayload>>>,
    workers: Mutex<Vec<thread::JoinHandle<()>>>,
    cancelled: Arc<AtomicBool>,
    floor: usize,
}

impl FetchPool {
    /// Start `workers` threads over a queue holding up to `capacity`
    /// payloads. Searches hydrate at least `floor` hits before returning.
    pub fn new(workers: usize, capacity: usize, floor: usize) -> Result<Self> {
        if workers == 0 || capacity == 0 {
            return Err(TaxisError::config(
                "fetch pool needs at least one worker and a non-empty queue",
            ));
        }
        let (sender, receiver) = bounded(capacity);
        let cancelled = Arc::new(AtomicBool::new(false));
        let handles = (0..workers)
            .map(|i| Self::spawn_worker(i, receiver.clone(), cancelled.clone()))
            .collect::<Result<Vec<_>>>()?;
        info!("started {workers} fetch workers");

        Ok(FetchPool {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(handles),
            cancelled,
            floor,
        })
    }

    fn spawn_worker(
        worker_id: usize,
        receiver: Receiver<FetchPayload>,
        cancelled: Arc<AtomicBool>,
    ) -> Result<thread::JoinHandle<()>> {
        let handle = thread::Builder::new()
            .name(format!("fetch-worker-{worker_id}"))
            .spawn(move || {
                for payload in receiver.iter() {
                    if cancelled.load(Ordering::Acquire) {
                        payload.abandon();
                    } else {
                        payload.fetch_all();
                    }
                }
                debug!("fetch worker {worker_id} stopped");
            })?;
        Ok(handle)
    }

    /// Hydrate `payload`. With a zero `budget` everything is hydrated on
    /// the calling thread; otherwise only an initial window is, and the rest
    /// is handed to the workers.
    pub fn submit(&self, mut payload: FetchPayload, budget: usize) {
        if budget == 0 {
            payload.fetch_all();
            return;
        }
        payload.fetch(initial_window(self.floor, budget));
        if payload.remaining() == 0 {
            payload.result().done();
        } else {
            self.dispatch(payload);
        }
    }

    /// Queue `payload` for the workers. When the queue is full or closed the
    /// payload is hydrated on the calling thread instead.
    pub fn dispatch(&self, payload: FetchPayload) {
        let rejected = match self.sender.lock().as_ref() {
            Some(sender) => match sender.try_send(payload) {
                Ok(()) => return,
                Err(TrySendError::Full(payload)) => {
                    warn!("fetch queue is full; hydrating on the caller");
                    payload
                }
                Err(TrySendError::Disconnected(payload)) => payload,
            },
            None => payload,
        };
        rejected.fetch_all();
    }

    /// Number of payloads waiting in the queue; zero once shut down.
    pub fn pending(&self) -> usize {
        self.sender.lock().as_ref().map_or(0, Sender::len)
    }

    /// Whether [`shutdown`](FetchPool::shutdown) was called or the pool
    /// was dropped.
    pub fn is_shutdown(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Close the queue and wait for the workers. Jobs already running
    /// complete; queued ones are finished without hydration.
    pub fn shutdown(&self) {
        self.close();
        let mut workers = self.workers.lock();
        while let Some(worker) = workers.pop() {
            if worker.join().is_err() {
                warn!("a fetch worker panicked");
            }
        }
    }

    fn close(&self) {
        if !self.cancelled.swap(true, Ordering::AcqRel) {
            info!("stopping fetch workers");
        }
        self.sender.lock().take();
    }
}

impl Drop for FetchPool {
    // Workers exit on their own once the queue is closed.
    fn drop(&mut self) {
        self.close();
    }
}
