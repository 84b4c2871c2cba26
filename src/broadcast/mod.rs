//! Fan-out of store changes to connected viewers.
//!
//! Each viewer owns a slot holding a bounded queue of pending frames and a cursor (the
//! version of the last frame queued for it). The hub's publish pass runs after every
//! store change: for each viewer it computes the delta from the viewer's cursor and
//! queues one UPDATE. It never waits on a viewer. If a queue is full, or the store no
//! longer has history back to the cursor, the queue is dropped and the slot is marked
//! for resync: the viewer's next read produces a fresh INIT instead.
//!
//! Viewers pull frames with [`Viewer::next_frame`] at their own pace, so a slow or
//! dead connection only ever affects its own slot.
//!
//! Once the hub has stopped, new viewers are handed an already closed slot.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{watch, Notify};
use tracing::{debug, trace};

use crate::error::StoreError;
use crate::state_store::{DeltaScope, StateStore};

pub mod protocol;

use protocol::Frame;

#[derive(Debug)]
struct SlotState {
    queue: VecDeque<Frame>,
    cursor: u64,
    needs_init: bool,
    closed: bool,
}

#[derive(Debug)]
struct ViewerSlot {
    id: u64,
    state: Mutex<SlotState>,
    notify: Notify,
}

impl ViewerSlot {
    fn close(&self) {
        self.state.lock().expect("viewer slot poisoned").closed = true;
        self.notify.notify_one();
    }
}

/// Accepts viewers and keeps each of them fed with frames.
#[derive(Debug)]
pub struct BroadcastHub {
    store: Arc<StateStore>,
    viewers: Mutex<HashMap<u64, Arc<ViewerSlot>>>,
    next_id: AtomicU64,
    queue_bound: usize,
    scope: DeltaScope,
    resyncs: AtomicU64,
    stopped: AtomicBool,
}

impl BroadcastHub {
    /// `queue_bound` is the number of pending frames a viewer may accumulate before it
    /// is resynchronised. With `full_log_updates`, UPDATE frames carry the whole log.
    pub fn new(store: Arc<StateStore>, queue_bound: usize, full_log_updates: bool) -> BroadcastHub {
        BroadcastHub {
            store,
            viewers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            queue_bound: queue_bound.max(1),
            scope: if full_log_updates {
                DeltaScope::FullLog
            } else {
                DeltaScope::NewInteractions
            },
            resyncs: AtomicU64::new(0),
            stopped: AtomicBool::new(false),
        }
    }

    /// Register a new viewer. Its first frame is an INIT of the state at read time.
    ///
    /// After shutdown the viewer is not registered and its first read returns `None`.
    pub fn connect(self: &Arc<Self>) -> Viewer {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut viewers = self.viewers.lock().expect("viewer registry poisoned");
        // `run` flips the flag under this lock before draining the registry
        let stopped = self.stopped.load(Ordering::Acquire);
        let slot = Arc::new(ViewerSlot {
            id,
            state: Mutex::new(SlotState {
                queue: VecDeque::new(),
                cursor: 0,
                needs_init: !stopped,
                closed: stopped,
            }),
            notify: Notify::new(),
        });
        if stopped {
            debug!(viewer = id, "hub stopped, viewer refused");
        } else {
            viewers.insert(id, slot.clone());
            debug!(viewer = id, "viewer connected");
        }
        drop(viewers);
        Viewer {
            hub: self.clone(),
            slot,
        }
    }

    fn disconnect(&self, id: u64) {
        if self
            .viewers
            .lock()
            .expect("viewer registry poisoned")
            .remove(&id)
            .is_some()
        {
            debug!(viewer = id, "viewer disconnected");
        }
    }

    pub fn viewer_count(&self) -> usize {
        self.viewers.lock().expect("viewer registry poisoned").len()
    }

    /// Number of times a viewer was switched to a full INIT because it fell behind.
    pub fn resync_count(&self) -> u64 {
        self.resyncs.load(Ordering::Relaxed)
    }

    /// Queue an UPDATE for every viewer behind the current store version.
    pub fn publish(&self) {
        let slots = self
            .viewers
            .lock()
            .expect("viewer registry poisoned")
            .values()
            .cloned()
            .collect::<Vec<_>>();

        // viewers at the same cursor share the same frame
        let mut frames: HashMap<u64, Result<Frame, StoreError>> = HashMap::new();
        for slot in slots {
            let mut state = slot.state.lock().expect("viewer slot poisoned");
            if state.closed || state.needs_init {
                continue;
            }
            let cursor = state.cursor;
            let frame = frames
                .entry(cursor)
                .or_insert_with(|| {
                    self.store
                        .delta_since(cursor, self.scope)
                        .map(|delta| Frame::update(&delta))
                })
                .clone();

            match frame {
                Ok(frame) if frame.version == cursor => continue,
                Ok(frame) if state.queue.len() < self.queue_bound => {
                    trace!(viewer = slot.id, version = frame.version, "update queued");
                    state.cursor = frame.version;
                    state.queue.push_back(frame);
                }
                Ok(_) => {
                    debug!(viewer = slot.id, pending = state.queue.len(), "viewer lagging, resync");
                    self.mark_for_resync(&mut state);
                }
                Err(e) => {
                    debug!(viewer = slot.id, error = %e, "cannot diff, resync");
                    self.mark_for_resync(&mut state);
                }
            }
            drop(state);
            slot.notify.notify_one();
        }
    }

    fn mark_for_resync(&self, state: &mut SlotState) {
        state.queue.clear();
        state.needs_init = true;
        self.resyncs.fetch_add(1, Ordering::Relaxed);
    }

    /// Publish on every store change until `shutdown` flips, then close every viewer.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut versions = self.store.subscribe();
        loop {
            tokio::select! {
                changed = versions.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    self.publish();
                }
                _ = shutdown.changed() => break,
            }
        }

        let slots = {
            let mut viewers = self.viewers.lock().expect("viewer registry poisoned");
            self.stopped.store(true, Ordering::Release);
            viewers.drain().map(|(_, slot)| slot).collect::<Vec<_>>()
        };
        for slot in slots {
            slot.close();
        }
        debug!("broadcast hub stopped");
    }
}

/// One connected viewer. Dropping it disconnects the viewer from the hub.
#[derive(Debug)]
pub struct Viewer {
    hub: Arc<BroadcastHub>,
    slot: Arc<ViewerSlot>,
}

impl Viewer {
    pub fn id(&self) -> u64 {
        self.slot.id
    }

    /// Next frame for this viewer, waiting for one if none is pending.
    ///
    /// The first call (and the first call after a resync) returns an INIT. Returns
    /// `None` once the hub has shut down.
    pub async fn next_frame(&mut self) -> Option<Frame> {
        loop {
            if let Some(frame) = self.try_next_frame() {
                return frame;
            }
            self.slot.notify.notified().await;
        }
    }

    /// A pending frame without waiting: `Some(None)` when closed, `None` when there is
    /// nothing to send yet.
    pub fn try_next_frame(&mut self) -> Option<Option<Frame>> {
        let mut state = self.slot.state.lock().expect("viewer slot poisoned");
        if state.closed {
            return Some(None);
        }
        if state.needs_init {
            let snapshot = self.hub.store.snapshot();
            state.cursor = snapshot.version;
            state.needs_init = false;
            trace!(viewer = self.slot.id, version = snapshot.version, "sending init");
            return Some(Some(Frame::init(snapshot)));
        }
        state.queue.pop_front().map(Some)
    }

    /// Frames waiting to be sent.
    pub fn pending(&self) -> usize {
        self.slot
            .state
            .lock()
            .expect("viewer slot poisoned")
            .queue
            .len()
    }
}

impl Drop for Viewer {
    fn drop(&mut self) {
        self.hub.disconnect(self.slot.id);
    }
}
