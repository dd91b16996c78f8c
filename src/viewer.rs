use std::{collections::HashMap, time::Duration};

use tokio::{sync::mpsc, task::JoinHandle};
use tracing::debug;

use crate::item::ContentItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(pub u64);

/// Something that can fire a one-shot timeout later.
pub trait Scheduler {
    fn schedule(&mut self, after: Duration) -> TimerId;
    fn cancel(&mut self, id: TimerId);
}

/// Runs each timer as a sleeping task that posts its id on a channel when it elapses.
pub struct TokioScheduler {
    next_id: u64,
    tasks: HashMap<TimerId, JoinHandle<()>>,
    elapsed_tx: mpsc::UnboundedSender<TimerId>,
}

impl TokioScheduler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TimerId>) {
        let (elapsed_tx, elapsed_rx) = mpsc::unbounded_channel();
        (
            TokioScheduler {
                next_id: 0,
                tasks: HashMap::new(),
                elapsed_tx,
            },
            elapsed_rx,
        )
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&mut self, after: Duration) -> TimerId {
        self.next_id += 1;
        let id = TimerId(self.next_id);
        // Finished tasks hold nothing worth keeping
        self.tasks.retain(|_, task| !task.is_finished());
        let tx = self.elapsed_tx.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = tx.send(id);
        });
        self.tasks.insert(id, task);
        id
    }

    fn cancel(&mut self, id: TimerId) {
        if let Some(task) = self.tasks.remove(&id) {
            task.abort();
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for (_, task) in self.tasks.drain() {
            task.abort();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerState {
    Idle,
    Viewing(usize),
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Done,
    Active,
    Pending,
}

/// What the presentation layer needs to draw the current story.
#[derive(Debug)]
pub struct Frame<'a> {
    pub item: &'a ContentItem,
    pub index: usize,
    pub total: usize,
    pub has_previous: bool,
    pub has_next: bool,
    pub progress: Vec<Progress>,
}

#[derive(Debug, thiserror::Error)]
pub enum ViewerError {
    #[error("no story at position {index} (have {total})")]
    OutOfRange { index: usize, total: usize },
}

/// Slideshow over a snapshot of stories taken when the session starts.
///
/// Entering `Viewing(i)` schedules exactly one dwell timeout. Any move to
/// another index, or out of `Viewing`, cancels the pending timeout first.
/// Stories leave the snapshot only once they have expired, checked on each move.
pub struct Viewer<S> {
    scheduler: S,
    dwell: Duration,
    state: ViewerState,
    items: Vec<ContentItem>,
    pending: Option<TimerId>,
}

impl<S: Scheduler> Viewer<S> {
    pub fn new(scheduler: S, dwell: Duration) -> Self {
        Viewer {
            scheduler,
            dwell,
            state: ViewerState::Idle,
            items: Vec::new(),
            pending: None,
        }
    }

    pub fn state(&self) -> ViewerState {
        self.state
    }

    /// Begin a session at `index`. Returns `false` when there is nothing to show.
    pub fn start(&mut self, items: Vec<ContentItem>, index: usize) -> Result<bool, ViewerError> {
        if items.is_empty() {
            return Ok(false);
        }
        if index >= items.len() {
            return Err(ViewerError::OutOfRange {
                index,
                total: items.len(),
            });
        }
        self.cancel_pending();
        self.items = items;
        self.show(index);
        Ok(true)
    }

    /// Move to the next live story, closing after the last one.
    pub fn advance(&mut self, now: u64) {
        if let ViewerState::Viewing(index) = self.state {
            self.cancel_pending();
            let (landing, current_live) = self.prune(index, now);
            let next = if current_live { landing + 1 } else { landing };
            if next < self.items.len() {
                self.show(next);
            } else {
                self.close();
            }
        }
    }

    /// Move to the previous live story. Does nothing on the first one.
    pub fn back(&mut self, now: u64) {
        if let ViewerState::Viewing(index) = self.state {
            let (landing, current_live) = self.prune(index, now);
            if landing > 0 {
                self.cancel_pending();
                self.show(landing - 1);
            } else if current_live {
                self.state = ViewerState::Viewing(0);
            } else if !self.items.is_empty() {
                self.cancel_pending();
                self.show(0);
            } else {
                self.close();
            }
        }
    }

    pub fn close(&mut self) {
        self.cancel_pending();
        debug!("closing viewer");
        self.items.clear();
        self.state = ViewerState::Closed;
    }

    /// Handle an elapsed dwell timer. Ids other than the pending one are stale and ignored.
    pub fn dwell_elapsed(&mut self, id: TimerId, now: u64) -> bool {
        if self.pending != Some(id) {
            debug!(timer = id.0, "ignoring stale dwell timer");
            return false;
        }
        self.advance(now);
        true
    }

    pub fn frame(&self) -> Option<Frame<'_>> {
        let ViewerState::Viewing(index) = self.state else {
            return None;
        };
        let total = self.items.len();
        let progress = (0..total)
            .map(|i| match i.cmp(&index) {
                std::cmp::Ordering::Less => Progress::Done,
                std::cmp::Ordering::Equal => Progress::Active,
                std::cmp::Ordering::Greater => Progress::Pending,
            })
            .collect();
        Some(Frame {
            item: &self.items[index],
            index,
            total,
            has_previous: index > 0,
            has_next: index + 1 < total,
            progress,
        })
    }

    fn show(&mut self, index: usize) {
        debug_assert!(self.pending.is_none());
        self.state = ViewerState::Viewing(index);
        self.pending = Some(self.scheduler.schedule(self.dwell));
    }

    /// Drop stories that expired mid-session. Returns where `index` lands in
    /// the pruned list and whether the story at `index` is still live.
    fn prune(&mut self, index: usize, now: u64) -> (usize, bool) {
        let current_live = self.items[index].is_live(now);
        let landing = self.items[..index]
            .iter()
            .filter(|item| item.is_live(now))
            .count();
        let before = self.items.len();
        self.items.retain(|item| item.is_live(now));
        if self.items.len() < before {
            debug!(
                dropped = before - self.items.len(),
                "dropped expired stories from viewing session"
            );
        }
        (landing, current_live)
    }

    fn cancel_pending(&mut self) {
        if let Some(id) = self.pending.take() {
            self.scheduler.cancel(id);
        }
    }
}
