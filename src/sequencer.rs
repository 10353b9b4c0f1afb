//! Deferred delivery of in-panel actions.
//!
//! Actions wait behind a readiness gate until the panel they target has
//! finished opening, then drain in FIFO order with a fixed stagger between
//! deliveries. The sequencer never sleeps on its own: the owning event loop
//! waits for [`ActionSequencer::next_deadline`] and calls
//! [`ActionSequencer::fire_due`].

use crate::types::PanelAction;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_STAGGER: Duration = Duration::from_millis(150);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedAction {
    pub action: PanelAction,
}

#[derive(Debug)]
struct ScheduledDelivery {
    due: Instant,
    action: PanelAction,
}

pub struct ActionSequencer<D>
where
    D: FnMut(PanelAction),
{
    deliver: D,
    stagger: Duration,
    ready: bool,
    queue: VecDeque<QueuedAction>,
    scheduled: VecDeque<ScheduledDelivery>,
}

impl<D> ActionSequencer<D>
where
    D: FnMut(PanelAction),
{
    pub fn new(deliver: D) -> Self {
        Self::with_stagger(deliver, DEFAULT_STAGGER)
    }

    pub fn with_stagger(deliver: D, stagger: Duration) -> Self {
        Self {
            deliver,
            stagger,
            ready: false,
            queue: VecDeque::new(),
            scheduled: VecDeque::new(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn stagger(&self) -> Duration {
        self.stagger
    }

    /// Actions waiting behind the gate plus deliveries already scheduled.
    pub fn queued_len(&self) -> usize {
        self.queue.len() + self.scheduled.len()
    }

    /// Deliver now if the gate is open, otherwise queue behind it. While a
    /// drain is still scheduled, a new action joins its tail one stagger
    /// after the last delivery.
    pub fn enqueue(&mut self, action: PanelAction) {
        if self.ready {
            if let Some(last) = self.scheduled.back() {
                let due = last.due + self.stagger;
                tracing::trace!(action = %action.describe(), "appended to running drain");
                self.scheduled.push_back(ScheduledDelivery { due, action });
                return;
            }
            tracing::trace!(action = %action.describe(), "delivering immediately");
            (self.deliver)(action);
        } else {
            tracing::trace!(action = %action.describe(), "queued until panel is ready");
            self.queue.push_back(QueuedAction { action });
        }
    }

    /// Opening the gate drains the queue: the first action is delivered
    /// before this returns, the k-th becomes due `(k - 1) * stagger` later.
    /// Closing it drops the queue and every scheduled delivery.
    pub fn set_ready(&mut self, ready: bool) {
        self.ready = ready;
        if !ready {
            self.drop_pending();
            return;
        }

        let Some(first) = self.queue.pop_front() else {
            return;
        };
        let start = Instant::now();
        tracing::debug!(
            queued = self.queue.len() + 1,
            stagger_ms = self.stagger.as_millis() as u64,
            "panel ready; draining actions"
        );
        (self.deliver)(first.action);

        let mut offset = Duration::ZERO;
        while let Some(queued) = self.queue.pop_front() {
            offset += self.stagger;
            self.scheduled.push_back(ScheduledDelivery {
                due: start + offset,
                action: queued.action,
            });
        }
    }

    /// Drop queued and scheduled actions without touching the gate.
    pub fn clear(&mut self) {
        self.drop_pending();
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.scheduled.front().map(|delivery| delivery.due)
    }

    /// Deliver every scheduled action whose time has come. Returns how many
    /// were delivered.
    pub fn fire_due(&mut self) -> usize {
        let now = Instant::now();
        let mut fired = 0;
        while self
            .scheduled
            .front()
            .is_some_and(|delivery| delivery.due <= now)
        {
            if let Some(delivery) = self.scheduled.pop_front() {
                (self.deliver)(delivery.action);
                fired += 1;
            }
        }
        fired
    }

    fn drop_pending(&mut self) {
        let dropped = self.queued_len();
        if dropped > 0 {
            tracing::debug!(dropped, "dropping pending panel actions");
        }
        self.queue.clear();
        self.scheduled.clear();
    }
}
