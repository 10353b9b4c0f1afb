use crate::sequencer::{ActionSequencer, DEFAULT_STAGGER};
use crate::types::{PanelAction, PanelState};
use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_PANEL_TRANSITION: Duration = Duration::from_millis(300);

/// Delivery handler the frontend hands to its controller.
pub type BoxedActionHandler = Box<dyn FnMut(PanelAction) + Send>;

/// Owns the side panel: its state, the open animation and the action
/// sequencer gated on that animation.
pub struct PanelController<D>
where
    D: FnMut(PanelAction),
{
    state: PanelState,
    sequencer: ActionSequencer<D>,
    transition: Duration,
    opening_since: Option<Instant>,
    rearm_at: Option<Instant>,
}

impl<D> PanelController<D>
where
    D: FnMut(PanelAction),
{
    pub fn new(deliver: D) -> Self {
        Self::with_timing(deliver, DEFAULT_STAGGER, DEFAULT_PANEL_TRANSITION)
    }

    pub fn with_timing(deliver: D, stagger: Duration, transition: Duration) -> Self {
        Self {
            state: PanelState::closed(),
            sequencer: ActionSequencer::with_stagger(deliver, stagger),
            transition,
            opening_since: None,
            rearm_at: None,
        }
    }

    pub fn state(&self) -> &PanelState {
        &self.state
    }

    pub fn is_ready(&self) -> bool {
        self.sequencer.is_ready()
    }

    pub fn pending_actions(&self) -> usize {
        self.sequencer.queued_len()
    }

    /// Apply a router patch, keeping the sequencer consistent with it.
    /// A patch for the panel type already open is merged over the current
    /// state; closing replaces it.
    pub fn apply_state(&mut self, next: PanelState) {
        let next = next.merged_over(&self.state);
        match (self.state.is_open(), next.is_open()) {
            (false, true) => {
                tracing::debug!(panel = ?next.panel_type(), "panel opening");
                self.opening_since = Some(Instant::now());
            }
            (true, false) => {
                tracing::debug!("panel closed");
                self.opening_since = None;
                self.rearm_at = None;
                self.sequencer.set_ready(false);
            }
            (true, true) if !self.state.same_target(&next) => {
                tracing::debug!(panel = ?next.panel_type(), "panel retargeted");
                self.sequencer.clear();
            }
            _ => {}
        }
        self.state = next;
    }

    pub fn enqueue(&mut self, action: PanelAction) {
        self.sequencer.enqueue(action);
    }

    /// Finish the open transition (or a post-cancel re-arm) if its time is
    /// up, then deliver whatever the sequencer has due.
    pub fn tick(&mut self) -> usize {
        let now = Instant::now();
        let mut delivered = 0;
        if self
            .opening_since
            .is_some_and(|started| now >= started + self.transition)
        {
            self.opening_since = None;
        }
        if self.opening_since.is_none() && self.rearm_at.is_some_and(|due| now >= due) {
            self.rearm_at = None;
        }
        let gate_due = self.state.is_open()
            && !self.sequencer.is_ready()
            && self.opening_since.is_none()
            && self.rearm_at.is_none();
        if gate_due {
            let before = self.sequencer.queued_len();
            self.sequencer.set_ready(true);
            delivered += before.saturating_sub(self.sequencer.queued_len());
        }
        delivered + self.sequencer.fire_due()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        let gate = match (
            self.opening_since.map(|started| started + self.transition),
            self.rearm_at,
        ) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        match (gate, self.sequencer.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Open animation progress in `0.0..=1.0`; a closed panel is `0.0`.
    pub fn transition_progress(&self) -> f32 {
        if !self.state.is_open() {
            return 0.0;
        }
        match self.opening_since {
            None => 1.0,
            Some(_) if self.transition.is_zero() => 1.0,
            Some(started) => {
                (started.elapsed().as_secs_f32() / self.transition.as_secs_f32()).min(1.0)
            }
        }
    }

    /// A turn was cancelled: nothing already queued may fire. An open panel
    /// stays on screen and becomes ready again after one transition period.
    pub fn cancel_pending(&mut self) {
        self.sequencer.set_ready(false);
        self.rearm_at = self
            .state
            .is_open()
            .then(|| Instant::now() + self.transition);
    }

    pub fn reset(&mut self) {
        self.sequencer.set_ready(false);
        self.opening_since = None;
        self.rearm_at = None;
        self.state = PanelState::closed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PanelType;
    use std::sync::{Arc, Mutex};

    type Delivered = Arc<Mutex<Vec<PanelAction>>>;

    fn controller() -> (PanelController<impl FnMut(PanelAction)>, Delivered) {
        let delivered: Delivered = Arc::new(Mutex::new(Vec::new()));
        let sink = delivered.clone();
        let controller = PanelController::new(move |action| sink.lock().unwrap().push(action));
        (controller, delivered)
    }

    fn project(slug: &str) -> PanelState {
        PanelState::opened(PanelType::Project).with_slug(Some(slug.to_string()))
    }

    fn field(name: &str) -> PanelAction {
        PanelAction::HighlightField {
            slug: "demo".into(),
            field: name.into(),
        }
    }

    async fn settle<D: FnMut(PanelAction)>(panel: &mut PanelController<D>) {
        while let Some(deadline) = panel.next_deadline() {
            tokio::time::sleep_until(deadline).await;
            panel.tick();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_actions_wait_for_open_transition() {
        let (mut panel, delivered) = controller();
        panel.apply_state(project("demo"));
        panel.enqueue(field("stack"));
        assert_eq!(panel.transition_progress(), 0.0);

        tokio::time::advance(Duration::from_millis(299)).await;
        assert_eq!(panel.tick(), 0);
        assert!(delivered.lock().unwrap().is_empty());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(panel.tick(), 1);
        assert!(panel.is_ready());
        assert_eq!(panel.transition_progress(), 1.0);
        assert_eq!(*delivered.lock().unwrap(), vec![field("stack")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_drops_queued_actions() {
        let (mut panel, delivered) = controller();
        panel.apply_state(project("demo"));
        panel.enqueue(field("stack"));
        panel.apply_state(PanelState::closed());
        assert!(!panel.is_ready());
        assert_eq!(panel.pending_actions(), 0);
        assert_eq!(panel.next_deadline(), None);

        tokio::time::advance(Duration::from_secs(10)).await;
        panel.tick();
        assert!(delivered.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retarget_clears_but_same_target_keeps_queue() {
        let (mut panel, delivered) = controller();
        panel.apply_state(project("demo"));
        panel.enqueue(field("stack"));

        panel.apply_state(project("demo").with_category(Some("web".into())));
        assert_eq!(panel.pending_actions(), 1);

        panel.apply_state(project("other"));
        assert_eq!(panel.pending_actions(), 0);

        settle(&mut panel).await;
        assert!(panel.is_ready());
        assert!(delivered.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_rearms_open_panel() {
        let (mut panel, delivered) = controller();
        panel.apply_state(project("demo"));
        settle(&mut panel).await;
        assert!(panel.is_ready());

        assert_eq!(panel.transition_progress(), 1.0);

        panel.enqueue(field("a"));
        panel.cancel_pending();
        assert!(!panel.is_ready());
        assert_eq!(panel.transition_progress(), 1.0);

        panel.enqueue(field("b"));
        tokio::time::advance(Duration::from_millis(150)).await;
        assert_eq!(panel.tick(), 0);
        assert_eq!(panel.transition_progress(), 1.0);

        settle(&mut panel).await;
        assert!(panel.is_ready());
        assert_eq!(panel.transition_progress(), 1.0);
        assert_eq!(*delivered.lock().unwrap(), vec![field("a"), field("b")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_open_waits_for_both_timers() {
        let (mut panel, delivered) = controller();
        panel.apply_state(project("demo"));
        tokio::time::advance(Duration::from_millis(200)).await;
        panel.cancel_pending();
        assert!((panel.transition_progress() - 2.0 / 3.0).abs() < 1e-3);

        panel.enqueue(field("late"));
        tokio::time::advance(Duration::from_millis(100)).await;
        assert_eq!(panel.tick(), 0);
        assert_eq!(panel.transition_progress(), 1.0);

        settle(&mut panel).await;
        assert_eq!(*delivered.lock().unwrap(), vec![field("late")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_panel_patch_without_slug_keeps_target_and_queue() {
        let (mut panel, delivered) = controller();
        panel.apply_state(project("demo"));
        panel.enqueue(field("stack"));

        panel.apply_state(PanelState::opened(PanelType::Project));
        assert_eq!(panel.state().slug.as_deref(), Some("demo"));
        assert_eq!(panel.pending_actions(), 1);
        panel.enqueue(field("scale"));

        settle(&mut panel).await;
        assert_eq!(*delivered.lock().unwrap(), vec![field("stack"), field("scale")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_closes_panel() {
        let (mut panel, _delivered) = controller();
        panel.apply_state(project("demo"));
        settle(&mut panel).await;
        panel.reset();
        assert!(!panel.state().is_open());
        assert!(!panel.is_ready());
        assert_eq!(panel.transition_progress(), 0.0);
    }
}
