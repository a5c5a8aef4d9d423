//! Resources that live exactly as long as the `Active` state
//!
//! An `ActiveSession` is created on activation and dropped on deactivation
//! (or page unload). Dropping it aborts every timer and effect task it
//! spawned and releases the ambient audio.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio::task::AbortHandle;
use tracing::debug;

use crate::config::EffectsConfig;
use crate::core::state::OverlayMode;
use crate::overlay::{Effect, EffectPhase, OverlayEvent, Presenter};

/// Owned set of spawned tasks, aborted together on drop
#[derive(Default)]
pub struct TaskSet {
    handles: Vec<AbortHandle>,
}

impl TaskSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handles.retain(|h| !h.is_finished());
        let handle = tokio::spawn(task);
        self.handles.push(handle.abort_handle());
    }

    /// Tasks that have not finished yet
    pub fn live(&self) -> usize {
        self.handles.iter().filter(|h| !h.is_finished()).count()
    }

    pub fn abort_all(&mut self) {
        for handle in self.handles.drain(..) {
            handle.abort();
        }
    }
}

impl Drop for TaskSet {
    fn drop(&mut self) {
        self.abort_all();
    }
}

/// Fires each scroll threshold at most once
#[derive(Debug, Clone)]
pub struct MilestoneTracker {
    thresholds: Vec<u8>,
    reached: Vec<u8>,
}

impl MilestoneTracker {
    pub fn new(thresholds: &[u8]) -> Self {
        let mut thresholds = thresholds.to_vec();
        thresholds.sort_unstable();
        thresholds.dedup();
        Self {
            thresholds,
            reached: Vec::new(),
        }
    }

    /// Thresholds newly crossed by `percent`, lowest first
    pub fn update(&mut self, percent: u8) -> Vec<u8> {
        let crossed: Vec<u8> = self
            .thresholds
            .iter()
            .copied()
            .filter(|t| percent >= *t && !self.reached.contains(t))
            .collect();
        self.reached.extend(&crossed);
        crossed
    }

    pub fn reached(&self) -> &[u8] {
        &self.reached
    }
}

/// Percentage of the content pane scrolled, 0-100
pub fn scroll_percent(scroll_top: f64, scroll_height: f64, client_height: f64) -> u8 {
    let scrollable = scroll_height - client_height;
    if scrollable <= 0.0 {
        return 100;
    }
    let percent = (scroll_top / scrollable * 100.0).round();
    percent.clamp(0.0, 100.0) as u8
}

pub struct ActiveSession {
    started: Instant,
    milestones: MilestoneTracker,
    last_progress: Option<u8>,
    effect_duration: Duration,
    presenter: Arc<dyn Presenter>,
    tasks: TaskSet,
    #[cfg(feature = "sound")]
    _audio: Option<crate::sound::AmbientHum>,
}

impl ActiveSession {
    /// Start the timers for `mode`. Must be called inside a tokio runtime.
    pub fn start(mode: OverlayMode, effects: &EffectsConfig, presenter: Arc<dyn Presenter>) -> Self {
        let mut session = Self {
            started: Instant::now(),
            milestones: MilestoneTracker::new(&effects.milestones),
            last_progress: None,
            effect_duration: Duration::from_millis(effects.cosmic_event_duration_ms),
            presenter,
            tasks: TaskSet::new(),
            #[cfg(feature = "sound")]
            _audio: None,
        };

        match mode {
            OverlayMode::Dark => {
                session.fire_effect(
                    Effect::SuckIn,
                    Duration::from_millis(effects.suck_in_duration_ms),
                );
            }
            OverlayMode::Galactic => {
                session.every(effects.twinkle_interval_ms, |_| OverlayEvent::Twinkle);
                session.every(effects.shooting_star_interval_ms, |_| OverlayEvent::ShootingStar);
                session.every(effects.stopwatch_tick_ms, OverlayEvent::ReadingTime);

                #[cfg(feature = "sound")]
                session.start_audio(effects);
            }
        }

        session
    }

    #[cfg(feature = "sound")]
    fn start_audio(&mut self, effects: &EffectsConfig) {
        if !effects.ambient_audio {
            return;
        }
        self._audio = match crate::sound::AmbientHum::start(effects.ambient_volume) {
            Ok(hum) => Some(hum),
            Err(e) => {
                tracing::warn!("Could not start ambient audio: {}", e);
                None
            }
        };
    }

    /// Present an event every `period_ms` (0 disables). The closure gets the
    /// time since activation.
    fn every<F>(&mut self, period_ms: u64, make_event: F)
    where
        F: Fn(Duration) -> OverlayEvent + Send + 'static,
    {
        if period_ms == 0 {
            return;
        }
        let presenter = Arc::clone(&self.presenter);
        let started = self.started;
        self.tasks.spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(period_ms));
            // First tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                presenter.present(make_event(started.elapsed()));
            }
        });
    }

    /// One-shot effect that ends itself after `duration`
    pub fn fire_effect(&mut self, effect: Effect, duration: Duration) {
        let presenter = Arc::clone(&self.presenter);
        self.tasks.spawn(async move {
            presenter.present(OverlayEvent::Effect {
                effect,
                phase: EffectPhase::Started,
            });
            tokio::time::sleep(duration).await;
            presenter.present(OverlayEvent::Effect {
                effect,
                phase: EffectPhase::Finished,
            });
        });
    }

    pub fn fire_cosmic_event(&mut self, effect: Effect) {
        self.fire_effect(effect, self.effect_duration);
    }

    /// Record a scroll position; presents progress and any new milestones
    pub fn scrolled(&mut self, percent: u8) {
        if self.last_progress != Some(percent) {
            self.last_progress = Some(percent);
            self.presenter.present(OverlayEvent::Progress(percent));
        }
        for milestone in self.milestones.update(percent) {
            debug!("Reading milestone {}% reached", milestone);
            self.fire_effect(Effect::Milestone(milestone), self.effect_duration);
        }
    }

    pub fn reading_time(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn progress(&self) -> Option<u8> {
        self.last_progress
    }

    pub fn live_tasks(&self) -> usize {
        self.tasks.live()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::{drain, ChannelPresenter};
    use tokio::sync::mpsc;

    #[test]
    fn test_milestones_fire_once_per_threshold() {
        let mut tracker = MilestoneTracker::new(&[25, 50, 75, 100]);
        assert!(tracker.update(10).is_empty());
        assert_eq!(tracker.update(30), vec![25]);
        // Still inside the same band
        assert!(tracker.update(31).is_empty());
        assert!(tracker.update(45).is_empty());
        // Scrolling back up and down again does not re-fire
        assert!(tracker.update(5).is_empty());
        assert!(tracker.update(30).is_empty());
        // A jump crosses several thresholds at once
        assert_eq!(tracker.update(100), vec![50, 75, 100]);
        assert!(tracker.update(100).is_empty());
        assert_eq!(tracker.reached(), &[25, 50, 75, 100]);
    }

    #[test]
    fn test_milestone_thresholds_are_normalized() {
        let mut tracker = MilestoneTracker::new(&[75, 25, 25]);
        assert_eq!(tracker.update(80), vec![25, 75]);
    }

    #[test]
    fn test_scroll_percent() {
        assert_eq!(scroll_percent(0.0, 2000.0, 1000.0), 0);
        assert_eq!(scroll_percent(500.0, 2000.0, 1000.0), 50);
        assert_eq!(scroll_percent(1000.0, 2000.0, 1000.0), 100);
        // Overscroll and negative positions are clamped
        assert_eq!(scroll_percent(1200.0, 2000.0, 1000.0), 100);
        assert_eq!(scroll_percent(-40.0, 2000.0, 1000.0), 0);
        // Nothing to scroll means everything is visible
        assert_eq!(scroll_percent(0.0, 800.0, 1000.0), 100);
    }

    #[tokio::test]
    async fn test_task_set_aborts_on_drop() {
        let (tx, mut rx) = mpsc::channel::<()>(1);
        let mut tasks = TaskSet::new();
        tasks.spawn(async move {
            let _tx = tx;
            std::future::pending::<()>().await;
        });
        assert_eq!(tasks.live(), 1);

        drop(tasks);
        // The aborted task dropped its sender
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_galactic_session_ticks_until_dropped() {
        let (presenter, mut rx) = ChannelPresenter::new();
        let effects = EffectsConfig {
            twinkle_interval_ms: 100,
            shooting_star_interval_ms: 0,
            stopwatch_tick_ms: 0,
            ..EffectsConfig::default()
        };
        let session = ActiveSession::start(OverlayMode::Galactic, &effects, Arc::new(presenter));
        assert_eq!(session.live_tasks(), 1);

        tokio::time::sleep(Duration::from_millis(350)).await;
        let events = drain(&mut rx);
        assert_eq!(
            events.iter().filter(|e| **e == OverlayEvent::Twinkle).count(),
            3
        );

        drop(session);
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dark_session_suck_in_cleans_itself_up() {
        let (presenter, mut rx) = ChannelPresenter::new();
        let session =
            ActiveSession::start(OverlayMode::Dark, &EffectsConfig::default(), Arc::new(presenter));

        tokio::time::sleep(Duration::from_millis(3100)).await;
        let events = drain(&mut rx);
        assert_eq!(
            events,
            vec![
                OverlayEvent::Effect {
                    effect: Effect::SuckIn,
                    phase: EffectPhase::Started
                },
                OverlayEvent::Effect {
                    effect: Effect::SuckIn,
                    phase: EffectPhase::Finished
                },
            ]
        );
        assert_eq!(session.live_tasks(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scrolled_presents_progress_and_milestones() {
        let (presenter, mut rx) = ChannelPresenter::new();
        let effects = EffectsConfig {
            twinkle_interval_ms: 0,
            shooting_star_interval_ms: 0,
            stopwatch_tick_ms: 0,
            ..EffectsConfig::default()
        };
        let mut session =
            ActiveSession::start(OverlayMode::Galactic, &effects, Arc::new(presenter));

        session.scrolled(30);
        session.scrolled(30);
        session.scrolled(40);
        tokio::time::sleep(Duration::from_millis(10)).await;

        let events = drain(&mut rx);
        let milestones: Vec<_> = events
            .iter()
            .filter(|e| {
                matches!(
                    e,
                    OverlayEvent::Effect {
                        effect: Effect::Milestone(_),
                        phase: EffectPhase::Started
                    }
                )
            })
            .collect();
        assert_eq!(milestones.len(), 1);
        assert!(events.contains(&OverlayEvent::Progress(30)));
        assert!(events.contains(&OverlayEvent::Progress(40)));
        // Duplicate position is not re-presented
        assert_eq!(
            events.iter().filter(|e| **e == OverlayEvent::Progress(30)).count(),
            1
        );
        assert_eq!(session.progress(), Some(40));
    }
}
