//! Authoritative game clock.
//!
//! [`PhaseClock`] is a pure state machine over wall-clock instants: the countdown is
//! always recomputed from the time elapsed since the phase started, never from a tick
//! counter, so late or skipped ticks do not make it drift. Phase boundaries are
//! advanced by exactly the phase duration, which keeps consecutive phases aligned to
//! the configured schedule even when a tick arrives late.
//!
//! [`run_phase_clock`] drives a shared clock at a fixed interval and turns its events
//! into store mutations.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::game_state::Phase;
use crate::state_store::{Mutation, StateStore};

/// How long each phase lasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseDurations {
    pub lobby: Duration,
    pub active: Duration,
    pub results: Duration,
}

impl PhaseDurations {
    pub fn of(&self, phase: Phase) -> Duration {
        match phase {
            Phase::Lobby => self.lobby,
            Phase::Active => self.active,
            Phase::Results => self.results,
        }
    }
}

/// Something the clock wants the store to know.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockEvent {
    /// The countdown changed within the current phase.
    Tick { time_left: u64 },
    /// A new phase started.
    Transition { phase: Phase, time_left: u64 },
    /// RESULTS ran out and a new run starts in LOBBY.
    Restart { time_left: u64 },
}

impl ClockEvent {
    pub fn into_mutation(self) -> Mutation {
        match self {
            ClockEvent::Tick { time_left } => Mutation::AdvanceClock { time_left },
            ClockEvent::Transition { phase, time_left } => {
                Mutation::TransitionPhase { phase, time_left }
            }
            ClockEvent::Restart { time_left } => Mutation::Reset { time_left },
        }
    }
}

#[derive(Debug)]
pub struct PhaseClock {
    phase: Phase,
    phase_started: Instant,
    durations: PhaseDurations,
    auto_restart: bool,
    last_reported: u64,
}

impl PhaseClock {
    /// A clock in LOBBY, started at `now`.
    pub fn new(durations: PhaseDurations, auto_restart: bool, now: Instant) -> PhaseClock {
        PhaseClock {
            phase: Phase::Lobby,
            phase_started: now,
            durations,
            auto_restart,
            last_reported: whole_seconds(durations.lobby),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Seconds left in the current phase at `now`, rounded up.
    pub fn time_left_at(&self, now: Instant) -> u64 {
        let elapsed = now.saturating_duration_since(self.phase_started);
        whole_seconds(self.durations.of(self.phase).saturating_sub(elapsed))
    }

    /// Bring the clock up to `now`.
    ///
    /// Returns every transition that happened since the last call, or a single tick if
    /// only the countdown moved. RESULTS holds at zero unless auto restart is enabled.
    pub fn advance(&mut self, now: Instant) -> Vec<ClockEvent> {
        let mut events = vec![];
        loop {
            let duration = self.durations.of(self.phase);
            if now.saturating_duration_since(self.phase_started) < duration {
                break;
            }
            let event = match self.phase.next() {
                Some(next) => {
                    self.phase = next;
                    self.phase_started += duration;
                    ClockEvent::Transition {
                        phase: next,
                        time_left: self.time_left_at(now),
                    }
                }
                None if self.auto_restart => {
                    self.phase = Phase::Lobby;
                    self.phase_started += duration;
                    ClockEvent::Restart {
                        time_left: self.time_left_at(now),
                    }
                }
                None => break,
            };
            self.last_reported = self.time_left_at(now);
            events.push(event);
        }

        let time_left = self.time_left_at(now);
        if time_left != self.last_reported {
            self.last_reported = time_left;
            events.push(ClockEvent::Tick { time_left });
        }
        events
    }

    /// Re-arm LOBBY from `now`, regardless of the current phase.
    pub fn restart(&mut self, now: Instant) -> ClockEvent {
        self.phase = Phase::Lobby;
        self.phase_started = now;
        self.last_reported = whole_seconds(self.durations.lobby);
        ClockEvent::Restart {
            time_left: self.last_reported,
        }
    }
}

fn whole_seconds(duration: Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}

/// Bring `clock` up to `now` and apply its events to `store`.
///
/// The clock lock is held while applying, so a concurrent restart cannot interleave
/// with a stale countdown.
pub(crate) fn apply_clock(clock: &Mutex<PhaseClock>, store: &StateStore, now: Instant) {
    let mut clock = clock.lock().expect("phase clock lock poisoned");
    for event in clock.advance(now) {
        match event {
            ClockEvent::Transition { phase, time_left } => {
                info!(%phase, time_left, "phase transition")
            }
            ClockEvent::Restart { .. } => info!("results over, restarting in lobby"),
            ClockEvent::Tick { .. } => {}
        }
        if let Err(e) = store.apply_mutation(event.into_mutation()) {
            warn!(error = %e, ?event, "clock event rejected");
        }
    }
}

/// Tick `clock` every `interval` until `shutdown` flips, applying its events to `store`.
pub async fn run_phase_clock(
    clock: Arc<Mutex<PhaseClock>>,
    store: Arc<StateStore>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            now = ticker.tick() => apply_clock(&clock, &store, now.into_std()),
            _ = shutdown.changed() => break,
        }
    }
    debug!("phase clock stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECOND: Duration = Duration::from_secs(1);

    fn durations() -> PhaseDurations {
        PhaseDurations {
            lobby: Duration::from_secs(3),
            active: Duration::from_secs(5),
            results: Duration::from_secs(2),
        }
    }

    fn transitions(events: &[ClockEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, ClockEvent::Transition { .. }))
            .count()
    }

    #[test]
    fn test_lobby_countdown_transitions_once() {
        let start = Instant::now();
        let mut clock = PhaseClock::new(durations(), false, start);
        let mut all = vec![];

        for tick in 1..=4 {
            let events = clock.advance(start + SECOND * tick);
            all.extend(events);
        }

        assert_eq!(transitions(&all), 1);
        assert_eq!(
            all,
            vec![
                ClockEvent::Tick { time_left: 2 },
                ClockEvent::Tick { time_left: 1 },
                ClockEvent::Transition {
                    phase: Phase::Active,
                    time_left: 5
                },
                ClockEvent::Tick { time_left: 4 },
            ]
        );
        assert_eq!(clock.phase(), Phase::Active);
    }

    #[test]
    fn test_late_tick_recomputes_from_wall_clock() {
        let start = Instant::now();
        let mut clock = PhaseClock::new(durations(), false, start);

        // a single tick arriving 4.5s in: lobby is over and active is 1.5s old
        let events = clock.advance(start + Duration::from_millis(4500));
        assert_eq!(
            events,
            vec![
                ClockEvent::Transition {
                    phase: Phase::Active,
                    time_left: 4
                },
            ]
        );
        assert_eq!(clock.time_left_at(start + SECOND * 6), 2);
    }

    #[test]
    fn test_results_holds_without_restart() {
        let start = Instant::now();
        let mut clock = PhaseClock::new(durations(), false, start);

        let events = clock.advance(start + SECOND * 100);
        assert_eq!(transitions(&events), 2);
        assert_eq!(clock.phase(), Phase::Results);
        assert_eq!(
            events.last(),
            Some(&ClockEvent::Transition {
                phase: Phase::Results,
                time_left: 0
            })
        );

        assert!(clock.advance(start + SECOND * 200).is_empty());
        assert_eq!(clock.phase(), Phase::Results);

        let event = clock.restart(start + SECOND * 200);
        assert_eq!(event, ClockEvent::Restart { time_left: 3 });
        assert_eq!(clock.phase(), Phase::Lobby);
    }

    #[test]
    fn test_auto_restart_after_results() {
        let start = Instant::now();
        let mut clock = PhaseClock::new(durations(), true, start);

        // lobby 3 + active 5 + results 2 = 10
        let events = clock.advance(start + SECOND * 10);
        assert_eq!(events.last(), Some(&ClockEvent::Restart { time_left: 3 }));
        assert_eq!(clock.phase(), Phase::Lobby);
        assert_eq!(
            ClockEvent::Restart { time_left: 3 }.into_mutation(),
            Mutation::Reset { time_left: 3 }
        );
    }

    #[test]
    fn test_clock_events_reach_the_store() {
        let start = Instant::now();
        let clock = Mutex::new(PhaseClock::new(durations(), false, start));
        let store = StateStore::new(vec![], 3, 16);

        apply_clock(&clock, &store, start + SECOND);
        assert_eq!(store.phase(), (Phase::Lobby, 2));
        apply_clock(&clock, &store, start + SECOND);
        assert_eq!(store.version(), 1);

        apply_clock(&clock, &store, start + SECOND * 4);
        assert_eq!(store.phase(), (Phase::Active, 4));
        assert_eq!(store.version(), 2);
    }

    #[test]
    fn test_fractional_seconds_round_up() {
        assert_eq!(whole_seconds(Duration::from_millis(1)), 1);
        assert_eq!(whole_seconds(Duration::from_millis(2000)), 2);
        assert_eq!(whole_seconds(Duration::ZERO), 0);
    }
}
