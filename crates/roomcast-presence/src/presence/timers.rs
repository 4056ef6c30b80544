//! Heartbeat and sweep intervals owned by the session task.

use std::time::Duration;

use tokio::time::{self, Instant, Interval, MissedTickBehavior};

/// Shortest period a timer runs at. `interval_at` panics on zero.
const MIN_PERIOD: Duration = Duration::from_millis(100);

/// Which timer fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Tick {
    Heartbeat,
    Sweep,
}

/// Both periodic timers. A stopped timer never fires.
#[derive(Default)]
pub(crate) struct Timers {
    heartbeat: Option<Interval>,
    sweep: Option<Interval>,
}

fn every(period: Duration) -> Interval {
    let period = period.max(MIN_PERIOD);
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

impl Timers {
    pub(crate) fn start(&mut self, heartbeat: Duration, sweep: Duration) {
        self.heartbeat = Some(every(heartbeat));
        self.sweep = Some(every(sweep));
    }

    pub(crate) fn stop(&mut self) {
        self.heartbeat = None;
        self.sweep = None;
    }

    /// Restart only the heartbeat, keeping the sweep schedule.
    pub(crate) fn set_heartbeat(&mut self, period: Duration) {
        if self.heartbeat.is_some() {
            self.heartbeat = Some(every(period));
        }
    }

    /// Wait for whichever timer fires next. Cancel safe.
    pub(crate) async fn next(&mut self) -> Tick {
        let Self { heartbeat, sweep } = self;
        tokio::select! {
            () = tick(heartbeat) => Tick::Heartbeat,
            () = tick(sweep) => Tick::Sweep,
        }
    }
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn next_at(timers: &mut Timers, start: Instant) -> (Tick, Duration) {
        let tick = timers.next().await;
        (tick, Instant::now() - start)
    }

    #[tokio::test(start_paused = true)]
    async fn first_tick_waits_a_full_period() {
        let mut timers = Timers::default();
        let start = Instant::now();
        timers.start(Duration::from_secs(15), Duration::from_secs(20));

        assert_eq!(
            next_at(&mut timers, start).await,
            (Tick::Heartbeat, Duration::from_secs(15))
        );
        assert_eq!(
            next_at(&mut timers, start).await,
            (Tick::Sweep, Duration::from_secs(20))
        );
        assert_eq!(
            next_at(&mut timers, start).await,
            (Tick::Heartbeat, Duration::from_secs(30))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_timers_never_fire() {
        let mut timers = Timers::default();
        timers.start(Duration::from_secs(1), Duration::from_secs(1));
        timers.stop();

        let result = time::timeout(Duration::from_secs(10), timers.next()).await;
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn set_heartbeat_restarts_period() {
        let mut timers = Timers::default();
        let start = Instant::now();
        timers.start(Duration::from_secs(15), Duration::from_secs(40));
        timers.set_heartbeat(Duration::from_secs(30));

        assert_eq!(
            next_at(&mut timers, start).await,
            (Tick::Heartbeat, Duration::from_secs(30))
        );
        assert_eq!(
            next_at(&mut timers, start).await,
            (Tick::Sweep, Duration::from_secs(40))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn set_heartbeat_on_stopped_timers_is_ignored() {
        let mut timers = Timers::default();
        timers.set_heartbeat(Duration::from_secs(30));

        let result = time::timeout(Duration::from_secs(60), timers.next()).await;
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_periods_are_raised_to_the_minimum() {
        let mut timers = Timers::default();
        let start = Instant::now();
        timers.start(Duration::ZERO, Duration::from_secs(1));

        assert_eq!(next_at(&mut timers, start).await, (Tick::Heartbeat, MIN_PERIOD));

        timers.set_heartbeat(Duration::ZERO);
        let (tick, _) = next_at(&mut timers, start).await;
        assert_eq!(tick, Tick::Heartbeat);
    }
}
