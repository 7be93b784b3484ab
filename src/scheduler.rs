//! Periodic task scheduling aligned to wall-clock boundaries.
//!
//! A [`Scheduler`] runs a tick closure on its own timer thread at a fixed
//! rate. The first tick can be aligned to the next whole second, minute or
//! hour. Stopping joins the timer thread, so once [`Scheduler::stop`]
//! returns no further tick runs; a tick already running is allowed to finish.

use crate::error::{Error, Result};
use chrono::{Duration as ClockDuration, Local, NaiveDateTime, Timelike};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Default reporting period.
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(60);

/// Numbers timer threads across all schedulers, for thread names.
static TIMER_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Which clock boundaries the first tick is aligned to.
///
/// Each flag clears only its own sub-unit: `second` rounds milliseconds up,
/// `minute` rounds seconds up, `hour` rounds minutes up. They are applied in
/// that order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncFlags {
    pub second: bool,
    pub minute: bool,
    pub hour: bool,
}

impl SyncFlags {
    pub const NONE: SyncFlags = SyncFlags {
        second: false,
        minute: false,
        hour: false,
    };

    /// Align to the next whole second.
    pub fn to_second() -> Self {
        SyncFlags {
            second: true,
            ..SyncFlags::NONE
        }
    }

    /// Align to the next exact minute (`hh:mm:00.000`).
    pub fn to_minute() -> Self {
        SyncFlags {
            minute: true,
            ..SyncFlags::to_second()
        }
    }

    /// Align to the next exact hour (`hh:00:00.000`).
    pub fn to_hour() -> Self {
        SyncFlags {
            hour: true,
            ..SyncFlags::to_minute()
        }
    }
}

/// Moves `start` forward to the boundaries selected by `sync`.
///
/// With all flags set, `14:41:23.456` becomes `15:00:00.000`.
pub fn sync_start_time(start: NaiveDateTime, sync: SyncFlags) -> NaiveDateTime {
    let mut time = start;

    if sync.second {
        let nanos = i64::from(time.nanosecond() % 1_000_000_000);
        if nanos != 0 {
            time += ClockDuration::nanoseconds(1_000_000_000 - nanos);
        }
    }

    if sync.minute {
        let seconds = i64::from(time.second());
        if seconds != 0 {
            time += ClockDuration::seconds(60 - seconds);
        }
    }

    if sync.hour {
        let minutes = i64::from(time.minute());
        if minutes != 0 {
            time += ClockDuration::minutes(60 - minutes);
        }
    }

    time
}

/// Timing of a periodic task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleConfig {
    pub period: Duration,
    pub sync: SyncFlags,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        ScheduleConfig {
            period: DEFAULT_PERIOD,
            sync: SyncFlags::NONE,
        }
    }
}

/// The closure run on every tick.
pub type Task = Arc<dyn Fn() + Send + Sync>;

/// A restartable periodic timer. Stopped until [`Scheduler::start`].
pub struct Scheduler {
    name: String,
    config: ScheduleConfig,
    task: Task,
    timer: Mutex<Option<Timer>>,
}

struct Timer {
    cancellation: Arc<Cancellation>,
    thread: JoinHandle<()>,
}

#[derive(Default)]
struct Cancellation {
    cancelled: Mutex<bool>,
    wakeup: Condvar,
}

impl Cancellation {
    fn cancel(&self) {
        *lock(&self.cancelled) = true;
        self.wakeup.notify_all();
    }

    /// Sleeps until `deadline`. Returns `false` if cancelled meanwhile.
    fn wait_until(&self, deadline: Instant) -> bool {
        let mut cancelled = lock(&self.cancelled);
        loop {
            if *cancelled {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            cancelled = match self.wakeup.wait_timeout(cancelled, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }
}

impl Scheduler {
    /// Creates a stopped scheduler. Timer threads are named `<name>-<n>`.
    pub fn new(name: impl Into<String>, config: ScheduleConfig, task: Task) -> Result<Self> {
        if config.period.is_zero() {
            return Err(Error::InvalidArgument(
                "scheduling period must be positive".to_string(),
            ));
        }

        Ok(Scheduler {
            name: name.into(),
            config,
            task,
            timer: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &ScheduleConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        lock(&self.timer).is_some()
    }

    /// Arms a fresh timer thread.
    ///
    /// Fails with [`Error::IllegalState`] if already running.
    pub fn start(&self) -> Result<()> {
        let mut timer = lock(&self.timer);
        if timer.is_some() {
            return Err(Error::IllegalState("already started"));
        }

        let now = Local::now().naive_local();
        let first_fire = sync_start_time(now, self.config.sync);
        let delay = (first_fire - now).to_std().unwrap_or_default();

        let cancellation = Arc::new(Cancellation::default());
        let thread_name = format!(
            "{}-{}",
            self.name,
            TIMER_COUNTER.fetch_add(1, Ordering::Relaxed) + 1
        );

        let thread = {
            let cancellation = Arc::clone(&cancellation);
            let task = Arc::clone(&self.task);
            let period = self.config.period;
            let first = Instant::now() + delay;
            thread::Builder::new()
                .name(thread_name.clone())
                .spawn(move || run_timer(&cancellation, first, period, task.as_ref()))?
        };

        *timer = Some(Timer {
            cancellation,
            thread,
        });

        info!(
            "Timer {} started, first run at {}.",
            thread_name,
            first_fire.format("%H:%M:%S%.3f")
        );
        Ok(())
    }

    /// Cancels the timer. Returns `false` if it was not running.
    pub fn stop(&self) -> bool {
        let mut timer = lock(&self.timer);
        let Some(Timer {
            cancellation,
            thread,
        }) = timer.take()
        else {
            return false;
        };

        cancellation.cancel();
        let thread_name = thread.thread().name().unwrap_or_default().to_string();

        // a tick calling stop() cannot wait for itself
        if thread.thread().id() != thread::current().id() && thread.join().is_err() {
            warn!("Timer {} panicked", thread_name);
        }

        info!("Timer {} stopped.", thread_name);
        true
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Fixed-rate loop: tick `k` is due at `first + k * period` regardless of
/// how long earlier ticks took.
fn run_timer(cancellation: &Cancellation, first: Instant, period: Duration, task: &(dyn Fn() + Send + Sync)) {
    let mut deadline = first;
    while cancellation.wait_until(deadline) {
        debug!("Task started.");
        task();
        deadline += period;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date_time(h: u32, m: u32, s: u32, ms: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2015, 3, 16)
            .unwrap()
            .and_hms_milli_opt(h, m, s, ms)
            .unwrap()
    }

    fn flags(second: bool, minute: bool, hour: bool) -> SyncFlags {
        SyncFlags {
            second,
            minute,
            hour,
        }
    }

    fn counting_scheduler(period_ms: u64) -> (Scheduler, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let task: Task = {
            let count = Arc::clone(&count);
            Arc::new(move || {
                count.fetch_add(1, Ordering::SeqCst);
            })
        };
        let config = ScheduleConfig {
            period: Duration::from_millis(period_ms),
            sync: SyncFlags::NONE,
        };
        (Scheduler::new("TestTimer", config, task).unwrap(), count)
    }

    #[test]
    fn test_sync_start_time_flags() {
        let start = date_time(15, 12, 34, 987);

        assert_eq!(sync_start_time(start, flags(false, false, false)), start);
        assert_eq!(sync_start_time(start, flags(true, false, false)), date_time(15, 12, 35, 0));
        assert_eq!(sync_start_time(start, flags(true, true, false)), date_time(15, 13, 0, 0));
        assert_eq!(sync_start_time(start, flags(true, true, true)), date_time(16, 0, 0, 0));
    }

    #[test]
    fn test_sync_to_minute() {
        let start = date_time(15, 12, 34, 987);
        assert_eq!(sync_start_time(start, SyncFlags::to_minute()), date_time(15, 13, 0, 0));
    }

    #[test]
    fn test_sync_flags_only_clear_own_unit() {
        let start = date_time(15, 12, 34, 987);
        assert_eq!(sync_start_time(start, flags(false, true, false)), date_time(15, 13, 0, 987));
        assert_eq!(sync_start_time(start, flags(false, false, true)), date_time(16, 0, 34, 987));
    }

    #[test]
    fn test_sync_already_aligned() {
        let start = date_time(9, 0, 0, 0);
        assert_eq!(sync_start_time(start, SyncFlags::to_hour()), start);
    }

    #[test]
    fn test_sync_rolls_over_midnight() {
        let start = date_time(23, 59, 59, 500);
        let expected = NaiveDate::from_ymd_opt(2015, 3, 17)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(sync_start_time(start, SyncFlags::to_hour()), expected);
    }

    #[test]
    fn test_zero_period_rejected() {
        let config = ScheduleConfig {
            period: Duration::ZERO,
            sync: SyncFlags::NONE,
        };
        let result = Scheduler::new("Zero", config, Arc::new(|| {}));
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_fixed_rate_ticks() {
        let (scheduler, count) = counting_scheduler(100);

        scheduler.start().unwrap();
        thread::sleep(Duration::from_millis(550));
        scheduler.stop();

        let ticks = count.load(Ordering::SeqCst);
        assert!((5..=7).contains(&ticks), "got {} ticks", ticks);
    }

    #[test]
    fn test_no_ticks_after_stop() {
        let (scheduler, count) = counting_scheduler(20);

        scheduler.start().unwrap();
        thread::sleep(Duration::from_millis(100));
        scheduler.stop();

        let after_stop = count.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(100));
        assert_eq!(count.load(Ordering::SeqCst), after_stop);
    }

    #[test]
    fn test_start_twice_is_illegal() {
        let (scheduler, _) = counting_scheduler(1000);

        scheduler.start().unwrap();
        assert!(matches!(scheduler.start(), Err(Error::IllegalState(_))));
        scheduler.stop();
    }

    #[test]
    fn test_stop_is_idempotent_and_restartable() {
        let (scheduler, count) = counting_scheduler(1000);

        scheduler.stop();
        assert!(!scheduler.is_running());

        scheduler.start().unwrap();
        assert!(scheduler.is_running());
        thread::sleep(Duration::from_millis(50));
        scheduler.stop();
        scheduler.stop();
        assert!(!scheduler.is_running());

        scheduler.start().unwrap();
        assert!(scheduler.is_running());
        thread::sleep(Duration::from_millis(50));
        scheduler.stop();

        // each unsynced start fires immediately
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_stop_reports_cancellation() {
        let (scheduler, _) = counting_scheduler(1000);

        assert!(!scheduler.stop());
        scheduler.start().unwrap();
        assert!(scheduler.stop());
        assert!(!scheduler.stop());
    }

    #[test]
    fn test_concurrent_stops_cancel_once() {
        let (scheduler, _) = counting_scheduler(1000);
        let scheduler = Arc::new(scheduler);
        scheduler.start().unwrap();

        let stoppers: Vec<_> = (0..8)
            .map(|_| {
                let scheduler = Arc::clone(&scheduler);
                thread::spawn(move || scheduler.stop())
            })
            .collect();
        let cancelled = stoppers
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|&cancelled| cancelled)
            .count();

        assert_eq!(cancelled, 1);
    }

    #[test]
    fn test_stop_waits_for_running_tick() {
        let finished = Arc::new(AtomicUsize::new(0));
        let task: Task = {
            let finished = Arc::clone(&finished);
            Arc::new(move || {
                thread::sleep(Duration::from_millis(150));
                finished.fetch_add(1, Ordering::SeqCst);
            })
        };
        let config = ScheduleConfig {
            period: Duration::from_secs(10),
            sync: SyncFlags::NONE,
        };
        let scheduler = Scheduler::new("Slow", config, task).unwrap();

        scheduler.start().unwrap();
        thread::sleep(Duration::from_millis(50));
        scheduler.stop();

        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_stops_timer() {
        let (scheduler, count) = counting_scheduler(20);
        scheduler.start().unwrap();
        thread::sleep(Duration::from_millis(50));
        drop(scheduler);

        let after_drop = count.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(80));
        assert_eq!(count.load(Ordering::SeqCst), after_drop);
    }
}
