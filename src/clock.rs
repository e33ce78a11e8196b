//! Time sources and repeating timers.
//!
//! Everything that reads the wall clock or waits on an interval goes through
//! these traits so tests can drive time by hand.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::error::{Result, StoreError};

/// Provides the current time.
pub trait Clock: Send + Sync {
  fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> {
    Utc::now()
  }
}

/// Clock frozen at a settable instant.
#[derive(Debug)]
pub struct FixedClock {
  now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
  pub fn new(now: DateTime<Utc>) -> Self {
    Self {
      now: Mutex::new(now),
    }
  }

  pub fn set(&self, now: DateTime<Utc>) {
    if let Ok(mut guard) = self.now.lock() {
      *guard = now;
    }
  }
}

impl Clock for FixedClock {
  fn now(&self) -> DateTime<Utc> {
    self.now.lock().map(|t| *t).unwrap_or_else(|e| *e.into_inner())
  }
}

/// One repeating timer.
#[async_trait]
pub trait Ticker: Send {
  /// Wait for the next tick. Returns `false` once the timer can never fire again.
  async fn tick(&mut self) -> bool;
}

/// Hands out repeating timers.
pub trait Scheduler: Send + Sync {
  fn ticker(&self, period: Duration) -> Result<Box<dyn Ticker>>;
}

/// Scheduler backed by `tokio::time`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
  fn ticker(&self, period: Duration) -> Result<Box<dyn Ticker>> {
    if period.is_zero() {
      return Err(StoreError::Configuration(
        "polling interval must be greater than zero".to_string(),
      ));
    }
    tokio::runtime::Handle::try_current()
      .map_err(|e| StoreError::FeedUnavailable(format!("no async runtime: {}", e)))?;

    // First tick after one full period, like a browser interval
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    Ok(Box::new(IntervalTicker { interval }))
  }
}

struct IntervalTicker {
  interval: Interval,
}

#[async_trait]
impl Ticker for IntervalTicker {
  async fn tick(&mut self) -> bool {
    self.interval.tick().await;
    true
  }
}

/// Scheduler whose timers only fire when [`ManualScheduler::advance`] is called.
#[derive(Debug, Clone, Default)]
pub struct ManualScheduler {
  senders: Arc<Mutex<Vec<mpsc::UnboundedSender<()>>>>,
}

impl ManualScheduler {
  pub fn new() -> Self {
    Self::default()
  }

  /// Fire every live timer once. Returns how many timers were fired.
  pub fn advance(&self) -> usize {
    let Ok(mut senders) = self.senders.lock() else {
      return 0;
    };
    senders.retain(|tx| tx.send(()).is_ok());
    senders.len()
  }

  /// Number of timers whose receiving side is still alive.
  pub fn live_timers(&self) -> usize {
    self
      .senders
      .lock()
      .map(|s| s.iter().filter(|tx| !tx.is_closed()).count())
      .unwrap_or(0)
  }
}

impl Scheduler for ManualScheduler {
  fn ticker(&self, _period: Duration) -> Result<Box<dyn Ticker>> {
    let (tx, rx) = mpsc::unbounded_channel();
    self
      .senders
      .lock()
      .map_err(|e| StoreError::FeedUnavailable(format!("Lock poisoned: {}", e)))?
      .push(tx);
    Ok(Box::new(ManualTicker { rx }))
  }
}

struct ManualTicker {
  rx: mpsc::UnboundedReceiver<()>,
}

#[async_trait]
impl Ticker for ManualTicker {
  async fn tick(&mut self) -> bool {
    self.rx.recv().await.is_some()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  #[test]
  fn test_fixed_clock_set() {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let clock = FixedClock::new(start);
    assert_eq!(clock.now(), start);

    let later = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    clock.set(later);
    assert_eq!(clock.now(), later);
  }

  #[test]
  fn test_tokio_scheduler_rejects_zero_period() {
    let result = TokioScheduler.ticker(Duration::ZERO);
    assert!(matches!(result, Err(StoreError::Configuration(_))));
  }

  #[test]
  fn test_tokio_scheduler_requires_runtime() {
    let result = TokioScheduler.ticker(Duration::from_millis(10));
    assert!(matches!(result, Err(StoreError::FeedUnavailable(_))));
  }

  #[tokio::test(start_paused = true)]
  async fn test_interval_ticker_waits_one_period() {
    let mut ticker = TokioScheduler.ticker(Duration::from_secs(5)).unwrap();
    let started = Instant::now();
    assert!(ticker.tick().await);
    assert!(started.elapsed() >= Duration::from_secs(5));
  }

  #[tokio::test]
  async fn test_manual_scheduler_fires_live_timers() {
    let scheduler = ManualScheduler::new();
    let mut first = scheduler.ticker(Duration::from_secs(1)).unwrap();
    let second = scheduler.ticker(Duration::from_secs(1)).unwrap();

    drop(second);
    assert_eq!(scheduler.live_timers(), 1);
    assert_eq!(scheduler.advance(), 1);
    assert!(first.tick().await);
  }
}
