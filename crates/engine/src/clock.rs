//! The clock seam: wall-clock time for live trading, virtual time for
//! deterministic backtests.
//!
//! The engine only ever talks to `dyn Clock`. Timers and time-alerts fire by
//! calling the registered handler with a [`TimeEvent`], which re-enters the
//! engine through the same serialized event stream as every other input.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use events::TimeEvent;
use tokio::task::JoinHandle;

use crate::error::EngineError;

/// Callback invoked with every timer or alert fire.
pub type TimeEventHandler = Arc<dyn Fn(TimeEvent) + Send + Sync>;

pub trait Clock {
    fn time_now(&self) -> DateTime<Utc>;

    /// Starts a repeating timer firing every `interval` from now.
    fn set_timer(&mut self, label: &str, interval: Duration) -> Result<(), EngineError>;

    /// Schedules a one-shot alert at `alert_time`.
    fn set_time_alert(&mut self, label: &str, alert_time: DateTime<Utc>)
        -> Result<(), EngineError>;

    fn timer_labels(&self) -> Vec<String>;

    fn time_alert_labels(&self) -> Vec<String>;

    fn cancel_all_timers(&mut self);

    fn cancel_all_time_alerts(&mut self);

    /// Registers the handler that receives every generated [`TimeEvent`].
    fn register_handler(&mut self, handler: TimeEventHandler);
}

fn validate_label(
    label: &str,
    timers: &[String],
    alerts: &[String],
) -> Result<(), EngineError> {
    if label.trim().is_empty() {
        return Err(EngineError::Precondition(
            "timer label must be non-empty".to_string(),
        ));
    }
    if timers.iter().any(|l| l == label) || alerts.iter().any(|l| l == label) {
        return Err(EngineError::Precondition(format!(
            "label '{}' is already registered on the clock",
            label
        )));
    }
    Ok(())
}

// ---===[ Live clock ]===---

/// Wall-clock implementation. Each timer is a spawned tokio task that calls
/// the registered handler; callers must run inside a tokio runtime.
#[derive(Default)]
pub struct LiveClock {
    handler: Option<TimeEventHandler>,
    timers: HashMap<String, JoinHandle<()>>,
    alerts: HashMap<String, JoinHandle<()>>,
}

impl LiveClock {
    pub fn new() -> Self {
        Self::default()
    }

    fn handler(&self) -> Result<TimeEventHandler, EngineError> {
        self.handler
            .clone()
            .ok_or_else(|| EngineError::Precondition("no time-event handler registered".to_string()))
    }
}

impl Clock for LiveClock {
    fn time_now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn set_timer(&mut self, label: &str, interval: Duration) -> Result<(), EngineError> {
        validate_label(label, &self.timer_labels(), &self.time_alert_labels())?;
        if interval <= Duration::zero() {
            return Err(EngineError::Precondition(format!(
                "timer '{}' interval must be positive",
                label
            )));
        }
        let period = interval
            .to_std()
            .map_err(|e| EngineError::Precondition(format!("timer interval: {}", e)))?;
        let handler = self.handler()?;
        let owned_label = label.to_string();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick of a tokio interval completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                handler(TimeEvent::new(owned_label.clone(), Utc::now()));
            }
        });
        self.timers.insert(label.to_string(), handle);
        Ok(())
    }

    fn set_time_alert(
        &mut self,
        label: &str,
        alert_time: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        validate_label(label, &self.timer_labels(), &self.time_alert_labels())?;
        let delay = alert_time - Utc::now();
        if delay <= Duration::zero() {
            return Err(EngineError::Precondition(format!(
                "alert '{}' time must be in the future",
                label
            )));
        }
        let sleep = delay
            .to_std()
            .map_err(|e| EngineError::Precondition(format!("alert time: {}", e)))?;
        let handler = self.handler()?;
        let owned_label = label.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(sleep).await;
            handler(TimeEvent::new(owned_label, alert_time));
        });
        self.alerts.insert(label.to_string(), handle);
        Ok(())
    }

    fn timer_labels(&self) -> Vec<String> {
        self.timers.keys().cloned().collect()
    }

    fn time_alert_labels(&self) -> Vec<String> {
        self.alerts.keys().cloned().collect()
    }

    fn cancel_all_timers(&mut self) {
        for (_, handle) in self.timers.drain() {
            handle.abort();
        }
    }

    fn cancel_all_time_alerts(&mut self) {
        for (_, handle) in self.alerts.drain() {
            handle.abort();
        }
    }

    fn register_handler(&mut self, handler: TimeEventHandler) {
        self.handler = Some(handler);
    }
}

impl Drop for LiveClock {
    fn drop(&mut self) {
        self.cancel_all_timers();
        self.cancel_all_time_alerts();
    }
}

// ---===[ Test clock ]===---

struct TestTimer {
    interval: Duration,
    next_time: DateTime<Utc>,
}

/// Virtual-time implementation driven by `set_time` / `iterate_time`.
pub struct TestClock {
    time: DateTime<Utc>,
    timers: HashMap<String, TestTimer>,
    alerts: HashMap<String, DateTime<Utc>>,
    handler: Option<TimeEventHandler>,
}

impl TestClock {
    pub fn new(initial_time: DateTime<Utc>) -> Self {
        Self {
            time: initial_time,
            timers: HashMap::new(),
            alerts: HashMap::new(),
            handler: None,
        }
    }

    /// Moves virtual time without generating events.
    pub fn set_time(&mut self, time: DateTime<Utc>) {
        self.time = time;
    }

    /// Advances virtual time to `to`, delivering every timer and alert fire
    /// in the interval `(previous, to]` to the registered handler, in
    /// chronological order. The fires are also returned.
    pub fn iterate_time(&mut self, to: DateTime<Utc>) -> Vec<TimeEvent> {
        if to < self.time {
            tracing::warn!(
                "iterate_time target {} is before current clock time {}",
                to,
                self.time
            );
            return Vec::new();
        }

        let mut fires: Vec<(DateTime<Utc>, String)> = Vec::new();
        for (label, timer) in self.timers.iter_mut() {
            while timer.next_time <= to {
                fires.push((timer.next_time, label.clone()));
                timer.next_time += timer.interval;
            }
        }
        let due: Vec<String> = self
            .alerts
            .iter()
            .filter(|(_, t)| **t <= to)
            .map(|(l, _)| l.clone())
            .collect();
        for label in due {
            if let Some(t) = self.alerts.remove(&label) {
                fires.push((t, label));
            }
        }

        // Label is the tie-break so simultaneous fires replay identically.
        fires.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        self.time = to;
        let events: Vec<TimeEvent> = fires
            .into_iter()
            .map(|(t, label)| TimeEvent::new(label, t))
            .collect();
        if let Some(handler) = &self.handler {
            for event in &events {
                handler(event.clone());
            }
        }
        events
    }
}

impl Clock for TestClock {
    fn time_now(&self) -> DateTime<Utc> {
        self.time
    }

    fn set_timer(&mut self, label: &str, interval: Duration) -> Result<(), EngineError> {
        validate_label(label, &self.timer_labels(), &self.time_alert_labels())?;
        if interval <= Duration::zero() {
            return Err(EngineError::Precondition(format!(
                "timer '{}' interval must be positive",
                label
            )));
        }
        self.timers.insert(
            label.to_string(),
            TestTimer {
                interval,
                next_time: self.time + interval,
            },
        );
        Ok(())
    }

    fn set_time_alert(
        &mut self,
        label: &str,
        alert_time: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        validate_label(label, &self.timer_labels(), &self.time_alert_labels())?;
        if alert_time <= self.time {
            return Err(EngineError::Precondition(format!(
                "alert '{}' time must be after the current clock time",
                label
            )));
        }
        self.alerts.insert(label.to_string(), alert_time);
        Ok(())
    }

    fn timer_labels(&self) -> Vec<String> {
        self.timers.keys().cloned().collect()
    }

    fn time_alert_labels(&self) -> Vec<String> {
        self.alerts.keys().cloned().collect()
    }

    fn cancel_all_timers(&mut self) {
        self.timers.clear();
    }

    fn cancel_all_time_alerts(&mut self) {
        self.alerts.clear();
    }

    fn register_handler(&mut self, handler: TimeEventHandler) {
        self.handler = Some(handler);
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn clock() -> TestClock {
        TestClock::new(Utc.with_ymd_and_hms(2020, 3, 14, 9, 0, 0).unwrap())
    }

    #[test]
    fn iterate_time_fires_timers_in_chronological_order() {
        let mut clock = clock();
        clock.set_timer("fast", Duration::seconds(10)).unwrap();
        clock.set_timer("slow", Duration::seconds(25)).unwrap();

        let events = clock.iterate_time(Utc.with_ymd_and_hms(2020, 3, 14, 9, 0, 30).unwrap());
        let labels: Vec<&str> = events.iter().map(|e| e.label.as_str()).collect();
        assert_eq!(labels, vec!["fast", "fast", "slow", "fast"]);
        assert!(events.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn iterate_time_fires_alert_once_then_removes_it() {
        let mut clock = clock();
        let alert_time = Utc.with_ymd_and_hms(2020, 3, 14, 9, 0, 5).unwrap();
        clock.set_time_alert("open", alert_time).unwrap();

        let events = clock.iterate_time(Utc.with_ymd_and_hms(2020, 3, 14, 9, 1, 0).unwrap());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].label, "open");
        assert_eq!(events[0].timestamp, alert_time);
        assert!(clock.time_alert_labels().is_empty());

        let later = clock.iterate_time(Utc.with_ymd_and_hms(2020, 3, 14, 9, 2, 0).unwrap());
        assert!(later.is_empty());
    }

    #[test]
    fn duplicate_label_is_rejected() {
        let mut clock = clock();
        clock.set_timer("t1", Duration::seconds(1)).unwrap();
        assert!(clock.set_timer("t1", Duration::seconds(2)).is_err());
        assert!(clock
            .set_time_alert("t1", clock.time_now() + Duration::seconds(5))
            .is_err());
    }

    #[test]
    fn alert_in_the_past_is_rejected() {
        let mut clock = clock();
        let past = clock.time_now() - Duration::seconds(1);
        assert!(clock.set_time_alert("late", past).is_err());
    }

    #[test]
    fn cancel_all_clears_registrations() {
        let mut clock = clock();
        clock.set_timer("t1", Duration::seconds(1)).unwrap();
        clock
            .set_time_alert("a1", clock.time_now() + Duration::seconds(5))
            .unwrap();
        clock.cancel_all_timers();
        clock.cancel_all_time_alerts();
        assert!(clock.timer_labels().is_empty());
        assert!(clock.time_alert_labels().is_empty());
        assert!(clock
            .iterate_time(clock.time_now() + Duration::minutes(5))
            .is_empty());
    }

    #[tokio::test]
    async fn live_clock_timer_calls_registered_handler() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut clock = LiveClock::new();
        clock.register_handler(Arc::new(move |event| {
            let _ = tx.send(event);
        }));
        clock.set_timer("pulse", Duration::milliseconds(5)).unwrap();

        let event = tokio::time::timeout(std::time::Duration::from_secs(1), rx.recv())
            .await
            .expect("timer did not fire")
            .expect("channel closed");
        assert_eq!(event.label, "pulse");

        clock.cancel_all_timers();
        assert!(clock.timer_labels().is_empty());
    }

    #[tokio::test]
    async fn live_clock_requires_handler_before_timer() {
        let mut clock = LiveClock::new();
        assert!(clock.set_timer("pulse", Duration::seconds(1)).is_err());
    }
}
