use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};
use tracing::{debug, error, info, warn};

use crate::collab::{ChatTransport, InboundEvent, Sender, ThreadMessage, messages};
use crate::engine::orchestrator::{Orchestrator, ReplyOutcome, TickOutcome};

/// Fires once per day at a fixed local time. A failed cycle leaves the day
/// unsettled so the next check retries.
#[derive(Clone, Debug)]
pub struct DailySchedule {
    at: NaiveTime,
    settled_on: Option<NaiveDate>,
}

impl DailySchedule {
    pub fn new(at: NaiveTime) -> Self {
        Self {
            at,
            settled_on: None,
        }
    }

    pub fn is_due(&self, now: NaiveDateTime) -> bool {
        now.time() >= self.at && self.settled_on != Some(now.date())
    }

    pub fn settle(&mut self, day: NaiveDate) {
        self.settled_on = Some(day);
    }
}

fn ts_value(ts: &str) -> f64 {
    ts.parse().unwrap_or(0.0)
}

/// Tracks the newest message seen per thread so polling only yields new
/// user replies.
#[derive(Default)]
pub struct ThreadWatcher {
    last_seen: HashMap<String, f64>,
}

impl ThreadWatcher {
    /// On first sight of a thread, user messages after the bot's last
    /// message count as unanswered and are returned.
    pub fn observe(&mut self, thread_id: &str, messages: &[ThreadMessage]) -> Vec<ThreadMessage> {
        let baseline = match self.last_seen.get(thread_id) {
            Some(ts) => *ts,
            None => messages
                .iter()
                .filter(|m| m.sender == Sender::Bot)
                .map(|m| ts_value(&m.ts))
                .fold(0.0, f64::max),
        };

        let fresh: Vec<ThreadMessage> = messages
            .iter()
            .filter(|m| ts_value(&m.ts) > baseline && matches!(m.sender, Sender::User(_)))
            .cloned()
            .collect();

        let newest = messages
            .iter()
            .map(|m| ts_value(&m.ts))
            .fold(baseline, f64::max);
        self.last_seen.insert(thread_id.to_string(), newest);
        fresh
    }
}

#[derive(Clone, Debug)]
pub struct ServiceOptions {
    pub daily_time: NaiveTime,
    pub poll_interval: Duration,
    pub watched_threads: usize,
}

/// Owns the daily schedule and drives `Orchestrator::tick`.
pub struct DailyScheduler {
    orchestrator: Arc<Orchestrator>,
    schedule: DailySchedule,
}

impl DailyScheduler {
    pub fn new(orchestrator: Arc<Orchestrator>, daily_time: NaiveTime) -> Self {
        Self {
            orchestrator,
            schedule: DailySchedule::new(daily_time),
        }
    }

    /// Run a cycle right away, whatever the time of day. Dormancy still applies.
    pub fn startup(&mut self, now: NaiveDateTime) -> TickOutcome {
        info!("startup word check");
        self.fire(now)
    }

    /// Run a cycle if today's word is due; `None` when it is not.
    pub fn check(&mut self, now: NaiveDateTime) -> Option<TickOutcome> {
        if !self.schedule.is_due(now) {
            return None;
        }
        Some(self.fire(now))
    }

    fn fire(&mut self, now: NaiveDateTime) -> TickOutcome {
        let outcome = self.orchestrator.tick();
        match &outcome {
            TickOutcome::Posted { word, .. } => info!(%word, "daily word posted"),
            TickOutcome::Dormant { word } => {
                info!(%word, "dormant: waiting for a reply to the current word")
            }
            TickOutcome::InFlight => debug!("tick skipped, generation in flight"),
            TickOutcome::Failed(e) => warn!(error = %e, "daily word failed, will retry"),
        }
        if outcome.is_settled() {
            self.schedule.settle(now.date());
        }
        outcome
    }
}

/// Polls the most recent word threads and routes new user messages.
pub struct ReplyListener {
    orchestrator: Arc<Orchestrator>,
    chat: Arc<dyn ChatTransport>,
    watcher: ThreadWatcher,
    watched: usize,
}

impl ReplyListener {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        chat: Arc<dyn ChatTransport>,
        watched: usize,
    ) -> Self {
        Self {
            orchestrator,
            chat,
            watcher: ThreadWatcher::default(),
            watched,
        }
    }

    /// One pass over the watched threads. Returns how many replies were routed.
    pub fn poll(&mut self) -> usize {
        let mut routed = 0;
        for thread_id in self.orchestrator.recent_threads(self.watched) {
            let messages = match self.chat.fetch_thread_messages(&thread_id) {
                Ok(m) => m,
                Err(e) => {
                    warn!(thread = %thread_id, error = %e, "could not poll thread");
                    continue;
                }
            };
            for message in self.watcher.observe(&thread_id, &messages) {
                let Sender::User(user_id) = message.sender else {
                    continue;
                };
                let event = InboundEvent {
                    thread_id: thread_id.clone(),
                    user_id,
                    text: message.text,
                    is_bot: false,
                    event_id: None,
                    ts: message.ts,
                };
                self.dispatch(&event);
                routed += 1;
            }
        }
        routed
    }

    fn dispatch(&self, event: &InboundEvent) {
        match self.orchestrator.handle_event(event) {
            Ok(ReplyOutcome::Discarded(reason)) => {
                debug!(thread = %event.thread_id, ?reason, "reply discarded")
            }
            Ok(ReplyOutcome::Known { word, next }) => info!(%word, ?next, "word marked known"),
            Ok(ReplyOutcome::Tutored { word, first_reply }) => {
                info!(%word, first_reply, "tutor replied")
            }
            Ok(ReplyOutcome::WordRequested { word, next }) => {
                info!(%word, ?next, "new word requested")
            }
            Err(e) => {
                error!(thread = %event.thread_id, error = %e, "reply handling failed");
                // The watcher has moved past this message, so tell the user.
                let notice = messages::processing_error();
                if let Err(e) = self.chat.post_reply(&event.thread_id, notice) {
                    warn!(thread = %event.thread_id, error = %e, "could not post error notice");
                }
            }
        }
    }
}

/// Runs the scheduler and the reply listener on separate threads. Each calls
/// the orchestrator directly; neither waits on the other.
pub struct Service {
    orchestrator: Arc<Orchestrator>,
    chat: Arc<dyn ChatTransport>,
    options: ServiceOptions,
}

impl Service {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        chat: Arc<dyn ChatTransport>,
        options: ServiceOptions,
    ) -> Self {
        Self {
            orchestrator,
            chat,
            options,
        }
    }

    pub fn spawn(self) -> Vec<JoinHandle<()>> {
        let interval = self.options.poll_interval;

        let mut scheduler =
            DailyScheduler::new(Arc::clone(&self.orchestrator), self.options.daily_time);
        let scheduler_thread = thread::spawn(move || {
            scheduler.startup(Local::now().naive_local());
            loop {
                thread::sleep(interval);
                scheduler.check(Local::now().naive_local());
            }
        });

        let mut listener =
            ReplyListener::new(self.orchestrator, self.chat, self.options.watched_threads);
        let listener_thread = thread::spawn(move || {
            loop {
                listener.poll();
                thread::sleep(interval);
            }
        });

        vec![scheduler_thread, listener_thread]
    }

    /// Blocks for the life of the process.
    pub fn run(self) -> anyhow::Result<()> {
        info!(
            daily_time = %self.options.daily_time,
            poll_secs = self.options.poll_interval.as_secs(),
            "service starting"
        );
        for handle in self.spawn() {
            if handle.join().is_err() {
                anyhow::bail!("service thread panicked");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(sender: Sender, ts: &str) -> ThreadMessage {
        ThreadMessage {
            sender,
            text: format!("message {ts}"),
            ts: ts.to_string(),
        }
    }

    fn user() -> Sender {
        Sender::User("U1".to_string())
    }

    #[test]
    fn test_schedule_fires_once_per_day_after_time() {
        let mut schedule = DailySchedule::new(NaiveTime::from_hms_opt(9, 0, 0).unwrap());
        let day = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let early = day.and_hms_opt(8, 59, 0).unwrap();
        let late = day.and_hms_opt(9, 1, 0).unwrap();

        assert!(!schedule.is_due(early));
        assert!(schedule.is_due(late));
        schedule.settle(day);
        assert!(!schedule.is_due(late));

        let next_day = NaiveDate::from_ymd_opt(2026, 3, 2)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        assert!(schedule.is_due(next_day));
    }

    #[test]
    fn test_watcher_first_sight_returns_unanswered_replies() {
        let mut watcher = ThreadWatcher::default();
        let messages = vec![
            msg(Sender::Bot, "100.1"),
            msg(user(), "100.2"),
            msg(Sender::Bot, "100.3"),
            msg(user(), "100.4"),
        ];
        let fresh = watcher.observe("t1", &messages);
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].ts, "100.4");
    }

    #[test]
    fn test_watcher_only_yields_new_user_messages() {
        let mut watcher = ThreadWatcher::default();
        let mut messages = vec![msg(Sender::Bot, "100.1")];
        assert!(watcher.observe("t1", &messages).is_empty());

        messages.push(msg(user(), "100.2"));
        messages.push(msg(Sender::Bot, "100.3"));
        let fresh = watcher.observe("t1", &messages);
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].ts, "100.2");

        assert!(watcher.observe("t1", &messages).is_empty());
    }
}
