//! Scheduler loop driving the scrape, evaluate and evict ticks

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use super::config::EngineConfig;
use super::Engine;
use crate::alerts::{deliver, NotificationSink};
use crate::scrape::Scraper;

/// Tick intervals for the three periodic tasks
#[derive(Debug, Clone, Copy)]
pub struct Intervals {
    pub scrape: Duration,
    pub evaluate: Duration,
    pub evict: Duration,
}

impl From<&EngineConfig> for Intervals {
    fn from(config: &EngineConfig) -> Self {
        Self {
            scrape: config.scrape_interval,
            evaluate: config.evaluation_interval,
            evict: config.eviction_interval,
        }
    }
}

/// Runs all periodic work for one engine in a single loop
pub struct Scheduler {
    engine: Arc<Engine>,
    scraper: Arc<Scraper>,
    sink: Arc<dyn NotificationSink>,
    intervals: Intervals,
    shutdown_tx: Option<mpsc::Sender<()>>,
}

impl Scheduler {
    pub fn new(
        engine: Arc<Engine>,
        scraper: Arc<Scraper>,
        sink: Arc<dyn NotificationSink>,
        intervals: Intervals,
    ) -> Self {
        Self {
            engine,
            scraper,
            sink,
            intervals,
            shutdown_tx: None,
        }
    }

    /// Start the loop.
    ///
    /// Each scrape tick runs on its own task so evaluation and eviction keep
    /// their schedule while targets are slow. A scrape tick is skipped while
    /// the previous scrape is still running. Shutdown aborts an in-flight
    /// scrape instead of waiting for it.
    pub fn start(&mut self) -> JoinHandle<()> {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        self.shutdown_tx = Some(shutdown_tx);

        let engine = Arc::clone(&self.engine);
        let scraper = Arc::clone(&self.scraper);
        let sink = Arc::clone(&self.sink);
        let intervals = self.intervals;

        tokio::spawn(async move {
            tracing::info!(
                scrape = ?intervals.scrape,
                evaluate = ?intervals.evaluate,
                evict = ?intervals.evict,
                targets = scraper.targets().len(),
                rules = engine.rules().len(),
                "Scheduler started"
            );

            let mut scrape_tick = interval(intervals.scrape);
            let mut evaluate_tick = interval(intervals.evaluate);
            let mut evict_tick = interval(intervals.evict);
            for ticker in [&mut scrape_tick, &mut evaluate_tick, &mut evict_tick] {
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            }

            let mut scrape_task: Option<JoinHandle<()>> = None;

            loop {
                tokio::select! {
                    biased;

                    _ = shutdown_rx.recv() => {
                        tracing::info!("Scheduler shutting down");
                        break;
                    }
                    _ = evaluate_tick.tick() => {
                        run_evaluation(&engine, &sink, now_ms());
                    }
                    _ = evict_tick.tick() => {
                        let removed = engine.evict(now_ms());
                        if removed > 0 {
                            tracing::info!("Evicted {} samples", removed);
                        }
                    }
                    _ = scrape_tick.tick() => {
                        if scrape_task.as_ref().is_some_and(|task| !task.is_finished()) {
                            tracing::warn!("Previous scrape still running, skipping tick");
                        } else {
                            let engine = Arc::clone(&engine);
                            let scraper = Arc::clone(&scraper);
                            scrape_task = Some(tokio::spawn(async move {
                                scraper.scrape_once(&engine, now_ms()).await;
                            }));
                        }
                    }
                }
            }

            if let Some(task) = scrape_task {
                task.abort();
            }
        })
    }

    /// Signal the loop to stop
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
    }

    pub fn is_running(&self) -> bool {
        self.shutdown_tx.is_some()
    }
}

/// Evaluate all rules and hand each notification to the sink on its own task
pub fn run_evaluation(engine: &Arc<Engine>, sink: &Arc<dyn NotificationSink>, now: i64) -> usize {
    let notifications = engine.evaluate(now);
    let count = notifications.len();

    for notification in notifications {
        let engine = Arc::clone(engine);
        let sink = Arc::clone(sink);
        tokio::spawn(async move {
            deliver(sink.as_ref(), &notification, engine.counters()).await;
        });
    }

    count
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::{Notification, NotifierError, NotifyState};
    use crate::data::MetricKey;
    use crate::rules::{Comparator, Condition, Expr, Rule};
    use crate::scrape::{ExpositionSource, ScrapeError};
    use futures::future::BoxFuture;

    struct FixedSource;

    impl ExpositionSource for FixedSource {
        fn fetch<'a>(&'a self, _target: &'a str) -> BoxFuture<'a, Result<String, ScrapeError>> {
            Box::pin(async { Ok("queue_depth 250\n".to_string()) })
        }
    }

    /// "stall:9100" never answers in time; every other target serves a queue depth
    struct StallSource;

    impl ExpositionSource for StallSource {
        fn fetch<'a>(&'a self, target: &'a str) -> BoxFuture<'a, Result<String, ScrapeError>> {
            Box::pin(async move {
                if target == "stall:9100" {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                }
                Ok("queue_depth 250\n".to_string())
            })
        }
    }

    struct ChannelSink {
        tx: mpsc::UnboundedSender<Notification>,
    }

    impl NotificationSink for ChannelSink {
        fn notify<'a>(&'a self, notification: &'a Notification) -> BoxFuture<'a, Result<(), NotifierError>> {
            Box::pin(async move {
                let _ = self.tx.send(notification.clone());
                Ok(())
            })
        }
    }

    fn queue_rule() -> Rule {
        Rule::new(
            "QueueBacklog",
            Condition::new(
                Expr::latest(MetricKey::with_labels("queue_depth", [("instance", "worker:8080")])),
                Comparator::GreaterThan,
                100.0,
            ),
        )
    }

    #[tokio::test]
    async fn test_scheduler_scrapes_evaluates_and_notifies() {
        let engine = Arc::new(Engine::new(vec![queue_rule()], Duration::from_secs(3600)));
        let scraper = Arc::new(Scraper::new(
            Arc::new(FixedSource),
            vec!["worker:8080".to_string()],
            Duration::from_secs(1),
            4,
        ));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink: Arc<dyn NotificationSink> = Arc::new(ChannelSink { tx });

        let mut scheduler = Scheduler::new(
            Arc::clone(&engine),
            scraper,
            sink,
            Intervals {
                scrape: Duration::from_millis(20),
                evaluate: Duration::from_millis(20),
                evict: Duration::from_secs(60),
            },
        );
        let handle = scheduler.start();
        assert!(scheduler.is_running());

        let notification = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out")
            .expect("channel closed");
        assert_eq!(notification.alert_name, "QueueBacklog");
        assert_eq!(notification.state, NotifyState::Firing);

        scheduler.stop().await;
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("scheduler did not stop")
            .unwrap();
        assert!(!scheduler.is_running());
        assert!(engine.counters().scrapes() >= 1);
    }

    #[tokio::test]
    async fn test_run_evaluation_delivers_and_counts() {
        let engine = Arc::new(Engine::new(vec![queue_rule()], Duration::from_secs(3600)));
        engine
            .append(
                &MetricKey::with_labels("queue_depth", [("instance", "worker:8080")]),
                1000,
                500.0,
            )
            .unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink: Arc<dyn NotificationSink> = Arc::new(ChannelSink { tx });

        assert_eq!(run_evaluation(&engine, &sink, 2000), 1);
        let notification = rx.recv().await.unwrap();
        assert_eq!(notification.value, Some(500.0));

        // Still firing on the next tick: no new notification
        assert_eq!(run_evaluation(&engine, &sink, 3000), 0);
    }

    fn fast_intervals() -> Intervals {
        Intervals {
            scrape: Duration::from_millis(10),
            evaluate: Duration::from_millis(10),
            evict: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn test_stalled_scrape_does_not_block_evaluation_or_shutdown() {
        let engine = Arc::new(Engine::new(vec![queue_rule()], Duration::from_secs(3600)));
        engine
            .append(
                &MetricKey::with_labels("queue_depth", [("instance", "worker:8080")]),
                now_ms(),
                500.0,
            )
            .unwrap();
        let scraper = Arc::new(Scraper::new(
            Arc::new(StallSource),
            vec!["stall:9100".to_string()],
            Duration::from_secs(2),
            4,
        ));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink: Arc<dyn NotificationSink> = Arc::new(ChannelSink { tx });

        let mut scheduler = Scheduler::new(Arc::clone(&engine), scraper, sink, fast_intervals());
        let handle = scheduler.start();

        let notification = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("evaluation never ran")
            .expect("channel closed");
        assert_eq!(notification.alert_name, "QueueBacklog");

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(engine.counters().evaluations() >= 5);
        // Later scrape ticks were skipped while the first one hung
        assert_eq!(engine.counters().scrapes(), 1);

        let started = std::time::Instant::now();
        scheduler.stop().await;
        tokio::time::timeout(Duration::from_millis(500), handle)
            .await
            .expect("scheduler waited for the stalled scrape")
            .unwrap();
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_stalled_target_abandoned_while_others_scraped() {
        let engine = Arc::new(Engine::new(vec![queue_rule()], Duration::from_secs(3600)));
        let scraper = Arc::new(Scraper::new(
            Arc::new(StallSource),
            vec!["stall:9100".to_string(), "worker:8080".to_string()],
            Duration::from_millis(100),
            4,
        ));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink: Arc<dyn NotificationSink> = Arc::new(ChannelSink { tx });

        let mut scheduler = Scheduler::new(Arc::clone(&engine), scraper, sink, fast_intervals());
        let handle = scheduler.start();

        // The healthy target's sample reaches the rule without waiting on the stalled one
        let notification = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("rule never fired")
            .expect("channel closed");
        assert_eq!(notification.state, NotifyState::Firing);

        let stalled_up = MetricKey::with_labels("up", [("instance", "stall:9100")]);
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while engine.latest(&stalled_up).is_none() && std::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(engine.latest(&stalled_up).map(|s| s.value), Some(0.0));

        scheduler.stop().await;
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("scheduler did not stop")
            .unwrap();
    }
}
