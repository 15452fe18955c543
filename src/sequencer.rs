//! FIFO of directives drained by a single worker task.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use log::{debug, warn};
use tokio::sync::{Notify, mpsc};
use tokio::time::{Duration, sleep};

use crate::executor::ActionRunner;
use crate::types::Directive;

/// Count of directives not yet settled, with a wakeup for when it reaches zero.
#[derive(Debug, Default)]
struct Outstanding {
    count: AtomicUsize,
    idle: Notify,
}

impl Outstanding {
    fn add(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    fn finish(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }

    fn get(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

/// Runs directives one at a time, in arrival order, with a settle pause after each.
///
/// The worker owns the runner; at most one directive is ever in flight. Dropping the
/// sequencer closes the queue, but directives already queued still run.
#[derive(Debug)]
pub struct ActionSequencer {
    tx: mpsc::UnboundedSender<Directive>,
    outstanding: Arc<Outstanding>,
}

impl ActionSequencer {
    /// Spawns the worker on the current tokio runtime.
    pub fn new<R: ActionRunner>(runner: R, settle: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let outstanding = Arc::new(Outstanding::default());
        tokio::spawn(work(runner, rx, settle, Arc::clone(&outstanding)));
        Self { tx, outstanding }
    }

    pub fn enqueue(&self, directive: Directive) {
        debug!("Queueing {:?} on '{}'", directive.kind, directive.target);
        self.outstanding.add();
        if let Err(rejected) = self.tx.send(directive) {
            warn!("Action worker is gone, dropping {:?}", rejected.0);
            self.outstanding.finish();
        }
    }

    /// Directives queued, running or settling.
    pub fn pending(&self) -> usize {
        self.outstanding.get()
    }

    /// Resolves once every queued directive has run and settled.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.outstanding.idle.notified();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }
}

async fn work<R: ActionRunner>(
    runner: R,
    mut rx: mpsc::UnboundedReceiver<Directive>,
    settle: Duration,
    outstanding: Arc<Outstanding>,
) {
    while let Some(directive) = rx.recv().await {
        runner.run(directive).await;
        sleep(settle).await;
        outstanding.finish();
    }
    debug!("Action queue closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tokio::time::Instant;

    #[derive(Clone, Default)]
    struct Recorder {
        runs: Arc<Mutex<Vec<(String, Instant, Instant)>>>,
    }

    #[async_trait]
    impl ActionRunner for Recorder {
        async fn run(&self, directive: Directive) {
            let started = Instant::now();
            sleep(Duration::from_millis(100)).await;
            self.runs
                .lock()
                .push((directive.target, started, Instant::now()));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn runs_in_order_with_settle_between() {
        let recorder = Recorder::default();
        let sequencer = ActionSequencer::new(recorder.clone(), Duration::from_millis(500));

        for target in ["#a", "#b", "#c"] {
            sequencer.enqueue(Directive::click(target));
        }
        assert_eq!(sequencer.pending(), 3);
        sequencer.wait_idle().await;
        assert_eq!(sequencer.pending(), 0);

        let runs = recorder.runs.lock().clone();
        let order: Vec<&str> = runs.iter().map(|(t, _, _)| t.as_str()).collect();
        assert_eq!(order, vec!["#a", "#b", "#c"]);
        for pair in runs.windows(2) {
            let (_, _, previous_end) = &pair[0];
            let (_, next_start, _) = &pair[1];
            assert!(*next_start >= *previous_end + Duration::from_millis(500));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn late_enqueue_waits_for_the_running_directive() {
        let recorder = Recorder::default();
        let sequencer = ActionSequencer::new(recorder.clone(), Duration::from_millis(500));

        sequencer.enqueue(Directive::click("#first"));
        sleep(Duration::from_millis(50)).await;
        sequencer.enqueue(Directive::click("#second"));
        sequencer.wait_idle().await;

        let runs = recorder.runs.lock().clone();
        assert_eq!(runs.len(), 2);
        assert!(runs[1].1 >= runs[0].2 + Duration::from_millis(500));
    }

    #[tokio::test]
    async fn wait_idle_returns_immediately_when_empty() {
        let sequencer = ActionSequencer::new(Recorder::default(), Duration::from_millis(500));
        sequencer.wait_idle().await;
        assert_eq!(sequencer.pending(), 0);
    }
}
