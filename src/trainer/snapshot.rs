use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::runtime::{self, Runtime};
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, watch};
use tokio::time;

use crate::Vector;
use crate::error::Result;

pub const DEFAULT_SNAPSHOT_INTERVAL: Duration = Duration::from_millis(50);

/// Why a continuous training loop ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// Cost improvement fell to or below the precision threshold.
    Converged,
    Cancelled,
    /// A step returned an error; see `Trainer::last_error`.
    Failed,
    /// The configured step cap was reached.
    StepLimit,
}

/// Training progress at one step.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub weights: Vector,
    pub bias: f64,
    pub step: usize,
    pub cost: f64,
    /// Set only on the last snapshot of a training loop.
    pub finished: Option<StopReason>,
}

impl Snapshot {
    pub fn is_final(&self) -> bool {
        self.finished.is_some()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Latest publication, tagged with a publisher-wide sequence number.
#[derive(Clone, Debug, Default)]
struct Published {
    seq: u64,
    snapshot: Option<Snapshot>,
}

type Sequenced = (u64, Snapshot);

struct PublisherState {
    seq: u64,
    /// `None` once the publisher is closed.
    latest: Option<watch::Sender<Published>>,
    finals: Vec<mpsc::UnboundedSender<Sequenced>>,
}

/// Fans snapshots out to every live subscriber.
///
/// Progress goes through one `watch` channel shared by all subscribers, so a
/// reader only ever sees the newest value. Final snapshots are additionally
/// queued per subscriber and are never overwritten.
pub(crate) struct SnapshotPublisher {
    state: Mutex<PublisherState>,
}

impl Default for SnapshotPublisher {
    fn default() -> Self {
        let (latest, _) = watch::channel(Published::default());
        Self {
            state: Mutex::new(PublisherState {
                seq: 0,
                latest: Some(latest),
                finals: Vec::new(),
            }),
        }
    }
}

impl SnapshotPublisher {
    pub(crate) fn subscribe(&self, interval: Duration) -> Result<SnapshotStream> {
        let runtime = runtime::Builder::new_current_thread().enable_time().build()?;
        let (final_tx, finals) = mpsc::unbounded_channel();

        let mut state = lock(&self.state);
        let latest = match &state.latest {
            Some(sender) => sender.subscribe(),
            // closed: the stream ends as soon as it is read
            None => watch::channel(Published::default()).1,
        };
        if state.latest.is_some() {
            state.finals.push(final_tx);
        }
        let last_seq = state.seq;
        drop(state);

        Ok(SnapshotStream {
            latest,
            finals,
            interval,
            last_seq,
            last_delivered: None,
            pending_progress: None,
            pending_final: None,
            closed: false,
            runtime,
        })
    }

    pub(crate) fn publish(&self, snapshot: Snapshot) {
        let mut state = lock(&self.state);
        state.seq += 1;
        let seq = state.seq;

        // Finals are queued before the watch value moves, so a reader that
        // sees sequence `n` can already receive every final up to `n`.
        if snapshot.is_final() {
            state.finals.retain(|tx| tx.send((seq, snapshot.clone())).is_ok());
        }
        if let Some(latest) = &state.latest {
            latest.send_replace(Published {
                seq,
                snapshot: Some(snapshot),
            });
        }
    }

    pub(crate) fn close(&self) {
        let mut state = lock(&self.state);
        state.latest = None;
        state.finals.clear();
    }
}

enum Next {
    Ready(Snapshot),
    WaitUntil(Instant),
    Idle,
    Ended,
}

/// Receiving end of a trainer's snapshot feed.
///
/// Progress snapshots are coalesced: a reader that falls behind gets only the
/// newest one, at most once per `interval`. Final snapshots are never dropped
/// and are handed out as soon as they are published. The stream ends once the
/// trainer is dropped and everything pending has been read.
pub struct SnapshotStream {
    latest: watch::Receiver<Published>,
    finals: mpsc::UnboundedReceiver<Sequenced>,
    interval: Duration,
    /// Sequence number of the last snapshot handed out.
    last_seq: u64,
    last_delivered: Option<Instant>,
    pending_progress: Option<Sequenced>,
    pending_final: Option<Sequenced>,
    closed: bool,
    runtime: Runtime,
}

impl SnapshotStream {
    /// Returns a snapshot if one is deliverable right now.
    pub fn try_next(&mut self) -> Option<Snapshot> {
        self.recv(Some(Instant::now()))
    }

    /// Waits at most `timeout` for a deliverable snapshot.
    pub fn next_timeout(&mut self, timeout: Duration) -> Option<Snapshot> {
        self.recv(Some(Instant::now() + timeout))
    }

    fn recv(&mut self, deadline: Option<Instant>) -> Option<Snapshot> {
        loop {
            let now = Instant::now();
            let ready_at = match self.poll_next(now) {
                Next::Ready(snapshot) => return Some(snapshot),
                Next::Ended => return None,
                Next::WaitUntil(ready_at) => Some(ready_at),
                Next::Idle => None,
            };
            if deadline.is_some_and(|deadline| deadline <= now) {
                return None;
            }

            let wake_at = match (ready_at, deadline) {
                (Some(ready_at), Some(deadline)) => Some(ready_at.min(deadline)),
                (ready_at, deadline) => ready_at.or(deadline),
            };
            let Self {
                latest,
                finals,
                pending_final,
                closed,
                runtime,
                ..
            } = self;
            runtime.block_on(wait_for_publish(latest, finals, pending_final, closed, wake_at));
        }
    }

    fn poll_next(&mut self, now: Instant) -> Next {
        // Read the watch value first: every final at or below its sequence is
        // already queued.
        let latest = self.latest.borrow_and_update().clone();
        if latest.seq > self.last_seq {
            if let Some(snapshot) = latest.snapshot.filter(|snapshot| !snapshot.is_final()) {
                self.pending_progress = Some((latest.seq, snapshot));
            }
        }

        let queued_final = match self.pending_final.take() {
            Some(sequenced) => Some(sequenced),
            None => match self.finals.try_recv() {
                Ok(sequenced) => Some(sequenced),
                Err(TryRecvError::Disconnected) => {
                    self.closed = true;
                    None
                }
                Err(TryRecvError::Empty) => None,
            },
        };
        if let Some((seq, snapshot)) = queued_final {
            if self.pending_progress.as_ref().is_some_and(|(pending, _)| *pending < seq) {
                self.pending_progress = None;
            }
            self.last_seq = seq;
            self.last_delivered = Some(now);
            return Next::Ready(snapshot);
        }

        if self.pending_progress.is_some() {
            let ready_at = self
                .last_delivered
                .map_or(now, |delivered| delivered + self.interval);
            if ready_at > now {
                return Next::WaitUntil(ready_at);
            }
            if let Some((seq, snapshot)) = self.pending_progress.take() {
                self.last_seq = seq;
                self.last_delivered = Some(now);
                return Next::Ready(snapshot);
            }
        }

        if self.closed { Next::Ended } else { Next::Idle }
    }
}

/// Sleeps until something is published, the publisher closes or `wake_at` passes.
async fn wait_for_publish(
    latest: &mut watch::Receiver<Published>,
    finals: &mut mpsc::UnboundedReceiver<Sequenced>,
    pending_final: &mut Option<Sequenced>,
    closed: &mut bool,
    wake_at: Option<Instant>,
) {
    let sleep = async {
        match wake_at {
            Some(wake_at) => time::sleep_until(time::Instant::from_std(wake_at)).await,
            None => std::future::pending().await,
        }
    };
    let open = !*closed;

    tokio::select! {
        changed = latest.changed(), if open => {
            if changed.is_err() {
                *closed = true;
            }
        }
        received = finals.recv(), if open => match received {
            Some(sequenced) => *pending_final = Some(sequenced),
            None => *closed = true,
        },
        _ = sleep => {}
    }
}

impl Iterator for SnapshotStream {
    type Item = Snapshot;

    /// Blocks until a snapshot is deliverable or the stream has ended.
    fn next(&mut self) -> Option<Snapshot> {
        self.recv(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use std::sync::Arc;
    use std::thread;

    fn snapshot(step: usize, finished: Option<StopReason>) -> Snapshot {
        Snapshot {
            weights: array![step as f64],
            bias: 0.0,
            step,
            cost: 1.0 / (step as f64 + 1.0),
            finished,
        }
    }

    #[test]
    fn test_latest_value_wins() {
        let publisher = SnapshotPublisher::default();
        let mut stream = publisher.subscribe(Duration::from_millis(10)).unwrap();

        for step in 1..=5 {
            publisher.publish(snapshot(step, None));
        }

        assert_eq!(stream.try_next().unwrap().step, 5);
        assert!(stream.try_next().is_none());
    }

    #[test]
    fn test_throttles_progress() {
        let publisher = SnapshotPublisher::default();
        let mut stream = publisher.subscribe(Duration::from_secs(10)).unwrap();

        publisher.publish(snapshot(1, None));
        assert_eq!(stream.try_next().unwrap().step, 1);

        publisher.publish(snapshot(2, None));
        assert!(stream.try_next().is_none());
        assert!(stream.next_timeout(Duration::from_millis(20)).is_none());
    }

    #[test]
    fn test_final_bypasses_throttle() {
        let publisher = SnapshotPublisher::default();
        let mut stream = publisher.subscribe(Duration::from_secs(10)).unwrap();

        publisher.publish(snapshot(1, None));
        assert_eq!(stream.try_next().unwrap().step, 1);

        publisher.publish(snapshot(2, None));
        publisher.publish(snapshot(3, Some(StopReason::Cancelled)));

        let last = stream.try_next().unwrap();
        assert_eq!(last.step, 3);
        assert_eq!(last.finished, Some(StopReason::Cancelled));
    }

    #[test]
    fn test_final_never_coalesced() {
        let publisher = SnapshotPublisher::default();
        let mut stream = publisher.subscribe(Duration::ZERO).unwrap();

        publisher.publish(snapshot(7, Some(StopReason::Converged)));
        publisher.publish(snapshot(0, None));

        assert_eq!(stream.try_next().unwrap().finished, Some(StopReason::Converged));
        assert_eq!(stream.try_next().unwrap().step, 0);
    }

    #[test]
    fn test_consecutive_finals_all_delivered() {
        let publisher = SnapshotPublisher::default();
        let mut stream = publisher.subscribe(Duration::from_secs(10)).unwrap();

        publisher.publish(snapshot(3, Some(StopReason::Cancelled)));
        publisher.publish(snapshot(0, None));
        publisher.publish(snapshot(4, Some(StopReason::Converged)));

        assert_eq!(stream.try_next().unwrap().finished, Some(StopReason::Cancelled));
        assert_eq!(stream.try_next().unwrap().finished, Some(StopReason::Converged));
        assert!(stream.try_next().is_none());
    }

    #[test]
    fn test_new_subscriber_skips_history() {
        let publisher = SnapshotPublisher::default();
        publisher.publish(snapshot(1, None));
        publisher.publish(snapshot(2, Some(StopReason::Converged)));

        let mut stream = publisher.subscribe(Duration::ZERO).unwrap();
        assert!(stream.try_next().is_none());

        publisher.publish(snapshot(0, None));
        assert_eq!(stream.try_next().unwrap().step, 0);
    }

    #[test]
    fn test_subscribe_after_close_ends() {
        let publisher = SnapshotPublisher::default();
        publisher.close();
        let mut stream = publisher.subscribe(Duration::ZERO).unwrap();
        assert!(stream.next().is_none());
    }

    #[test]
    fn test_every_subscriber_receives() {
        let publisher = SnapshotPublisher::default();
        let mut a = publisher.subscribe(Duration::ZERO).unwrap();
        let mut b = publisher.subscribe(Duration::ZERO).unwrap();

        publisher.publish(snapshot(4, None));
        assert_eq!(a.try_next().unwrap().step, 4);
        assert_eq!(b.try_next().unwrap().step, 4);
    }

    #[test]
    fn test_blocking_iterator_ends_on_close() {
        let publisher = Arc::new(SnapshotPublisher::default());
        let stream = publisher.subscribe(Duration::ZERO).unwrap();

        let producer = {
            let publisher = Arc::clone(&publisher);
            thread::spawn(move || {
                publisher.publish(snapshot(1, None));
                thread::sleep(Duration::from_millis(5));
                publisher.publish(snapshot(2, Some(StopReason::Converged)));
                publisher.close();
            })
        };

        let received: Vec<Snapshot> = stream.collect();
        producer.join().unwrap();

        assert!(!received.is_empty());
        let last = received.last().unwrap();
        assert_eq!(last.step, 2);
        assert!(last.is_final());
        assert!(received.windows(2).all(|w| w[0].step <= w[1].step));
    }
}
