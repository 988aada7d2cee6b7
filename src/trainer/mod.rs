//! Stateful gradient descent trainer.
//!
//! A `Trainer` owns the weights, bias, step counter and cost of one model
//! fitted to one dataset. Every mutation goes through a single mutex, so a
//! manual `step()` and the continuous training loop (running on its own
//! thread) can never interleave within an iteration.
//!
//! Progress is observed through `subscribe()`, which returns a throttled
//! `SnapshotStream`.
//!
//! # Example
//! ```rust
//! use polyfit::{Dataset, RegressionModel, StopReason, Trainer};
//! use ndarray::array;
//!
//! let dataset = Dataset::synthetic_linear(100, &array![3.0], -1.0, 0.05, 42).unwrap();
//! let trainer = Trainer::new(
//!     dataset.features,
//!     dataset.labels,
//!     array![0.0],
//!     0.0,
//!     0.1,
//!     0.0,
//!     0.001,
//!     RegressionModel::simple_linear(),
//! )
//! .unwrap();
//!
//! let updates = trainer.subscribe().unwrap();
//! trainer.start_training().unwrap();
//! assert_eq!(trainer.wait(), Some(StopReason::Converged));
//!
//! let last = updates.into_iter().find(|s| s.is_final()).unwrap();
//! assert_eq!(last.step, trainer.current_step());
//! ```

mod session;
mod snapshot;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, info, trace, warn};

use crate::config::{self, TrainerConfig};
use crate::dataset::PreparedDataset;
use crate::error::{RegressionError, Result};
use crate::linear_model::RegressionModel;
use crate::{Matrix, Vector};
use session::Session;

pub use session::Hyperparameters;
pub use snapshot::{DEFAULT_SNAPSHOT_INTERVAL, Snapshot, SnapshotStream, StopReason};
use snapshot::SnapshotPublisher;

/// Point-in-time copy of the trainer's observable state.
#[derive(Clone, Debug, PartialEq)]
pub struct TrainingState {
    pub weights: Vector,
    pub bias: f64,
    pub step: usize,
    pub cost: f64,
    pub is_training: bool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Shared {
    session: Mutex<Session>,
    hyper: Mutex<Hyperparameters>,
    is_training: AtomicBool,
    cancel: AtomicBool,
    publisher: SnapshotPublisher,
    last_error: Mutex<Option<String>>,
}

impl Shared {
    fn hyperparameters(&self) -> Hyperparameters {
        *lock(&self.hyper)
    }

    /// Publishes while the session lock is held so snapshots leave in step order.
    fn publish(&self, session: &Session, finished: Option<StopReason>) {
        self.publisher.publish(session.snapshot(finished));
    }
}

pub struct Trainer {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<StopReason>>>,
    snapshot_interval: Duration,
}

impl Trainer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        x: Matrix,
        y: Vector,
        weights: Vector,
        bias: f64,
        learning_rate: f64,
        lambda: f64,
        precision_threshold: f64,
        model: RegressionModel,
    ) -> Result<Self> {
        config::validate_learning_rate(learning_rate)?;
        config::validate_lambda(lambda)?;
        config::validate_precision_threshold(precision_threshold)?;

        let expected = model.weights_count(x.ncols())?;
        if weights.len() != expected {
            return Err(RegressionError::DimensionMismatch {
                expected,
                actual: weights.len(),
            });
        }

        let session = Session::new(model, x, y, weights, bias, lambda)?;
        let hyper = Hyperparameters {
            learning_rate,
            lambda,
            precision_threshold,
            max_steps: None,
        };

        Ok(Self {
            shared: Arc::new(Shared {
                session: Mutex::new(session),
                hyper: Mutex::new(hyper),
                is_training: AtomicBool::new(false),
                cancel: AtomicBool::new(false),
                publisher: SnapshotPublisher::default(),
                last_error: Mutex::new(None),
            }),
            worker: Mutex::new(None),
            snapshot_interval: DEFAULT_SNAPSHOT_INTERVAL,
        })
    }

    /// Zero-initialized trainer for a prepared dataset using the configured model
    /// and hyperparameters.
    pub fn from_config(config: &TrainerConfig, dataset: &PreparedDataset) -> Result<Self> {
        config.validate()?;
        let model = config.resolve_model()?;
        let weights = model.default_weights(dataset.n_features())?;

        let trainer = Self::new(
            dataset.features.clone(),
            dataset.labels.clone(),
            weights,
            0.0,
            config.learning_rate,
            config.lambda,
            config.precision_threshold,
            model,
        )?
        .with_snapshot_interval(config.snapshot_interval());
        trainer.update_max_steps(config.max_steps);
        Ok(trainer)
    }

    /// Throttle interval handed to streams created by `subscribe()`.
    pub fn with_snapshot_interval(mut self, interval: Duration) -> Self {
        self.snapshot_interval = interval;
        self
    }

    pub fn subscribe(&self) -> Result<SnapshotStream> {
        self.subscribe_with_interval(self.snapshot_interval)
    }

    pub fn subscribe_with_interval(&self, interval: Duration) -> Result<SnapshotStream> {
        self.shared.publisher.subscribe(interval)
    }

    pub fn state(&self) -> TrainingState {
        let session = lock(&self.shared.session);
        TrainingState {
            weights: session.weights.clone(),
            bias: session.bias,
            step: session.step,
            cost: session.current_cost,
            is_training: self.is_training(),
        }
    }

    pub fn weights(&self) -> Vector {
        lock(&self.shared.session).weights.clone()
    }

    pub fn bias(&self) -> f64 {
        lock(&self.shared.session).bias
    }

    pub fn current_step(&self) -> usize {
        lock(&self.shared.session).step
    }

    pub fn cost(&self) -> f64 {
        lock(&self.shared.session).current_cost
    }

    pub fn is_training(&self) -> bool {
        self.shared.is_training.load(Ordering::Acquire)
    }

    pub fn model(&self) -> RegressionModel {
        lock(&self.shared.session).model.clone()
    }

    pub fn hyperparameters(&self) -> Hyperparameters {
        self.shared.hyperparameters()
    }

    /// Message of the error that ended the most recent training loop, if any.
    pub fn last_error(&self) -> Option<String> {
        lock(&self.shared.last_error).clone()
    }

    pub fn r2(&self) -> Result<f64> {
        let session = lock(&self.shared.session);
        session
            .model
            .r2(&session.features, &session.weights, session.bias, &session.labels)
    }

    /// Runs exactly one gradient descent iteration.
    ///
    /// If the continuous loop is running, this waits for its current iteration
    /// and then runs between two loop iterations.
    pub fn step(&self) -> Result<()> {
        let hyper = self.shared.hyperparameters();
        let mut session = lock(&self.shared.session);
        session.step(&hyper)?;
        trace!("manual step {} cost {}", session.step, session.current_cost);
        self.shared.publish(&session, None);
        Ok(())
    }

    /// Starts the continuous loop on a worker thread. Does nothing if it is already running.
    pub fn start_training(&self) -> Result<()> {
        let mut worker = lock(&self.worker);
        if self.is_training() {
            return Ok(());
        }
        if let Some(finished) = worker.take() {
            let _ = finished.join();
        }

        self.shared.cancel.store(false, Ordering::Release);
        self.shared.is_training.store(true, Ordering::Release);
        *lock(&self.shared.last_error) = None;

        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name("polyfit-trainer".to_string())
            .spawn(move || run_training_loop(&shared));

        match spawned {
            Ok(handle) => {
                *worker = Some(handle);
                Ok(())
            }
            Err(err) => {
                self.shared.is_training.store(false, Ordering::Release);
                Err(err.into())
            }
        }
    }

    /// Cancels the loop and waits for it to publish its final snapshot and exit.
    /// Safe to call when no loop is running.
    pub fn stop_training(&self) -> Option<StopReason> {
        // Held until the join completes so a concurrent start cannot clear
        // the cancel flag or spawn a loop this call never sees.
        let mut worker = lock(&self.worker);
        self.shared.cancel.store(true, Ordering::Release);
        let handle = worker.take()?;
        Some(self.join(handle))
    }

    /// Blocks until the running loop ends on its own and returns why it ended.
    pub fn wait(&self) -> Option<StopReason> {
        let handle = lock(&self.worker).take()?;
        Some(self.join(handle))
    }

    fn join(&self, handle: JoinHandle<StopReason>) -> StopReason {
        handle.join().unwrap_or_else(|_| {
            self.shared.is_training.store(false, Ordering::Release);
            StopReason::Failed
        })
    }

    /// Stops any running loop, then zeroes weights, bias and step for the current model.
    pub fn reset_training(&self) -> Result<()> {
        self.stop_training();
        let lambda = self.shared.hyperparameters().lambda;

        let mut session = lock(&self.shared.session);
        session.reset(lambda)?;
        debug!("training reset, cost {}", session.current_cost);
        self.shared.publish(&session, None);
        Ok(())
    }

    /// Switches to another model. Training state is rebuilt from zero.
    pub fn update_model(&self, model: RegressionModel) -> Result<()> {
        self.stop_training();
        let lambda = self.shared.hyperparameters().lambda;

        let mut session = lock(&self.shared.session);
        let replacement = Session::zeroed(
            model,
            session.features.clone(),
            session.labels.clone(),
            lambda,
        )?;
        *session = replacement;
        debug!("model changed to {}", session.model);
        self.shared.publish(&session, None);
        Ok(())
    }

    /// Replaces the dataset. Training state is rebuilt from zero.
    pub fn update_dataset(&self, x: Matrix, y: Vector) -> Result<()> {
        self.stop_training();
        let lambda = self.shared.hyperparameters().lambda;

        let mut session = lock(&self.shared.session);
        let replacement = Session::zeroed(session.model.clone(), x, y, lambda)?;
        *session = replacement;
        debug!(
            "dataset changed to {} samples x {} features",
            session.features.nrows(),
            session.features.ncols()
        );
        self.shared.publish(&session, None);
        Ok(())
    }

    pub fn update_learning_rate(&self, learning_rate: f64) -> Result<()> {
        config::validate_learning_rate(learning_rate)?;
        lock(&self.shared.hyper).learning_rate = learning_rate;
        debug!("learning rate set to {}", learning_rate);
        Ok(())
    }

    pub fn update_regularization(&self, lambda: f64) -> Result<()> {
        config::validate_lambda(lambda)?;
        lock(&self.shared.hyper).lambda = lambda;
        debug!("regularization set to {}", lambda);
        Ok(())
    }

    pub fn update_precision_threshold(&self, precision_threshold: f64) -> Result<()> {
        config::validate_precision_threshold(precision_threshold)?;
        lock(&self.shared.hyper).precision_threshold = precision_threshold;
        debug!("precision threshold set to {}%", precision_threshold);
        Ok(())
    }

    pub fn update_max_steps(&self, max_steps: Option<usize>) {
        lock(&self.shared.hyper).max_steps = max_steps;
    }

    /// Manual weight edit. The length is not checked here; a wrong length makes
    /// the next step fail with `DimensionMismatch`.
    pub fn set_weights(&self, weights: Vector) -> Result<()> {
        self.edit_parameters(|session| session.weights = weights)
    }

    pub fn set_bias(&self, bias: f64) -> Result<()> {
        self.edit_parameters(|session| session.bias = bias)
    }

    fn edit_parameters(&self, edit: impl FnOnce(&mut Session)) -> Result<()> {
        if self.is_training() {
            return Err(RegressionError::TrainingActive);
        }
        let lambda = self.shared.hyperparameters().lambda;

        let mut session = lock(&self.shared.session);
        edit(&mut session);
        match session.regularized_cost(&session.weights, session.bias, lambda) {
            Ok(cost) => session.current_cost = cost,
            Err(err) => warn!("cost not updated after parameter edit: {}", err),
        }
        session.previous_cost = None;
        self.shared.publish(&session, None);
        Ok(())
    }
}

impl Drop for Trainer {
    fn drop(&mut self) {
        self.stop_training();
        self.shared.publisher.close();
    }
}

fn run_training_loop(shared: &Shared) -> StopReason {
    info!("training started");
    let mut iteration = 0usize;

    let reason = loop {
        if shared.cancel.load(Ordering::Acquire) {
            break StopReason::Cancelled;
        }

        let hyper = shared.hyperparameters();
        let converged = {
            let mut session = lock(&shared.session);
            if hyper.max_steps.is_some_and(|limit| session.step >= limit) {
                break StopReason::StepLimit;
            }
            if let Err(err) = session.step(&hyper) {
                warn!("training stopped at step {}: {}", session.step, err);
                *lock(&shared.last_error) = Some(err.to_string());
                break StopReason::Failed;
            }
            trace!("step {} cost {}", session.step, session.current_cost);
            shared.publish(&session, None);

            // The first iteration of a run never counts as converged.
            iteration > 0 && session.has_converged(hyper.precision_threshold)
        };

        if converged {
            break StopReason::Converged;
        }
        if shared.cancel.load(Ordering::Acquire) {
            break StopReason::Cancelled;
        }
        thread::yield_now();
        iteration += 1;
    };

    let session = lock(&shared.session);
    match reason {
        StopReason::Converged => info!(
            "training converged at step {}, cost {}, weights {}, bias {}",
            session.step, session.current_cost, session.weights, session.bias
        ),
        _ => info!("training ended ({:?}) at step {}", reason, session.step),
    }
    shared.publish(&session, Some(reason));
    shared.is_training.store(false, Ordering::Release);
    reason
}
