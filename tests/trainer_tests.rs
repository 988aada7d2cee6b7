use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use approx::assert_abs_diff_eq;
use ndarray::array;
use polyfit::{
    Dataset, RegressionError, RegressionModel, Snapshot, SnapshotStream, StopReason, Trainer,
    Vector,
};

/// Separable logistic problem: the cost keeps shrinking for a very long time,
/// so with a zero threshold the loop only ends when told to.
fn endless_trainer() -> Trainer {
    Trainer::new(
        array![[-2.0], [-1.0], [1.0], [2.0]],
        array![0.0, 0.0, 1.0, 1.0],
        array![0.0],
        0.0,
        0.5,
        0.0,
        0.0,
        RegressionModel::logistic(),
    )
    .unwrap()
}

fn drain(stream: &mut SnapshotStream) -> Vec<Snapshot> {
    std::iter::from_fn(|| stream.try_next()).collect()
}

#[test]
fn test_cancel_yields_one_final_snapshot() {
    let trainer = endless_trainer();
    let mut updates = trainer.subscribe_with_interval(Duration::from_millis(5)).unwrap();

    trainer.start_training().unwrap();
    thread::sleep(Duration::from_millis(30));
    assert!(trainer.is_training());

    assert_eq!(trainer.stop_training(), Some(StopReason::Cancelled));
    assert!(!trainer.is_training());

    let state = trainer.state();
    let snapshots = drain(&mut updates);
    let finals: Vec<&Snapshot> = snapshots.iter().filter(|s| s.is_final()).collect();

    assert_eq!(finals.len(), 1);
    assert_eq!(finals[0].finished, Some(StopReason::Cancelled));
    assert_eq!(finals[0].step, state.step);
    assert_eq!(finals[0].weights, state.weights);
    assert!(state.step > 0);
}

#[test]
fn test_stop_is_idempotent() {
    let trainer = endless_trainer();
    trainer.start_training().unwrap();
    thread::sleep(Duration::from_millis(5));

    assert_eq!(trainer.stop_training(), Some(StopReason::Cancelled));
    let step = trainer.current_step();
    assert_eq!(trainer.stop_training(), None);
    assert_eq!(trainer.current_step(), step);
    assert!(!trainer.is_training());
}

#[test]
fn test_start_twice_runs_one_loop() {
    let trainer = endless_trainer();
    trainer.start_training().unwrap();
    trainer.start_training().unwrap();
    thread::sleep(Duration::from_millis(5));

    assert_eq!(trainer.stop_training(), Some(StopReason::Cancelled));
    assert_eq!(trainer.wait(), None);
}

#[test]
fn test_model_change_mid_session_resets() {
    let trainer = endless_trainer();
    trainer.start_training().unwrap();
    thread::sleep(Duration::from_millis(10));

    trainer.update_model(RegressionModel::parabola_linear()).unwrap();

    let state = trainer.state();
    assert!(!state.is_training);
    assert_eq!(state.step, 0);
    assert_eq!(state.weights, Vector::zeros(2));
    assert_eq!(state.bias, 0.0);
}

#[test]
fn test_reset_mid_session() {
    let trainer = endless_trainer();
    trainer.start_training().unwrap();
    thread::sleep(Duration::from_millis(5));

    trainer.reset_training().unwrap();
    assert!(!trainer.is_training());
    assert_eq!(trainer.current_step(), 0);
    assert_eq!(trainer.weights(), array![0.0]);
    assert!((trainer.cost() - std::f64::consts::LN_2).abs() < 1e-12);
}

#[test]
fn test_never_converges_on_first_iteration() {
    // Zero weights already fit all-zero labels exactly.
    let trainer = Trainer::new(
        array![[1.0], [2.0], [3.0]],
        array![0.0, 0.0, 0.0],
        array![0.0],
        0.0,
        0.1,
        0.0,
        1e9,
        RegressionModel::simple_linear(),
    )
    .unwrap();
    assert_eq!(trainer.cost(), 0.0);

    trainer.start_training().unwrap();
    assert_eq!(trainer.wait(), Some(StopReason::Converged));
    assert_eq!(trainer.current_step(), 2);
}

#[test]
fn test_converges_on_synthetic_data() {
    let dataset = Dataset::synthetic_linear(200, &array![2.0, -3.0], 1.0, 0.01, 5).unwrap();
    let trainer = Trainer::new(
        dataset.features.clone(),
        dataset.labels.clone(),
        array![0.0, 0.0],
        0.0,
        0.2,
        0.0,
        0.0001,
        RegressionModel::simple_linear(),
    )
    .unwrap();

    trainer.start_training().unwrap();
    assert_eq!(trainer.wait(), Some(StopReason::Converged));

    // terms for two features at degree 1 are [x2, x1]
    let weights = trainer.weights();
    assert!((weights[0] + 3.0).abs() < 0.05);
    assert!((weights[1] - 2.0).abs() < 0.05);
    assert!((trainer.bias() - 1.0).abs() < 0.05);
    assert!(trainer.r2().unwrap() > 0.99);
}

#[test]
fn test_snapshots_arrive_in_step_order() {
    let trainer = endless_trainer();
    trainer.update_max_steps(Some(3000));
    let mut updates = trainer.subscribe_with_interval(Duration::ZERO).unwrap();

    let consumer = thread::spawn(move || {
        let mut received = Vec::new();
        while let Some(snapshot) = updates.next_timeout(Duration::from_secs(10)) {
            let done = snapshot.is_final();
            received.push(snapshot);
            if done {
                break;
            }
        }
        received
    });

    trainer.start_training().unwrap();
    assert_eq!(trainer.wait(), Some(StopReason::StepLimit));

    let received = consumer.join().unwrap();
    assert!(received.windows(2).all(|pair| pair[0].step <= pair[1].step));
    let last = received.last().unwrap();
    assert_eq!(last.finished, Some(StopReason::StepLimit));
    assert_eq!(last.step, 3000);
}

#[test]
fn test_slow_observer_sees_only_latest() {
    let trainer = endless_trainer();
    trainer.update_max_steps(Some(5000));
    let mut updates = trainer.subscribe_with_interval(Duration::from_secs(60)).unwrap();

    trainer.start_training().unwrap();
    trainer.wait();

    let snapshots = drain(&mut updates);
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].step, 5000);
    assert!(snapshots[0].is_final());
}

#[test]
fn test_manual_steps_serialize_with_loop() {
    let trainer = Arc::new(endless_trainer());
    trainer.start_training().unwrap();

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let trainer = Arc::clone(&trainer);
            thread::spawn(move || {
                for _ in 0..50 {
                    trainer.step().unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    trainer.stop_training();
    let state = trainer.state();
    assert!(state.step >= 200);
    assert!(state.cost.is_finite());
    assert!(state.weights[0] > 0.0);
}

#[test]
fn test_hyperparameters_change_while_training() {
    let trainer = endless_trainer();
    trainer.start_training().unwrap();

    trainer.update_learning_rate(0.05).unwrap();
    trainer.update_regularization(0.1).unwrap();
    assert_eq!(trainer.hyperparameters().learning_rate, 0.05);
    assert_eq!(trainer.hyperparameters().lambda, 0.1);

    // Any improvement below 100% now counts as converged.
    trainer.update_precision_threshold(100.0).unwrap();
    assert_eq!(trainer.wait(), Some(StopReason::Converged));
}

#[test]
fn test_hyperparameter_updates_apply_from_next_step() {
    let trainer = Trainer::new(
        array![[1.0], [2.0]],
        array![1.0, 3.0],
        array![2.0],
        1.0,
        0.1,
        0.0,
        0.001,
        RegressionModel::simple_linear(),
    )
    .unwrap();

    // gradients at w = 2, b = 1: dw = 3, db = 2
    trainer.step().unwrap();
    assert_abs_diff_eq!(trainer.weights()[0], 1.7, epsilon = 1e-12);
    assert_abs_diff_eq!(trainer.bias(), 0.8, epsilon = 1e-12);

    trainer.update_learning_rate(0.2).unwrap();
    trainer.update_regularization(0.5).unwrap();
    assert_abs_diff_eq!(trainer.weights()[0], 1.7, epsilon = 1e-12);
    assert_abs_diff_eq!(trainer.bias(), 0.8, epsilon = 1e-12);

    // gradients at w = 1.7, b = 0.8: dw = 1.95, db = 1.35, decay 0.5 * 1.7 / 2
    trainer.step().unwrap();
    assert_abs_diff_eq!(trainer.weights()[0], 1.225, epsilon = 1e-12);
    assert_abs_diff_eq!(trainer.bias(), 0.53, epsilon = 1e-12);
    // 0.570425 / 4 + 0.5 * 1.225^2 / 4
    assert_abs_diff_eq!(trainer.cost(), 0.330184375, epsilon = 1e-12);
    assert_eq!(trainer.current_step(), 2);
}

#[test]
fn test_stop_racing_start_always_ends_loop() {
    let trainer = Arc::new(endless_trainer());

    for _ in 0..200 {
        let barrier = Arc::new(Barrier::new(2));
        let starter = {
            let trainer = Arc::clone(&trainer);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                trainer.start_training().unwrap();
            })
        };
        barrier.wait();
        trainer.stop_training();
        starter.join().unwrap();

        // Whichever call won, one more stop must end any loop it left running.
        trainer.stop_training();
        assert!(!trainer.is_training());
    }
}

#[test]
fn test_parameter_edits_refused_while_training() {
    let trainer = endless_trainer();
    trainer.start_training().unwrap();

    assert!(matches!(trainer.set_weights(array![1.0]), Err(RegressionError::TrainingActive)));
    assert!(matches!(trainer.set_bias(1.0), Err(RegressionError::TrainingActive)));

    trainer.stop_training();
    trainer.set_bias(1.0).unwrap();
    assert_eq!(trainer.bias(), 1.0);
}

#[test]
fn test_drop_ends_stream() {
    let trainer = endless_trainer();
    let updates = trainer.subscribe_with_interval(Duration::ZERO).unwrap();
    trainer.start_training().unwrap();
    thread::sleep(Duration::from_millis(5));
    drop(trainer);

    let received: Vec<Snapshot> = updates.collect();
    let last = received.last().unwrap();
    assert_eq!(last.finished, Some(StopReason::Cancelled));
}
