use std::time::Duration;

use ndarray::array;
use polyfit::metrics::accuracy_score;
use polyfit::{Dataset, RegressionModel, Trainer};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Logistic Regression Training Example ===\n");

    // Two features, label is 1 above the line x2 = 2 * x1 - 0.5
    let dataset = Dataset::synthetic_classification(200, &array![-2.0, 1.0], 0.5, 3)?;
    println!("Dataset: {} samples, {} features", dataset.n_samples(), dataset.n_features());

    let model = RegressionModel::logistic();
    println!("Model function: {}", model.description(dataset.n_features())?);

    let trainer = Trainer::new(
        dataset.features.clone(),
        dataset.labels.clone(),
        model.default_weights(dataset.n_features())?,
        0.0,
        0.5,
        0.01,
        0.01,
        model.clone(),
    )?
    .with_snapshot_interval(Duration::from_millis(20));

    let updates = trainer.subscribe()?;
    trainer.start_training()?;

    for snapshot in updates {
        println!("Step {:>6}: cost = {:.6}", snapshot.step, snapshot.cost);
        if let Some(reason) = snapshot.finished {
            println!("\nTraining finished: {:?}", reason);
            break;
        }
    }

    let state = trainer.state();
    println!("Weights: {}", state.weights);
    println!("Bias: {:.4}", state.bias);

    let probabilities = model.predict(&dataset.features, &state.weights, state.bias)?;
    let accuracy = accuracy_score(&dataset.labels, &probabilities)?;
    println!("Training accuracy: {:.2}%", accuracy * 100.0);

    // Start over with a quadratic boundary model on the same data
    trainer.update_model(RegressionModel::new("Quadratic Logistic Regression", model.kind, 2))?;
    for _ in 0..100 {
        trainer.step()?;
    }
    println!(
        "\nQuadratic model after {} manual steps: cost = {:.6}",
        trainer.current_step(),
        trainer.cost()
    );

    Ok(())
}
