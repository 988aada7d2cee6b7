use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::info;

use polyfit::metrics::{accuracy_score, mean_squared_error};
use polyfit::{
    Dataset, LoadedTable, RegressionModel, RegressionType, Trainer, TrainerConfig, load_csv,
};

#[derive(Parser)]
#[command(
    name = "polyfit",
    version,
    about = "Fit polynomial regression models by gradient descent"
)]
struct Cli {
    #[arg(short, long, help = "CSV file with a header row (defaults to the built-in fish dataset)")]
    data: Option<PathBuf>,

    #[arg(
        long,
        value_delimiter = ',',
        help = "Feature column names (defaults to all but the last)"
    )]
    x_columns: Vec<String>,

    #[arg(long, help = "Target column name (defaults to the last column)")]
    y_column: Option<String>,

    #[arg(short, long, help = "Model key or name, e.g. simple-linear, cubic-linear, logistic")]
    model: Option<String>,

    #[arg(short, long, help = "TOML config file")]
    config: Option<PathBuf>,

    #[arg(long, help = "Learning rate")]
    learning_rate: Option<f64>,

    #[arg(long, help = "L2 regularization strength")]
    lambda: Option<f64>,

    #[arg(long, help = "Stop when cost improves by at most this percentage")]
    threshold: Option<f64>,

    #[arg(long, help = "Upper bound on training steps")]
    max_steps: Option<usize>,

    #[arg(long, help = "Take this many manual steps instead of training to convergence")]
    steps: Option<usize>,

    #[arg(long, help = "List the available models and exit")]
    list_models: bool,
}

fn column_index(table: &LoadedTable, name: &str) -> Result<usize> {
    table
        .columns
        .iter()
        .position(|column| column == name)
        .with_context(|| {
            format!(
                "no column named '{}', available: {}",
                name,
                table.columns.join(", ")
            )
        })
}

fn load_dataset(cli: &Cli) -> Result<Dataset> {
    let Some(path) = &cli.data else {
        return Ok(Dataset::fish());
    };

    let table = load_csv(path).with_context(|| format!("failed to load {}", path.display()))?;
    if table.columns.len() < 2 {
        bail!("{} needs at least two columns", path.display());
    }

    let y_index = match &cli.y_column {
        Some(name) => column_index(&table, name)?,
        None => table.columns.len() - 1,
    };
    let x_indexes = if cli.x_columns.is_empty() {
        (0..table.columns.len()).filter(|&i| i != y_index).collect()
    } else {
        cli.x_columns
            .iter()
            .map(|name| column_index(&table, name))
            .collect::<Result<Vec<_>>>()?
    };

    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    Ok(Dataset::select_columns(name, &table.table, &x_indexes, y_index)?)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    if cli.list_models {
        for model in RegressionModel::catalogue() {
            println!("{}", model);
        }
        return Ok(());
    }

    let mut config = match &cli.config {
        Some(path) => TrainerConfig::load(path)?,
        None => TrainerConfig::default(),
    };
    if let Some(model) = &cli.model {
        config.model = model.clone();
    }
    if let Some(learning_rate) = cli.learning_rate {
        config.learning_rate = learning_rate;
    }
    if let Some(lambda) = cli.lambda {
        config.lambda = lambda;
    }
    if let Some(threshold) = cli.threshold {
        config.precision_threshold = threshold;
    }
    if cli.max_steps.is_some() {
        config.max_steps = cli.max_steps;
    }
    config.validate()?;

    let dataset = load_dataset(&cli)?;
    let prepared = dataset.prepared(config.normalize_x, config.normalize_y)?;
    let trainer = Trainer::from_config(&config, &prepared)?;
    let model = trainer.model();

    println!(
        "{}: {} samples, {} features",
        dataset.name,
        dataset.n_samples(),
        dataset.n_features()
    );
    println!("model: {}", model);
    println!("formula: {}", model.description(dataset.n_features())?);

    match cli.steps {
        Some(steps) => {
            for _ in 0..steps {
                trainer.step()?;
                info!("step {} cost {:.6}", trainer.current_step(), trainer.cost());
            }
        }
        None => {
            let updates = trainer.subscribe()?;
            trainer.start_training()?;
            for snapshot in updates {
                info!("step {} cost {:.6}", snapshot.step, snapshot.cost);
                if let Some(reason) = snapshot.finished {
                    println!("training finished: {:?}", reason);
                    break;
                }
            }
            trainer.wait();
            if let Some(err) = trainer.last_error() {
                bail!("training failed: {}", err);
            }
        }
    }

    let state = trainer.state();
    println!("step: {}", state.step);
    println!("weights: {}", state.weights);
    println!("bias: {:.6}", state.bias);
    println!("cost: {:.6}", state.cost);

    match model.kind {
        RegressionType::Linear => {
            let predictions = model.predict(&prepared.features, &state.weights, state.bias)?;
            println!("mse: {:.6}", mean_squared_error(&prepared.labels, &predictions)?);
            match trainer.r2() {
                Ok(r2) => println!("r2: {:.4}", r2),
                Err(err) => println!("r2: unavailable ({})", err),
            }
        }
        RegressionType::Logistic => {
            let probabilities = model.predict(&prepared.features, &state.weights, state.bias)?;
            println!("accuracy: {:.4}", accuracy_score(&prepared.labels, &probabilities)?);
        }
    }

    Ok(())
}
