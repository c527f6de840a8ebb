use std::{error::Error, fs::File, path::Path, path::PathBuf};

use clap::{Args, Parser, Subcommand};

use convfit::{
    architecture::{cifar10_cnn, Sequential},
    baseline::NearestCentroid,
    dataset::{self, Split, CLASS_NAMES},
    epoch_limiter::EpochLimiter,
    evaluate, fit,
    training_context::TrainingContext,
    training_observer::TrainingObserver,
    EachEpoch, History, Sample, TrainingOptions,
};
use indicatif::{ProgressBar, ProgressStyle};
use log::info;

/// A CLI for training an image classifier on the CIFAR-10 binary dataset and exporting its learning curves.
#[derive(Parser, Debug, Clone)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// log epoch results to stdout in addition to drawing on the terminal, allowing output to be piped
    #[arg(long, default_value = "false", global = true)]
    log_output: bool,
}

#[derive(Subcommand, Debug, Clone)]
enum Commands {
    /// Train a classifier on the training split, validating against the test split after each epoch
    Train(TrainArgs),
    /// Print the layer-by-layer summary of the CIFAR-10 network
    Summary {
        /// path to save the architecture to. Supported file extensions are .json and .cbor
        #[arg(short = 'o', long = "out")]
        output_file: Option<PathBuf>,
    },
    /// Report image counts, class balance and pixel statistics for one split of the dataset
    Inspect(InspectArgs),
}

#[derive(Args, Clone, Debug)]
struct TrainArgs {
    /// directory containing data_batch_1.bin through data_batch_5.bin and test_batch.bin
    #[arg(short = 'd', long = "data")]
    data_dir: PathBuf,

    #[arg(short = 'e', long, visible_alias = "epochs", default_value = "10")]
    /// number of epochs to train the model for
    num_epochs: usize,

    #[arg(short = 'b', long, default_value = "60")]
    /// number of samples per training batch
    batch_size: usize,

    #[arg(long, default_value = "4")]
    /// zero-based epoch after which training stops, regardless of the planned number of epochs
    stop_epoch: usize,

    #[arg(long, conflicts_with = "stop_epoch")]
    /// train for the full number of epochs
    no_stop: bool,

    #[arg(long)]
    /// skip validation after each epoch. The model is still evaluated against the test split once training finishes
    no_validate: bool,

    #[arg(long)]
    /// load at most this many training images
    train_limit: Option<usize>,

    #[arg(long)]
    /// load at most this many test images
    test_limit: Option<usize>,

    #[arg(long)]
    /// seed for shuffling the training data each epoch
    seed: Option<u64>,

    #[arg(long, default_value = "0.01")]
    /// softmax temperature of the baseline classifier. Lower values give more confident predictions
    temperature: f64,

    /// path to save the learning curves to. Supported file extensions are .json, .cbor and .csv
    #[arg(short = 'o', long = "history-out")]
    history_output_file: Option<PathBuf>,
}

#[derive(Args, Clone, Debug)]
struct InspectArgs {
    /// directory containing the dataset's .bin files
    #[arg(short = 'd', long = "data")]
    data_dir: PathBuf,

    /// which split to inspect: train or test
    #[arg(long, default_value = "train")]
    split: Split,

    /// load at most this many images
    #[arg(long)]
    limit: Option<usize>,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    info!("Using arguments {cli:?}");
    match cli.command {
        Commands::Train(train_args) => train(train_args, cli.log_output),
        Commands::Summary { output_file } => {
            // check the output file extension before doing any work
            if let Some(output_file) = &output_file {
                validate_output_file_extension(output_file, &ARCHITECTURE_EXTENSIONS)?;
            }
            let architecture = cifar10_cnn()?;
            println!("{}", architecture);
            if let Some(output_file) = &output_file {
                serialize_architecture(output_file, &architecture)?;
            }
            Ok(())
        }
        Commands::Inspect(inspect_args) => inspect(inspect_args),
    }
}

fn train(train_args: TrainArgs, log_output: bool) -> Result<(), Box<dyn Error>> {
    // check the output file extension to make sure we can save it later. If not, better to fail now than after training
    if let Some(output_file) = &train_args.history_output_file {
        validate_output_file_extension(output_file, &HISTORY_EXTENSIONS)?;
    }
    let training_options = TrainingOptions::new(
        train_args.num_epochs,
        train_args.batch_size,
        true,
        train_args.seed,
    )?;

    let architecture = cifar10_cnn()?;
    println!("{}", architecture);

    let training_data = dataset::normalize(&dataset::load_split(
        &train_args.data_dir,
        Split::Train,
        train_args.train_limit,
    )?);
    let test_data = dataset::normalize(&dataset::load_split(
        &train_args.data_dir,
        Split::Test,
        train_args.test_limit,
    )?);
    // the test split is evaluated after training even without per-epoch validation
    require_images(Split::Train, &training_data)?;
    require_images(Split::Test, &test_data)?;
    println!(
        "Data loaded. Training: {}, Test: {}",
        training_data.len(),
        test_data.len()
    );

    let mut model = NearestCentroid::new(
        architecture.input_shape().len(),
        architecture.output_shape().len(),
        train_args.temperature,
    );

    let validate = if train_args.no_validate {
        EachEpoch::DoNotValidateModel
    } else {
        EachEpoch::ValidateModel(&test_data)
    };
    let training_progress =
        TrainingProgress::new((training_data.len() * train_args.num_epochs) as u64, log_output);
    let limiter = EpochLimiter::new(train_args.stop_epoch);
    let mut observers: Vec<&dyn TrainingObserver> = vec![&training_progress];
    if !train_args.no_stop {
        observers.push(&limiter);
    }

    // run the training loop on the model
    let history = fit(
        &mut model,
        &training_data,
        validate,
        &observers,
        &training_options,
    )?;
    training_progress
        .into_inner()
        .finish_with_message("Training complete");

    let evaluation = evaluate(&model, &test_data, train_args.batch_size)?;
    println!(
        "{} Test loss: {}, Test accuracy: {}",
        chrono::Local::now(),
        evaluation.loss,
        evaluation.accuracy
    );
    if let Some(best_epoch) = history.best_epoch() {
        println!("Best epoch: {} of {}", best_epoch + 1, history.len());
    }

    if let Some(output_file) = &train_args.history_output_file {
        serialize_history(output_file, &history)?;
    }
    Ok(())
}

fn inspect(inspect_args: InspectArgs) -> Result<(), Box<dyn Error>> {
    let images = dataset::load_split(
        &inspect_args.data_dir,
        inspect_args.split,
        inspect_args.limit,
    )?;
    let samples = dataset::normalize(&images);
    println!("{} split: {} images", inspect_args.split, samples.len());

    let counts = dataset::class_distribution(&samples);
    for (label, name) in CLASS_NAMES.iter().enumerate() {
        println!(
            "  {:>2} {:<12} {}",
            label,
            name,
            counts.get(&label).copied().unwrap_or(0)
        );
    }
    let stats = dataset::pixel_statistics(&samples);
    println!(
        "normalized pixels: mean {:.4}, std dev {:.4}, min {}, max {}",
        stats.mean, stats.std_dev, stats.min, stats.max
    );
    Ok(())
}

fn require_images(split: Split, samples: &[Sample]) -> Result<(), Box<dyn Error>> {
    if samples.is_empty() {
        return Err(format!(
            "The {} split contains no images. Check the data directory and the --{}-limit option",
            split, split
        )
        .into());
    }
    Ok(())
}

const HISTORY_EXTENSIONS: [&str; 3] = ["json", "cbor", "csv"];
const ARCHITECTURE_EXTENSIONS: [&str; 2] = ["json", "cbor"];

fn file_extension(path: &Path) -> Result<&str, Box<dyn Error>> {
    path.extension()
        .and_then(|extension| extension.to_str())
        .ok_or_else(|| {
            format!(
                "No file extension found for {} - unable to determine output format",
                path.display()
            )
            .into()
        })
}

fn validate_output_file_extension(
    output_file_path: &Path,
    supported: &[&str],
) -> Result<(), Box<dyn Error>> {
    let file_extension = file_extension(output_file_path)?;
    if !supported.contains(&file_extension) {
        return Err(format!(
            "Unsupported file extension: {}. Supported extensions are: {}",
            file_extension,
            supported.join(", ")
        )
        .into());
    }
    Ok(())
}

fn serialize_history(history_output_file: &Path, history: &History) -> Result<(), Box<dyn Error>> {
    println!("Saving learning curves to file: {:?}", history_output_file);
    let mut out_file = File::create(history_output_file)?;
    match file_extension(history_output_file)? {
        "json" => serde_json::to_writer_pretty(&mut out_file, history)?,
        "cbor" => ciborium::into_writer(history, &mut out_file)?,
        "csv" => history.write_csv(&mut out_file)?,
        other => return Err(format!("Unsupported file extension: {}", other).into()),
    }
    Ok(())
}

fn serialize_architecture(
    architecture_output_file: &Path,
    architecture: &Sequential,
) -> Result<(), Box<dyn Error>> {
    println!("Saving architecture to file: {:?}", architecture_output_file);
    let mut out_file = File::create(architecture_output_file)?;
    match file_extension(architecture_output_file)? {
        "json" => serde_json::to_writer_pretty(&mut out_file, architecture)?,
        "cbor" => ciborium::into_writer(architecture, &mut out_file)?,
        other => return Err(format!("Unsupported file extension: {}", other).into()),
    }
    Ok(())
}

struct TrainingProgress {
    pb: ProgressBar,
    should_log: bool,
}

impl TrainingProgress {
    fn new(total: u64, should_log: bool) -> Self {
        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "[{elapsed_precise}] [{bar:40.green/white}] {human_pos}/{human_len} {per_sec} ({eta}) {msg}",
                )
                .unwrap(),
        );
        TrainingProgress { pb, should_log }
    }

    fn into_inner(self) -> ProgressBar {
        self.pb
    }
}

impl TrainingObserver for TrainingProgress {
    fn on_batch_end(&self, _batch: usize, batch_size: usize) {
        self.pb.inc(batch_size as u64);
    }

    fn on_epoch_end(&self, epoch: usize, context: &mut TrainingContext) {
        let Some(logs) = context.logs() else {
            return;
        };
        let line = format!(
            "{} Epoch {}/{}: Loss: {:.4}, Accuracy: {:.4}, Validation Loss: {}, Validation Accuracy: {}",
            chrono::Local::now(),
            epoch + 1,
            context.planned_epochs(),
            logs.loss,
            logs.accuracy,
            logs.val_loss.map_or("-".to_string(), |l| format!("{:.4}", l)),
            logs.val_accuracy
                .map_or("-".to_string(), |a| format!("{:.4}", a)),
        );
        self.pb.println(&line);
        if self.should_log {
            println!("{}", line);
        }
    }

    fn on_train_end(&self, context: &TrainingContext) {
        // a run stopped early never reaches the planned total
        if context.should_stop() {
            self.pb.set_length(self.pb.position());
        }
    }
}
