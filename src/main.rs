use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::{info, LevelFilter};

use blob_nn::data::{load_dir, load_image};
use blob_nn::{Classifier, ClassifierConfig, LabeledDataset, ValidationSet};

#[derive(Parser, Debug)]
#[command(name = "blob-nn", version, about = "Train and apply a diffuse-source image classifier")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Search hyperparameters (unless disabled in the config), fit and save a model.
    Train {
        /// Classifier configuration as JSON. Missing keys take their defaults.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Directory of images of the target class.
        #[arg(long)]
        blob: PathBuf,
        /// Directory of images of the other class.
        #[arg(long)]
        other: PathBuf,
        #[arg(long)]
        val_blob: Option<PathBuf>,
        #[arg(long)]
        val_other: Option<PathBuf>,
        /// Artifacts are written to `<out>/blob_nn_model`.
        #[arg(long)]
        out: PathBuf,
        #[arg(long)]
        overwrite: bool,
    },
    /// Label images with a saved model.
    Predict {
        /// Directory passed as `--out` when training.
        #[arg(long)]
        model: PathBuf,
        /// Print the probability of each predicted label.
        #[arg(long)]
        proba: bool,
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::default()
        .filter_level(LevelFilter::Info)
        .parse_env(env_logger::Env::default().filter_or("BLOB_NN_LOG", "info"))
        .init();

    match Cli::parse().command {
        Command::Train { config, blob, other, val_blob, val_other, out, overwrite } => {
            let config = match config {
                Some(path) => ClassifierConfig::load_json(&path)
                    .with_context(|| format!("reading config {}", path.display()))?,
                None => ClassifierConfig::default(),
            };
            train(config, blob, other, val_blob, val_other, out, overwrite)
        }
        Command::Predict { model, proba, images } => predict(model, proba, images),
    }
}

fn train(
    config: ClassifierConfig,
    blob: PathBuf,
    other: PathBuf,
    val_blob: Option<PathBuf>,
    val_other: Option<PathBuf>,
    out: PathBuf,
    overwrite: bool,
) -> Result<()> {
    let channels = config.img_num_channels;
    let data = LabeledDataset::new(
        load_dir(&blob, channels).with_context(|| format!("loading {}", blob.display()))?,
        load_dir(&other, channels).with_context(|| format!("loading {}", other.display()))?,
    );
    let validation = ValidationSet {
        blob: val_blob.map(|d| load_dir(&d, channels)).transpose().context("loading validation blobs")?,
        other: val_other.map(|d| load_dir(&d, channels)).transpose().context("loading validation others")?,
    };

    let mut classifier = Classifier::new(config, data, validation);
    classifier.create().context("creating the classifier")?;
    if let Some(network) = classifier.network() {
        info!("final network:\n{}", network.summary());
    }
    if let Some(best) = classifier.best_params() {
        info!("best hyperparameters: {}", serde_json::to_string(best)?);
    }
    let path = classifier.save(&out, overwrite).context("saving artifacts")?;
    info!("saved to {}", path.display());
    Ok(())
}

fn predict(model: PathBuf, proba: bool, images: Vec<PathBuf>) -> Result<()> {
    let (mut classifier, report) = Classifier::load(&model, ClassifierConfig::default())
        .with_context(|| format!("loading model from {}", model.display()))?;
    info!("loaded {report}");
    if !report.model {
        bail!("no model found in {}", model.display());
    }
    let channels = classifier
        .metadata()
        .map_or(classifier.config().img_num_channels, |m| m.img_num_channels);

    let samples = images
        .iter()
        .map(|p| load_image(p, channels).with_context(|| format!("reading {}", p.display())))
        .collect::<Result<Vec<_>>>()?;
    let predictions = classifier.predict(&samples, proba)?;
    for (path, p) in images.iter().zip(predictions) {
        match p.probability {
            Some(prob) => println!("{}\t{}\t{prob:.4}", path.display(), p.label),
            None => println!("{}\t{}", path.display(), p.label),
        }
    }
    Ok(())
}
