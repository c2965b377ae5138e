use std::path::PathBuf;

use bovw::report::{show_worst, ImageSink};
use bovw::*;
use clap::Parser;
use image::RgbImage;

#[derive(Parser)]
#[command(name = "classify")]
#[command(about = "Train and test a bag of visual words classifier on a folder-per-class dataset")]
struct Cli {
    /// Folder holding one sub folder per class.
    data: PathBuf,

    /// Indices of the (alphabetically sorted) class folders to use.
    #[arg(long, value_delimiter = ',', default_value = "40,41,42,43,44,45,46,47,48,49")]
    classes: Vec<usize>,

    #[arg(long, default_value = "75")]
    image_size: u32,

    #[arg(long, default_value = "7")]
    step_size: u32,

    #[arg(long, default_value = "8")]
    patch_size: u32,

    #[arg(long, default_value = "900")]
    words: usize,

    /// SVM regularization strength.
    #[arg(long, default_value = "16384")]
    c: f64,

    /// Use an RBF kernel with this gamma instead of a linear SVM.
    #[arg(long)]
    gamma: Option<f64>,

    /// Where to write the worst misclassified images.
    #[arg(long)]
    errors_dir: Option<PathBuf>,

    /// Save the vocabulary to this file.
    #[arg(long)]
    save_vocab: Option<PathBuf>,
}

/// Writes every shown image as a PNG file.
struct PngSink(PathBuf);

impl ImageSink for PngSink {
    fn show(&mut self, label: &str, rank: usize, image: &RgbImage) -> BowResult<()> {
        image.save(self.0.join(format!("{}_{}.png", label, rank)))?;
        Ok(())
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config {
        image_size: cli.image_size,
        features: FeatureParams::new(cli.step_size, cli.patch_size, cli.words),
        svm: match cli.gamma {
            Some(gamma) => SvmParams::rbf(cli.c, Gamma::Value(gamma)),
            None => SvmParams::linear(cli.c),
        },
        ..Config::default()
    };

    let dataset = Dataset::load(&cli.data, &cli.classes, config.image_size)?;
    let outcome = pipeline::run(&config, &dataset.gray, &dataset.labels)?;
    println!("{}", outcome.evaluation);

    if let Some(dir) = cli.errors_dir {
        std::fs::create_dir_all(&dir)?;
        let color_test = outcome.split.test_of(&dataset.color)?;
        show_worst(&outcome.evaluation, &color_test, &mut PngSink(dir))?;
    }
    if let Some(file) = cli.save_vocab {
        outcome.vocabulary.save(file)?;
    }
    Ok(())
}
