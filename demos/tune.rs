use std::path::PathBuf;

use bovw::cv::KFold;
use bovw::split::split_data;
use bovw::tune::{best, c_sweep, gamma_sweep, grid, powers_of_two, search, TuningResult};
use bovw::*;
use clap::{Parser, ValueEnum};

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum KernelArg {
    Linear,
    Rbf,
}

#[derive(Parser)]
#[command(name = "tune")]
#[command(about = "Cross validated grid search over the pipeline hyperparameters")]
struct Cli {
    /// Folder holding one sub folder per class.
    data: PathBuf,

    /// Indices of the class folders used for tuning.
    #[arg(long, value_delimiter = ',', default_value = "20,21,22,23,24,25,26,27,28,29")]
    classes: Vec<usize>,

    #[arg(long, value_delimiter = ',', default_value = "75")]
    image_sizes: Vec<u32>,

    #[arg(long, value_delimiter = ',', default_value = "4,7,10,13,16,19")]
    step_sizes: Vec<u32>,

    #[arg(long, value_delimiter = ',', default_value = "4,6,8,12,16")]
    patch_sizes: Vec<u32>,

    #[arg(long, value_delimiter = ',', default_value = "300")]
    words: Vec<usize>,

    /// Linear SVM, or RBF SVM with gamma = 1 / (n_features * Var(X)) while sweeping C.
    #[arg(long, value_enum, default_value = "linear")]
    kernel: KernelArg,

    /// Exponents e of the SVM C = 2^e to try.
    #[arg(long, default_value = "0")]
    c_min: i32,

    #[arg(long, default_value = "0")]
    c_max: i32,

    /// With `--kernel rbf`: exponents e of gamma = 2^e tried at the best C.
    #[arg(long, requires = "gamma_max")]
    gamma_min: Option<i32>,

    #[arg(long, requires = "gamma_min")]
    gamma_max: Option<i32>,

    #[arg(long, default_value = "5")]
    folds: usize,

    #[arg(long, default_value = "0")]
    seed: u64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let svms = c_sweep(&powers_of_two(cli.c_min..=cli.c_max), cli.kernel == KernelArg::Rbf);
    let candidates = grid(&cli.step_sizes, &cli.patch_sizes, &cli.words, &svms);
    let kfold = KFold::shuffled(cli.folds, cli.seed);

    let mut overall = Vec::new();
    for &size in &cli.image_sizes {
        let dataset = Dataset::load(&cli.data, &cli.classes, size)?;
        // tune on the training part only
        let split = split_data(&dataset.gray, &dataset.labels)?;
        let mut results = search(&split.train_x, &split.train_y, &candidates, &kfold, cli.seed)?;
        print_results(size, &results);

        if let (KernelArg::Rbf, Some(lo), Some(hi)) = (cli.kernel, cli.gamma_min, cli.gamma_max) {
            if let Some(b) = best(&results).copied() {
                let gammas = gamma_sweep(&b.candidate, &powers_of_two(lo..=hi));
                let tuned = search(&split.train_x, &split.train_y, &gammas, &kfold, cli.seed)?;
                print_results(size, &tuned);
                results.extend(tuned);
            }
        }
        if let Some(b) = best(&results) {
            overall.push((size, *b));
        }
    }

    if let Some((size, b)) = overall
        .iter()
        .fold(None::<&(u32, TuningResult)>, |acc, cur| match acc {
            Some(a) if a.1.accuracy >= cur.1.accuracy => Some(a),
            _ => Some(cur),
        })
    {
        println!("\nBest: image size {} {:?} -> {:.3}%", size, b.candidate, b.accuracy);
    }
    Ok(())
}

fn print_results(size: u32, results: &[TuningResult]) {
    for r in results {
        let gamma = match r.candidate.svm.kernel {
            Kernel::Linear => "linear".to_string(),
            Kernel::Rbf(Gamma::Value(g)) => format!("gamma {}", g),
            Kernel::Rbf(g) => format!("gamma {:?}", g),
        };
        println!(
            "size {:>3} step {:>2} patch {:>2} words {:>4} C {:>9} {} -> {:.3}%",
            size,
            r.candidate.features.step_size,
            r.candidate.features.patch_size,
            r.candidate.features.vocab_size,
            r.candidate.svm.c,
            gamma,
            r.accuracy
        );
    }
}
