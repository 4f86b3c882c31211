//! Train a Character-Level RNN or LSTM Language Model
//!
//! Reads a plain-text corpus, builds a character vocabulary from it, and
//! trains a recurrent network to predict the next character. Progress is
//! printed to the console and written to `training_log.csv`.
//!
//! ## Usage
//!
//! ```bash
//! # List available presets
//! cargo run --release --example train -- --list-presets
//!
//! # Train with a preset
//! cargo run --release --example train -- --preset tiny-lstm
//!
//! # Override preset parameters
//! cargo run --release --example train -- --preset tiny-lstm --epochs 5 --lr 0.001
//!
//! # Fully custom configuration
//! cargo run --release --example train -- --cell rnn --hidden 64 --layers 1 --epochs 2
//!
//! # Learned input embedding instead of one-hot characters
//! cargo run --release --example train -- --preset tiny-lstm --embed 16
//! ```
//!
//! ## Prerequisites
//!
//! Download Shakespeare corpus:
//! ```bash
//! curl -o shakespeare.txt https://www.gutenberg.org/files/100/100-0.txt
//! ```
//!
//! ## Output
//!
//! All outputs are saved to: `data/<preset>_<timestamp>/`
//! - `training_log.csv` - One row per epoch
//! - `network.json` - Network configuration
//! - `solver.json` - Training hyperparameters
//! - `vocab.json` - Character vocabulary

use char_rnn::{
    CellKind, CharDataset, CharRnn, NetworkConfig, SamplingStrategy, Solver, SolverConfig,
    TrainingLogger,
};
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Parser)]
#[command(name = "train", about = "Train a character-level RNN/LSTM language model")]
struct Args {
    /// Named preset (see --list-presets)
    #[arg(long)]
    preset: Option<String>,

    /// List available presets and exit
    #[arg(long)]
    list_presets: bool,

    // Model architecture (override preset or use standalone)
    /// Cell type: rnn or lstm
    #[arg(long)]
    cell: Option<CellKind>,

    /// Hidden state width
    #[arg(long)]
    hidden: Option<usize>,

    /// Number of stacked recurrent layers
    #[arg(long)]
    layers: Option<usize>,

    /// Learned input embedding width (default: one-hot input)
    #[arg(long)]
    embed: Option<usize>,

    /// L2 regularization strength
    #[arg(long, default_value = "0.0")]
    reg: f64,

    // Training parameters
    /// Number of epochs
    #[arg(long)]
    epochs: Option<usize>,

    /// Iterations per epoch (default: one pass over the corpus)
    #[arg(long)]
    iterations: Option<usize>,

    /// Initial learning rate
    #[arg(long)]
    lr: Option<f64>,

    /// Per-epoch learning rate decay
    #[arg(long, default_value = "0.95")]
    lr_decay: f64,

    /// Minibatch size
    #[arg(long, default_value = "32")]
    batch_size: usize,

    /// Timesteps per training window
    #[arg(long)]
    seq_len: Option<usize>,

    /// Gradient clipping max norm (0 disables)
    #[arg(long, default_value = "5.0")]
    grad_clip: f64,

    /// Use plain SGD instead of Adam
    #[arg(long)]
    sgd: bool,

    // Data
    /// Path to training text file
    #[arg(long, default_value = "shakespeare.txt")]
    data: String,

    /// Fraction of the corpus held out for validation
    #[arg(long, default_value = "0.1")]
    val_fraction: f64,

    /// Random seed
    #[arg(long, default_value = "0")]
    seed: u64,
}

struct Preset {
    name: &'static str,
    cell: CellKind,
    hidden: usize,
    layers: usize,
    seq_len: usize,
    lr: f64,
    epochs: usize,
    iterations: Option<usize>,
    description: &'static str,
}

const PRESETS: &[Preset] = &[
    Preset {
        name: "tiny-rnn",
        cell: CellKind::Vanilla,
        hidden: 64,
        layers: 1,
        seq_len: 25,
        lr: 0.002,
        epochs: 3,
        iterations: Some(300),
        description: "Single vanilla RNN layer, a few minutes on CPU",
    },
    Preset {
        name: "tiny-lstm",
        cell: CellKind::Lstm,
        hidden: 64,
        layers: 1,
        seq_len: 32,
        lr: 0.002,
        epochs: 3,
        iterations: Some(300),
        description: "Single LSTM layer, same budget as tiny-rnn",
    },
    Preset {
        name: "char-lstm",
        cell: CellKind::Lstm,
        hidden: 128,
        layers: 2,
        seq_len: 50,
        lr: 0.002,
        epochs: 10,
        iterations: None,
        description: "Two-layer LSTM, full passes over the corpus",
    },
    Preset {
        name: "deep-lstm",
        cell: CellKind::Lstm,
        hidden: 256,
        layers: 3,
        seq_len: 64,
        lr: 0.001,
        epochs: 20,
        iterations: None,
        description: "Three-layer LSTM, hours on CPU",
    },
];

fn print_presets() {
    println!("\nAvailable presets:\n");
    println!(
        "  {:<10} {:>5} {:>6} {:>6} {:>7} {:>7} {:>6}   {}",
        "NAME", "CELL", "HIDDEN", "LAYERS", "SEQ_LEN", "LR", "EPOCHS", "DESCRIPTION"
    );
    println!("  {}", "-".repeat(90));
    for p in PRESETS {
        println!(
            "  {:<10} {:>5} {:>6} {:>6} {:>7} {:>7.4} {:>6}   {}",
            p.name, p.cell, p.hidden, p.layers, p.seq_len, p.lr, p.epochs, p.description
        );
    }
    println!("\nUsage: cargo run --release --example train -- --preset <NAME>");
    println!("Override any parameter: --preset tiny-lstm --epochs 5 --lr 0.001");
}

fn section(title: &str) {
    println!("\n{}", "=".repeat(70));
    println!("{}", title);
    println!("{}", "=".repeat(70));
    println!();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if args.list_presets {
        print_presets();
        return Ok(());
    }

    // ========================================================================
    // Resolve configuration from preset + CLI overrides
    // ========================================================================
    let preset = match args.preset {
        Some(ref name) => Some(PRESETS.iter().find(|p| p.name == name.as_str()).ok_or_else(
            || {
                format!(
                    "Unknown preset '{}'. Use --list-presets to see available options.",
                    name
                )
            },
        )?),
        None => None,
    };

    let cell = args.cell.or(preset.map(|p| p.cell)).unwrap_or(CellKind::Lstm);
    let hidden = args.hidden.or(preset.map(|p| p.hidden)).unwrap_or(128);
    let layers = args.layers.or(preset.map(|p| p.layers)).unwrap_or(2);
    let seq_len = args.seq_len.or(preset.map(|p| p.seq_len)).unwrap_or(50);
    let learning_rate = args.lr.or(preset.map(|p| p.lr)).unwrap_or(0.002);
    let epochs = args.epochs.or(preset.map(|p| p.epochs)).unwrap_or(10);
    let iterations = args.iterations.or(preset.and_then(|p| p.iterations));

    println!("\n{}", "=".repeat(70));
    match args.preset {
        Some(ref name) => println!("  Training char-rnn, preset: {}", name),
        None => println!("  Training char-rnn, custom configuration"),
    }
    println!("{}", "=".repeat(70));

    let timestamp = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
    let prefix = args.preset.as_deref().unwrap_or("custom").replace('-', "_");
    let run_dir = format!("data/{}_{}", prefix, timestamp);
    fs::create_dir_all(&run_dir)?;
    println!("Output directory: {}/", run_dir);

    let mut rng = StdRng::seed_from_u64(args.seed);

    // ========================================================================
    // 1. Load Training Data
    // ========================================================================
    section("1. Loading Training Data");

    let dataset = CharDataset::from_file(&args.data).map_err(|e| {
        if args.data == "shakespeare.txt" {
            format!(
                "{} ({}). Download with:\n  \
                 curl -o shakespeare.txt https://www.gutenberg.org/files/100/100-0.txt",
                args.data, e
            )
        } else {
            format!("{}: {}", args.data, e)
        }
    })?;
    let vocab = dataset.vocab().clone();
    let (train, val) = dataset.train_val_split(args.val_fraction)?;
    println!(
        "Split: {} training / {} validation characters",
        train.data().len(),
        val.data().len()
    );
    vocab.save(format!("{}/vocab.json", run_dir))?;

    // ========================================================================
    // 2. Model
    // ========================================================================
    section("2. Model");

    let config = NetworkConfig {
        hidden_dim: hidden,
        n_layers: layers,
        cell_type: cell,
        reg: args.reg,
        embed_dim: args.embed,
        ..NetworkConfig::char_model(vocab.len())
    };
    config.save(format!("{}/network.json", run_dir))?;

    let model = CharRnn::<f32>::new(config, &mut rng)?;
    let num_params = model.num_parameters();
    println!("  Vocabulary: {}", vocab.len());
    println!("  Cell: {}", cell);
    println!("  Hidden: {}", hidden);
    println!("  Layers: {}", layers);
    match args.embed {
        Some(dim) => println!("  Input: learned embedding, width {}", dim),
        None => println!("  Input: one-hot"),
    }
    println!(
        "  Parameters: {} ({:.2}M)",
        num_params,
        num_params as f64 / 1_000_000.0
    );

    // ========================================================================
    // 3. Train
    // ========================================================================
    section("3. Training");

    let solver_config = SolverConfig {
        update_rule: if args.sgd {
            char_rnn::UpdateRule::Sgd
        } else {
            char_rnn::UpdateRule::adam()
        },
        learning_rate,
        lr_decay: args.lr_decay,
        num_epochs: epochs,
        batch_size: args.batch_size,
        seq_len,
        iterations_per_epoch: iterations,
        grad_clip: (args.grad_clip > 0.0).then_some(args.grad_clip),
        ..SolverConfig::default()
    };
    solver_config.validate()?;
    fs::write(
        format!("{}/solver.json", run_dir),
        serde_json::to_string_pretty(&solver_config)?,
    )?;

    println!("  Epochs: {}", solver_config.num_epochs);
    println!("  Learning rate: {} (decay {})", learning_rate, args.lr_decay);
    println!("  Batch size: {}", solver_config.batch_size);
    println!("  Sequence length: {}", seq_len);
    println!("  Gradient clipping: {:?}", solver_config.grad_clip);
    println!();

    let logger = TrainingLogger::new(format!("{}/training_log.csv", run_dir))?;
    let mut solver = Solver::new(model, train, Some(val), solver_config)
        .with_vocab(vocab.clone())
        .with_logger(logger);
    solver.train(&mut rng)?;

    if let Some(best) = solver.best_val_loss() {
        println!("\nBest validation loss: {:.4} (perplexity {:.2})", best, best.exp());
    }

    // ========================================================================
    // 4. Generate Samples
    // ========================================================================
    section("4. Sample Generation");

    let encoder = vocab.encoder();
    let seeds = [('T', 0.5), ('R', 0.8), ('K', 1.0)];
    for (seed, temperature) in seeds {
        let Some(start) = vocab.index_of(seed) else {
            continue;
        };
        let generated = solver.model.sample_with(
            &[start],
            &encoder,
            200,
            SamplingStrategy::Temperature(temperature),
            &mut rng,
        )?;
        println!("'{}' (t={}):", seed, temperature);
        println!("  {}{}", seed, vocab.decode(&generated[0]));
        println!();
    }

    println!("Training complete. Output: {}/", run_dir);

    Ok(())
}
