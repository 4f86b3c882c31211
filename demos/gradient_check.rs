//! Gradient Check for Every Network Configuration
//!
//! Compares the analytic gradients of the full network with central
//! finite differences, for both cell types and one to three layers, and
//! prints a table of relative errors per parameter.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --release --example gradient_check
//! cargo run --release --example gradient_check -- --hidden 10 --steps 5 --seed 3
//! cargo run --release --example gradient_check -- --embed 8
//! ```
//!
//! In double precision every error should be far below `1e-2`; values
//! around `1e-7` are typical. Errors near 1 mean a backward pass is wrong.

use char_rnn::{
    check_network_gradients, check_network_gradients_indices, CellKind, CharRnn, NetworkConfig,
    Tensor,
};
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Parser)]
#[command(name = "gradient_check", about = "Check analytic RNN/LSTM gradients numerically")]
struct Args {
    /// Minibatch size
    #[arg(long, default_value = "2")]
    batch: usize,

    /// Timesteps
    #[arg(long, default_value = "3")]
    steps: usize,

    /// Hidden state width
    #[arg(long, default_value = "6")]
    hidden: usize,

    /// Input and output dimension
    #[arg(long, default_value = "20")]
    dim: usize,

    /// Learned input embedding width (checks index input through W_embed)
    #[arg(long)]
    embed: Option<usize>,

    /// L2 regularization strength
    #[arg(long, default_value = "0.0")]
    reg: f64,

    /// Finite-difference step
    #[arg(long, default_value = "1e-6")]
    h: f64,

    /// Random seed
    #[arg(long, default_value = "0")]
    seed: u64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    println!("\n{}", "=".repeat(70));
    println!(
        "  Gradient check: N={} T={} H={} D=V={} reg={} h={:e}",
        args.batch, args.steps, args.hidden, args.dim, args.reg, args.h
    );
    println!("{}", "=".repeat(70));

    let mut worst: f64 = 0.0;
    for cell in [CellKind::Vanilla, CellKind::Lstm] {
        for n_layers in 1..=3 {
            let mut rng = StdRng::seed_from_u64(args.seed);
            let config = NetworkConfig {
                input_dim: args.dim,
                hidden_dim: args.hidden,
                output_dim: args.dim,
                n_layers,
                cell_type: cell,
                reg: args.reg,
                weight_scale: None,
                forget_bias: None,
                embed_dim: args.embed,
            };
            let mut model = CharRnn::<f64>::new(config, &mut rng)?;
            let indices = |rng: &mut StdRng| -> Vec<Vec<usize>> {
                (0..args.batch)
                    .map(|_| (0..args.steps).map(|_| rng.random_range(0..args.dim)).collect())
                    .collect()
            };
            let results = match args.embed {
                Some(_) => {
                    let inputs = indices(&mut rng);
                    let targets = indices(&mut rng);
                    check_network_gradients_indices(&mut model, &inputs, &targets, args.h)?
                }
                None => {
                    let x = Tensor::randn(vec![args.batch, args.steps, args.dim], 1.0, &mut rng);
                    let y = indices(&mut rng);
                    check_network_gradients(&mut model, &x, &y, args.h)?
                }
            };

            println!("\n{} x {} layer(s)", cell, n_layers);
            println!("  {:<8} {:>12} {:>12}", "PARAM", "MAX REL", "NORM REL");
            for r in results {
                println!(
                    "  {:<8} {:>12.3e} {:>12.3e}",
                    r.id.to_string(),
                    r.max_relative_error,
                    r.norm_relative_error
                );
                worst = worst.max(r.norm_relative_error);
            }
        }
    }

    println!("\nWorst whole-tensor relative error: {:.3e}", worst);
    if worst > 1e-2 {
        return Err(format!("gradient check failed ({:.3e} > 1e-2)", worst).into());
    }
    Ok(())
}
