//! Analytic gradients of the full network against central finite differences.

use char_rnn::{
    check_network_gradients, check_network_gradients_indices, CellKind, CharRnn, GradientCheck,
    NetworkConfig, ParamId, RnnError, Scalar, Tensor,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const BATCH: usize = 2;
const STEPS: usize = 3;

/// Toy network plus a random dense input batch and random targets
fn setup<F: Scalar>(config: NetworkConfig, seed: u64) -> (CharRnn<F>, Tensor<F>, Vec<Vec<usize>>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let model = CharRnn::new(config.clone(), &mut rng).unwrap();
    let x = Tensor::randn(vec![BATCH, STEPS, config.input_dim], 1.0, &mut rng);
    let y = (0..BATCH)
        .map(|_| (0..STEPS).map(|_| rng.random_range(0..config.output_dim)).collect())
        .collect();
    (model, x, y)
}

fn assert_all_below(results: &[GradientCheck], threshold: f64) {
    for r in results {
        println!(
            "{:>6}: max {:.2e} norm {:.2e}",
            r.id, r.max_relative_error, r.norm_relative_error
        );
    }
    for r in results {
        assert!(
            r.norm_relative_error < threshold,
            "{} gradient off by {:.3e}",
            r.id,
            r.norm_relative_error
        );
    }
}

fn ids(results: &[GradientCheck]) -> Vec<String> {
    results.iter().map(|r| r.id.to_string()).collect()
}

// ── Double precision ─────────────────────────────────────────────────

#[test]
fn test_vanilla_single_layer() {
    let (mut model, x, y) = setup::<f64>(NetworkConfig::toy(), 0);
    let results = check_network_gradients(&mut model, &x, &y, 1e-6).unwrap();

    assert_eq!(ids(&results), vec!["Wx_0", "Wh_0", "b_0", "W_out", "b_out"]);
    assert_all_below(&results, 1e-5);
}

#[test]
fn test_lstm_single_layer() {
    let config = NetworkConfig::toy().with_cell(CellKind::Lstm);
    let (mut model, x, y) = setup::<f64>(config, 0);
    let results = check_network_gradients(&mut model, &x, &y, 1e-6).unwrap();
    assert_all_below(&results, 1e-5);
}

#[test]
fn test_lstm_three_layers() {
    let config = NetworkConfig::toy().with_cell(CellKind::Lstm).with_layers(3);
    let (mut model, x, y) = setup::<f64>(config, 0);
    let results = check_network_gradients(&mut model, &x, &y, 1e-6).unwrap();

    assert_eq!(results.len(), 3 * 3 + 2);
    for k in 0..3 {
        for name in ["Wx", "Wh", "b"] {
            let id: ParamId = format!("{}_{}", name, k).parse().unwrap();
            assert!(results.iter().any(|r| r.id == id));
        }
    }
    assert_all_below(&results, 1e-5);
}

#[test]
fn test_vanilla_two_layers_with_regularization() {
    let config = NetworkConfig::toy().with_layers(2).with_reg(0.1);
    let (mut model, x, y) = setup::<f64>(config, 3);
    let results = check_network_gradients(&mut model, &x, &y, 1e-6).unwrap();
    assert_all_below(&results, 1e-5);
}

#[test]
fn test_lstm_with_forget_bias() {
    let mut config = NetworkConfig::toy().with_cell(CellKind::Lstm).with_layers(2);
    config.forget_bias = Some(1.0);
    let (mut model, x, y) = setup::<f64>(config, 5);
    let results = check_network_gradients(&mut model, &x, &y, 1e-6).unwrap();
    assert_all_below(&results, 1e-5);
}

#[test]
fn test_check_leaves_parameters_unchanged() {
    let (mut model, x, y) = setup::<f64>(NetworkConfig::toy(), 1);
    let before = model.params.clone();
    check_network_gradients(&mut model, &x, &y, 1e-6).unwrap();
    assert_eq!(model.params, before);
}

// ── Embedded input ───────────────────────────────────────────────────

/// Toy network with a learned input embedding plus random index batches
fn setup_embedded(config: NetworkConfig, seed: u64) -> (CharRnn<f64>, Vec<Vec<usize>>, Vec<Vec<usize>>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let model = CharRnn::new(config.clone(), &mut rng).unwrap();
    let mut grid = |bound: usize| -> Vec<Vec<usize>> {
        (0..BATCH)
            .map(|_| (0..STEPS).map(|_| rng.random_range(0..bound)).collect())
            .collect()
    };
    let inputs = grid(config.input_dim);
    let targets = grid(config.output_dim);
    (model, inputs, targets)
}

#[test]
fn test_vanilla_with_embedding() {
    let config = NetworkConfig::toy().with_embedding(5);
    let (mut model, inputs, targets) = setup_embedded(config, 0);
    let results = check_network_gradients_indices(&mut model, &inputs, &targets, 1e-6).unwrap();

    assert_eq!(
        ids(&results),
        vec!["W_embed", "Wx_0", "Wh_0", "b_0", "W_out", "b_out"]
    );
    assert_all_below(&results, 1e-5);
}

#[test]
fn test_lstm_two_layers_with_embedding_and_regularization() {
    let config = NetworkConfig::toy()
        .with_cell(CellKind::Lstm)
        .with_layers(2)
        .with_reg(0.05)
        .with_embedding(8);
    let (mut model, inputs, targets) = setup_embedded(config, 2);
    let results = check_network_gradients_indices(&mut model, &inputs, &targets, 1e-6).unwrap();

    assert_eq!(results[0].id, ParamId::Embed);
    assert_all_below(&results, 1e-5);
}

#[test]
fn test_embedded_network_rejects_dense_check() {
    let config = NetworkConfig::toy().with_embedding(5);
    let (mut model, _, targets) = setup_embedded(config, 4);
    let x = Tensor::zeros(vec![BATCH, STEPS, 20]);
    assert!(matches!(
        check_network_gradients(&mut model, &x, &targets, 1e-6),
        Err(RnnError::InvalidConfiguration(_))
    ));
}

// ── Single precision ─────────────────────────────────────────────────

#[test]
fn test_single_precision() {
    for cell in [CellKind::Vanilla, CellKind::Lstm] {
        let config = NetworkConfig::toy().with_cell(cell);
        let (mut model, x, y) = setup::<f32>(config, 0);
        // Cancellation dominates in f32 unless the step is large
        let results = check_network_gradients(&mut model, &x, &y, 1e-2).unwrap();
        assert_all_below(&results, 1e-1);
    }
}
