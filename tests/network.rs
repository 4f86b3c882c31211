//! End-to-end behaviour of the character model: loss invariants, sampling
//! contract, error reporting.

use char_rnn::{
    CellKind, CharRnn, CharVocab, Embedding, NetworkConfig, OneHotEncoder, ParamId, RnnError,
    SamplingStrategy, Tensor,
};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn toy(cell: CellKind, layers: usize) -> CharRnn<f64> {
    let mut rng = StdRng::seed_from_u64(0);
    let config = NetworkConfig::toy().with_cell(cell).with_layers(layers);
    CharRnn::new(config, &mut rng).unwrap()
}

fn batch() -> (Vec<Vec<usize>>, Vec<Vec<usize>>) {
    let inputs = vec![vec![0, 4, 9, 13], vec![19, 2, 2, 7]];
    let targets = vec![vec![4, 9, 13, 1], vec![2, 2, 7, 11]];
    (inputs, targets)
}

// ── Loss ─────────────────────────────────────────────────────────────

#[test]
fn test_untrained_loss_near_uniform() {
    // Small initial scores give roughly ln(V) per position
    for cell in [CellKind::Vanilla, CellKind::Lstm] {
        let model = toy(cell, 1);
        let (inputs, targets) = batch();
        let (loss, _) = model.loss_indices(&inputs, &targets).unwrap();
        assert!((loss - 20f64.ln()).abs() < 1.0, "{} loss {}", cell, loss);
    }
}

#[test]
fn test_scores_softmax_to_distributions() {
    let model = toy(CellKind::Lstm, 2);
    let (inputs, _) = batch();
    let x: Tensor<f64> = model.encoder().encode(&inputs).unwrap();
    let (scores, states) = model.forward_scores(&x, None).unwrap();

    assert_eq!(scores.shape, vec![2, 4, 20]);
    assert_eq!(states.len(), 2);
    let probs = scores.reshape(&[8, 20]).softmax_rows();
    for row in probs.data.chunks(20) {
        let total: f64 = row.iter().sum();
        assert!((total - 1.0).abs() < 1e-12);
        assert!(row.iter().all(|&p| p > 0.0));
    }
}

#[test]
fn test_relabeling_invariance() {
    // Permuting the vocabulary on both sides leaves the loss unchanged
    let model = toy(CellKind::Lstm, 1);
    let (inputs, targets) = batch();
    let (loss, _) = model.loss_indices(&inputs, &targets).unwrap();

    let v = 20;
    let perm: Vec<usize> = (0..v).map(|j| (j * 7 + 3) % v).collect();
    let mut inv = vec![0; v];
    for (j, &p) in perm.iter().enumerate() {
        inv[p] = j;
    }

    let mut relabeled = model.clone();
    let h = relabeled.config().hidden_dim;
    let width = relabeled.params.layers[0].wx.shape[1];
    let wx = &model.params.layers[0].wx;
    relabeled.params.layers[0].wx = Tensor::from_fn(vec![v, width], |i| {
        let (row, col) = (i / width, i % width);
        wx.data[perm[row] * width + col]
    });
    let w_out = &model.params.output.weight;
    relabeled.params.output.weight = Tensor::from_fn(vec![h, v], |i| {
        let (row, col) = (i / v, i % v);
        w_out.data[row * v + perm[col]]
    });
    let b_out = &model.params.output.bias;
    relabeled.params.output.bias = Tensor::from_fn(vec![v], |j| b_out.data[perm[j]]);

    let map = |rows: &[Vec<usize>]| -> Vec<Vec<usize>> {
        rows.iter().map(|r| r.iter().map(|&i| inv[i]).collect()).collect()
    };
    let (relabeled_loss, _) = relabeled
        .loss_indices(&map(&inputs), &map(&targets))
        .unwrap();

    assert!((loss - relabeled_loss).abs() < 1e-12);
}

#[test]
fn test_all_masked_batch_has_zero_data_loss() {
    let model = toy(CellKind::Vanilla, 1);
    let (inputs, targets) = batch();
    let x: Tensor<f64> = model.encoder().encode(&inputs).unwrap();
    let mask = vec![vec![false; 4]; 2];

    let (loss, grads) = model.loss_masked(&x, &targets, Some(mask.as_slice())).unwrap();
    assert_eq!(loss, 0.0);
    for (_, g) in grads.tensors() {
        assert!(g.data.iter().all(|&v| v == 0.0));
    }
}

// ── Sampling ─────────────────────────────────────────────────────────

#[test]
fn test_sample_lengths() {
    let model = toy(CellKind::Lstm, 2);
    let encoder = model.encoder();

    let none = model.sample(&[1, 2, 3], &encoder, 0).unwrap();
    assert_eq!(none, vec![Vec::<usize>::new(); 3]);

    let some = model.sample(&[1, 2, 3], &encoder, 25).unwrap();
    assert_eq!(some.len(), 3);
    for row in &some {
        assert_eq!(row.len(), 25);
        assert!(row.iter().all(|&i| i < 20));
    }
}

#[test]
fn test_greedy_sampling_is_deterministic() {
    let model = toy(CellKind::Vanilla, 2);
    let encoder = model.encoder();
    let a = model.sample(&[5, 6], &encoder, 12).unwrap();
    let b = model.sample(&[5, 6], &encoder, 12).unwrap();
    assert_eq!(a, b);

    let mut rng = StdRng::seed_from_u64(9);
    let c = model
        .sample_with(&[5, 6], &encoder, 12, SamplingStrategy::Greedy, &mut rng)
        .unwrap();
    assert_eq!(a, c);
}

#[test]
fn test_temperature_sampling_is_seeded() {
    let model = toy(CellKind::Lstm, 1);
    let encoder = model.encoder();
    let run = |seed| {
        let mut rng = StdRng::seed_from_u64(seed);
        model
            .sample_with(&[0], &encoder, 30, SamplingStrategy::Temperature(1.0), &mut rng)
            .unwrap()
    };
    assert_eq!(run(4), run(4));
}

#[test]
fn test_sampling_needs_matching_input_and_output() {
    // Trains fine on dense features, but predictions cannot be fed back
    let mut rng = StdRng::seed_from_u64(2);
    let config = NetworkConfig {
        input_dim: 3,
        ..NetworkConfig::toy()
    };
    let model: CharRnn<f64> = CharRnn::new(config, &mut rng).unwrap();

    let x = Tensor::randn(vec![2, 4, 3], 1.0, &mut rng);
    assert!(model.loss(&x, &[vec![19, 0, 5, 7], vec![1, 2, 3, 4]]).is_ok());

    for length in [0, 1, 5] {
        assert!(matches!(
            model.sample(&[0, 1, 2], &model.encoder(), length),
            Err(RnnError::ShapeMismatch(_))
        ));
    }
    assert!(matches!(
        model.sample_with(&[0], &model.encoder(), 5, SamplingStrategy::Temperature(1.0), &mut rng),
        Err(RnnError::ShapeMismatch(_))
    ));
}

// ── Embedding ────────────────────────────────────────────────────────

#[test]
fn test_identity_embedding_matches_one_hot() {
    // An identity W_embed reproduces one-hot input exactly
    let plain = toy(CellKind::Lstm, 2);
    let mut rng = StdRng::seed_from_u64(0);
    let config = NetworkConfig::toy()
        .with_cell(CellKind::Lstm)
        .with_layers(2)
        .with_embedding(20);
    let mut embedded = CharRnn::<f64>::new(config, &mut rng).unwrap();
    embedded.params.layers = plain.params.layers.clone();
    embedded.params.output = plain.params.output.clone();
    embedded.params.embedding = Some(Embedding {
        weight: Tensor::from_fn(vec![20, 20], |i| if i / 20 == i % 20 { 1.0 } else { 0.0 }),
    });

    let (inputs, targets) = batch();
    let (plain_loss, plain_grads) = plain.loss_indices(&inputs, &targets).unwrap();
    let (embedded_loss, embedded_grads) = embedded.loss_indices(&inputs, &targets).unwrap();
    assert_eq!(plain_loss, embedded_loss);
    for (id, g) in plain_grads.tensors() {
        assert_eq!(embedded_grads.get(id), Some(g), "{}", id);
    }
    assert!(embedded_grads.get(ParamId::Embed).is_some());

    let encoder = plain.encoder();
    assert_eq!(
        plain.sample(&[3, 11], &encoder, 15).unwrap(),
        embedded.sample(&[3, 11], &encoder, 15).unwrap()
    );
}

#[test]
fn test_embedded_sampling() {
    let mut rng = StdRng::seed_from_u64(8);
    let config = NetworkConfig::toy().with_embedding(6);
    let model = CharRnn::<f64>::new(config, &mut rng).unwrap();
    let encoder = model.encoder();

    let out = model.sample(&[0, 19], &encoder, 9).unwrap();
    assert!(out.iter().all(|row| row.len() == 9 && row.iter().all(|&i| i < 20)));
    assert!(matches!(
        model.sample(&[20], &encoder, 9),
        Err(RnnError::InvalidIndex { index: 20, .. })
    ));
}

// ── Errors ───────────────────────────────────────────────────────────

#[test]
fn test_error_kinds() {
    let model = toy(CellKind::Vanilla, 1);
    let (inputs, targets) = batch();

    let wrong_width: Tensor<f64> = OneHotEncoder::new(10).encode(&[vec![1, 2, 3, 4]]).unwrap();
    assert!(matches!(
        model.loss(&wrong_width, &[vec![1, 2, 3, 4]]),
        Err(RnnError::ShapeMismatch(_))
    ));

    let bad_targets = vec![vec![4, 9, 13, 20], vec![2, 2, 7, 11]];
    assert!(matches!(
        model.loss_indices(&inputs, &bad_targets),
        Err(RnnError::InvalidIndex { index: 20, bound: 20 })
    ));

    let short_targets = vec![vec![4, 9, 13], vec![2, 2, 7]];
    assert!(matches!(
        model.loss_indices(&inputs, &short_targets),
        Err(RnnError::ShapeMismatch(_))
    ));

    assert!(matches!(
        model.sample(&[0], &OneHotEncoder::new(7), 3),
        Err(RnnError::ShapeMismatch(_))
    ));
    assert!(matches!(
        model.sample(&[25], &model.encoder(), 3),
        Err(RnnError::InvalidIndex { index: 25, .. })
    ));

    let mut rng = StdRng::seed_from_u64(0);
    assert!(matches!(
        model.sample_with(&[0], &model.encoder(), 3, SamplingStrategy::Temperature(0.0), &mut rng),
        Err(RnnError::InvalidConfiguration(_))
    ));

    assert!(model.loss_indices(&inputs, &targets).is_ok());
}

#[test]
fn test_vocab_drives_model_dimensions() {
    let vocab = CharVocab::from_text("to be or not to be");
    let mut rng = StdRng::seed_from_u64(1);
    let model: CharRnn<f32> = CharRnn::new(NetworkConfig::char_model(vocab.len()), &mut rng).unwrap();

    let ids = vocab.encode("not").unwrap();
    let generated = model.sample(&ids[..1], &vocab.encoder(), 8).unwrap();
    let text = vocab.decode(&generated[0]);
    assert_eq!(text.chars().count(), 8);
    assert!(text.chars().all(|c| vocab.index_of(c).is_some()));

    assert!(matches!(vocab.encode("xyz"), Err(RnnError::UnknownChar('x'))));
}
