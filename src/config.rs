//! Network Configuration
//!
//! Hyperparameters that fix the shape of a [`CharRnn`](crate::CharRnn).
//! Configurations serialize to JSON so a trained vocabulary and model shape
//! can be stored next to each other.
//!
//! ```json
//! {
//!   "input_dim": 65, "hidden_dim": 128, "output_dim": 65,
//!   "n_layers": 2, "cell_type": "lstm", "reg": 0.0,
//!   "weight_scale": null, "forget_bias": 1.0, "embed_dim": null
//! }
//! ```
//!
//! With `embed_dim` set, inputs are vocabulary indices looked up in a learned
//! `W_embed [input_dim, embed_dim]` table, and layer 0 reads `embed_dim`-wide
//! vectors instead of one-hot rows.
//!
//! Numeric precision is not a field: it is the `F` type parameter of the
//! network (`CharRnn<f32>` or `CharRnn<f64>`).

use crate::layers::cell::CellKind;
use crate::{Result, RnnError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Width of each input vector (vocabulary size for one-hot or embedded input)
    pub input_dim: usize,
    pub hidden_dim: usize,
    /// Number of scores per position (vocabulary size)
    pub output_dim: usize,
    pub n_layers: usize,
    pub cell_type: CellKind,
    /// L2 coefficient applied to weight matrices
    #[serde(default)]
    pub reg: f64,
    /// Standard deviation of initial weights; `1/√fan_in` when absent
    #[serde(default)]
    pub weight_scale: Option<f64>,
    /// Initial value of the LSTM forget-gate bias; zero when absent
    #[serde(default)]
    pub forget_bias: Option<f64>,
    /// Width of the learned input embedding; one-hot input when absent
    #[serde(default)]
    pub embed_dim: Option<usize>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self::toy()
    }
}

impl NetworkConfig {
    /// Small configuration used for gradient checks
    ///
    /// Batch size 2 and 3 timesteps are the usual companions:
    /// `D = V = 20`, `H = 6`, one vanilla layer.
    pub fn toy() -> Self {
        Self {
            input_dim: 20,
            hidden_dim: 6,
            output_dim: 20,
            n_layers: 1,
            cell_type: CellKind::Vanilla,
            reg: 0.0,
            weight_scale: None,
            forget_bias: None,
            embed_dim: None,
        }
    }

    /// Character language model over a vocabulary of `vocab_size` symbols
    pub fn char_model(vocab_size: usize) -> Self {
        Self {
            input_dim: vocab_size,
            hidden_dim: 128,
            output_dim: vocab_size,
            n_layers: 2,
            cell_type: CellKind::Lstm,
            reg: 0.0,
            weight_scale: None,
            forget_bias: Some(1.0),
            embed_dim: None,
        }
    }

    pub fn with_cell(mut self, cell_type: CellKind) -> Self {
        self.cell_type = cell_type;
        self
    }

    pub fn with_layers(mut self, n_layers: usize) -> Self {
        self.n_layers = n_layers;
        self
    }

    pub fn with_reg(mut self, reg: f64) -> Self {
        self.reg = reg;
        self
    }

    pub fn with_embedding(mut self, embed_dim: usize) -> Self {
        self.embed_dim = Some(embed_dim);
        self
    }

    /// Reject configurations that cannot build a network
    pub fn validate(&self) -> Result<()> {
        let dims = [
            ("input_dim", self.input_dim),
            ("hidden_dim", self.hidden_dim),
            ("output_dim", self.output_dim),
            ("n_layers", self.n_layers),
            ("embed_dim", self.embed_dim.unwrap_or(1)),
        ];
        for (name, value) in dims {
            if value == 0 {
                return Err(RnnError::InvalidConfiguration(format!(
                    "{} must be positive",
                    name
                )));
            }
        }
        if !self.reg.is_finite() || self.reg < 0.0 {
            return Err(RnnError::InvalidConfiguration(format!(
                "reg must be a non-negative number, got {}",
                self.reg
            )));
        }
        if let Some(scale) = self.weight_scale {
            if !scale.is_finite() || scale <= 0.0 {
                return Err(RnnError::InvalidConfiguration(format!(
                    "weight_scale must be positive, got {}",
                    scale
                )));
            }
        }
        Ok(())
    }

    /// Input width of layer `k`
    pub fn layer_input_dim(&self, k: usize) -> usize {
        if k == 0 {
            self.embed_dim.unwrap_or(self.input_dim)
        } else {
            self.hidden_dim
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        assert!(NetworkConfig::toy().validate().is_ok());
        assert!(matches!(
            NetworkConfig::toy().with_layers(0).validate(),
            Err(RnnError::InvalidConfiguration(_))
        ));
        let mut c = NetworkConfig::toy();
        c.hidden_dim = 0;
        assert!(c.validate().is_err());
        assert!(NetworkConfig::toy().with_reg(-1.0).validate().is_err());
        assert!(NetworkConfig::toy().with_embedding(0).validate().is_err());
    }

    #[test]
    fn test_embedding_sets_first_layer_width() {
        let plain = NetworkConfig::toy().with_layers(2);
        assert_eq!(plain.layer_input_dim(0), 20);

        let embedded = plain.with_embedding(8);
        assert!(embedded.validate().is_ok());
        assert_eq!(embedded.layer_input_dim(0), 8);
        assert_eq!(embedded.layer_input_dim(1), 6);
    }

    #[test]
    fn test_json_uses_cell_names() {
        let json = serde_json::to_string(&NetworkConfig::char_model(30)).unwrap();
        assert!(json.contains("\"cell_type\":\"lstm\""));

        let parsed: NetworkConfig = serde_json::from_str(
            r#"{"input_dim":4,"hidden_dim":3,"output_dim":4,"n_layers":1,"cell_type":"rnn"}"#,
        )
        .unwrap();
        assert_eq!(parsed.cell_type, CellKind::Vanilla);
        assert_eq!(parsed.reg, 0.0);
        assert_eq!(parsed.forget_bias, None);
        assert_eq!(parsed.embed_dim, None);

        let bad = serde_json::from_str::<NetworkConfig>(
            r#"{"input_dim":4,"hidden_dim":3,"output_dim":4,"n_layers":1,"cell_type":"gru"}"#,
        );
        assert!(bad.is_err());
    }

    #[test]
    fn test_save_load() {
        let path = std::env::temp_dir().join(format!("char_rnn_config_{}.json", std::process::id()));
        let config = NetworkConfig::char_model(12).with_reg(0.01);
        config.save(&path).unwrap();
        assert_eq!(NetworkConfig::load(&path).unwrap(), config);
        let _ = std::fs::remove_file(&path);
    }
}
