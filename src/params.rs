//! Typed Parameter Sets
//!
//! Every trainable tensor of the network has a [`ParamId`]: the optional
//! input embedding (`W_embed`), a role within a recurrent layer (`Wx`, `Wh`,
//! `b`) or a role within the output projection (`W_out`, `b_out`). A
//! [`ParamSet`] stores the tensors in a fixed
//! schema and is used both for the live parameters and for their gradients,
//! so both always have the same keys and shapes.
//!
//! Names such as `"Wh_0"` or `"b_out"` exist only for display and for
//! lookup at the edges (logging, command line selection).
//!
//! ```text
//! embed:    W_embed [V, D]     (only when configured)
//! layer 0:  Wx_0 [D, G]   Wh_0 [H, G]   b_0 [G]
//! layer 1:  Wx_1 [H, G]   Wh_1 [H, G]   b_1 [G]
//! ...
//! output:   W_out [H, V]  b_out [V]
//! ```

use crate::layers::embedding::Embedding;
use crate::layers::linear::Linear;
use crate::layers::recurrent::RecurrentParams;
use crate::tensor::{Scalar, Tensor};
use std::fmt;
use std::str::FromStr;

/// Role of a tensor within one recurrent layer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LayerRole {
    Wx,
    Wh,
    B,
}

/// Role of a tensor within the output projection
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OutputRole {
    W,
    B,
}

/// Identifies one trainable tensor
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParamId {
    Embed,
    Layer { index: usize, role: LayerRole },
    Output(OutputRole),
}

impl ParamId {
    /// Weight matrices take part in L2 regularization; biases do not
    pub fn is_weight(self) -> bool {
        matches!(
            self,
            ParamId::Layer {
                role: LayerRole::Wx | LayerRole::Wh,
                ..
            } | ParamId::Output(OutputRole::W)
                | ParamId::Embed
        )
    }
}

impl fmt::Display for ParamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamId::Embed => write!(f, "W_embed"),
            ParamId::Layer { index, role } => {
                let prefix = match role {
                    LayerRole::Wx => "Wx",
                    LayerRole::Wh => "Wh",
                    LayerRole::B => "b",
                };
                write!(f, "{}_{}", prefix, index)
            }
            ParamId::Output(OutputRole::W) => write!(f, "W_out"),
            ParamId::Output(OutputRole::B) => write!(f, "b_out"),
        }
    }
}

impl FromStr for ParamId {
    type Err = crate::RnnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "W_out" => return Ok(ParamId::Output(OutputRole::W)),
            "b_out" => return Ok(ParamId::Output(OutputRole::B)),
            "W_embed" => return Ok(ParamId::Embed),
            _ => {}
        }
        let unknown = || crate::RnnError::InvalidConfiguration(format!("unknown parameter '{}'", s));

        let (prefix, index) = s.rsplit_once('_').ok_or_else(unknown)?;
        let index: usize = index.parse().map_err(|_| unknown())?;
        let role = match prefix {
            "Wx" => LayerRole::Wx,
            "Wh" => LayerRole::Wh,
            "b" => LayerRole::B,
            _ => return Err(unknown()),
        };
        Ok(ParamId::Layer { index, role })
    }
}

/// All trainable tensors of a network, or gradients with the same layout
#[derive(Clone, Debug, PartialEq)]
pub struct ParamSet<F> {
    /// Input embedding `W_embed`, absent for one-hot or dense input
    pub embedding: Option<Embedding<F>>,
    /// Recurrent layers, bottom first
    pub layers: Vec<RecurrentParams<F>>,
    /// Output projection `W_out`, `b_out`
    pub output: Linear<F>,
}

impl<F: Scalar> ParamSet<F> {
    /// Every id in a stable order: embedding, layer by layer, then the
    /// output projection
    pub fn ids(&self) -> Vec<ParamId> {
        let mut ids = Vec::with_capacity(self.layers.len() * 3 + 3);
        if self.embedding.is_some() {
            ids.push(ParamId::Embed);
        }
        for index in 0..self.layers.len() {
            for role in [LayerRole::Wx, LayerRole::Wh, LayerRole::B] {
                ids.push(ParamId::Layer { index, role });
            }
        }
        ids.push(ParamId::Output(OutputRole::W));
        ids.push(ParamId::Output(OutputRole::B));
        ids
    }

    pub fn get(&self, id: ParamId) -> Option<&Tensor<F>> {
        match id {
            ParamId::Embed => self.embedding.as_ref().map(|e| &e.weight),
            ParamId::Layer { index, role } => {
                let layer = self.layers.get(index)?;
                Some(match role {
                    LayerRole::Wx => &layer.wx,
                    LayerRole::Wh => &layer.wh,
                    LayerRole::B => &layer.b,
                })
            }
            ParamId::Output(OutputRole::W) => Some(&self.output.weight),
            ParamId::Output(OutputRole::B) => Some(&self.output.bias),
        }
    }

    pub fn get_mut(&mut self, id: ParamId) -> Option<&mut Tensor<F>> {
        match id {
            ParamId::Embed => self.embedding.as_mut().map(|e| &mut e.weight),
            ParamId::Layer { index, role } => {
                let layer = self.layers.get_mut(index)?;
                Some(match role {
                    LayerRole::Wx => &mut layer.wx,
                    LayerRole::Wh => &mut layer.wh,
                    LayerRole::B => &mut layer.b,
                })
            }
            ParamId::Output(OutputRole::W) => Some(&mut self.output.weight),
            ParamId::Output(OutputRole::B) => Some(&mut self.output.bias),
        }
    }

    /// Lookup by display name, e.g. `"Wh_0"`
    pub fn by_name(&self, name: &str) -> Option<&Tensor<F>> {
        name.parse().ok().and_then(|id| self.get(id))
    }

    /// `(id, tensor)` pairs in [`ids`](Self::ids) order
    pub fn tensors(&self) -> Vec<(ParamId, &Tensor<F>)> {
        let mut out = Vec::with_capacity(self.layers.len() * 3 + 3);
        if let Some(embedding) = &self.embedding {
            out.push((ParamId::Embed, &embedding.weight));
        }
        for (index, layer) in self.layers.iter().enumerate() {
            out.push((ParamId::Layer { index, role: LayerRole::Wx }, &layer.wx));
            out.push((ParamId::Layer { index, role: LayerRole::Wh }, &layer.wh));
            out.push((ParamId::Layer { index, role: LayerRole::B }, &layer.b));
        }
        out.push((ParamId::Output(OutputRole::W), &self.output.weight));
        out.push((ParamId::Output(OutputRole::B), &self.output.bias));
        out
    }

    /// Mutable `(id, tensor)` pairs in [`ids`](Self::ids) order
    pub fn tensors_mut(&mut self) -> Vec<(ParamId, &mut Tensor<F>)> {
        let mut out = Vec::with_capacity(self.layers.len() * 3 + 3);
        if let Some(embedding) = &mut self.embedding {
            out.push((ParamId::Embed, &mut embedding.weight));
        }
        for (index, layer) in self.layers.iter_mut().enumerate() {
            out.push((ParamId::Layer { index, role: LayerRole::Wx }, &mut layer.wx));
            out.push((ParamId::Layer { index, role: LayerRole::Wh }, &mut layer.wh));
            out.push((ParamId::Layer { index, role: LayerRole::B }, &mut layer.b));
        }
        out.push((ParamId::Output(OutputRole::W), &mut self.output.weight));
        out.push((ParamId::Output(OutputRole::B), &mut self.output.bias));
        out
    }

    /// Same layout with every element zero
    pub fn zeros_like(&self) -> Self {
        Self {
            embedding: self.embedding.as_ref().map(|e| Embedding {
                weight: Tensor::zeros(e.weight.shape.clone()),
            }),
            layers: self.layers.iter().map(RecurrentParams::zeros_like).collect(),
            output: Linear {
                weight: Tensor::zeros(self.output.weight.shape.clone()),
                bias: Tensor::zeros(self.output.bias.shape.clone()),
            },
        }
    }

    /// Total number of scalar parameters
    pub fn num_elements(&self) -> usize {
        self.tensors().iter().map(|(_, t)| t.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::cell::CellKind;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn params() -> ParamSet<f64> {
        let mut rng = StdRng::seed_from_u64(0);
        ParamSet {
            embedding: None,
            layers: vec![
                RecurrentParams::new(CellKind::Vanilla, 5, 3, None, None, &mut rng),
                RecurrentParams::new(CellKind::Vanilla, 3, 3, None, None, &mut rng),
            ],
            output: Linear::new(3, 5, None, &mut rng),
        }
    }

    #[test]
    fn test_names_roundtrip() {
        let p = params();
        let names: Vec<String> = p.ids().iter().map(|id| id.to_string()).collect();
        assert_eq!(
            names,
            vec!["Wx_0", "Wh_0", "b_0", "Wx_1", "Wh_1", "b_1", "W_out", "b_out"]
        );
        for id in p.ids() {
            assert_eq!(id.to_string().parse::<ParamId>().unwrap(), id);
        }
        assert!("Wq_0".parse::<ParamId>().is_err());
    }

    #[test]
    fn test_lookup() {
        let p = params();
        assert_eq!(p.by_name("Wx_0").unwrap().shape, vec![5, 3]);
        assert_eq!(p.by_name("b_out").unwrap().shape, vec![5]);
        assert!(p.by_name("Wx_7").is_none());
        assert_eq!(p.num_elements(), 15 + 9 + 3 + 9 + 9 + 3 + 15 + 5);
    }

    #[test]
    fn test_weights_vs_biases() {
        let weights: Vec<String> = params()
            .ids()
            .into_iter()
            .filter(|id| id.is_weight())
            .map(|id| id.to_string())
            .collect();
        assert_eq!(weights, vec!["Wx_0", "Wh_0", "Wx_1", "Wh_1", "W_out"]);
    }

    #[test]
    fn test_embedding_comes_first() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut p = params();
        p.embedding = Some(Embedding::new(7, 5, None, &mut rng));

        let ids = p.ids();
        assert_eq!(ids[0], ParamId::Embed);
        assert_eq!(ids.len(), 9);
        assert!(ParamId::Embed.is_weight());
        assert_eq!("W_embed".parse::<ParamId>().unwrap(), ParamId::Embed);
        assert_eq!(p.by_name("W_embed").unwrap().shape, vec![7, 5]);

        let zeros = p.zeros_like();
        assert_eq!(zeros.ids(), ids);
        assert!(zeros.get(ParamId::Embed).unwrap().data.iter().all(|&v| v == 0.0));
        assert!(params().get(ParamId::Embed).is_none());
    }
}
