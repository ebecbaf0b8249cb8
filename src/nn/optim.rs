//! Gradient-based parameter updates.

use candle_core::backprop::GradStore;
use candle_core::{Tensor, Var};
use candle_nn::Optimizer as _;
use candle_nn::{AdamW, ParamsAdamW, SGD};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerKind {
    Sgd,
    #[default]
    Adam,
}

impl FromStr for OptimizerKind {
    type Err = crate::Error;

    fn from_str(name: &str) -> crate::Result<Self> {
        match name.to_lowercase().as_str() {
            "sgd" => Ok(OptimizerKind::Sgd),
            "adam" | "adamw" => Ok(OptimizerKind::Adam),
            _ => Err(crate::Error::UnknownVariant {
                kind: "optimizer",
                name: name.to_string(),
                expected: "sgd, adam",
            }),
        }
    }
}

/// Consumes a scalar loss, back-propagates it and updates every variable.
pub enum Optimizer {
    Sgd(SGD),
    Adam(AdamW),
}

impl Optimizer {
    pub fn new(
        kind: OptimizerKind,
        vars: Vec<Var>,
        learning_rate: f64,
        weight_decay: f64,
    ) -> crate::Result<Self> {
        Ok(match kind {
            OptimizerKind::Sgd => Optimizer::Sgd(SGD::new(vars, learning_rate)?),
            OptimizerKind::Adam => Optimizer::Adam(AdamW::new(
                vars,
                ParamsAdamW {
                    lr: learning_rate,
                    weight_decay,
                    ..Default::default()
                },
            )?),
        })
    }

    pub fn learning_rate(&self) -> f64 {
        match self {
            Optimizer::Sgd(o) => o.learning_rate(),
            Optimizer::Adam(o) => o.learning_rate(),
        }
    }

    pub fn set_learning_rate(&mut self, lr: f64) {
        match self {
            Optimizer::Sgd(o) => o.set_learning_rate(lr),
            Optimizer::Adam(o) => o.set_learning_rate(lr),
        }
    }

    /// Back-propagate `loss`, clip the gradients of `vars` to `±clip` and
    /// apply one update.
    pub fn backward_step(
        &mut self,
        loss: &Tensor,
        vars: &[Var],
        clip: Option<f64>,
    ) -> crate::Result<()> {
        let mut grads = loss.backward()?;
        if let Some(threshold) = clip {
            clip_gradients(&mut grads, vars, threshold)?;
        }
        match self {
            Optimizer::Sgd(o) => o.step(&grads)?,
            Optimizer::Adam(o) => o.step(&grads)?,
        }
        Ok(())
    }
}

/// Clamp every gradient element of `vars` into `[-threshold, threshold]`.
pub fn clip_gradients(grads: &mut GradStore, vars: &[Var], threshold: f64) -> crate::Result<()> {
    for var in vars {
        let clipped = match grads.get(var.as_tensor()) {
            Some(g) => g.clamp(-threshold, threshold)?,
            None => continue,
        };
        grads.insert(var.as_tensor(), clipped);
    }
    Ok(())
}
