use crate::nn::ParamRegistry;
use candle_core::{D, Tensor};
use candle_nn::{Init, ops};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Which attractor strategy a model uses for a given pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EstimatorKind {
    /// Centroids of cells grouped by their dominant ground-truth source.
    #[serde(alias = "truth")]
    Oracle,
    /// Learned anchors; needs no ground truth.
    #[default]
    Anchor,
}

impl FromStr for EstimatorKind {
    type Err = crate::Error;

    fn from_str(name: &str) -> crate::Result<Self> {
        match name.to_lowercase().as_str() {
            "oracle" | "truth" => Ok(EstimatorKind::Oracle),
            "anchor" => Ok(EstimatorKind::Anchor),
            _ => Err(crate::Error::UnknownVariant {
                kind: "attractor estimator",
                name: name.to_string(),
                expected: "oracle (truth), anchor",
            }),
        }
    }
}

/// One attractor per source slot, chosen once when the model is built.
pub enum AttractorEstimator {
    Oracle(OracleEstimator),
    Anchor(AnchorEstimator),
}

impl AttractorEstimator {
    /// Build the estimator for `kind`. Learned variants register their
    /// parameters under `block`.
    pub fn build(
        kind: EstimatorKind,
        registry: &mut ParamRegistry,
        block: &str,
        n_signal: usize,
        embed_size: usize,
    ) -> crate::Result<Self> {
        Ok(match kind {
            EstimatorKind::Oracle => AttractorEstimator::Oracle(OracleEstimator::new(n_signal)),
            EstimatorKind::Anchor => AttractorEstimator::Anchor(AnchorEstimator::new(
                registry, block, n_signal, embed_size,
            )?),
        })
    }

    pub fn kind(&self) -> EstimatorKind {
        match self {
            AttractorEstimator::Oracle(_) => EstimatorKind::Oracle,
            AttractorEstimator::Anchor(_) => EstimatorKind::Anchor,
        }
    }

    /// Attractors `[B, N, E]` for embeddings `[B, T, F, E]`.
    ///
    /// # Errors
    /// `Error::OracleNeedsTruth` when the oracle runs without `truth`.
    pub fn estimate(&self, embeddings: &Tensor, truth: Option<&Tensor>) -> crate::Result<Tensor> {
        match self {
            AttractorEstimator::Oracle(o) => {
                o.estimate(embeddings, truth.ok_or(crate::Error::OracleNeedsTruth)?)
            }
            AttractorEstimator::Anchor(a) => a.estimate(embeddings),
        }
    }
}

fn flatten_embeddings(embeddings: &Tensor) -> crate::Result<(Tensor, (usize, usize, usize, usize))> {
    let dims = embeddings.dims4()?;
    let (b, t, f, e) = dims;
    Ok((embeddings.reshape((b, t * f, e))?, dims))
}

#[derive(Debug, Clone, Copy)]
pub struct OracleEstimator {
    n_signal: usize,
}

impl OracleEstimator {
    pub fn new(n_signal: usize) -> Self {
        Self { n_signal }
    }

    /// Mean embedding of the cells each source dominates.
    ///
    /// `truth` is the per-source log-magnitude `[B, N, T, F]`. A slot that
    /// dominates no cell gets the zero vector.
    pub fn estimate(&self, embeddings: &Tensor, truth: &Tensor) -> crate::Result<Tensor> {
        let (flat, (b, t, f, _)) = flatten_embeddings(embeddings)?;
        let truth_dims = truth.dims4()?;
        if truth_dims != (b, self.n_signal, t, f) {
            return Err(crate::Error::shape(
                format!("truth [{b}, {}, {t}, {f}]", self.n_signal),
                truth.dims(),
            ));
        }
        let (assign, counts) = dominance(truth)?;
        let sums = assign.matmul(&flat)?;
        let counts = counts.clamp(1f32, f32::MAX)?;
        Ok(sums.broadcast_div(&counts)?)
    }
}

/// One-hot assignment `[B, N, T*F]` of every cell to the source with the
/// largest log-magnitude there, and the per-slot cell counts `[B, N, 1]`.
///
/// Ties go to the lowest slot index.
pub fn dominance(truth: &Tensor) -> crate::Result<(Tensor, Tensor)> {
    let (b, n, t, f) = truth.dims4()?;
    let cells = t * f;
    let values = truth.flatten_all()?.to_vec1::<f32>()?;
    let mut assign = vec![0.0f32; b * n * cells];
    let mut counts = vec![0.0f32; b * n];
    for bi in 0..b {
        let base = bi * n * cells;
        for cell in 0..cells {
            let mut best = 0;
            for ni in 1..n {
                if values[base + ni * cells + cell] > values[base + best * cells + cell] {
                    best = ni;
                }
            }
            assign[base + best * cells + cell] = 1.0;
            counts[bi * n + best] += 1.0;
        }
    }
    let device = truth.device();
    Ok((
        Tensor::from_vec(assign, (b, n, cells), device)?,
        Tensor::from_vec(counts, (b, n, 1), device)?,
    ))
}

/// Learned anchors: every cell is softly assigned to the anchors by a
/// softmax over embedding-anchor affinity, and each attractor is the
/// assignment-weighted mean of the embeddings.
pub struct AnchorEstimator {
    anchors: Tensor,
}

impl AnchorEstimator {
    pub fn new(
        registry: &mut ParamRegistry,
        block: &str,
        n_signal: usize,
        embed_size: usize,
    ) -> crate::Result<Self> {
        let vb = registry.scope(block)?;
        let anchors = vb.get_with_hints(
            (n_signal, embed_size),
            "anchors",
            Init::Randn {
                mean: 0.0,
                stdev: 1.0,
            },
        )?;
        Ok(Self { anchors })
    }

    pub fn estimate(&self, embeddings: &Tensor) -> crate::Result<Tensor> {
        let (flat, (_, _, _, e)) = flatten_embeddings(embeddings)?;
        let (_, anchor_dim) = self.anchors.dims2()?;
        if anchor_dim != e {
            return Err(crate::Error::shape(format!("embed size {anchor_dim}"), e));
        }
        let logits = flat.broadcast_matmul(&self.anchors.t()?.contiguous()?)?;
        let weights = ops::softmax(&logits, D::Minus1)?.transpose(1, 2)?.contiguous()?;
        let sums = weights.matmul(&flat)?;
        let mass = weights.sum_keepdim(2)?.affine(1.0, 1e-8)?;
        Ok(sums.broadcast_div(&mass)?)
    }
}
