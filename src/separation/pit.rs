//! Permutation-invariant MSE between ground-truth and estimated sources.

use candle_core::Tensor;
use ndarray::{Array, ArrayView, Axis, RemoveAxis};

/// Assignment of estimated slots to ground-truth sources.
///
/// `self[gt]` is the estimated slot matched with ground-truth source `gt`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Permutation(Vec<usize>);

impl Permutation {
    pub fn identity(n: usize) -> Self {
        Permutation((0..n).collect())
    }

    /// Wrap a slot list, checking it is a bijection on `0..len`.
    pub fn new(slots: Vec<usize>) -> crate::Result<Self> {
        let mut seen = vec![false; slots.len()];
        for &s in &slots {
            if s >= slots.len() || seen[s] {
                return Err(crate::Error::InvalidParameter {
                    name: "permutation",
                    value: format!("{slots:?}"),
                    reason: "not a bijection".to_string(),
                });
            }
            seen[s] = true;
        }
        Ok(Permutation(slots))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    /// Reorder estimated sources along axis 0 so that row `i` lines up
    /// with ground-truth source `i`.
    pub fn apply<A: Clone, D: RemoveAxis>(&self, estimated: ArrayView<'_, A, D>) -> Array<A, D> {
        estimated.select(Axis(0), &self.0)
    }
}

impl std::ops::Index<usize> for Permutation {
    type Output = usize;

    fn index(&self, gt: usize) -> &usize {
        &self.0[gt]
    }
}

/// Every permutation of `0..n` in lexicographic order.
pub fn permutations(n: usize) -> Vec<Vec<usize>> {
    let mut current: Vec<usize> = (0..n).collect();
    let mut out = vec![current.clone()];
    loop {
        // next lexicographic permutation
        let Some(i) = (1..n).rev().find(|&i| current[i - 1] < current[i]) else {
            return out;
        };
        let pivot = i - 1;
        let Some(j) = (i..n).rev().find(|&j| current[j] > current[pivot]) else {
            return out;
        };
        current.swap(pivot, j);
        current[i..].reverse();
        out.push(current.clone());
    }
}

/// Batch loss and the permutation that produced it for each example.
#[derive(Debug, Clone)]
pub struct PitScore {
    /// Scalar: mean over examples of the minimal summed per-source MSE.
    pub loss: Tensor,
    pub permutations: Vec<Permutation>,
    /// Minimal summed MSE per example.
    pub example_losses: Vec<f32>,
}

/// Pairwise per-source MSE `[B, N, N]`: entry `(b, i, j)` compares
/// ground-truth source `i` with estimated slot `j`.
pub fn pairwise_mse(truth: &Tensor, estimated: &Tensor) -> crate::Result<Tensor> {
    let dims = truth.dims4()?;
    if estimated.dims4()? != dims {
        return Err(crate::Error::shape(
            format!("estimated {:?}", truth.dims()),
            estimated.dims(),
        ));
    }
    let diff = truth.unsqueeze(2)?.broadcast_sub(&estimated.unsqueeze(1)?)?;
    Ok(diff.sqr()?.flatten_from(3)?.mean(3)?)
}

/// Cheapest permutation for one example's `N x N` cost matrix.
///
/// Candidates are visited in lexicographic order and only a strictly
/// smaller cost replaces the incumbent, so ties keep the earliest.
fn best_permutation(costs: &[Vec<f32>], candidates: &[Vec<usize>]) -> (usize, f32) {
    let mut best = (0, f32::INFINITY);
    for (k, perm) in candidates.iter().enumerate() {
        let cost: f32 = perm.iter().enumerate().map(|(gt, &est)| costs[gt][est]).sum();
        if cost < best.1 {
            best = (k, cost);
        }
    }
    best
}

/// Permutation-invariant MSE over `[B, N, T, F]` log-magnitudes.
///
/// The loss stays differentiable with respect to `estimated`: it is built
/// by selecting the winning pairwise terms out of the pairwise tensor.
pub fn pit_mse_loss(truth: &Tensor, estimated: &Tensor) -> crate::Result<PitScore> {
    let pairwise = pairwise_mse(truth, estimated)?;
    let (b, n, _) = pairwise.dims3()?;
    if b == 0 {
        return Err(crate::Error::InvalidSize {
            name: "batch",
            value: 0,
            reason: "must be > 0",
        });
    }
    let costs = pairwise.to_vec3::<f32>()?;
    let candidates = permutations(n);

    let winners: Vec<(usize, f32)> = {
        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            costs
                .par_iter()
                .map(|c| best_permutation(c, &candidates))
                .collect()
        }
        #[cfg(not(feature = "parallel"))]
        {
            costs
                .iter()
                .map(|c| best_permutation(c, &candidates))
                .collect()
        }
    };

    let mut picks = Vec::with_capacity(b * n);
    for (bi, &(k, _)) in winners.iter().enumerate() {
        for (gt, &est) in candidates[k].iter().enumerate() {
            picks.push((bi * n * n + gt * n + est) as u32);
        }
    }
    let picks = Tensor::from_vec(picks, b * n, pairwise.device())?;
    let loss = pairwise
        .flatten_all()?
        .index_select(&picks, 0)?
        .sum_all()?
        .affine(1.0 / b as f64, 0.0)?;

    Ok(PitScore {
        loss,
        permutations: winners
            .iter()
            .map(|&(k, _)| Permutation(candidates[k].clone()))
            .collect(),
        example_losses: winners.iter().map(|&(_, c)| c).collect(),
    })
}
