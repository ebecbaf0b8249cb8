use candle_core::Tensor;
use candle_nn::ops;

/// Soft masks and the masked mixture, both `[B, N, T, F]`.
#[derive(Debug, Clone)]
pub struct Separation {
    /// `sigmoid(embedding · attractor)`, strictly inside `(0, 1)`.
    pub masks: Tensor,
    /// Masks applied to the mixture log-magnitude.
    pub separated: Tensor,
}

/// Separate the mixture log-magnitude `[B, T, F]` with attractors
/// `[B, N, E]` and embeddings `[B, T, F, E]`.
pub fn separate(
    embeddings: &Tensor,
    attractors: &Tensor,
    log_mixture: &Tensor,
) -> crate::Result<Separation> {
    let (b, t, f, e) = embeddings.dims4()?;
    let (ab, n, ae) = attractors.dims3()?;
    if ab != b || ae != e {
        return Err(crate::Error::shape(
            format!("attractors [{b}, N, {e}]"),
            attractors.dims(),
        ));
    }
    if log_mixture.dims3()? != (b, t, f) {
        return Err(crate::Error::shape(
            format!("mixture [{b}, {t}, {f}]"),
            log_mixture.dims(),
        ));
    }

    let flat = embeddings.reshape((b, t * f, e))?;
    let logits = flat.matmul(&attractors.transpose(1, 2)?.contiguous()?)?;
    let masks = ops::sigmoid(&logits)?
        .transpose(1, 2)?
        .contiguous()?
        .reshape((b, n, t, f))?;
    let separated = masks.broadcast_mul(&log_mixture.unsqueeze(1)?)?;
    Ok(Separation { masks, separated })
}
