//! The assembled separation network.
//!
//! [`Model::build`] resolves every parameter block once; after that the
//! model is a fixed pipeline
//! `encoder -> attractor estimator -> masks -> PIT -> reconstruction`
//! driven by the caller, who also owns the recurrent state.

use crate::config::HParams;
use crate::dataset::Batch;
use crate::metrics::StepMetrics;
use crate::nn::{EmbeddingNetwork, ParamRegistry, RecurrentState, encoder};
use crate::separation::{
    AttractorEstimator, Permutation, batch_snr, mask, pit_mse_loss, reconstruct,
};
use crate::spectrum;
use crate::utils::{array4_from_tensor, to_tensor};
use candle_core::{Device, Tensor};
use ndarray::{Array2, Array3, Array4, Axis};
use num_complex::Complex32;

/// Which attractor estimator drives a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// The estimator whose loss is optimised.
    Train,
    /// The estimator used for validation, test and separation.
    Infer,
}

/// Network inputs derived from complex spectrograms.
#[derive(Debug, Clone)]
pub struct Features {
    /// `[B, T, F]`
    pub log_mixture: Tensor,
    /// `[B, T, F]`
    pub mixture_phase: Array3<f32>,
    /// `[B, N, T, F]`, absent at inference.
    pub log_sources: Option<Tensor>,
}

impl Features {
    pub fn from_batch(batch: &Batch, device: &Device) -> crate::Result<Self> {
        let mixture = batch.mixture();
        Ok(Self {
            log_mixture: to_tensor(&spectrum::log_magnitude(&mixture), device)?,
            mixture_phase: spectrum::phase(&mixture),
            log_sources: Some(to_tensor(&spectrum::log_magnitude(&batch.sources), device)?),
        })
    }

    /// Features of a single mixture `(T, F)`, as a batch of one.
    pub fn from_mixture(mixture: &Array2<Complex32>, device: &Device) -> crate::Result<Self> {
        let mixture = mixture.clone().insert_axis(Axis(0));
        Ok(Self {
            log_mixture: to_tensor(&spectrum::log_magnitude(&mixture), device)?,
            mixture_phase: spectrum::phase(&mixture),
            log_sources: None,
        })
    }
}

/// Result of scoring one batch against its ground truth.
#[derive(Debug, Clone)]
pub struct Scored {
    /// Scalar PIT loss, still attached to the parameters.
    pub loss: Tensor,
    pub permutations: Vec<Permutation>,
    /// Separated log-magnitudes `[B, N, T, F]`, reordered by `permutations`
    /// to line up with the ground truth.
    pub separated_log: Array4<f32>,
    /// SNR per example in dB.
    pub snr: Vec<f32>,
}

impl Scored {
    pub fn metrics(&self) -> crate::Result<StepMetrics> {
        let snr = if self.snr.is_empty() {
            f32::NAN
        } else {
            self.snr.iter().sum::<f32>() / self.snr.len() as f32
        };
        Ok(StepMetrics {
            loss: self.loss.to_scalar::<f32>()?,
            snr,
        })
    }
}

pub struct Model {
    name: String,
    hparams: HParams,
    registry: ParamRegistry,
    encoder: Box<dyn EmbeddingNetwork>,
    train_estimator: AttractorEstimator,
    /// `None` when inference shares the training estimator.
    infer_estimator: Option<AttractorEstimator>,
}

impl Model {
    pub fn build(name: &str, hparams: &HParams, device: Device) -> crate::Result<Self> {
        hparams.validate()?;
        let mut registry = ParamRegistry::new(device);
        let encoder = encoder::build(
            hparams.encoder,
            &mut registry,
            hparams.feature_size(),
            hparams.embed_size,
            hparams.hidden_size,
            hparams.dropout_keep_prob,
        )?;
        let train_estimator = AttractorEstimator::build(
            hparams.train_estimator,
            &mut registry,
            "train_estimator",
            hparams.max_n_signal,
            hparams.embed_size,
        )?;
        let infer_estimator = if hparams.same_estimator() {
            None
        } else {
            Some(AttractorEstimator::build(
                hparams.infer_estimator,
                &mut registry,
                "infer_estimator",
                hparams.max_n_signal,
                hparams.embed_size,
            )?)
        };
        log::info!(
            "built model {name}: {} parameters in blocks {:?}",
            registry.parameter_count(),
            registry.block_names()
        );
        Ok(Self {
            name: name.to_string(),
            hparams: hparams.clone(),
            registry,
            encoder,
            train_estimator,
            infer_estimator,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hparams(&self) -> &HParams {
        &self.hparams
    }

    pub fn registry(&self) -> &ParamRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ParamRegistry {
        &mut self.registry
    }

    pub fn device(&self) -> &Device {
        self.registry.device()
    }

    pub fn estimator(&self, strategy: Strategy) -> &AttractorEstimator {
        match (strategy, &self.infer_estimator) {
            (Strategy::Infer, Some(infer)) => infer,
            _ => &self.train_estimator,
        }
    }

    /// Separated log-magnitudes `[B, N, T, F]` of `features`.
    fn forward(
        &self,
        features: &Features,
        strategy: Strategy,
        state: &mut RecurrentState,
        train: bool,
    ) -> crate::Result<Tensor> {
        let embeddings = self.encoder.embed(&features.log_mixture, state, train)?;
        let attractors = self
            .estimator(strategy)
            .estimate(&embeddings, features.log_sources.as_ref())?;
        Ok(mask::separate(&embeddings, &attractors, &features.log_mixture)?.separated)
    }

    /// Run the full pipeline on a batch with ground truth.
    ///
    /// The permutation that minimises the loss of each example is also the
    /// one used to reorder its separated sources before reconstruction, so
    /// the SNR always scores the same assignment as the loss.
    pub fn score(
        &self,
        batch: &Batch,
        strategy: Strategy,
        state: &mut RecurrentState,
        train: bool,
    ) -> crate::Result<Scored> {
        if batch.n_signal() != self.hparams.max_n_signal {
            return Err(crate::Error::shape(
                format!("{} sources per example", self.hparams.max_n_signal),
                batch.sources.dim(),
            ));
        }
        let features = Features::from_batch(batch, self.device())?;
        let separated = self.forward(&features, strategy, state, train)?;
        let Some(log_sources) = features.log_sources.as_ref() else {
            return Err(crate::Error::OracleNeedsTruth);
        };
        let pit = pit_mse_loss(log_sources, &separated)?;

        let raw = array4_from_tensor(&separated)?;
        let mut separated_log = Array4::<f32>::zeros(raw.raw_dim());
        let mut estimated = Array4::<Complex32>::zeros(raw.raw_dim());
        for (b, perm) in pit.permutations.iter().enumerate() {
            let aligned = perm.apply(raw.index_axis(Axis(0), b));
            let complex = reconstruct(aligned.view(), features.mixture_phase.index_axis(Axis(0), b))?;
            separated_log.index_axis_mut(Axis(0), b).assign(&aligned);
            estimated.index_axis_mut(Axis(0), b).assign(&complex);
        }
        let snr = batch_snr(batch.sources.view(), estimated.view())?;

        Ok(Scored {
            loss: pit.loss,
            permutations: pit.permutations,
            separated_log,
            snr: snr.to_vec(),
        })
    }

    /// Separate a mixture spectrogram `(T, F)` into `(N, T, F)` complex
    /// source estimates, in slot order.
    ///
    /// # Errors
    /// `Error::OracleNeedsTruth` if inference is configured with the oracle
    /// estimator.
    pub fn separate(
        &self,
        mixture: &Array2<Complex32>,
        state: &mut RecurrentState,
    ) -> crate::Result<Array3<Complex32>> {
        let features = Features::from_mixture(mixture, self.device())?;
        let separated = self.forward(&features, Strategy::Infer, state, false)?;
        let separated = array4_from_tensor(&separated)?;
        reconstruct(
            separated.index_axis(Axis(0), 0),
            features.mixture_phase.index_axis(Axis(0), 0),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::EncoderKind;
    use crate::separation::EstimatorKind;

    fn small(train: EstimatorKind, infer: EstimatorKind) -> HParams {
        HParams {
            fft_size: 16,
            fft_stride: 4,
            embed_size: 4,
            batch_size: 2,
            encoder: EncoderKind::Toy,
            train_estimator: train,
            infer_estimator: infer,
            ..Default::default()
        }
    }

    fn batch(hp: &HParams) -> Batch {
        let f = hp.feature_size();
        let tracks: Vec<Array2<Complex32>> = (0..4)
            .map(|k| Array2::from_shape_fn((5, f), |(t, b)| Complex32::new((k + t + b) as f32 * 0.1, 0.2)))
            .collect();
        let refs: Vec<&Array2<Complex32>> = tracks.iter().collect();
        Batch::from_tracks(&refs, 2).unwrap()
    }

    #[test]
    fn shared_estimator_registers_one_block() {
        let hp = small(EstimatorKind::Anchor, EstimatorKind::Anchor);
        let model = Model::build("m", &hp, Device::Cpu).unwrap();
        assert_eq!(model.registry().block_names(), &["encoder", "train_estimator"]);
        let hp = small(EstimatorKind::Oracle, EstimatorKind::Anchor);
        let model = Model::build("m", &hp, Device::Cpu).unwrap();
        assert_eq!(model.registry().block_names(), &["encoder", "infer_estimator"]);
        assert_eq!(model.estimator(Strategy::Train).kind(), EstimatorKind::Oracle);
        assert_eq!(model.estimator(Strategy::Infer).kind(), EstimatorKind::Anchor);
    }

    #[test]
    fn score_shapes() {
        let hp = small(EstimatorKind::Oracle, EstimatorKind::Anchor);
        let model = Model::build("m", &hp, Device::Cpu).unwrap();
        let b = batch(&hp);
        let mut state = RecurrentState::new();
        let scored = model.score(&b, Strategy::Train, &mut state, false).unwrap();
        assert_eq!(scored.separated_log.dim(), (2, 2, 5, hp.feature_size()));
        assert_eq!(scored.permutations.len(), 2);
        assert_eq!(scored.snr.len(), 2);
        assert!(scored.metrics().unwrap().is_finite());
    }

    #[test]
    fn oracle_inference_is_rejected() {
        let hp = small(EstimatorKind::Oracle, EstimatorKind::Oracle);
        let model = Model::build("m", &hp, Device::Cpu).unwrap();
        let mix = Array2::<Complex32>::zeros((3, hp.feature_size()));
        let err = model.separate(&mix, &mut RecurrentState::new()).unwrap_err();
        assert!(matches!(err, crate::Error::OracleNeedsTruth));
    }

    #[test]
    fn separate_returns_one_spectrogram_per_slot() {
        let hp = small(EstimatorKind::Anchor, EstimatorKind::Anchor);
        let model = Model::build("m", &hp, Device::Cpu).unwrap();
        let mix = Array2::from_elem((3, hp.feature_size()), Complex32::new(0.5, 0.5));
        let out = model.separate(&mix, &mut RecurrentState::new()).unwrap();
        assert_eq!(out.dim(), (2, 3, hp.feature_size()));
    }

    #[test]
    fn wrong_source_count_fails_loudly() {
        let hp = small(EstimatorKind::Anchor, EstimatorKind::Anchor);
        let model = Model::build("m", &hp, Device::Cpu).unwrap();
        let f = hp.feature_size();
        let t = Array2::<Complex32>::zeros((2, f));
        let b = Batch::from_tracks(&[&t, &t, &t], 3).unwrap();
        assert!(model.score(&b, Strategy::Train, &mut RecurrentState::new(), false).is_err());
    }

    #[test]
    fn loss_permutation_is_the_one_applied_to_the_output() {
        let hp = HParams {
            max_n_signal: 3,
            ..small(EstimatorKind::Oracle, EstimatorKind::Anchor)
        };
        let model = Model::build("m", &hp, Device::Cpu).unwrap();
        let f = hp.feature_size();
        let tracks: Vec<Array2<Complex32>> = (0..6)
            .map(|k| {
                Array2::from_shape_fn((5, f), |(t, b)| {
                    let x = ((k * 7 + t * 3 + b * 5) % 11) as f32;
                    Complex32::new(x * 0.3 + k as f32, (b as f32 - x) * 0.1)
                })
            })
            .collect();
        let refs: Vec<&Array2<Complex32>> = tracks.iter().collect();
        let b = Batch::from_tracks(&refs, 3).unwrap();
        let features = Features::from_batch(&b, model.device()).unwrap();
        let truth = features.log_sources.as_ref().unwrap();

        for strategy in [Strategy::Train, Strategy::Infer] {
            let scored = model.score(&b, strategy, &mut RecurrentState::new(), false).unwrap();
            let aligned = to_tensor(&scored.separated_log, model.device()).unwrap();
            let again = pit_mse_loss(truth, &aligned).unwrap();
            for perm in &again.permutations {
                assert_eq!(perm.as_slice(), &[0, 1, 2], "{strategy:?}");
            }
            let loss = scored.loss.to_scalar::<f32>().unwrap();
            let realigned = again.loss.to_scalar::<f32>().unwrap();
            assert!((loss - realigned).abs() <= 1e-5 * loss.abs().max(1.0), "{strategy:?}");

            let mut estimated = Array4::<Complex32>::zeros(b.sources.raw_dim());
            for (i, mut out) in estimated.outer_iter_mut().enumerate() {
                let phase = features.mixture_phase.index_axis(Axis(0), i);
                out.assign(&reconstruct(scored.separated_log.index_axis(Axis(0), i), phase).unwrap());
            }
            let snr = batch_snr(b.sources.view(), estimated.view()).unwrap();
            assert_eq!(snr.to_vec(), scored.snr, "{strategy:?}");
        }
    }
}
