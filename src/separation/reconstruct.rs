use crate::spectrum::polar;
use ndarray::{Array1, Array3, ArrayView2, ArrayView3, ArrayView4, Axis, Zip};
use num_complex::Complex32;

/// Added to both powers in [`batch_snr`] so a perfect estimate stays finite.
pub const SNR_EPS: f64 = 1e-8;

/// Per-source complex spectrograms from log-magnitudes `(N, T, F)` and the
/// mixture phase `(T, F)`: `expm1(log_mag) * exp(i * phase)`.
pub fn reconstruct(
    log_magnitude: ArrayView3<'_, f32>,
    mixture_phase: ArrayView2<'_, f32>,
) -> crate::Result<Array3<Complex32>> {
    let (n, t, f) = log_magnitude.dim();
    if mixture_phase.dim() != (t, f) {
        return Err(crate::Error::shape(
            format!("phase ({t}, {f})"),
            mixture_phase.dim(),
        ));
    }
    let mut out = Array3::<Complex32>::zeros((n, t, f));
    for (mut slot, log_mag) in out.outer_iter_mut().zip(log_magnitude.outer_iter()) {
        let magnitude = log_mag.mapv(f32::exp_m1);
        slot.assign(&polar(magnitude.view(), mixture_phase));
    }
    Ok(out)
}

/// Signal-to-noise ratio in dB of every example of a `[B, N, T, F]` batch:
/// `10 log10((P_true + eps) / (P_err + eps))` with powers summed over all
/// sources and cells of the example.
///
/// An exact estimate gives a large finite value; an all-zero estimate
/// gives 0 dB.
pub fn batch_snr(
    truth: ArrayView4<'_, Complex32>,
    estimated: ArrayView4<'_, Complex32>,
) -> crate::Result<Array1<f32>> {
    if truth.dim() != estimated.dim() {
        return Err(crate::Error::shape(
            format!("estimated {:?}", truth.dim()),
            estimated.dim(),
        ));
    }
    let snr = truth
        .axis_iter(Axis(0))
        .zip(estimated.axis_iter(Axis(0)))
        .map(|(t, e)| {
            let mut signal = 0.0f64;
            let mut noise = 0.0f64;
            Zip::from(&t).and(&e).for_each(|&a, &b| {
                signal += a.norm_sqr() as f64;
                noise += (a - b).norm_sqr() as f64;
            });
            (10.0 * ((signal + SNR_EPS) / (noise + SNR_EPS)).log10()) as f32
        })
        .collect();
    Ok(snr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{Array2, Array4};

    #[test]
    fn zero_log_magnitude_is_silence() {
        let log_mag = Array3::<f32>::zeros((2, 3, 4));
        let phase = Array2::<f32>::ones((3, 4));
        let out = reconstruct(log_mag.view(), phase.view()).unwrap();
        assert!(out.iter().all(|c| c.norm() == 0.0));
    }

    #[test]
    fn inverts_log1p_and_keeps_phase() {
        let log_mag = Array3::from_elem((1, 1, 1), 2.0f32.ln_1p());
        let phase = Array2::from_elem((1, 1), std::f32::consts::FRAC_PI_2);
        let out = reconstruct(log_mag.view(), phase.view()).unwrap();
        assert_relative_eq!(out[(0, 0, 0)].re, 0.0, epsilon = 1e-5);
        assert_relative_eq!(out[(0, 0, 0)].im, 2.0, epsilon = 1e-5);
    }

    #[test]
    fn snr_extremes() {
        let truth = Array4::from_elem((2, 2, 3, 3), Complex32::new(1.0, -1.0));
        let perfect = batch_snr(truth.view(), truth.view()).unwrap();
        assert!(perfect.iter().all(|&s| s > 80.0 && s.is_finite()));

        let silent = Array4::<Complex32>::zeros(truth.raw_dim());
        let zero = batch_snr(truth.view(), silent.view()).unwrap();
        assert!(zero.iter().all(|&s| s.abs() < 1e-3));

        let half = truth.mapv(|c| c * 0.5);
        let partial = batch_snr(truth.view(), half.view()).unwrap();
        assert_relative_eq!(partial[0], 6.0206, epsilon = 1e-3);
    }

    #[test]
    fn snr_rejects_shape_mismatch() {
        let a = Array4::<Complex32>::zeros((1, 2, 3, 3));
        let b = Array4::<Complex32>::zeros((1, 3, 3, 3));
        assert!(batch_snr(a.view(), b.view()).is_err());
    }
}
