use num_complex::Complex32;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use std::sync::Arc;

/// Real-input FFT plan for forward and inverse transforms of one frame size.
///
/// Both directions are planned once and shared across frames. The forward
/// transform returns the `len / 2 + 1` non-redundant bins; the inverse takes
/// the same half spectrum back to `len` real samples.
///
/// # Example
/// ```
/// use danet::fft::RealFftPlan;
///
/// let plan = RealFftPlan::new(8);
/// let spectrum = plan.forward(&[1.0; 8]).unwrap();
/// assert_eq!(spectrum.len(), 5);
/// let frame = plan.inverse(&spectrum).unwrap();
/// assert!((frame[3] - 1.0).abs() < 1e-6);
/// ```
pub struct RealFftPlan {
    forward: Arc<dyn RealToComplex<f32>>,
    inverse: Arc<dyn ComplexToReal<f32>>,
    len: usize,
}

impl RealFftPlan {
    /// Create a new plan for frames of `len` samples.
    pub fn new(len: usize) -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        let forward = planner.plan_fft_forward(len);
        let inverse = planner.plan_fft_inverse(len);
        Self {
            forward,
            inverse,
            len,
        }
    }

    /// Frame length in samples.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of frequency bins produced by [`RealFftPlan::forward`].
    pub fn n_bins(&self) -> usize {
        self.len / 2 + 1
    }

    /// Forward transform of one real frame.
    ///
    /// # Errors
    /// Returns `Error::ShapeMismatch` if `frame` does not have the planned length.
    pub fn forward(&self, frame: &[f32]) -> crate::Result<Vec<Complex32>> {
        if frame.len() != self.len {
            return Err(crate::Error::shape(
                format!("frame of {} samples", self.len),
                frame.len(),
            ));
        }
        let mut in_buf = frame.to_vec();
        let mut out_buf = self.forward.make_output_vec();
        self.forward
            .process(&mut in_buf, &mut out_buf)
            .map_err(|e| crate::Error::Fft(e.to_string()))?;
        Ok(out_buf)
    }

    /// Inverse transform of one half spectrum, scaled by `1 / len`.
    ///
    /// The imaginary parts of the DC and Nyquist bins are discarded, since
    /// a real signal cannot carry them.
    pub fn inverse(&self, spectrum: &[Complex32]) -> crate::Result<Vec<f32>> {
        if spectrum.len() != self.n_bins() {
            return Err(crate::Error::shape(
                format!("spectrum of {} bins", self.n_bins()),
                spectrum.len(),
            ));
        }
        let mut in_buf = spectrum.to_vec();
        in_buf[0].im = 0.0;
        if self.len % 2 == 0
            && let Some(last) = in_buf.last_mut()
        {
            last.im = 0.0;
        }
        let mut out_buf = self.inverse.make_output_vec();
        self.inverse
            .process(&mut in_buf, &mut out_buf)
            .map_err(|e| crate::Error::Fft(e.to_string()))?;
        let scale = 1.0 / self.len as f32;
        for v in out_buf.iter_mut() {
            *v *= scale;
        }
        Ok(out_buf)
    }
}

#[cfg(feature = "parallel")]
const _: () = {
    fn _assert_send_sync<T: Send + Sync>() {}
    fn _check() {
        _assert_send_sync::<RealFftPlan>();
    }
};
