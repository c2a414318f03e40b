use bincode::{Decode, Encode};
use ndarray::{s, Array1, Array2, Array3, ArrayView2, ArrayView3, Axis};
use rand::Rng;

use crate::errors::{Result, SlimcutError};
use crate::layers::{relu, uniform};

/// Number of positions the window covers.
pub const KERNEL_WIDTH: usize = 5;

// Zero positions added on each side so that the output keeps the input length.
const PADDING: usize = KERNEL_WIDTH / 2;

/// Convolution over the time axis of `[batch, time, channels]` features, followed by ReLU.
#[derive(Clone, Debug, PartialEq, Encode, Decode)]
pub struct LocalContextConvolution {
    /// `[out_channels, in_channels, KERNEL_WIDTH]`
    #[bincode(with_serde)]
    weight: Array3<f32>,

    /// `[out_channels]`
    #[bincode(with_serde)]
    bias: Array1<f32>,
}

impl LocalContextConvolution {
    /// Creates a convolution with weights drawn from `U(-1/sqrt(in * 5), 1/sqrt(in * 5))`.
    pub fn new<R>(in_channels: usize, out_channels: usize, rng: &mut R) -> Self
    where
        R: Rng + ?Sized,
    {
        #[allow(clippy::cast_precision_loss)]
        let bound = ((in_channels * KERNEL_WIDTH) as f32).sqrt().recip();
        Self {
            weight: uniform((out_channels, in_channels, KERNEL_WIDTH), bound, rng),
            bias: uniform(out_channels, bound, rng),
        }
    }

    /// Creates a convolution from explicit parameters.
    ///
    /// # Errors
    ///
    /// [`SlimcutError::InvalidModel`] is returned when the kernel is not 5 wide or `bias` does
    /// not have one entry per output channel.
    pub fn from_parts(weight: Array3<f32>, bias: Array1<f32>) -> Result<Self> {
        let conv = Self { weight, bias };
        conv.validate()?;
        Ok(conv)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        let (out_channels, _, width) = self.weight.dim();
        if width != KERNEL_WIDTH {
            return Err(SlimcutError::invalid_model(format!(
                "convolution kernel is {width} wide, expected {KERNEL_WIDTH}",
            )));
        }
        if out_channels != self.bias.len() {
            return Err(SlimcutError::invalid_model(
                "convolution bias does not match its output channels",
            ));
        }
        Ok(())
    }

    pub fn in_channels(&self) -> usize {
        self.weight.len_of(Axis(1))
    }

    pub fn out_channels(&self) -> usize {
        self.weight.len_of(Axis(0))
    }

    pub(crate) fn n_params(&self) -> usize {
        self.weight.len() + self.bias.len()
    }

    /// Convolves and applies ReLU. The output has the same batch and time sizes as `x`.
    ///
    /// # Errors
    ///
    /// [`SlimcutError::Shape`] is returned when `x` does not have `in_channels` features.
    pub fn forward(&self, x: ArrayView3<f32>) -> Result<Array3<f32>> {
        let mut y = self.convolve(x)?;
        y.mapv_inplace(relu);
        Ok(y)
    }

    /// Convolution without the activation.
    ///
    /// # Errors
    ///
    /// [`SlimcutError::Shape`] is returned when `x` does not have `in_channels` features.
    pub fn convolve(&self, x: ArrayView3<f32>) -> Result<Array3<f32>> {
        let (batch_size, len, channels) = x.dim();
        if channels != self.in_channels() {
            return Err(SlimcutError::shape(format!(
                "convolution expects {} channels, got {channels}",
                self.in_channels(),
            )));
        }
        let mut y = Array3::zeros((batch_size, len, self.out_channels()));
        for (xb, mut yb) in x.outer_iter().zip(y.outer_iter_mut()) {
            yb.assign(&self.convolve_sequence(xb));
        }
        Ok(y)
    }

    fn convolve_sequence(&self, x: ArrayView2<f32>) -> Array2<f32> {
        let len = x.nrows();
        let mut y = Array2::<f32>::zeros((len, self.out_channels()));
        y += &self.bias;
        for k in 0..KERNEL_WIDTH {
            // Output position t reads input position t + k - PADDING.
            let (dst, src) = if k < PADDING {
                let shift = PADDING - k;
                (shift..len.max(shift), 0..len.saturating_sub(shift))
            } else {
                let shift = k - PADDING;
                (0..len.saturating_sub(shift), shift..len.max(shift))
            };
            if src.is_empty() {
                continue;
            }
            let w = self.weight.index_axis(Axis(2), k);
            let contribution = x.slice(s![src, ..]).dot(&w.t());
            let mut target = y.slice_mut(s![dst, ..]);
            target += &contribution;
        }
        y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use ndarray::array;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    // One input and one output channel, kernel [1, 2, 3, 4, 5], no bias.
    fn ramp() -> LocalContextConvolution {
        let weight = Array3::from_shape_vec((1, 1, 5), vec![1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        LocalContextConvolution::from_parts(weight, Array1::zeros(1)).unwrap()
    }

    #[test]
    fn test_symmetric_zero_padding() {
        let conv = ramp();
        let x = array![[[1.0f32], [0.0], [0.0], [0.0], [0.0], [0.0]]];
        let y = conv.convolve(x.view()).unwrap();

        // An impulse at t = 0 reaches t = 0, 1, 2 through kernel taps 2, 1, 0.
        assert_eq!(array![[[3.0f32], [2.0], [1.0], [0.0], [0.0], [0.0]]], y);
    }

    #[test]
    fn test_window_is_centered() {
        let conv = ramp();
        let x = array![[[0.0f32], [0.0], [0.0], [1.0], [0.0], [0.0], [0.0]]];
        let y = conv.convolve(x.view()).unwrap();

        assert_eq!(
            array![[[0.0f32], [5.0], [4.0], [3.0], [2.0], [1.0], [0.0]]],
            y
        );
    }

    #[test]
    fn test_single_position() {
        let conv = ramp();
        let y = conv.convolve(array![[[2.0f32]]].view()).unwrap();

        assert_eq!(array![[[6.0f32]]], y);
    }

    #[test]
    fn test_relu() {
        let mut weight = Array3::<f32>::zeros((2, 1, 5));
        weight[[0, 0, 2]] = 1.0;
        weight[[1, 0, 2]] = -1.0;
        let conv = LocalContextConvolution::from_parts(weight, array![0.0, 0.5]).unwrap();
        let y = conv.forward(array![[[2.0f32], [0.25]]].view()).unwrap();

        assert_eq!(array![[[2.0f32, 0.0], [0.25, 0.25]]], y);
    }

    #[test]
    fn test_channel_mismatch() {
        let mut rng = StdRng::seed_from_u64(0);
        let conv = LocalContextConvolution::new(32, 48, &mut rng);
        let e = conv.forward(Array3::<f32>::zeros((1, 3, 16)).view()).unwrap_err();

        assert_eq!(
            "ShapeError: convolution expects 32 channels, got 16",
            e.to_string()
        );
    }

    #[test]
    fn test_from_parts_kernel_width() {
        let e = LocalContextConvolution::from_parts(Array3::zeros((1, 1, 3)), Array1::zeros(1))
            .unwrap_err();

        assert_eq!(
            "InvalidModelError: convolution kernel is 3 wide, expected 5",
            e.to_string()
        );
    }

    #[test]
    fn test_batch_rows_are_independent() {
        let mut rng = StdRng::seed_from_u64(5);
        let conv = LocalContextConvolution::new(3, 4, &mut rng);
        let mut x = uniform((2, 6, 3), 1.0, &mut rng);
        x.slice_mut(s![1, 4.., ..]).fill(0.0);
        let batched = conv.forward(x.view()).unwrap();
        let alone = conv.forward(x.slice(s![1..2, ..4, ..])).unwrap();

        for (a, b) in alone.iter().zip(batched.slice(s![1, ..4, ..])) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    proptest! {
        #[test]
        fn test_preserves_length(len in 1usize..40, batch_size in 1usize..4, seed in any::<u64>()) {
            let mut rng = StdRng::seed_from_u64(seed);
            let conv = LocalContextConvolution::new(3, 2, &mut rng);
            let x = uniform((batch_size, len, 3), 1.0, &mut rng);
            let y = conv.forward(x.view()).unwrap();

            prop_assert_eq!(&[batch_size, len, 2], y.shape());
            prop_assert!(y.iter().all(|&v| v >= 0.0));
        }
    }
}
