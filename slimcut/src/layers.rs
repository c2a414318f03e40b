//! Building blocks shared by the stages of the scorer.

use bincode::{Decode, Encode};
use ndarray::{Array, Array1, Array2, ArrayView2, Dimension, ShapeBuilder};
use rand::Rng;
use rand_distr::{Distribution, Uniform};

use crate::errors::{Result, SlimcutError};

/// Fully connected layer computing `x W^T + b`.
#[derive(Clone, Debug, PartialEq, Encode, Decode)]
pub struct Linear {
    /// `[out_features, in_features]`
    #[bincode(with_serde)]
    weight: Array2<f32>,

    /// `[out_features]`
    #[bincode(with_serde)]
    bias: Array1<f32>,
}

impl Linear {
    /// Creates a layer with weights drawn from `U(-1/sqrt(in), 1/sqrt(in))`.
    pub fn new<R>(in_features: usize, out_features: usize, rng: &mut R) -> Self
    where
        R: Rng + ?Sized,
    {
        #[allow(clippy::cast_precision_loss)]
        let bound = (in_features as f32).sqrt().recip();
        Self {
            weight: uniform((out_features, in_features), bound, rng),
            bias: uniform(out_features, bound, rng),
        }
    }

    /// Creates a layer from explicit parameters.
    ///
    /// # Errors
    ///
    /// [`SlimcutError::Shape`] is returned when `bias` does not have one entry per weight row.
    pub fn from_parts(weight: Array2<f32>, bias: Array1<f32>) -> Result<Self> {
        if weight.nrows() != bias.len() {
            return Err(SlimcutError::shape(format!(
                "linear layer has {} outputs but {} biases",
                weight.nrows(),
                bias.len(),
            )));
        }
        Ok(Self { weight, bias })
    }

    pub fn in_features(&self) -> usize {
        self.weight.ncols()
    }

    pub fn out_features(&self) -> usize {
        self.weight.nrows()
    }

    pub(crate) fn n_params(&self) -> usize {
        self.weight.len() + self.bias.len()
    }

    /// Applies the layer to each row of `x`. The caller checks that `x` has `in_features`
    /// columns.
    pub fn forward(&self, x: ArrayView2<f32>) -> Array2<f32> {
        debug_assert_eq!(x.ncols(), self.in_features());
        x.dot(&self.weight.t()) + &self.bias
    }
}

#[inline(always)]
pub fn relu(x: f32) -> f32 {
    x.max(0.0)
}

#[inline(always)]
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Inverted dropout: zeroes each entry with probability `p` and scales survivors by `1/(1-p)`.
pub(crate) fn dropout<D, R>(x: &mut Array<f32, D>, p: f32, rng: &mut R)
where
    D: Dimension,
    R: Rng + ?Sized,
{
    if p <= 0.0 {
        return;
    }
    let scale = (1.0 - p).recip();
    x.map_inplace(|v| {
        if rng.gen::<f32>() < p {
            *v = 0.0;
        } else {
            *v *= scale;
        }
    });
}

/// Array filled from `U(-bound, bound)`.
pub(crate) fn uniform<Sh, D, R>(shape: Sh, bound: f32, rng: &mut R) -> Array<f32, D>
where
    Sh: ShapeBuilder<Dim = D>,
    D: Dimension,
    R: Rng + ?Sized,
{
    let dist = Uniform::new_inclusive(-bound, bound);
    Array::from_shape_fn(shape, |_| dist.sample(rng))
}

#[cfg(test)]
mod tests {
    use super::*;

    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_linear_forward() {
        let weight = array![[1.0, 2.0], [0.0, -1.0], [0.5, 0.5]];
        let bias = array![0.0, 1.0, -1.0];
        let linear = Linear::from_parts(weight, bias).unwrap();
        let y = linear.forward(array![[1.0, 1.0], [2.0, 0.0]].view());

        assert_eq!(array![[3.0f32, 0.0, 0.0], [2.0, 1.0, 0.0]], y);
    }

    #[test]
    fn test_linear_from_parts_mismatch() {
        let e = Linear::from_parts(Array2::zeros((3, 2)), Array1::zeros(2)).unwrap_err();

        assert_eq!(
            "ShapeError: linear layer has 3 outputs but 2 biases",
            e.to_string()
        );
    }

    #[test]
    fn test_linear_init_bounds() {
        let mut rng = StdRng::seed_from_u64(1);
        let linear = Linear::new(16, 4, &mut rng);

        assert_eq!(16, linear.in_features());
        assert_eq!(4, linear.out_features());
        assert_eq!(68, linear.n_params());
        assert!(linear
            .weight
            .iter()
            .chain(&linear.bias)
            .all(|w| w.abs() <= 0.25));
    }

    #[test]
    fn test_activations() {
        assert_eq!(0.0, relu(-2.0));
        assert_eq!(3.0, relu(3.0));
        assert_eq!(0.5, sigmoid(0.0));
        assert!(sigmoid(10.0) > 0.99);
    }

    #[test]
    fn test_dropout_disabled() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut x = array![[1.0f32, 2.0], [3.0, 4.0]];
        dropout(&mut x, 0.0, &mut rng);

        assert_eq!(array![[1.0f32, 2.0], [3.0, 4.0]], x);
    }

    #[test]
    fn test_dropout_scales_survivors() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut x = Array2::<f32>::ones((32, 32));
        dropout(&mut x, 0.5, &mut rng);

        assert!(x.iter().all(|&v| v == 0.0 || v == 2.0));
        assert!(x.iter().any(|&v| v == 0.0));
        assert!(x.iter().any(|&v| v == 2.0));
    }
}
