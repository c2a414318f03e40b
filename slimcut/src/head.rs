use bincode::{Decode, Encode};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::Rng;

use crate::errors::{Result, SlimcutError};
use crate::layers::{dropout, relu, Linear};

/// Two-layer feed-forward network reducing every position to one score.
#[derive(Clone, Debug, PartialEq, Encode, Decode)]
pub struct ClassificationHead {
    hidden: Linear,
    output: Linear,
    dropout: f32,
}

impl ClassificationHead {
    /// Creates a head mapping `in_features` to `hidden` units, then to a single output.
    pub fn new<R>(in_features: usize, hidden: usize, dropout: f32, rng: &mut R) -> Self
    where
        R: Rng + ?Sized,
    {
        Self {
            hidden: Linear::new(in_features, hidden, rng),
            output: Linear::new(hidden, 1, rng),
            dropout,
        }
    }

    /// Creates a head from explicit layers.
    ///
    /// # Errors
    ///
    /// [`SlimcutError::InvalidModel`] is returned when the layers do not chain into a single
    /// output or `dropout` is not in `[0, 1)`.
    pub fn from_layers(hidden: Linear, output: Linear, dropout: f32) -> Result<Self> {
        let head = Self {
            hidden,
            output,
            dropout,
        };
        head.validate()?;
        Ok(head)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.hidden.out_features() != self.output.in_features() {
            return Err(SlimcutError::invalid_model(
                "hidden and output layers of the classification head do not match",
            ));
        }
        if self.output.out_features() != 1 {
            return Err(SlimcutError::invalid_model(format!(
                "classification head has {} outputs, expected 1",
                self.output.out_features(),
            )));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(SlimcutError::invalid_model(format!(
                "dropout probability {} is not in [0, 1)",
                self.dropout,
            )));
        }
        Ok(())
    }

    pub fn in_features(&self) -> usize {
        self.hidden.in_features()
    }

    pub fn hidden_features(&self) -> usize {
        self.hidden.out_features()
    }

    pub fn dropout(&self) -> f32 {
        self.dropout
    }

    pub(crate) fn n_params(&self) -> usize {
        self.hidden.n_params() + self.output.n_params()
    }

    /// Scores each row of `features` in inference mode.
    ///
    /// # Errors
    ///
    /// [`SlimcutError::Shape`] is returned when `features` does not have `in_features` columns.
    pub fn forward(&self, features: ArrayView2<f32>) -> Result<Array1<f32>> {
        let h = self.activate(features)?;
        Ok(self.collapse(h))
    }

    /// Scores each row of `features` with dropout applied to the hidden units.
    ///
    /// # Errors
    ///
    /// [`SlimcutError::Shape`] is returned when `features` does not have `in_features` columns.
    pub fn forward_train<R>(&self, features: ArrayView2<f32>, rng: &mut R) -> Result<Array1<f32>>
    where
        R: Rng + ?Sized,
    {
        let mut h = self.activate(features)?;
        dropout(&mut h, self.dropout, rng);
        Ok(self.collapse(h))
    }

    fn activate(&self, features: ArrayView2<f32>) -> Result<Array2<f32>> {
        if features.ncols() != self.in_features() {
            return Err(SlimcutError::shape(format!(
                "classification head expects {} features, got {}",
                self.in_features(),
                features.ncols(),
            )));
        }
        let mut h = self.hidden.forward(features);
        h.mapv_inplace(relu);
        Ok(h)
    }

    fn collapse(&self, h: Array2<f32>) -> Array1<f32> {
        self.output.forward(h.view()).index_axis_move(Axis(1), 0)
    }
}
