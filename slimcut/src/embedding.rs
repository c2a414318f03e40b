use bincode::{Decode, Encode};
use ndarray::{s, Array2, Array3, ArrayView1, ArrayView2};
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

use crate::errors::{Result, SlimcutError};
use crate::vocab::PADDING_CODE;

/// Lookup table from character codes to dense vectors.
///
/// Row 0 belongs to the padding code and is always zero.
#[derive(Clone, Debug, PartialEq, Encode, Decode)]
pub struct CharacterEmbeddingLayer {
    /// `[num_tokens, emb]`
    #[bincode(with_serde)]
    table: Array2<f32>,
}

impl CharacterEmbeddingLayer {
    /// Creates a table with rows drawn from the standard normal distribution, except for the
    /// padding row.
    pub fn new<R>(num_tokens: usize, emb: usize, rng: &mut R) -> Self
    where
        R: Rng + ?Sized,
    {
        let mut table: Array2<f32> =
            Array2::from_shape_fn((num_tokens, emb), |_| StandardNormal.sample(rng));
        if num_tokens > 0 {
            table.row_mut(PADDING_CODE as usize).fill(0.0);
        }
        Self { table }
    }

    /// Creates a layer from an explicit table.
    ///
    /// # Errors
    ///
    /// [`SlimcutError::InvalidModel`] is returned when the table is empty or its padding row
    /// is not zero.
    pub fn from_table(table: Array2<f32>) -> Result<Self> {
        let layer = Self { table };
        layer.validate()?;
        Ok(layer)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.table.nrows() == 0 {
            return Err(SlimcutError::invalid_model("embedding table has no rows"));
        }
        if self
            .table
            .row(PADDING_CODE as usize)
            .iter()
            .any(|&v| v != 0.0)
        {
            return Err(SlimcutError::invalid_model(
                "embedding of the padding code is not zero",
            ));
        }
        Ok(())
    }

    pub fn num_tokens(&self) -> usize {
        self.table.nrows()
    }

    pub fn width(&self) -> usize {
        self.table.ncols()
    }

    pub(crate) fn n_params(&self) -> usize {
        self.table.len()
    }

    pub fn table(&self) -> ArrayView2<f32> {
        self.table.view()
    }

    /// Returns the vector of `code`.
    ///
    /// # Errors
    ///
    /// [`SlimcutError::Range`] is returned when `code` is not below the vocabulary size.
    pub fn lookup(&self, code: u32) -> Result<ArrayView1<f32>> {
        let idx = self.index(code)?;
        Ok(self.table.row(idx))
    }

    /// Embeds every position of a `[batch, max_len]` id array, padding included.
    ///
    /// # Errors
    ///
    /// [`SlimcutError::Range`] is returned for the first code outside the vocabulary.
    pub fn forward(&self, ids: ArrayView2<u32>) -> Result<Array3<f32>> {
        let (batch_size, max_len) = ids.dim();
        let mut output = Array3::zeros((batch_size, max_len, self.width()));
        for ((b, t), &code) in ids.indexed_iter() {
            let idx = self.index(code)?;
            if code != PADDING_CODE {
                output.slice_mut(s![b, t, ..]).assign(&self.table.row(idx));
            }
        }
        Ok(output)
    }

    fn index(&self, code: u32) -> Result<usize> {
        usize::try_from(code)
            .ok()
            .filter(|&idx| idx < self.table.nrows())
            .ok_or_else(|| SlimcutError::range(code, self.table.nrows()))
    }
}
