use ndarray::{Array2, ArrayView1, ArrayView2};

use crate::errors::{Result, SlimcutError};
use crate::vocab::PADDING_CODE;

/// Character codes of several sequences, right-padded to a common width, with their lengths.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputBatch {
    ids: Array2<u32>,
    lengths: Vec<usize>,
}

impl InputBatch {
    /// Creates a batch from a padded `[batch, max_len]` id array and the true lengths.
    ///
    /// # Errors
    ///
    /// [`SlimcutError::Shape`] is returned when the number of lengths differs from the number of
    /// rows, or when a length is 0 or exceeds the row width.
    pub fn new(ids: Array2<u32>, lengths: Vec<usize>) -> Result<Self> {
        validate_lengths(ids.nrows(), ids.ncols(), &lengths)?;
        Ok(Self { ids, lengths })
    }

    /// Pads `sequences` with [`PADDING_CODE`] to the length of the longest one.
    ///
    /// # Errors
    ///
    /// [`SlimcutError::Shape`] is returned when one of the sequences is empty.
    ///
    /// # Examples
    ///
    /// ```
    /// use slimcut::InputBatch;
    ///
    /// let batch = InputBatch::from_sequences(&[vec![3u32, 4, 5], vec![6]]).unwrap();
    /// assert_eq!(&[3, 1], batch.lengths());
    /// assert_eq!(3, batch.max_len());
    /// assert_eq!(4, batch.total_len());
    /// ```
    pub fn from_sequences<S>(sequences: &[S]) -> Result<Self>
    where
        S: AsRef<[u32]>,
    {
        let max_len = sequences
            .iter()
            .map(|s| s.as_ref().len())
            .max()
            .unwrap_or(0);
        let mut ids = Array2::from_elem((sequences.len(), max_len), PADDING_CODE);
        let mut lengths = Vec::with_capacity(sequences.len());
        for (mut row, seq) in ids.outer_iter_mut().zip(sequences) {
            let seq = seq.as_ref();
            for (dst, &src) in row.iter_mut().zip(seq) {
                *dst = src;
            }
            lengths.push(seq.len());
        }
        Self::new(ids, lengths)
    }

    /// Padded ids, `[batch, max_len]`.
    pub fn ids(&self) -> ArrayView2<u32> {
        self.ids.view()
    }

    /// Codes of the real characters of sequence `i`.
    pub fn sequence(&self, i: usize) -> Option<ArrayView1<u32>> {
        let len = *self.lengths.get(i)?;
        Some(self.ids.row(i).slice_move(ndarray::s![..len]))
    }

    /// True lengths, one per sequence.
    pub fn lengths(&self) -> &[usize] {
        &self.lengths
    }

    /// Number of sequences.
    pub fn batch_size(&self) -> usize {
        self.lengths.len()
    }

    /// Width of the padded id array.
    pub fn max_len(&self) -> usize {
        self.ids.ncols()
    }

    /// Sum of all lengths, which is the number of scores the batch produces.
    pub fn total_len(&self) -> usize {
        self.lengths.iter().sum()
    }

    /// Returns `true` if the batch has no sequences.
    pub fn is_empty(&self) -> bool {
        self.lengths.is_empty()
    }
}

pub(crate) fn validate_lengths(batch_size: usize, max_len: usize, lengths: &[usize]) -> Result<()> {
    if lengths.len() != batch_size {
        return Err(SlimcutError::shape(format!(
            "{} lengths given for a batch of {} sequences",
            lengths.len(),
            batch_size,
        )));
    }
    for (i, &len) in lengths.iter().enumerate() {
        if len == 0 {
            return Err(SlimcutError::shape(format!("sequence {i} has length 0")));
        }
        if len > max_len {
            return Err(SlimcutError::shape(format!(
                "sequence {i} has length {len}, longer than the batch width {max_len}",
            )));
        }
    }
    Ok(())
}
