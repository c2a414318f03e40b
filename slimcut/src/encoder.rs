//! LSTM encoder over variable-length sequences.
//!
//! A batch enters as a zero-padded `[batch, max_len, emb]` array. [`PackedBatch::pack()`] cuts
//! every sequence down to its true length, the LSTM runs on those slices only, and
//! [`PackedBatch::unpack()`] lays the results back into a zero-padded array.

use bincode::{Decode, Encode};
use ndarray::{s, Array1, Array2, Array3, ArrayView2, ArrayView3, ArrayViewMut2, Axis};
use rand::Rng;

use crate::batch::validate_lengths;
use crate::errors::{Result, SlimcutError};
use crate::layers::{sigmoid, uniform};

#[cfg(feature = "multithreading")]
use rayon::prelude::*;

/// Real (non-padding) rows of each sequence of a batch.
#[derive(Clone, Debug, PartialEq)]
pub struct PackedBatch {
    sequences: Vec<Array2<f32>>,
    width: usize,
}

impl PackedBatch {
    /// Keeps the first `lengths[i]` positions of sequence `i`.
    ///
    /// # Errors
    ///
    /// [`SlimcutError::Shape`] is returned when `lengths` does not match the batch.
    pub fn pack(padded: ArrayView3<f32>, lengths: &[usize]) -> Result<Self> {
        let (batch_size, max_len, width) = padded.dim();
        validate_lengths(batch_size, max_len, lengths)?;
        let sequences = padded
            .outer_iter()
            .zip(lengths)
            .map(|(x, &len)| x.slice(s![..len, ..]).to_owned())
            .collect();
        Ok(Self { sequences, width })
    }

    /// Re-expands to `[batch, max_len, width]`, filling padding positions with zeros.
    ///
    /// # Errors
    ///
    /// [`SlimcutError::Shape`] is returned when a sequence is longer than `max_len`.
    pub fn unpack(&self, max_len: usize) -> Result<Array3<f32>> {
        let mut padded = Array3::zeros((self.sequences.len(), max_len, self.width));
        for (i, (mut dst, src)) in padded.outer_iter_mut().zip(&self.sequences).enumerate() {
            if src.nrows() > max_len {
                return Err(SlimcutError::shape(format!(
                    "sequence {i} has length {}, longer than the batch width {max_len}",
                    src.nrows(),
                )));
            }
            dst.slice_mut(s![..src.nrows(), ..]).assign(src);
        }
        Ok(padded)
    }

    pub fn width(&self) -> usize {
        self.width
    }
}

/// One direction of an LSTM layer.
///
/// Gates are stacked in input, forget, cell, output order.
#[derive(Clone, Debug, PartialEq, Encode, Decode)]
pub struct LstmCell {
    /// `[4 * hidden, input]`
    #[bincode(with_serde)]
    w_ih: Array2<f32>,

    /// `[4 * hidden, hidden]`
    #[bincode(with_serde)]
    w_hh: Array2<f32>,

    #[bincode(with_serde)]
    b_ih: Array1<f32>,

    #[bincode(with_serde)]
    b_hh: Array1<f32>,
}

impl LstmCell {
    /// Creates a cell with weights drawn from `U(-1/sqrt(hidden), 1/sqrt(hidden))`.
    pub fn new<R>(input_size: usize, hidden_size: usize, rng: &mut R) -> Self
    where
        R: Rng + ?Sized,
    {
        #[allow(clippy::cast_precision_loss)]
        let bound = (hidden_size as f32).sqrt().recip();
        let n_gates = hidden_size * 4;
        Self {
            w_ih: uniform((n_gates, input_size), bound, rng),
            w_hh: uniform((n_gates, hidden_size), bound, rng),
            b_ih: uniform(n_gates, bound, rng),
            b_hh: uniform(n_gates, bound, rng),
        }
    }

    pub fn input_size(&self) -> usize {
        self.w_ih.ncols()
    }

    pub fn hidden_size(&self) -> usize {
        self.w_hh.ncols()
    }

    pub(crate) fn n_params(&self) -> usize {
        self.w_ih.len() + self.w_hh.len() + self.b_ih.len() + self.b_hh.len()
    }

    pub(crate) fn validate(&self) -> Result<()> {
        let n_gates = self.hidden_size() * 4;
        if self.w_ih.nrows() != n_gates
            || self.w_hh.nrows() != n_gates
            || self.b_ih.len() != n_gates
            || self.b_hh.len() != n_gates
        {
            return Err(SlimcutError::invalid_model("inconsistent LSTM weight shapes"));
        }
        Ok(())
    }

    /// Reads `xs` (`[len, input]`) step by step, right to left if `reverse` is set, and writes
    /// the hidden state of each step to the same row of `out` (`[len, hidden]`).
    fn run(&self, xs: ArrayView2<f32>, reverse: bool, mut out: ArrayViewMut2<f32>) {
        let hidden = self.hidden_size();
        let bias = &self.b_ih + &self.b_hh;
        let input_gates = xs.dot(&self.w_ih.t()) + &bias;
        let mut h = Array1::<f32>::zeros(hidden);
        let mut c = Array1::<f32>::zeros(hidden);
        let mut step = |t: usize| {
            let gates = &input_gates.row(t) + &self.w_hh.dot(&h);
            let i = gates.slice(s![..hidden]).mapv(sigmoid);
            let f = gates.slice(s![hidden..hidden * 2]).mapv(sigmoid);
            let g = gates.slice(s![hidden * 2..hidden * 3]).mapv(f32::tanh);
            let o = gates.slice(s![hidden * 3..]).mapv(sigmoid);
            c = &f * &c + &i * &g;
            h = &o * &c.mapv(f32::tanh);
            out.row_mut(t).assign(&h);
        };
        if reverse {
            (0..xs.nrows()).rev().for_each(&mut step);
        } else {
            (0..xs.nrows()).for_each(&mut step);
        }
    }
}

/// Single-layer LSTM, optionally bidirectional.
#[derive(Clone, Debug, PartialEq, Encode, Decode)]
pub struct SequenceEncoder {
    forward: LstmCell,
    backward: Option<LstmCell>,
}

impl SequenceEncoder {
    pub fn new<R>(input_size: usize, hidden_size: usize, bidirectional: bool, rng: &mut R) -> Self
    where
        R: Rng + ?Sized,
    {
        let forward = LstmCell::new(input_size, hidden_size, rng);
        let backward = bidirectional.then(|| LstmCell::new(input_size, hidden_size, rng));
        Self { forward, backward }
    }

    pub fn is_bidirectional(&self) -> bool {
        self.backward.is_some()
    }

    pub fn input_width(&self) -> usize {
        self.forward.input_size()
    }

    /// `hidden` for one direction, `2 * hidden` for two.
    pub fn output_width(&self) -> usize {
        if self.is_bidirectional() {
            self.forward.hidden_size() * 2
        } else {
            self.forward.hidden_size()
        }
    }

    pub(crate) fn n_params(&self) -> usize {
        self.forward.n_params() + self.backward.as_ref().map_or(0, LstmCell::n_params)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        self.forward.validate()?;
        if let Some(backward) = &self.backward {
            backward.validate()?;
            if backward.input_size() != self.forward.input_size()
                || backward.hidden_size() != self.forward.hidden_size()
            {
                return Err(SlimcutError::invalid_model(
                    "LSTM directions have different shapes",
                ));
            }
        }
        Ok(())
    }

    /// Encodes each packed sequence. The output keeps the packing.
    ///
    /// # Errors
    ///
    /// [`SlimcutError::Shape`] is returned when the packed width is not the encoder input width.
    pub fn encode(&self, packed: &PackedBatch) -> Result<PackedBatch> {
        if packed.width() != self.input_width() {
            return Err(SlimcutError::shape(format!(
                "encoder expects {} input features, got {}",
                self.input_width(),
                packed.width(),
            )));
        }
        #[cfg(not(feature = "multithreading"))]
        let sequences = packed
            .sequences
            .iter()
            .map(|xs| self.encode_sequence(xs.view()))
            .collect();
        #[cfg(feature = "multithreading")]
        let sequences = packed
            .sequences
            .par_iter()
            .map(|xs| self.encode_sequence(xs.view()))
            .collect();
        Ok(PackedBatch {
            sequences,
            width: self.output_width(),
        })
    }

    /// Packs, encodes and unpacks a zero-padded `[batch, max_len, input]` array.
    ///
    /// # Errors
    ///
    /// [`SlimcutError::Shape`] is returned when `lengths` does not match the batch or the feature
    /// width does not match the encoder.
    pub fn forward(&self, padded: ArrayView3<f32>, lengths: &[usize]) -> Result<Array3<f32>> {
        let packed = PackedBatch::pack(padded, lengths)?;
        self.encode(&packed)?.unpack(padded.len_of(Axis(1)))
    }

    fn encode_sequence(&self, xs: ArrayView2<f32>) -> Array2<f32> {
        let hidden = self.forward.hidden_size();
        let mut out = Array2::zeros((xs.nrows(), self.output_width()));
        self.forward.run(xs, false, out.slice_mut(s![.., ..hidden]));
        if let Some(backward) = &self.backward {
            backward.run(xs, true, out.slice_mut(s![.., hidden..]));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn padded_batch(rng: &mut StdRng) -> Array3<f32> {
        let mut x = uniform((2, 5, 3), 1.0, rng);
        x.slice_mut(s![1, 3.., ..]).fill(0.0);
        x
    }

    #[test]
    fn test_pack_unpack() {
        let x = array![
            [[1.0f32, 1.0], [2.0, 2.0], [3.0, 3.0]],
            [[4.0, 4.0], [0.0, 0.0], [0.0, 0.0]]
        ];
        let packed = PackedBatch::pack(x.view(), &[3, 1]).unwrap();

        assert_eq!(
            vec![3, 1],
            packed.sequences.iter().map(Array2::nrows).collect::<Vec<_>>()
        );
        assert_eq!(array![[4.0f32, 4.0]], packed.sequences[1]);
        assert_eq!(x, packed.unpack(3).unwrap());
    }

    #[test]
    fn test_unpack_zero_fills() {
        let x = array![[[1.0f32], [7.0]], [[2.0], [9.0]]];
        let packed = PackedBatch::pack(x.view(), &[2, 1]).unwrap();

        assert_eq!(array![[[1.0f32], [7.0]], [[2.0], [0.0]]], packed.unpack(2).unwrap());
        assert!(packed.unpack(1).is_err());
    }

    #[test]
    fn test_pack_rejects_bad_lengths() {
        let x = Array3::<f32>::zeros((2, 5, 3));

        assert!(matches!(
            PackedBatch::pack(x.view(), &[5, 0]),
            Err(SlimcutError::Shape(_))
        ));
        assert!(matches!(
            PackedBatch::pack(x.view(), &[5]),
            Err(SlimcutError::Shape(_))
        ));
        assert!(matches!(
            PackedBatch::pack(x.view(), &[5, 6]),
            Err(SlimcutError::Shape(_))
        ));
    }

    #[test]
    fn test_output_width() {
        let mut rng = StdRng::seed_from_u64(0);
        let uni = SequenceEncoder::new(3, 16, false, &mut rng);
        let bi = SequenceEncoder::new(3, 16, true, &mut rng);

        assert_eq!(16, uni.output_width());
        assert_eq!(32, bi.output_width());

        let x = padded_batch(&mut rng);
        assert_eq!(&[2, 5, 32], bi.forward(x.view(), &[5, 3]).unwrap().shape());
    }

    #[test]
    fn test_padding_positions_are_zero() {
        let mut rng = StdRng::seed_from_u64(1);
        let encoder = SequenceEncoder::new(3, 4, true, &mut rng);
        let x = padded_batch(&mut rng);
        let y = encoder.forward(x.view(), &[5, 3]).unwrap();

        assert!(y.slice(s![1, 3.., ..]).iter().all(|&v| v == 0.0));
        assert!(y.slice(s![1, ..3, ..]).iter().any(|&v| v != 0.0));
    }

    #[test]
    fn test_padding_does_not_leak() {
        let mut rng = StdRng::seed_from_u64(2);
        let encoder = SequenceEncoder::new(3, 4, true, &mut rng);
        let mut x = padded_batch(&mut rng);
        let y1 = encoder.forward(x.view(), &[5, 3]).unwrap();

        // Garbage at padding positions must not change the real positions.
        x.slice_mut(s![1, 3.., ..]).fill(100.0);
        let y2 = encoder.forward(x.view(), &[5, 3]).unwrap();

        assert_eq!(y1, y2);
    }

    #[test]
    fn test_backward_starts_at_last_character() {
        let mut rng = StdRng::seed_from_u64(3);
        let encoder = SequenceEncoder::new(3, 4, true, &mut rng);
        let x = padded_batch(&mut rng);
        let batched = encoder.forward(x.view(), &[5, 3]).unwrap();
        let alone = encoder.forward(x.slice(s![1..2, ..3, ..]), &[3]).unwrap();

        assert_eq!(alone.slice(s![0, .., ..]), batched.slice(s![1, ..3, ..]));
    }

    #[test]
    fn test_reverse_run_mirrors_forward_run() {
        let mut rng = StdRng::seed_from_u64(5);
        let cell = LstmCell::new(3, 4, &mut rng);
        let xs = uniform((6, 3), 1.0, &mut rng);
        let mut backward = Array2::<f32>::zeros((6, 4));
        cell.run(xs.view(), true, backward.view_mut());
        let mut forward = Array2::<f32>::zeros((6, 4));
        cell.run(xs.slice(s![..;-1, ..]), false, forward.view_mut());

        for (a, b) in forward.slice(s![..;-1, ..]).iter().zip(&backward) {
            assert!((a - b).abs() < 1e-6, "{a} != {b}");
        }
    }

    #[test]
    fn test_forward_is_causal() {
        let mut rng = StdRng::seed_from_u64(4);
        let encoder = SequenceEncoder::new(3, 4, false, &mut rng);
        let mut x = padded_batch(&mut rng);
        let y1 = encoder.forward(x.view(), &[5, 3]).unwrap();
        x[[0, 4, 0]] += 1.0;
        let y2 = encoder.forward(x.view(), &[5, 3]).unwrap();

        assert_eq!(y1.slice(s![0, ..4, ..]), y2.slice(s![0, ..4, ..]));
        assert_ne!(y1.slice(s![0, 4, ..]), y2.slice(s![0, 4, ..]));
    }

    #[test]
    fn test_width_mismatch() {
        let mut rng = StdRng::seed_from_u64(0);
        let encoder = SequenceEncoder::new(4, 2, false, &mut rng);
        let e = encoder
            .forward(Array3::<f32>::zeros((1, 2, 3)).view(), &[2])
            .unwrap_err();

        assert_eq!(
            "ShapeError: encoder expects 4 input features, got 3",
            e.to_string()
        );
    }
}
