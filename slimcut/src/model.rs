use std::io::{Read, Write};

use bincode::{Decode, Encode};
use ndarray::{s, Array3, ArrayView2};
use rand::Rng;

use crate::batch::{validate_lengths, InputBatch};
use crate::config::{DataConfig, ModelConfig};
use crate::conv::LocalContextConvolution;
use crate::embedding::CharacterEmbeddingLayer;
use crate::encoder::SequenceEncoder;
use crate::errors::{Result, SlimcutError};
use crate::head::ClassificationHead;

const MODEL_MAGIC: &[u8] = b"SlimcutModel 0.1\n";

/// Largest number of bytes [`Model::read()`] decodes after the header.
pub const MODEL_SIZE_LIMIT: usize = 1 << 30;

/// Anything that assigns one boundary score to every character of a batch.
pub trait SequenceScorer {
    /// Number of character codes the scorer accepts.
    fn num_tokens(&self) -> usize;

    /// Returns `batch.total_len()` scores, sequence by sequence, each in character order.
    ///
    /// # Errors
    ///
    /// Returns an error when the batch does not fit the scorer.
    fn score(&self, batch: &InputBatch) -> Result<Vec<f32>>;
}

/// LSTM + convolution boundary scorer.
#[derive(Clone, Debug, PartialEq, Encode, Decode)]
pub struct Model {
    data_config: DataConfig,
    config: ModelConfig,
    embedding: CharacterEmbeddingLayer,
    encoder: SequenceEncoder,
    conv: LocalContextConvolution,
    head: ClassificationHead,
}

impl Model {
    /// Creates a randomly initialized model using the thread-local generator.
    ///
    /// # Errors
    ///
    /// [`SlimcutError::Configuration`] is returned when a configuration is invalid.
    pub fn new(data_config: DataConfig, config: ModelConfig) -> Result<Self> {
        Self::from_rng(data_config, config, &mut rand::thread_rng())
    }

    /// Creates a model whose parameters are drawn from `rng`.
    ///
    /// The same seed gives the same parameters.
    ///
    /// # Errors
    ///
    /// [`SlimcutError::Configuration`] is returned when a configuration is invalid.
    pub fn from_rng<R>(data_config: DataConfig, config: ModelConfig, rng: &mut R) -> Result<Self>
    where
        R: Rng + ?Sized,
    {
        data_config.validate()?;
        config.validate()?;
        let embedding = CharacterEmbeddingLayer::new(data_config.num_tokens, config.emb, rng);
        let encoder = SequenceEncoder::new(config.emb, config.cell, config.bidirectional, rng);
        let conv = LocalContextConvolution::new(config.encoder_width(), config.conv, rng);
        let head = ClassificationHead::new(config.conv, config.l1, config.dropout, rng);
        let model = Self {
            data_config,
            config,
            embedding,
            encoder,
            conv,
            head,
        };
        tracing::debug!(
            "initialized model: num_tokens={} config={} params={}",
            model.num_tokens(),
            model.config,
            model.n_params(),
        );
        Ok(model)
    }

    /// Parses `model_params` and creates a randomly initialized model.
    ///
    /// # Errors
    ///
    /// [`SlimcutError::Configuration`] is returned when the string or the resulting configuration
    /// is invalid.
    ///
    /// # Examples
    ///
    /// ```
    /// use slimcut::{DataConfig, Model};
    ///
    /// let model = Model::from_params(DataConfig::new(50), "emb:32|conv:48|cell:16|bi:1|l1:16").unwrap();
    /// assert_eq!(32, model.encoder_width());
    ///
    /// assert!(Model::from_params(DataConfig::new(50), "emb:32|conv:48|cell:16").is_err());
    /// ```
    pub fn from_params(data_config: DataConfig, model_params: &str) -> Result<Self> {
        Self::new(data_config, model_params.parse()?)
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn data_config(&self) -> DataConfig {
        self.data_config
    }

    pub fn num_tokens(&self) -> usize {
        self.data_config.num_tokens
    }

    /// Width of the LSTM output, `cell` or `2 * cell`.
    pub fn encoder_width(&self) -> usize {
        self.encoder.output_width()
    }

    pub fn embedding(&self) -> &CharacterEmbeddingLayer {
        &self.embedding
    }

    pub fn encoder(&self) -> &SequenceEncoder {
        &self.encoder
    }

    pub fn convolution(&self) -> &LocalContextConvolution {
        &self.conv
    }

    pub fn head(&self) -> &ClassificationHead {
        &self.head
    }

    /// Total number of trainable parameters.
    pub fn n_params(&self) -> usize {
        self.embedding.n_params()
            + self.encoder.n_params()
            + self.conv.n_params()
            + self.head.n_params()
    }

    /// Scores a padded `[batch, max_len]` id array in inference mode.
    ///
    /// The result has `lengths.iter().sum()` entries, sequence-major then position-major.
    ///
    /// # Errors
    ///
    /// * [`SlimcutError::Shape`] is returned when `lengths` does not describe `ids`.
    /// * [`SlimcutError::Range`] is returned when a code is outside the vocabulary.
    pub fn forward(&self, ids: ArrayView2<u32>, lengths: &[usize]) -> Result<Vec<f32>> {
        let features = self.features(ids, lengths)?;
        let mut scores = Vec::with_capacity(lengths.iter().sum());
        for (b, &len) in lengths.iter().enumerate() {
            let ys = self.head.forward(features.slice(s![b, ..len, ..]))?;
            scores.extend(ys.iter());
        }
        Ok(scores)
    }

    /// Same as [`Model::forward()`], but with dropout active. Dropout masks are drawn from
    /// `rng`.
    ///
    /// # Errors
    ///
    /// * [`SlimcutError::Shape`] is returned when `lengths` does not describe `ids`.
    /// * [`SlimcutError::Range`] is returned when a code is outside the vocabulary.
    pub fn forward_train<R>(
        &self,
        ids: ArrayView2<u32>,
        lengths: &[usize],
        rng: &mut R,
    ) -> Result<Vec<f32>>
    where
        R: Rng + ?Sized,
    {
        let features = self.features(ids, lengths)?;
        let mut scores = Vec::with_capacity(lengths.iter().sum());
        for (b, &len) in lengths.iter().enumerate() {
            let ys = self
                .head
                .forward_train(features.slice(s![b, ..len, ..]), rng)?;
            scores.extend(ys.iter());
        }
        Ok(scores)
    }

    // Embedding, LSTM and convolution. Returns `[batch, max_len, conv]`.
    fn features(&self, ids: ArrayView2<u32>, lengths: &[usize]) -> Result<Array3<f32>> {
        let (batch_size, max_len) = ids.dim();
        validate_lengths(batch_size, max_len, lengths)?;
        tracing::trace!("scoring {batch_size} sequences padded to {max_len}");
        let embedded = self.embedding.forward(ids)?;
        let encoded = self.encoder.forward(embedded.view(), lengths)?;
        self.conv.forward(encoded.view())
    }

    /// Exports the model.
    ///
    /// # Errors
    ///
    /// When `wtr` generates an error, it will be returned as is.
    pub fn write<W>(&self, wtr: &mut W) -> Result<()>
    where
        W: Write,
    {
        wtr.write_all(MODEL_MAGIC)?;
        bincode::encode_into_std_write(self, wtr, bincode::config::standard())?;
        Ok(())
    }

    /// Reads a model written by [`Model::write()`].
    ///
    /// # Errors
    ///
    /// When `rdr` generates an error or the stored parameters do not agree with the stored
    /// configuration, an error variant will be returned. A body that is truncated or larger
    /// than [`MODEL_SIZE_LIMIT`] is a [`SlimcutError::DecodeError`].
    pub fn read<R>(rdr: &mut R) -> Result<Self>
    where
        R: Read,
    {
        let mut magic = [0; MODEL_MAGIC.len()];
        rdr.read_exact(&mut magic)?;
        if magic != MODEL_MAGIC {
            return Err(SlimcutError::invalid_argument(
                "rdr",
                "model format unsupported",
            ));
        }
        let model: Self = bincode::decode_from_std_read(
            rdr,
            bincode::config::standard().with_limit::<MODEL_SIZE_LIMIT>(),
        )?;
        model.validate()?;
        tracing::debug!(
            "read model: num_tokens={} config={} params={}",
            model.num_tokens(),
            model.config,
            model.n_params(),
        );
        Ok(model)
    }

    fn validate(&self) -> Result<()> {
        self.data_config
            .validate()
            .and_then(|()| self.config.validate())
            .map_err(|e| SlimcutError::invalid_model(e.to_string()))?;
        self.embedding.validate()?;
        self.encoder.validate()?;
        self.conv.validate()?;
        self.head.validate()?;

        let config = &self.config;
        let mismatch = if self.embedding.num_tokens() != self.data_config.num_tokens {
            Some("embedding rows")
        } else if self.embedding.width() != config.emb {
            Some("embedding width")
        } else if self.encoder.input_width() != config.emb {
            Some("LSTM input width")
        } else if self.encoder.is_bidirectional() != config.bidirectional
            || self.encoder.output_width() != config.encoder_width()
        {
            Some("LSTM output width")
        } else if self.conv.in_channels() != config.encoder_width() {
            Some("convolution input channels")
        } else if self.conv.out_channels() != config.conv {
            Some("convolution output channels")
        } else if self.head.in_features() != config.conv {
            Some("classification head input width")
        } else if self.head.hidden_features() != config.l1 {
            Some("classification head hidden width")
        } else if self.head.dropout() != config.dropout {
            Some("classification head dropout")
        } else {
            None
        };
        if let Some(what) = mismatch {
            return Err(SlimcutError::invalid_model(format!(
                "inconsistent {what} for the configuration {config}",
            )));
        }
        Ok(())
    }
}

impl SequenceScorer for Model {
    fn num_tokens(&self) -> usize {
        self.data_config.num_tokens
    }

    fn score(&self, batch: &InputBatch) -> Result<Vec<f32>> {
        self.forward(batch.ids(), batch.lengths())
    }
}
