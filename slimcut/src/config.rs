//! Model and data configurations.

use std::fmt;
use std::str::FromStr;

use bincode::{Decode, Encode};
use hashbrown::HashMap;

use crate::errors::{Result, SlimcutError};

/// Configuration string used when nothing else is specified.
pub const DEFAULT_MODEL_PARAMS: &str = "emb:32|conv:48|cell:16|bi:1|l1:16|do:0.1";

/// Parses a configuration string of `key:value` pairs separated by `|`.
///
/// Empty segments are skipped and the last occurrence of a key wins.
///
/// # Errors
///
/// When a segment has no `:` or its value is not a number, an error variant will be returned.
///
/// # Examples
///
/// ```
/// let params = slimcut::parse_model_params("emb:32|do:0.1").unwrap();
/// assert_eq!(Some(&32.0), params.get("emb"));
/// assert_eq!(Some(&0.1), params.get("do"));
/// ```
pub fn parse_model_params(params: &str) -> Result<HashMap<String, f64>> {
    let mut result = HashMap::new();
    for pair in params.split('|') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        let (key, value) = pair.split_once(':').ok_or_else(|| {
            SlimcutError::configuration("model_params", format!("`{pair}` is not a key:value pair"))
        })?;
        let value = value.trim().parse::<f64>().map_err(|_| {
            SlimcutError::configuration(
                "model_params",
                format!("value of `{}` is not a number", key.trim()),
            )
        })?;
        result.insert(key.trim().to_string(), value);
    }
    Ok(result)
}

/// Data-side configuration of a model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Encode, Decode)]
pub struct DataConfig {
    /// Vocabulary size, including the padding and unknown codes.
    pub num_tokens: usize,
}

impl DataConfig {
    /// Creates a data configuration for a vocabulary of `num_tokens` codes.
    pub const fn new(num_tokens: usize) -> Self {
        Self { num_tokens }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.num_tokens < 2 {
            return Err(SlimcutError::configuration(
                "num_tokens",
                "the vocabulary must contain the padding code and at least one more code",
            ));
        }
        Ok(())
    }
}

/// Hyperparameters of the LSTM + convolution scorer.
#[derive(Clone, Debug, PartialEq, Encode, Decode)]
pub struct ModelConfig {
    /// Embedding width (`emb`).
    pub emb: usize,

    /// Number of convolution output channels (`conv`).
    pub conv: usize,

    /// LSTM hidden width (`cell`).
    pub cell: usize,

    /// Whether the LSTM also reads right to left (`bi`).
    pub bidirectional: bool,

    /// Hidden width of the classification head (`l1`).
    pub l1: usize,

    /// Dropout probability in the classification head (`do`).
    pub dropout: f32,
}

impl ModelConfig {
    /// Creates a unidirectional configuration without dropout.
    pub const fn new(emb: usize, conv: usize, cell: usize, l1: usize) -> Self {
        Self {
            emb,
            conv,
            cell,
            bidirectional: false,
            l1,
            dropout: 0.0,
        }
    }

    /// Enables or disables the backward LSTM.
    pub const fn bidirectional(mut self, bidirectional: bool) -> Self {
        self.bidirectional = bidirectional;
        self
    }

    /// Sets the dropout probability.
    pub const fn dropout(mut self, dropout: f32) -> Self {
        self.dropout = dropout;
        self
    }

    /// Builds a configuration from parsed `key:value` parameters.
    ///
    /// Unknown keys are ignored.
    ///
    /// # Errors
    ///
    /// A missing `emb`, `conv`, `cell` or `l1`, or a value out of its domain, leads to
    /// [`SlimcutError::Configuration`].
    pub fn from_params(params: &HashMap<String, f64>) -> Result<Self> {
        let bidirectional = match params.get("bi") {
            None => false,
            Some(&v) if v == 0.0 => false,
            Some(&v) if v == 1.0 => true,
            Some(_) => return Err(SlimcutError::configuration("bi", "must be 0 or 1")),
        };
        #[allow(clippy::cast_possible_truncation)]
        let dropout = params.get("do").copied().unwrap_or(0.0) as f32;
        let config = Self {
            emb: width(params, "emb")?,
            conv: width(params, "conv")?,
            cell: width(params, "cell")?,
            bidirectional,
            l1: width(params, "l1")?,
            dropout,
        };
        config.validate()?;
        Ok(config)
    }

    /// Width of the encoder output.
    pub const fn encoder_width(&self) -> usize {
        if self.bidirectional {
            self.cell * 2
        } else {
            self.cell
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        for (key, value) in [
            ("emb", self.emb),
            ("conv", self.conv),
            ("cell", self.cell),
            ("l1", self.l1),
        ] {
            if value == 0 {
                return Err(SlimcutError::configuration(key, "must be a positive integer"));
            }
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(SlimcutError::configuration("do", "must be in [0, 1)"));
        }
        Ok(())
    }
}

fn width(params: &HashMap<String, f64>, key: &'static str) -> Result<usize> {
    let value = *params
        .get(key)
        .ok_or_else(|| SlimcutError::configuration(key, "required key is missing"))?;
    if !value.is_finite() || value < 1.0 || value.fract() != 0.0 || value > u32::MAX.into() {
        return Err(SlimcutError::configuration(key, "must be a positive integer"));
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Ok(value as usize)
}

impl FromStr for ModelConfig {
    type Err = SlimcutError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_params(&parse_model_params(s)?)
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self::new(32, 48, 16, 16).bidirectional(true).dropout(0.1)
    }
}

impl fmt::Display for ModelConfig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "emb:{}|conv:{}|cell:{}|bi:{}|l1:{}|do:{}",
            self.emb,
            self.conv,
            self.cell,
            u8::from(self.bidirectional),
            self.l1,
            self.dropout,
        )
    }
}
