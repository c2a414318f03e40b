//! Definition of errors.

use std::error::Error;
use std::fmt;

pub type Result<T, E = SlimcutError> = std::result::Result<T, E>;

#[derive(Debug)]
pub enum SlimcutError {
    Configuration(ConfigurationError),
    Shape(ShapeError),
    Range(RangeError),
    InvalidArgument(InvalidArgumentError),
    InvalidModel(InvalidModelError),
    DecodeError(bincode::error::DecodeError),
    EncodeError(bincode::error::EncodeError),
    IOError(std::io::Error),
}

impl SlimcutError {
    pub(crate) fn configuration<S>(key: &'static str, msg: S) -> Self
    where
        S: Into<String>,
    {
        Self::Configuration(ConfigurationError {
            key,
            msg: msg.into(),
        })
    }

    pub(crate) fn shape<S>(msg: S) -> Self
    where
        S: Into<String>,
    {
        Self::Shape(ShapeError { msg: msg.into() })
    }

    pub(crate) const fn range(code: u32, num_tokens: usize) -> Self {
        Self::Range(RangeError { code, num_tokens })
    }

    pub(crate) fn invalid_argument<S>(arg: &'static str, msg: S) -> Self
    where
        S: Into<String>,
    {
        Self::InvalidArgument(InvalidArgumentError {
            arg,
            msg: msg.into(),
        })
    }

    pub(crate) fn invalid_model<S>(msg: S) -> Self
    where
        S: Into<String>,
    {
        Self::InvalidModel(InvalidModelError { msg: msg.into() })
    }
}

impl fmt::Display for SlimcutError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Configuration(e) => e.fmt(f),
            Self::Shape(e) => e.fmt(f),
            Self::Range(e) => e.fmt(f),
            Self::InvalidArgument(e) => e.fmt(f),
            Self::InvalidModel(e) => e.fmt(f),
            Self::DecodeError(e) => e.fmt(f),
            Self::EncodeError(e) => e.fmt(f),
            Self::IOError(e) => e.fmt(f),
        }
    }
}

impl Error for SlimcutError {}

/// Error used when a model configuration key is missing or malformed.
#[derive(Debug)]
pub struct ConfigurationError {
    /// Name of the configuration key.
    pub(crate) key: &'static str,

    /// Error message.
    pub(crate) msg: String,
}

impl ConfigurationError {
    /// Returns the offending key.
    pub const fn key(&self) -> &'static str {
        self.key
    }
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ConfigurationError: {}: {}", self.key, self.msg)
    }
}

impl Error for ConfigurationError {}

/// Error used when a batch and its lengths vector disagree, or when the width produced by one
/// stage does not fit the next one.
#[derive(Debug)]
pub struct ShapeError {
    /// Error message.
    pub(crate) msg: String,
}

impl fmt::Display for ShapeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ShapeError: {}", self.msg)
    }
}

impl Error for ShapeError {}

/// Error used when a character code is outside the vocabulary.
#[derive(Debug)]
pub struct RangeError {
    /// The rejected code.
    pub(crate) code: u32,

    /// Size of the vocabulary.
    pub(crate) num_tokens: usize,
}

impl RangeError {
    /// Returns the rejected code.
    pub const fn code(&self) -> u32 {
        self.code
    }
}

impl fmt::Display for RangeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "RangeError: character code {} is out of range for {} tokens",
            self.code, self.num_tokens
        )
    }
}

impl Error for RangeError {}

/// Error used when the argument is invalid.
#[derive(Debug)]
pub struct InvalidArgumentError {
    /// Name of the argument.
    pub(crate) arg: &'static str,

    /// Error message.
    pub(crate) msg: String,
}

impl fmt::Display for InvalidArgumentError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "InvalidArgumentError: {}: {}", self.arg, self.msg)
    }
}

impl Error for InvalidArgumentError {}

/// Error used when the model is invalid.
#[derive(Debug)]
pub struct InvalidModelError {
    /// Error message.
    pub(crate) msg: String,
}

impl fmt::Display for InvalidModelError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "InvalidModelError: {}", self.msg)
    }
}

impl Error for InvalidModelError {}

impl From<bincode::error::DecodeError> for SlimcutError {
    fn from(error: bincode::error::DecodeError) -> Self {
        Self::DecodeError(error)
    }
}

impl From<bincode::error::EncodeError> for SlimcutError {
    fn from(error: bincode::error::EncodeError) -> Self {
        Self::EncodeError(error)
    }
}

impl From<std::io::Error> for SlimcutError {
    fn from(error: std::io::Error) -> Self {
        Self::IOError(error)
    }
}
