#![cfg_attr(docsrs, feature(doc_cfg))]

//! # Slimcut
//!
//! Slimcut is a character-level word boundary scorer. Each character of a text receives a score
//! rating a word boundary after it, computed by an LSTM over character embeddings, a 5-wide
//! convolution and a small feed-forward head.
//!
//! ## Examples
//!
//! ```no_run
//! use std::fs::File;
//! use std::io::{prelude::*, stdin, BufReader};
//!
//! use slimcut::{BoundaryType, CharacterVocabulary, Model, Predictor, Sentence};
//!
//! let mut f = BufReader::new(File::open("model.bin").unwrap());
//! let model = Model::read(&mut f).unwrap();
//! let mut f = BufReader::new(File::open("vocab.bin").unwrap());
//! let vocab = CharacterVocabulary::read(&mut f).unwrap();
//! let predictor = Predictor::new(model, vocab).unwrap();
//!
//! for line in stdin().lock().lines() {
//!     let s = Sentence::from_raw(line.unwrap()).unwrap();
//!     let mut s = predictor.predict_one(s).unwrap();
//!     let scores = s.boundary_scores().unwrap().to_vec();
//!     for (b, &score) in s.boundaries_mut().iter_mut().zip(&scores) {
//!         *b = if score >= 0.0 {
//!             BoundaryType::WordBoundary
//!         } else {
//!             BoundaryType::NotWordBoundary
//!         };
//!     }
//!     println!("{}", s.to_tokenized_string().unwrap());
//! }
//! ```
//!
//! Sequences of a batch are encoded in parallel with **crate feature** `multithreading`.

pub mod errors;

mod batch;
mod config;
mod conv;
mod embedding;
mod encoder;
mod head;
mod layers;
mod model;
mod predictor;
mod sentence;
mod vocab;

pub use batch::InputBatch;
pub use config::{parse_model_params, DataConfig, ModelConfig, DEFAULT_MODEL_PARAMS};
pub use conv::{LocalContextConvolution, KERNEL_WIDTH};
pub use embedding::CharacterEmbeddingLayer;
pub use encoder::{LstmCell, PackedBatch, SequenceEncoder};
pub use errors::{Result, SlimcutError};
pub use head::ClassificationHead;
pub use layers::{relu, sigmoid, Linear};
pub use model::{Model, SequenceScorer, MODEL_SIZE_LIMIT};
pub use predictor::Predictor;
pub use sentence::{BoundaryType, Sentence};
pub use vocab::{CharacterVocabulary, PADDING_CODE, UNKNOWN_CODE, VOCAB_SIZE_LIMIT};
