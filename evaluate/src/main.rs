use std::fs::File;
use std::io::{prelude::*, stderr, stdin};
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use slimcut::{BoundaryType, CharacterVocabulary, Model, Predictor, Sentence};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum EvaluationMetric {
    /// Evaluates each character boundary
    Char,

    /// Evaluates each word using Nagata's method
    Word,
}

#[derive(Parser, Debug)]
#[command(
    name = "evaluate",
    about = "A program to evaluate the accuracy of Slimcut."
)]
struct Args {
    /// The model file to use when analyzing text
    #[arg(long)]
    model: PathBuf,

    /// The vocabulary file the model was initialized with
    #[arg(long)]
    vocab: PathBuf,

    /// Characters scoring at least this value are followed by a word boundary
    #[arg(long, default_value = "0", allow_hyphen_values = true)]
    threshold: f32,

    /// Number of sentences scored together
    #[arg(long, default_value = "32")]
    batch_size: usize,

    /// Evaluation metric
    #[arg(long, value_enum, default_value_t = EvaluationMetric::Char)]
    metric: EvaluationMetric,
}

fn apply_threshold(s: &mut Sentence, threshold: f32) {
    let Some(scores) = s.take_boundary_scores() else {
        return;
    };
    for (b, &score) in s.boundaries_mut().iter_mut().zip(&scores) {
        *b = if score >= threshold {
            BoundaryType::WordBoundary
        } else {
            BoundaryType::NotWordBoundary
        };
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(stderr)
        .init();

    let args = Args::parse();

    eprintln!("Loading model file...");
    let mut f = zstd::Decoder::new(File::open(&args.model)?)?;
    let model = Model::read(&mut f)?;
    let mut f = zstd::Decoder::new(File::open(&args.vocab)?)?;
    let vocab = CharacterVocabulary::read(&mut f)?;
    let predictor = Predictor::new(model, vocab)?.batch_size(args.batch_size);

    eprintln!("Start tokenization");
    let mut references = vec![];
    let mut sentences = vec![];
    for line in stdin().lock().lines() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        let s = Sentence::from_tokenized(line)?;
        references.push(s.boundaries().to_vec());
        sentences.push(s);
    }
    let mut results = vec![];
    for (reference, mut s) in references.into_iter().zip(predictor.predict(sentences)?) {
        apply_threshold(&mut s, args.threshold);
        results.push((reference, s.boundaries().to_vec()));
    }

    match args.metric {
        EvaluationMetric::Char => {
            let mut n_tp = 0u32;
            let mut n_tn = 0u32;
            let mut n_fp = 0u32;
            let mut n_fn = 0u32;
            for (rs, hs) in results {
                for (r, h) in rs.into_iter().zip(hs) {
                    if r == h {
                        if h == BoundaryType::WordBoundary {
                            n_tp += 1;
                        } else {
                            n_tn += 1;
                        }
                    } else if h == BoundaryType::WordBoundary {
                        n_fp += 1;
                    } else {
                        n_fn += 1;
                    }
                }
            }
            let precision = f64::from(n_tp) / f64::from(n_tp + n_fp);
            let recall = f64::from(n_tp) / f64::from(n_tp + n_fn);
            let f1 = 2. * precision * recall / (precision + recall);
            println!("Precision: {precision}");
            println!("Recall: {recall}");
            println!("F1: {f1}");
            println!("TP: {n_tp}, TN: {n_tn}, FP: {n_fp}, FN: {n_fn}");
        }
        EvaluationMetric::Word => {
            // Reference:
            // Masaaki Nagata. 1994. A stochastic Japanese morphological analyzer using a forward-DP
            // backward-A* n-best search algorithm. In COLING 1994 Volume 1: The 15th International
            // Conference on Computational Linguistics.
            let mut n_sys = 0u32;
            let mut n_ref = 0u32;
            let mut n_cor = 0u32;
            for (rs, hs) in results {
                let mut matched = true;
                for (r, h) in rs.into_iter().zip(hs) {
                    if r == h {
                        if h == BoundaryType::WordBoundary {
                            if matched {
                                n_cor += 1;
                            }
                            matched = true;
                            n_ref += 1;
                            n_sys += 1;
                        }
                    } else {
                        if h == BoundaryType::WordBoundary {
                            n_sys += 1;
                        } else {
                            n_ref += 1;
                        }
                        matched = false;
                    }
                }
                if matched {
                    n_cor += 1;
                }
                n_sys += 1;
                n_ref += 1;
            }
            let precision = f64::from(n_cor) / f64::from(n_sys);
            let recall = f64::from(n_cor) / f64::from(n_ref);
            let f1 = 2. * precision * recall / (precision + recall);
            println!("Precision: {precision}");
            println!("Recall: {recall}");
            println!("F1: {f1}");
        }
    }

    Ok(())
}
