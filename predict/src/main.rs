use std::fs::File;
use std::io::{prelude::*, stderr, stdin, stdout, BufWriter};
use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use slimcut::{BoundaryType, CharacterVocabulary, Model, Predictor, Sentence};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "predict", about = "A program to perform word segmentation.")]
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

    /// Print boundary scores instead of tokenized text
    #[arg(long)]
    scores: bool,
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

fn flush_batch<W>(
    predictor: &Predictor,
    batch: &mut Vec<Option<Sentence>>,
    args: &Args,
    out: &mut W,
) -> Result<usize, Box<dyn std::error::Error>>
where
    W: Write,
{
    // Empty input lines are kept as they are.
    let has_text: Vec<bool> = batch.iter().map(Option::is_some).collect();
    let sentences: Vec<Sentence> = batch.drain(..).flatten().collect();
    let mut predicted = predictor.predict(sentences)?.into_iter();
    let mut n_chars = 0;
    for has_text in has_text {
        if !has_text {
            writeln!(out)?;
            continue;
        }
        let Some(mut s) = predicted.next() else {
            break;
        };
        n_chars += s.chars().len();
        if args.scores {
            let scores: Vec<String> = s
                .boundary_scores()
                .unwrap_or_default()
                .iter()
                .map(|v| v.to_string())
                .collect();
            writeln!(out, "{}", scores.join(" "))?;
        } else {
            apply_threshold(&mut s, args.threshold);
            writeln!(out, "{}", s.to_tokenized_string()?)?;
        }
    }
    Ok(n_chars)
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
    let mut out = BufWriter::new(stdout().lock());
    let mut n_chars = 0;
    let mut batch = Vec::with_capacity(args.batch_size);
    let start = Instant::now();
    for line in stdin().lock().lines() {
        let line = line?;
        batch.push(if line.is_empty() {
            None
        } else {
            Some(Sentence::from_raw(line)?)
        });
        if batch.len() >= args.batch_size {
            n_chars += flush_batch(&predictor, &mut batch, &args, &mut out)?;
        }
    }
    n_chars += flush_batch(&predictor, &mut batch, &args, &mut out)?;
    out.flush()?;

    let duration = start.elapsed();
    eprintln!("Elapsed: {} [sec]", duration.as_secs_f64());
    eprintln!(
        "Speed: {} [chars/sec]",
        n_chars as f64 / duration.as_secs_f64()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use slimcut::{InputBatch, SequenceScorer};

    struct AlternatingScorer;

    impl SequenceScorer for AlternatingScorer {
        fn num_tokens(&self) -> usize {
            8
        }

        fn score(&self, batch: &InputBatch) -> slimcut::Result<Vec<f32>> {
            Ok((0..batch.total_len())
                .map(|i| if i % 2 == 0 { 1.0 } else { -1.0 })
                .collect())
        }
    }

    #[test]
    fn test_apply_threshold() {
        let vocab = CharacterVocabulary::from_corpus(["abcd"], 1);
        let predictor = Predictor::new(AlternatingScorer, vocab).unwrap();
        let mut sentences = predictor
            .predict(vec![Sentence::from_raw("abcd").unwrap()])
            .unwrap();
        let s = &mut sentences[0];
        apply_threshold(s, 0.0);

        assert_eq!("a bc d", s.to_tokenized_string().unwrap());
        assert_eq!(None, s.boundary_scores());
    }

    #[test]
    fn test_apply_threshold_without_scores() {
        let mut s = Sentence::from_raw("abc").unwrap();
        apply_threshold(&mut s, 0.0);

        assert_eq!(&[BoundaryType::Unknown; 2], s.boundaries());
    }
}
