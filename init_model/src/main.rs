use std::fs::{self, File};
use std::io::{prelude::*, stderr, BufReader, BufWriter};
use std::path::{Path, PathBuf};

use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use slimcut::{
    CharacterVocabulary, DataConfig, Model, ModelConfig, Sentence, DEFAULT_MODEL_PARAMS,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "A program to initialize models of Slimcut.")]
struct Args {
    /// A tokenized corpus to collect characters from
    #[arg(long, required = true)]
    tok: Vec<PathBuf>,

    /// The file to write the initialized model to
    #[arg(long)]
    model: PathBuf,

    /// The file to write the character vocabulary to
    #[arg(long)]
    vocab: PathBuf,

    /// Model hyperparameters as `key:value` pairs separated by `|`
    #[arg(long, default_value = DEFAULT_MODEL_PARAMS)]
    model_config: String,

    /// Seed of the parameter initialization (random if omitted)
    #[arg(long)]
    seed: Option<u64>,

    /// Characters occurring fewer times than this value are encoded as unknown
    #[arg(long, default_value = "1")]
    min_freq: usize,

    /// The number of workers for zstd (0 means multithreaded will be disabled)
    #[arg(long, default_value = "0")]
    zstd_workers: u32,
}

// Writes to a sibling temporary file first so that `path` is replaced as a whole.
fn write_compressed<F>(
    path: &Path,
    workers: u32,
    write: F,
) -> Result<(), Box<dyn std::error::Error>>
where
    F: FnOnce(&mut zstd::Encoder<'static, BufWriter<File>>) -> slimcut::Result<()>,
{
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    let result = (|| -> Result<(), Box<dyn std::error::Error>> {
        let mut f = zstd::Encoder::new(BufWriter::new(File::create(&tmp_path)?), 19)?;
        f.multithread(workers)?;
        write(&mut f)?;
        f.finish()?.flush()?;
        fs::rename(&tmp_path, path)?;
        Ok(())
    })();
    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(stderr)
        .init();

    let args = Args::parse();
    let config: ModelConfig = args.model_config.parse()?;

    eprintln!("Loading dataset...");
    let mut lines = vec![];
    for path in &args.tok {
        eprintln!("Loading {path:?} ...");
        let f = BufReader::new(File::open(path)?);
        for (i, line) in f.lines().enumerate() {
            if i % 10000 == 0 {
                eprint!("# of sentences: {i}\r");
                stderr().flush()?;
            }
            let line = line?;
            if line.is_empty() {
                continue;
            }
            let s = Sentence::from_tokenized(&line)?;
            lines.push(s.to_raw_string().to_string());
        }
        eprintln!("# of sentences: {}", lines.len());
    }

    let vocab = CharacterVocabulary::from_corpus(&lines, args.min_freq);
    eprintln!("# of characters: {}", vocab.chars().len());

    eprintln!("Initializing model: {config}");
    let data_config = DataConfig::new(vocab.num_tokens());
    let model = match args.seed {
        Some(seed) => Model::from_rng(data_config, config, &mut StdRng::seed_from_u64(seed))?,
        None => Model::new(data_config, config)?,
    };
    eprintln!("# of parameters: {}", model.n_params());

    write_compressed(&args.vocab, args.zstd_workers, |f| vocab.write(f))?;
    write_compressed(&args.model, args.zstd_workers, |f| model.write(f))?;
    eprintln!("Wrote {:?} and {:?}", args.model, args.vocab);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use slimcut::SlimcutError;
    use tempfile::tempdir;

    fn tmp_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }

    #[test]
    fn test_write_compressed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vocab.zst");
        let vocab = CharacterVocabulary::from_corpus(["กขค"], 1);
        write_compressed(&path, 0, |f| vocab.write(f)).unwrap();

        let mut f = zstd::Decoder::new(File::open(&path).unwrap()).unwrap();
        assert_eq!(vocab, CharacterVocabulary::read(&mut f).unwrap());
        assert!(!tmp_path(&path).exists());
    }

    #[test]
    fn test_write_compressed_removes_tmp_on_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.zst");
        let result = write_compressed(&path, 0, |f| {
            f.write_all(b"partial")?;
            Err(SlimcutError::from(std::io::Error::other("disk full")))
        });

        assert!(result.is_err());
        assert!(!tmp_path(&path).exists());
        assert!(!path.exists());
    }
}
