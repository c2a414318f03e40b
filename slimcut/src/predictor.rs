use crate::batch::InputBatch;
use crate::errors::{Result, SlimcutError};
use crate::model::{Model, SequenceScorer};
use crate::sentence::Sentence;
use crate::vocab::CharacterVocabulary;

const DEFAULT_BATCH_SIZE: usize = 32;

/// Predictor.
///
/// Attaches boundary scores to sentences, feeding the scorer a fixed number of sentences at a
/// time.
pub struct Predictor<S = Model> {
    scorer: S,
    vocab: CharacterVocabulary,
    batch_size: usize,
}

impl<S> Predictor<S>
where
    S: SequenceScorer,
{
    /// Creates a new predictor.
    ///
    /// # Errors
    ///
    /// [`SlimcutError::InvalidArgument`] is returned when `vocab` produces codes that `scorer`
    /// does not accept.
    pub fn new(scorer: S, vocab: CharacterVocabulary) -> Result<Self> {
        if vocab.num_tokens() > scorer.num_tokens() {
            return Err(SlimcutError::invalid_argument(
                "vocab",
                format!(
                    "vocabulary has {} codes but the scorer accepts {}",
                    vocab.num_tokens(),
                    scorer.num_tokens(),
                ),
            ));
        }
        Ok(Self {
            scorer,
            vocab,
            batch_size: DEFAULT_BATCH_SIZE,
        })
    }

    /// Sets the number of sentences scored together. 0 is treated as 1.
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Fills the boundary scores of every sentence.
    ///
    /// # Errors
    ///
    /// Errors of the scorer are returned as is.
    pub fn predict(&self, mut sentences: Vec<Sentence>) -> Result<Vec<Sentence>> {
        for chunk in sentences.chunks_mut(self.batch_size) {
            let codes: Vec<Vec<u32>> = chunk
                .iter()
                .map(|s| self.vocab.encode(s.to_raw_string()))
                .collect();
            let batch = InputBatch::from_sequences(&codes)?;
            let scores = self.scorer.score(&batch)?;
            if scores.len() != batch.total_len() {
                return Err(SlimcutError::shape(format!(
                    "scorer returned {} scores for {} characters",
                    scores.len(),
                    batch.total_len(),
                )));
            }
            let mut rest = scores.as_slice();
            for (sentence, &len) in chunk.iter_mut().zip(batch.lengths()) {
                let (head, tail) = rest.split_at(len);
                sentence.set_boundary_scores(head.to_vec());
                rest = tail;
            }
        }
        Ok(sentences)
    }

    /// Fills the boundary scores of one sentence.
    ///
    /// # Errors
    ///
    /// Errors of the scorer are returned as is.
    pub fn predict_one(&self, sentence: Sentence) -> Result<Sentence> {
        let mut sentences = self.predict(vec![sentence])?;
        sentences
            .pop()
            .ok_or_else(|| SlimcutError::shape("scorer returned no sentence"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use crate::config::{DataConfig, ModelConfig};

    // Scores each character by its code, which makes the routing of scores visible.
    struct CodeScorer;

    impl SequenceScorer for CodeScorer {
        fn num_tokens(&self) -> usize {
            16
        }

        fn score(&self, batch: &InputBatch) -> Result<Vec<f32>> {
            let mut scores = vec![];
            for i in 0..batch.batch_size() {
                if let Some(seq) = batch.sequence(i) {
                    scores.extend(seq.iter().map(|&c| c as f32));
                }
            }
            Ok(scores)
        }
    }

    fn vocab() -> CharacterVocabulary {
        CharacterVocabulary::new(vec!['a', 'b', 'c', 'd']).unwrap()
    }

    #[test]
    fn test_predict_routes_scores() {
        let predictor = Predictor::new(CodeScorer, vocab()).unwrap().batch_size(2);
        let sentences = vec![
            Sentence::from_raw("abc").unwrap(),
            Sentence::from_raw("d").unwrap(),
            Sentence::from_raw("cxa").unwrap(),
        ];
        let sentences = predictor.predict(sentences).unwrap();

        assert_eq!(Some(&[2.0, 3.0, 4.0][..]), sentences[0].boundary_scores());
        assert_eq!(Some(&[5.0][..]), sentences[1].boundary_scores());
        assert_eq!(Some(&[4.0, 1.0, 2.0][..]), sentences[2].boundary_scores());
    }

    #[test]
    fn test_predict_empty() {
        let predictor = Predictor::new(CodeScorer, vocab()).unwrap();

        assert!(predictor.predict(vec![]).unwrap().is_empty());
    }

    #[test]
    fn test_new_vocab_too_large() {
        let chars = ('a'..='z').collect();
        let vocab = CharacterVocabulary::new(chars).unwrap();
        let e = Predictor::new(CodeScorer, vocab).err().unwrap();

        assert_eq!(
            "InvalidArgumentError: vocab: vocabulary has 28 codes but the scorer accepts 16",
            e.to_string()
        );
    }

    #[test]
    fn test_predict_with_model() {
        let mut rng = StdRng::seed_from_u64(0);
        let vocab = vocab();
        let config = ModelConfig::new(8, 6, 4, 4).bidirectional(true);
        let model =
            Model::from_rng(DataConfig::new(vocab.num_tokens()), config, &mut rng).unwrap();
        let predictor = Predictor::new(model, vocab).unwrap().batch_size(1);
        let s = predictor
            .predict_one(Sentence::from_raw("abcd").unwrap())
            .unwrap();

        assert_eq!(4, s.boundary_scores().unwrap().len());
    }
}
