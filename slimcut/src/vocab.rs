use std::io::{Read, Write};

use bincode::{Decode, Encode};
use hashbrown::{HashMap, HashSet};

use crate::errors::{Result, SlimcutError};

/// Code reserved for "no character".
pub const PADDING_CODE: u32 = 0;

/// Code assigned to characters that are not in the vocabulary.
pub const UNKNOWN_CODE: u32 = 1;

const N_RESERVED: usize = 2;

const VOCAB_MAGIC: &[u8] = b"SlimcutVocabulary 0.1\n";

/// Largest number of bytes [`CharacterVocabulary::read()`] decodes after the header.
pub const VOCAB_SIZE_LIMIT: usize = 1 << 24;

#[derive(Encode, Decode)]
struct VocabularyData {
    chars: Vec<char>,
}

/// Mapping from characters to integer codes.
///
/// Code 0 is padding and code 1 is the unknown character; real characters start at 2.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CharacterVocabulary {
    chars: Vec<char>,
    ids: HashMap<char, u32>,
}

impl CharacterVocabulary {
    /// Creates a vocabulary from a list of characters.
    ///
    /// The first character gets code 2, the second code 3, and so on.
    ///
    /// # Errors
    ///
    /// An error variant will be returned if `chars` contains duplicates or is too large to be
    /// addressed with `u32` codes.
    pub fn new(chars: Vec<char>) -> Result<Self> {
        if u32::try_from(chars.len() + N_RESERVED).is_err() {
            return Err(SlimcutError::invalid_argument("chars", "too many characters"));
        }
        let mut seen = HashSet::with_capacity(chars.len());
        for &c in &chars {
            if !seen.insert(c) {
                return Err(SlimcutError::invalid_argument(
                    "chars",
                    format!("duplicated character {c:?}"),
                ));
            }
        }
        Ok(Self::from_distinct(chars))
    }

    /// Builds a vocabulary from corpus lines.
    ///
    /// Characters are ordered by descending frequency, then by code point. Characters seen fewer
    /// than `min_freq` times are left out and encode as [`UNKNOWN_CODE`].
    pub fn from_corpus<I, S>(lines: I, min_freq: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut freqs: HashMap<char, usize> = HashMap::new();
        for line in lines {
            for c in line.as_ref().chars() {
                *freqs.entry(c).or_default() += 1;
            }
        }
        let mut counted: Vec<_> = freqs
            .into_iter()
            .filter(|&(_, freq)| freq >= min_freq)
            .collect();
        counted.sort_unstable_by(|(c1, f1), (c2, f2)| f2.cmp(f1).then(c1.cmp(c2)));
        Self::from_distinct(counted.into_iter().map(|(c, _)| c).collect())
    }

    // `chars` must be distinct and fewer than `u32::MAX - 1`.
    fn from_distinct(chars: Vec<char>) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        let ids = chars
            .iter()
            .enumerate()
            .map(|(i, &c)| (c, (i + N_RESERVED) as u32))
            .collect();
        Self { chars, ids }
    }

    /// Number of codes, including the padding and unknown codes.
    pub fn num_tokens(&self) -> usize {
        self.chars.len() + N_RESERVED
    }

    /// Returns the code of `c`, if it is in the vocabulary.
    pub fn get(&self, c: char) -> Option<u32> {
        self.ids.get(&c).copied()
    }

    /// Returns the character of `code`. Reserved codes have no character.
    pub fn char_of(&self, code: u32) -> Option<char> {
        let idx = usize::try_from(code).ok()?.checked_sub(N_RESERVED)?;
        self.chars.get(idx).copied()
    }

    /// Characters in code order, starting with code 2.
    pub fn chars(&self) -> &[char] {
        &self.chars
    }

    /// Encodes a text into codes. Unseen characters become [`UNKNOWN_CODE`].
    pub fn encode(&self, text: &str) -> Vec<u32> {
        text.chars()
            .map(|c| self.get(c).unwrap_or(UNKNOWN_CODE))
            .collect()
    }

    /// Exports the vocabulary.
    ///
    /// # Errors
    ///
    /// When `wtr` generates an error, it will be returned as is.
    pub fn write<W>(&self, wtr: &mut W) -> Result<()>
    where
        W: Write,
    {
        wtr.write_all(VOCAB_MAGIC)?;
        let data = VocabularyData {
            chars: self.chars.clone(),
        };
        bincode::encode_into_std_write(data, wtr, bincode::config::standard())?;
        Ok(())
    }

    /// Reads a vocabulary written by [`CharacterVocabulary::write()`].
    ///
    /// # Errors
    ///
    /// When `rdr` generates an error or the data is not a vocabulary, an error variant will be
    /// returned. A body that is truncated or larger than [`VOCAB_SIZE_LIMIT`] is a
    /// [`SlimcutError::DecodeError`].
    pub fn read<R>(rdr: &mut R) -> Result<Self>
    where
        R: Read,
    {
        let mut magic = [0; VOCAB_MAGIC.len()];
        rdr.read_exact(&mut magic)?;
        if magic != VOCAB_MAGIC {
            return Err(SlimcutError::invalid_argument(
                "rdr",
                "vocabulary format unsupported",
            ));
        }
        let data: VocabularyData = bincode::decode_from_std_read(
            rdr,
            bincode::config::standard().with_limit::<VOCAB_SIZE_LIMIT>(),
        )?;
        Self::new(data.chars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_corpus_order() {
        let vocab = CharacterVocabulary::from_corpus(["abcab", "cbb"], 1);

        assert_eq!(&['b', 'a', 'c'], vocab.chars());
        assert_eq!(5, vocab.num_tokens());
        assert_eq!(Some(2), vocab.get('b'));
        assert_eq!(Some(4), vocab.get('c'));
    }

    #[test]
    fn test_from_corpus_min_freq() {
        let vocab = CharacterVocabulary::from_corpus(["aab", "ac"], 2);

        assert_eq!(&['a'], vocab.chars());
        assert_eq!(vec![2, 1, 2, 1], vocab.encode("abax"));
    }

    #[test]
    fn test_codes_skip_reserved() {
        let vocab = CharacterVocabulary::new(vec!['ก', 'ข']).unwrap();

        assert_eq!(None, vocab.char_of(PADDING_CODE));
        assert_eq!(None, vocab.char_of(UNKNOWN_CODE));
        assert_eq!(Some('ก'), vocab.char_of(2));
        assert_eq!(Some('ข'), vocab.char_of(3));
        assert_eq!(None, vocab.char_of(4));
        assert!(vocab.encode("กขค").iter().all(|&c| c != PADDING_CODE));
    }

    #[test]
    fn test_new_duplicated() {
        let e = CharacterVocabulary::new(vec!['a', 'b', 'a']).unwrap_err();

        assert_eq!(
            "InvalidArgumentError: chars: duplicated character 'a'",
            e.to_string()
        );
    }

    #[test]
    fn test_write_read() {
        let vocab = CharacterVocabulary::from_corpus(["สวัสดีครับ"], 1);
        let mut buf = vec![];
        vocab.write(&mut buf).unwrap();
        let restored = CharacterVocabulary::read(&mut buf.as_slice()).unwrap();

        assert_eq!(vocab, restored);
    }

    #[test]
    fn test_read_bad_magic() {
        let e = CharacterVocabulary::read(&mut b"NotAVocabularyFile....\n".as_slice()).unwrap_err();

        assert_eq!(
            "InvalidArgumentError: rdr: vocabulary format unsupported",
            e.to_string()
        );
    }

    #[test]
    fn test_read_truncated() {
        let mut buf = VOCAB_MAGIC.to_vec();
        buf.extend([3, b'a']);
        let e = CharacterVocabulary::read(&mut buf.as_slice()).unwrap_err();

        assert!(matches!(e, SlimcutError::DecodeError(_)));
    }

    #[test]
    fn test_read_oversized_length() {
        let mut buf = VOCAB_MAGIC.to_vec();
        buf.push(253);
        buf.extend((1u64 << 40).to_le_bytes());
        let e = CharacterVocabulary::read(&mut buf.as_slice()).unwrap_err();

        assert!(matches!(e, SlimcutError::DecodeError(_)));
    }
}
