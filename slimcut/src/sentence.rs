use crate::errors::{Result, SlimcutError};

/// Boundary type.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[repr(u8)]
pub enum BoundaryType {
    /// Inner of a word.
    NotWordBoundary = 0,

    /// Word boundary.
    WordBoundary = 1,

    /// Unknown. (Not annotated.)
    Unknown = 2,
}

/// Sentence with boundary annotations and scores.
#[derive(Debug, PartialEq, Clone)]
pub struct Sentence {
    text: String,
    chars: Vec<char>,
    char_to_str_pos: Vec<usize>,
    boundaries: Vec<BoundaryType>,
    boundary_scores: Option<Vec<f32>>,
}

impl Sentence {
    fn from_parts(chars: Vec<char>, boundaries: Vec<BoundaryType>) -> Self {
        let mut char_to_str_pos = Vec::with_capacity(chars.len() + 1);
        let mut pos = 0;
        char_to_str_pos.push(0);
        for &c in &chars {
            pos += c.len_utf8();
            char_to_str_pos.push(pos);
        }
        Self {
            text: chars.iter().collect(),
            chars,
            char_to_str_pos,
            boundaries,
            boundary_scores: None,
        }
    }

    /// Creates a new [`Sentence`] from a string without any annotation.
    ///
    /// All boundaries are [`BoundaryType::Unknown`].
    ///
    /// # Errors
    ///
    /// If the given `text` is empty, an error variant will be returned.
    ///
    /// # Examples
    ///
    /// ```
    /// use slimcut::Sentence;
    ///
    /// let s = Sentence::from_raw("สวัสดีครับ");
    /// assert!(s.is_ok());
    ///
    /// let s = Sentence::from_raw("");
    /// assert!(s.is_err());
    /// ```
    pub fn from_raw<S>(text: S) -> Result<Self>
    where
        S: AsRef<str>,
    {
        let text = text.as_ref();
        if text.is_empty() {
            return Err(SlimcutError::invalid_argument("text", "is empty"));
        }
        let chars: Vec<char> = text.chars().collect();
        let boundaries = vec![BoundaryType::Unknown; chars.len() - 1];
        Ok(Self::from_parts(chars, boundaries))
    }

    /// Gets the string without any annotation.
    pub fn to_raw_string(&self) -> &str {
        &self.text
    }

    /// Creates a new [`Sentence`] from a text whose words are separated by single spaces.
    ///
    /// A backslash escapes the following character, so `\ ` is a space inside a word.
    ///
    /// # Errors
    ///
    /// This function will return an error variant when:
    ///
    /// * `tokenized_text` is empty.
    /// * `tokenized_text` starts/ends with a whitespace.
    /// * `tokenized_text` contains consecutive whitespaces.
    ///
    /// # Examples
    ///
    /// ```
    /// use slimcut::{BoundaryType, Sentence};
    ///
    /// let s = Sentence::from_tokenized("ab c").unwrap();
    /// assert_eq!(
    ///     &[BoundaryType::NotWordBoundary, BoundaryType::WordBoundary],
    ///     s.boundaries(),
    /// );
    ///
    /// assert!(Sentence::from_tokenized("ab  c").is_err());
    /// ```
    pub fn from_tokenized<S>(tokenized_text: S) -> Result<Self>
    where
        S: AsRef<str>,
    {
        let tokenized_text = tokenized_text.as_ref();
        if tokenized_text.is_empty() {
            return Err(SlimcutError::invalid_argument("tokenized_text", "is empty"));
        }

        let mut chars = Vec::with_capacity(tokenized_text.len());
        let mut boundaries = Vec::with_capacity(tokenized_text.len());
        let mut prev_boundary = false;
        let mut escape = false;
        for c in tokenized_text.chars() {
            match (escape, c) {
                (false, '\\') => {
                    escape = true;
                }
                (false, ' ') => {
                    if chars.is_empty() {
                        return Err(SlimcutError::invalid_argument(
                            "tokenized_text",
                            "starts with a whitespace",
                        ));
                    } else if prev_boundary {
                        return Err(SlimcutError::invalid_argument(
                            "tokenized_text",
                            "contains consecutive whitespaces",
                        ));
                    }
                    prev_boundary = true;
                }
                (_, _) => {
                    if !chars.is_empty() {
                        boundaries.push(if prev_boundary {
                            BoundaryType::WordBoundary
                        } else {
                            BoundaryType::NotWordBoundary
                        });
                    }
                    prev_boundary = false;
                    escape = false;
                    chars.push(c);
                }
            }
        }
        if prev_boundary {
            return Err(SlimcutError::invalid_argument(
                "tokenized_text",
                "ends with a whitespace",
            ));
        }
        if chars.is_empty() {
            return Err(SlimcutError::invalid_argument(
                "tokenized_text",
                "contains no characters",
            ));
        }
        Ok(Self::from_parts(chars, boundaries))
    }

    /// Generates a string with whitespaces for word boundaries.
    ///
    /// # Errors
    ///
    /// If the sentence contains unknown boundary, an error variant will be returned.
    ///
    /// # Examples
    ///
    /// ```
    /// use slimcut::Sentence;
    ///
    /// let s = Sentence::from_tokenized("ab c\\ d").unwrap();
    /// assert_eq!("ab c\\ d", s.to_tokenized_string().unwrap());
    /// ```
    pub fn to_tokenized_string(&self) -> Result<String> {
        let mut result = String::with_capacity(self.text.len() * 2);
        for (i, &c) in self.chars.iter().enumerate() {
            if i != 0 {
                match self.boundaries[i - 1] {
                    BoundaryType::WordBoundary => result.push(' '),
                    BoundaryType::NotWordBoundary => (),
                    BoundaryType::Unknown => {
                        return Err(SlimcutError::invalid_argument(
                            "boundaries",
                            "sentence contains an unknown boundary",
                        ));
                    }
                }
            }
            if matches!(c, '\\' | ' ') {
                result.push('\\');
            }
            result.push(c);
        }
        Ok(result)
    }

    /// Generates a vector of words.
    ///
    /// # Errors
    ///
    /// If the sentence contains unknown boundaries, an error variant will be returned.
    pub fn to_tokenized_vec(&self) -> Result<Vec<&str>> {
        let mut result = vec![];
        let mut start = 0;
        for (i, b) in self.boundaries.iter().enumerate() {
            match b {
                BoundaryType::WordBoundary => {
                    let end = self.char_to_str_pos[i + 1];
                    result.push(&self.text[start..end]);
                    start = end;
                }
                BoundaryType::NotWordBoundary => (),
                BoundaryType::Unknown => {
                    return Err(SlimcutError::invalid_argument(
                        "boundaries",
                        "sentence contains an unknown boundary",
                    ));
                }
            }
        }
        result.push(&self.text[start..]);
        Ok(result)
    }

    /// Characters of the sentence.
    pub fn chars(&self) -> &[char] {
        &self.chars
    }

    /// Boundaries between adjacent characters; one fewer than the characters.
    pub fn boundaries(&self) -> &[BoundaryType] {
        &self.boundaries
    }

    pub fn boundaries_mut(&mut self) -> &mut [BoundaryType] {
        &mut self.boundaries
    }

    /// One score per character, set by [`Predictor`](crate::Predictor). The score of character
    /// `i` rates a word boundary after it; the last one rates the end of the text.
    pub fn boundary_scores(&self) -> Option<&[f32]> {
        self.boundary_scores.as_deref()
    }

    /// Moves the scores out, leaving [`None`] in their place.
    pub fn take_boundary_scores(&mut self) -> Option<Vec<f32>> {
        self.boundary_scores.take()
    }

    pub(crate) fn set_boundary_scores(&mut self, scores: Vec<f32>) {
        debug_assert_eq!(scores.len(), self.chars.len());
        self.boundary_scores = Some(scores);
    }
}
