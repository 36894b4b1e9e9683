use crate::llm::TokenCounter;

/// Extra margin applied to character windows cut from an oversized sentence
const WINDOW_MARGIN: f64 = 0.8;

/// Finds sentence boundaries. Returned pieces must cover the input exactly,
/// in order, with nothing dropped.
pub trait SentenceSplitter: Send + Sync {
    fn split<'a>(&self, text: &'a str) -> Vec<&'a str>;
}

/// Splits after any of a fixed set of terminator characters.
/// The terminator stays attached to the sentence it ends.
#[derive(Debug, Clone)]
pub struct DelimiterSplitter {
    terminators: Vec<char>,
}

impl DelimiterSplitter {
    pub fn new(terminators: &str) -> Self {
        Self {
            terminators: terminators.chars().collect(),
        }
    }
}

impl Default for DelimiterSplitter {
    fn default() -> Self {
        Self::new("。")
    }
}

impl SentenceSplitter for DelimiterSplitter {
    fn split<'a>(&self, text: &'a str) -> Vec<&'a str> {
        if self.terminators.is_empty() {
            return if text.is_empty() { Vec::new() } else { vec![text] };
        }
        text.split_inclusive(|c| self.terminators.contains(&c))
            .collect()
    }
}

/// A contiguous slice of the source text and its token count
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub text: String,
    pub tokens: usize,
}

/// Token-budgeted text segmentation.
///
/// Text that fits the budget is returned whole. Longer text is split into
/// sentences and packed greedily; a sentence that alone exceeds the budget is
/// cut into fixed-size character windows sized from its own chars-per-token
/// ratio. Window sizes are an estimate and are not re-counted.
///
/// Concatenating the returned segments in order always reproduces the input.
pub struct Chunker<'a, C: TokenCounter + ?Sized> {
    counter: &'a C,
    splitter: &'a dyn SentenceSplitter,
    budget: usize,
}

impl<'a, C: TokenCounter + ?Sized> Chunker<'a, C> {
    pub fn new(counter: &'a C, splitter: &'a dyn SentenceSplitter, budget: usize) -> Self {
        Self {
            counter,
            splitter,
            budget,
        }
    }

    pub fn chunk(&self, text: &str) -> Vec<Segment> {
        if text.is_empty() {
            return Vec::new();
        }

        let total = self.counter.count_tokens(text);
        if total <= self.budget {
            return vec![Segment {
                text: text.to_string(),
                tokens: total,
            }];
        }

        ::log::debug!(
            "Text has {} tokens, over the {} token budget; segmenting",
            total,
            self.budget
        );

        let mut segments = Vec::new();
        let mut current = String::new();
        let mut running = 0;

        for sentence in self.splitter.split(text) {
            let tokens = self.counter.count_tokens(sentence);

            if tokens > self.budget {
                ::log::debug!("Splitting oversized sentence ({} tokens)", tokens);
                flush(&mut segments, &mut current, &mut running);
                segments.extend(self.split_oversized(sentence, tokens));
                continue;
            }

            if running + tokens > self.budget {
                flush(&mut segments, &mut current, &mut running);
            }
            current.push_str(sentence);
            running += tokens;
        }
        flush(&mut segments, &mut current, &mut running);

        ::log::debug!("Produced {} segments", segments.len());
        segments
    }

    /// Cut a sentence that exceeds the budget into character windows
    fn split_oversized(&self, sentence: &str, tokens: usize) -> Vec<Segment> {
        let chars: Vec<char> = sentence.chars().collect();
        let chars_per_token = chars.len() as f64 / tokens as f64;
        let window =
            ((self.budget as f64 * chars_per_token * WINDOW_MARGIN).floor() as usize).max(1);

        chars
            .chunks(window)
            .map(|w| Segment {
                text: w.iter().collect(),
                tokens: (w.len() as f64 / chars_per_token).ceil() as usize,
            })
            .collect()
    }
}

fn flush(segments: &mut Vec<Segment>, current: &mut String, running: &mut usize) {
    if !current.is_empty() {
        segments.push(Segment {
            text: std::mem::take(current),
            tokens: *running,
        });
    }
    *running = 0;
}
