pub mod openai;

use crate::error::Result;
use async_trait::async_trait;

pub use openai::OpenAiClient;

/// Counts tokens the way the provider will bill them
pub trait TokenCounter {
    fn count_tokens(&self, text: &str) -> usize;
}

/// A chat-completion style language model
#[async_trait]
pub trait LlmProvider: TokenCounter + Send + Sync {
    /// Complete `prompt`, optionally under a system prompt
    async fn complete(&self, prompt: &str, system_prompt: Option<&str>) -> Result<String>;

    /// Maximum context size of the configured model, in tokens
    fn max_tokens(&self) -> usize;

    /// Budget for request text, leaving room for prompt scaffolding
    fn safe_token_budget(&self) -> usize {
        safe_budget(self.max_tokens())
    }
}

/// 80% of `max_tokens`, rounded down
pub fn safe_budget(max_tokens: usize) -> usize {
    max_tokens * 4 / 5
}

/// Deterministic token estimate.
///
/// CJK and full-width characters count one token each; any other run of
/// characters counts one token per four characters, rounded up.
pub fn estimate_tokens(text: &str) -> usize {
    let mut tokens = 0;
    let mut run = 0usize;
    for c in text.chars() {
        if is_wide(c) {
            tokens += run.div_ceil(4) + 1;
            run = 0;
        } else {
            run += 1;
        }
    }
    tokens + run.div_ceil(4)
}

fn is_wide(c: char) -> bool {
    matches!(c,
        '\u{2E80}'..='\u{9FFF}'
        | '\u{AC00}'..='\u{D7AF}'
        | '\u{F900}'..='\u{FAFF}'
        | '\u{FF00}'..='\u{FFEF}'
        | '\u{20000}'..='\u{2FA1F}')
}
