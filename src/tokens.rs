// Token Estimator Module
// Deterministic whitespace-based token approximation used for both usage
// accounting and slicing canned bodies into streamable pieces.

use crate::openai::Message;

/// Split text into token pieces.
///
/// Each piece is a run of non-whitespace characters together with the
/// whitespace that precedes it, so concatenating the pieces reproduces the
/// text (trailing whitespace is folded into the last piece). Whitespace-only
/// input produces no pieces.
pub fn split_tokens(text: &str) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut in_word = false;

    for ch in text.chars() {
        if ch.is_whitespace() {
            if in_word {
                pieces.push(std::mem::take(&mut current));
                in_word = false;
            }
            current.push(ch);
        } else {
            current.push(ch);
            in_word = true;
        }
    }

    if in_word {
        pieces.push(current);
    } else if !current.is_empty() {
        if let Some(last) = pieces.last_mut() {
            last.push_str(&current);
        }
    }

    pieces
}

/// Estimate the number of tokens in a text.
///
/// Always equal to `split_tokens(text).len()`, without allocating the pieces.
pub fn estimate_tokens(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Estimate prompt tokens for a chat message list.
///
/// Sum of the per-message counts; messages without content count as zero.
pub fn estimate_prompt_tokens(messages: &[Message]) -> usize {
    messages
        .iter()
        .filter_map(|message| message.content.as_deref())
        .map(estimate_tokens)
        .sum()
}
