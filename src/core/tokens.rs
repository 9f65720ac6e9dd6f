//! Token accounting.
//!
//! Uses tiktoken-rs BPE tokenizers: the model's own encoding when tiktoken
//! knows the model, `cl100k_base` otherwise. Each message carries a fixed
//! overhead for role markers and each image block a fixed cost.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use tiktoken_rs::tokenizer::{get_tokenizer, Tokenizer};
use tiktoken_rs::CoreBPE;

use crate::core::error::ChatError;
use crate::core::message::{ContentBlock, Message};
use crate::core::registry::ModelRegistry;

/// Role markers and separators per message.
pub const MESSAGE_OVERHEAD_TOKENS: usize = 4;
/// Priming for the reply, counted once per request.
pub const CONVERSATION_FRAMING_TOKENS: usize = 2;
/// Flat estimate for one image attachment (low-detail tile).
pub const IMAGE_BLOCK_TOKENS: usize = 85;

static CL100K: LazyLock<Option<CoreBPE>> = LazyLock::new(|| tiktoken_rs::cl100k_base().ok());
static O200K: LazyLock<Option<CoreBPE>> = LazyLock::new(|| tiktoken_rs::o200k_base().ok());

fn encoder_for(model: &str) -> Option<&'static CoreBPE> {
    match get_tokenizer(model) {
        Some(Tokenizer::O200kBase) => O200K.as_ref(),
        _ => CL100K.as_ref(),
    }
}

/// Count tokens for a text string using the model's tokenizer profile.
pub fn count_tokens(text: &str, model: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    match encoder_for(model) {
        Some(bpe) => bpe.encode_ordinary(text).len(),
        // Roughly four characters per token when no encoder is available.
        None => text.chars().count().div_ceil(4),
    }
}

pub fn count_message_tokens(message: &Message, model: &str) -> usize {
    MESSAGE_OVERHEAD_TOKENS
        + message
            .content
            .iter()
            .map(|block| match block {
                ContentBlock::Text { text } => count_tokens(text, model),
                ContentBlock::Image { .. } => IMAGE_BLOCK_TOKENS,
            })
            .sum::<usize>()
}

pub fn count_conversation_tokens(messages: &[Arc<Message>], model: &str) -> usize {
    CONVERSATION_FRAMING_TOKENS
        + messages
            .iter()
            .map(|message| count_message_tokens(message, model))
            .sum::<usize>()
}

/// Returns the longest suffix of `messages` whose estimated size fits in
/// `budget`. Never returns an empty history: if the most recent message
/// alone exceeds the budget the call fails instead.
pub fn limit_message_tokens(
    messages: &[Arc<Message>],
    budget: usize,
    model: &str,
) -> Result<Vec<Arc<Message>>, ChatError> {
    let Some(latest) = messages.last() else {
        return Err(ChatError::NoMessages);
    };

    let mut used = 0usize;
    let mut start = messages.len();
    for (index, message) in messages.iter().enumerate().rev() {
        let cost = count_message_tokens(message, model);
        if used + cost > budget {
            break;
        }
        used += cost;
        start = index;
    }

    if start == messages.len() {
        return Err(ChatError::TokenBudgetExceeded {
            budget,
            required: count_message_tokens(latest, model),
        });
    }

    Ok(messages[start..].to_vec())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub images: usize,
}

/// Cumulative usage per model, used for cost display.
#[derive(Debug, Clone, Default)]
pub struct UsageLedger {
    by_model: HashMap<String, TokenUsage>,
}

impl UsageLedger {
    /// Attributes one request/response exchange to `model`.
    pub fn record(&mut self, model: &str, input: &[Arc<Message>], response: &Message) {
        let images = response.content.iter().filter(|b| b.is_image()).count();
        let entry = self.by_model.entry(model.to_string()).or_default();
        entry.prompt_tokens += count_conversation_tokens(input, model);
        entry.completion_tokens += count_message_tokens(response, model);
        entry.images += images;
    }

    pub fn usage(&self, model: &str) -> TokenUsage {
        self.by_model.get(model).copied().unwrap_or_default()
    }

    pub fn models(&self) -> impl Iterator<Item = (&str, &TokenUsage)> {
        self.by_model.iter().map(|(model, usage)| (model.as_str(), usage))
    }

    /// Estimated spend across all models, priced from the registry.
    pub fn total_cost(&self, registry: &ModelRegistry) -> f64 {
        self.by_model
            .iter()
            .filter_map(|(model, usage)| {
                registry.get(model).map(|capability| {
                    let cost = capability.cost;
                    usage.prompt_tokens as f64 * cost.prompt.price
                        / f64::from(cost.prompt.unit.max(1))
                        + usage.completion_tokens as f64 * cost.completion.price
                            / f64::from(cost.completion.unit.max(1))
                        + usage.images as f64 * cost.image.price / f64::from(cost.image.unit.max(1))
                })
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::ModelsDocument;
    use crate::core::message::{ImageDetail, Role};

    const MODEL: &str = "gpt-4";

    fn history(texts: &[&str]) -> Vec<Arc<Message>> {
        texts
            .iter()
            .enumerate()
            .map(|(i, text)| {
                let message = if i % 2 == 0 {
                    Message::user(*text)
                } else {
                    Message::assistant(*text)
                };
                Arc::new(message)
            })
            .collect()
    }

    #[test]
    fn counts_include_overhead_and_images() {
        let text_only = Message::user("hello");
        let with_image = Message::new(
            Role::User,
            vec![
                ContentBlock::text("hello"),
                ContentBlock::image("https://x", ImageDetail::Auto),
            ],
        );
        let base = count_message_tokens(&text_only, MODEL);
        assert!(base > MESSAGE_OVERHEAD_TOKENS);
        assert_eq!(count_message_tokens(&with_image, MODEL), base + IMAGE_BLOCK_TOKENS);
    }

    #[test]
    fn concurrent_counts_agree() {
        let text = "The quick brown fox jumps over the lazy dog.";
        let expected = count_tokens(text, "gpt-4o");

        let counts: Vec<usize> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| count_tokens(text, "gpt-4o")))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(expected > 0);
        assert!(counts.iter().all(|&count| count == expected));
    }

    #[test]
    fn generous_budget_keeps_everything() {
        let messages = history(&["one", "two", "three"]);
        let limited = limit_message_tokens(&messages, 10_000, MODEL).unwrap();
        assert_eq!(limited.len(), 3);
    }

    #[test]
    fn tight_budget_keeps_the_longest_fitting_suffix() {
        let messages = history(&[
            "an early message that is fairly long and should be dropped first",
            "short",
            "latest",
        ]);
        let tail_cost: usize = messages[1..]
            .iter()
            .map(|m| count_message_tokens(m, MODEL))
            .sum();

        let limited = limit_message_tokens(&messages, tail_cost, MODEL).unwrap();

        assert_eq!(limited.len(), 2);
        assert!(Arc::ptr_eq(&limited[0], &messages[1]));
        assert!(Arc::ptr_eq(&limited[1], &messages[2]));
    }

    #[test]
    fn suffix_stops_at_first_message_that_does_not_fit() {
        let messages = history(&["tiny", "a considerably longer middle message here", "end"]);
        let last = count_message_tokens(&messages[2], MODEL);
        let first = count_message_tokens(&messages[0], MODEL);
        // Room for the last and first but not the middle: still only a suffix.
        let limited = limit_message_tokens(&messages, last + first, MODEL).unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn latest_message_over_budget_is_an_error() {
        let messages = history(&["hello there, this will not fit"]);
        let cost = count_message_tokens(&messages[0], MODEL);

        let err = limit_message_tokens(&messages, cost - 1, MODEL).unwrap_err();

        assert_eq!(
            err,
            ChatError::TokenBudgetExceeded {
                budget: cost - 1,
                required: cost
            }
        );
    }

    #[test]
    fn empty_history_is_rejected() {
        assert_eq!(
            limit_message_tokens(&[], 100, MODEL).unwrap_err(),
            ChatError::NoMessages
        );
    }

    #[test]
    fn ledger_accumulates_per_model_and_prices_images() {
        let registry = ModelRegistry::from_document(ModelsDocument::default(), &[]);
        let mut ledger = UsageLedger::default();
        let input = history(&["draw a fox"]);
        let image_reply = Message::new(
            Role::Assistant,
            vec![ContentBlock::image("https://img", ImageDetail::Auto)],
        );

        ledger.record("dall-e-2", &input, &image_reply);
        ledger.record("dall-e-2", &input, &image_reply);

        let usage = ledger.usage("dall-e-2");
        assert_eq!(usage.images, 2);
        assert_eq!(
            usage.prompt_tokens,
            2 * count_conversation_tokens(&input, "dall-e-2")
        );
        let cost = ledger.total_cost(&registry);
        assert!((cost - 0.04).abs() < 1e-9);
        assert_eq!(ledger.usage("unused"), TokenUsage::default());
    }
}
