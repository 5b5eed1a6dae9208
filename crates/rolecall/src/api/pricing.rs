//! Static per-model pricing and cost arithmetic.
//!
//! Prices are USD per 1000 tokens. Each cloud provider has a table and a
//! default entry (its cheapest model) used for unknown model names. The
//! local provider is always free.

use crate::providers::Provider;
use serde::Serialize;

/// Cost per 1000 input and output tokens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PricingInfo {
    /// USD per 1000 prompt tokens.
    pub input: f64,
    /// USD per 1000 completion tokens.
    pub output: f64,
}

impl PricingInfo {
    pub const FREE: PricingInfo = PricingInfo {
        input: 0.0,
        output: 0.0,
    };

    const fn new(input: f64, output: f64) -> Self {
        Self { input, output }
    }

    /// Exact cost for a completed call.
    pub fn cost(&self, prompt_tokens: u32, completion_tokens: u32) -> f64 {
        (f64::from(prompt_tokens) / 1000.0) * self.input
            + (f64::from(completion_tokens) / 1000.0) * self.output
    }

    /// Rough cost for `tokens` tokens of unknown direction, priced at the
    /// mean of the input and output rates.
    pub fn estimate(&self, tokens: u32) -> f64 {
        (self.input + self.output) / 2.0 * (f64::from(tokens) / 1000.0)
    }
}

const OPENAI_PRICING: &[(&str, PricingInfo)] = &[
    ("gpt-4o-mini", PricingInfo::new(0.00015, 0.0006)),
    ("gpt-4o", PricingInfo::new(0.0025, 0.01)),
    ("gpt-4-turbo", PricingInfo::new(0.01, 0.03)),
    ("gpt-4", PricingInfo::new(0.03, 0.06)),
    ("gpt-3.5-turbo", PricingInfo::new(0.0005, 0.0015)),
    ("o1-mini", PricingInfo::new(0.003, 0.012)),
    ("o1", PricingInfo::new(0.015, 0.06)),
];

/// Fallback for unknown OpenAI models.
pub const OPENAI_DEFAULT_MODEL: &str = "gpt-4o-mini";

const ANTHROPIC_PRICING: &[(&str, PricingInfo)] = &[
    ("claude-3-5-sonnet-20241022", PricingInfo::new(0.003, 0.015)),
    ("claude-3-5-haiku-20241022", PricingInfo::new(0.0008, 0.004)),
    ("claude-3-opus-20240229", PricingInfo::new(0.015, 0.075)),
    ("claude-3-sonnet-20240229", PricingInfo::new(0.003, 0.015)),
    ("claude-3-haiku-20240307", PricingInfo::new(0.00025, 0.00125)),
];

/// Fallback for unknown Anthropic models.
pub const ANTHROPIC_DEFAULT_MODEL: &str = "claude-3-haiku-20240307";

fn lookup(table: &[(&str, PricingInfo)], model: &str) -> Option<PricingInfo> {
    table
        .iter()
        .find(|(name, _)| *name == model)
        .map(|(_, pricing)| *pricing)
}

/// Pricing for a provider/model pair.
///
/// Exact model names only: `gpt-4o-2024-08-06` is not `gpt-4o`. Unknown
/// names get the provider default.
pub fn pricing_for(provider: Provider, model: &str) -> PricingInfo {
    match provider {
        Provider::OpenAi => lookup(OPENAI_PRICING, model)
            .or_else(|| lookup(OPENAI_PRICING, OPENAI_DEFAULT_MODEL))
            .unwrap_or(PricingInfo::FREE),
        Provider::Anthropic => lookup(ANTHROPIC_PRICING, model)
            .or_else(|| lookup(ANTHROPIC_PRICING, ANTHROPIC_DEFAULT_MODEL))
            .unwrap_or(PricingInfo::FREE),
        Provider::Local => PricingInfo::FREE,
    }
}

/// Whether the pricing table has an exact entry for `model`.
pub fn has_pricing(provider: Provider, model: &str) -> bool {
    match provider {
        Provider::OpenAi => lookup(OPENAI_PRICING, model).is_some(),
        Provider::Anthropic => lookup(ANTHROPIC_PRICING, model).is_some(),
        Provider::Local => true,
    }
}
