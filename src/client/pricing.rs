// src/client/pricing.rs
// Per-model price table. Prices are USD per 1k tokens.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    /// Cheapest and fastest; the speed/cost strategies land here
    Economy,
    /// Default mid-tier model
    Standard,
    /// Most capable model for debugging and high-debt work
    Premium,
}

#[derive(Debug, Clone, Copy)]
pub struct ModelPrice {
    pub model: &'static str,
    pub tier: ModelTier,
    pub input_per_1k: f64,
    pub output_per_1k: f64,
}

/// Known models, cheapest first. Unknown models are billed at the most
/// expensive entry so the cost gate errs toward rejection.
pub const PRICE_TABLE: &[ModelPrice] = &[
    ModelPrice {
        model: "gpt-5-nano",
        tier: ModelTier::Economy,
        input_per_1k: 0.000_05,
        output_per_1k: 0.000_40,
    },
    ModelPrice {
        model: "gpt-5-mini",
        tier: ModelTier::Standard,
        input_per_1k: 0.000_25,
        output_per_1k: 0.002_00,
    },
    ModelPrice {
        model: "gpt-5",
        tier: ModelTier::Premium,
        input_per_1k: 0.001_25,
        output_per_1k: 0.010_00,
    },
];

pub fn price_for(model: &str) -> ModelPrice {
    PRICE_TABLE
        .iter()
        .find(|p| p.model == model)
        .copied()
        .unwrap_or(PRICE_TABLE[PRICE_TABLE.len() - 1])
}

pub fn model_for_tier(tier: ModelTier) -> &'static str {
    PRICE_TABLE
        .iter()
        .find(|p| p.tier == tier)
        .map(|p| p.model)
        .unwrap_or(PRICE_TABLE[0].model)
}

pub fn cheapest_model() -> &'static str {
    model_for_tier(ModelTier::Economy)
}

/// Prompt text length / 4 is the token approximation used everywhere in the
/// engine; real counts come back from the provider after the fact.
pub fn estimate_tokens(text: &str) -> u32 {
    (text.len() / 4) as u32
}

/// Projected cost of a request before it is sent.
pub fn estimate_cost(model: &str, prompt: &str, max_output_tokens: u32) -> f64 {
    let price = price_for(model);
    let input_tokens = estimate_tokens(prompt) as f64;
    input_tokens / 1000.0 * price.input_per_1k
        + max_output_tokens as f64 / 1000.0 * price.output_per_1k
}

/// Actual cost from provider-reported token counts.
pub fn actual_cost(model: &str, input_tokens: u32, output_tokens: u32) -> f64 {
    let price = price_for(model);
    input_tokens as f64 / 1000.0 * price.input_per_1k
        + output_tokens as f64 / 1000.0 * price.output_per_1k
}
