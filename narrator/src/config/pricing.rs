//! Centralized pricing configuration for TTS models.
//!
//! This module is the single source of truth for what one metered credit costs
//! in USD. Providers bill in credits (usually one per character, less on
//! discounted tiers); the orchestrator converts the credits actually charged
//! into dollars with these prices.
//!
//! Prices depend on the subscription plan, so every entry can be overridden
//! through the `pricing:` section of the YAML configuration.
//!
//! # Updates
//!
//! When provider pricing changes, update the constants in this file.

use std::collections::HashMap;
use std::sync::LazyLock;

/// USD per 1000 credits when a model has no table entry and no override.
pub const DEFAULT_PRICE_PER_1K: f64 = 0.24;

/// TTS pricing database, USD per 1000 credits.
/// Key format: "provider:model" (lowercase)
static TTS_PRICE_PER_1K: LazyLock<HashMap<&'static str, f64>> = LazyLock::new(|| {
    let mut m = HashMap::new();

    // -------------------------------------------------------------------------
    // ElevenLabs TTS
    // https://elevenlabs.io/pricing
    // -------------------------------------------------------------------------
    m.insert("elevenlabs:eleven_multilingual_v2", 0.24); // Creator plan
    m.insert("elevenlabs:eleven_multilingual_v1", 0.24);
    m.insert("elevenlabs:eleven_monolingual_v1", 0.24);
    m.insert("elevenlabs:eleven_v3", 0.24);
    // Half-credit models
    m.insert("elevenlabs:eleven_turbo_v2_5", 0.12);
    m.insert("elevenlabs:eleven_turbo_v2", 0.12);
    m.insert("elevenlabs:eleven_flash_v2_5", 0.08);
    m.insert("elevenlabs:eleven_flash_v2", 0.08);

    m
});

/// Price table with configuration overrides applied on top of the defaults.
///
/// Overrides are keyed by model id and expressed in USD per 1000 credits.
#[derive(Debug, Clone, Default)]
pub struct PriceBook {
    overrides: HashMap<String, f64>,
}

impl PriceBook {
    pub fn new(overrides: HashMap<String, f64>) -> Self {
        let overrides = overrides
            .into_iter()
            .map(|(model, price)| (model.to_lowercase(), price))
            .collect();
        Self { overrides }
    }

    /// USD per 1000 credits for `model`, honoring overrides first.
    pub fn price_per_1k(&self, provider: &str, model: &str) -> f64 {
        let model = model.to_lowercase();
        if let Some(price) = self.overrides.get(&model) {
            return *price;
        }
        let key = format!("{}:{}", provider.to_lowercase(), model);
        TTS_PRICE_PER_1K
            .get(key.as_str())
            .copied()
            .unwrap_or(DEFAULT_PRICE_PER_1K)
    }
}
