//! Per-model character budgets used to size synthesis chunks.
//!
//! Two numbers matter for every model:
//!
//! - `chunk_chars`: the target size of one chunk. Models differ in how much
//!   audio they produce per character, so the same "5-6 minutes of audio per
//!   request" target maps to different character counts. These values were
//!   tuned empirically and are meant to be overridden from configuration, not
//!   derived from a formula.
//! - `request_limit`: the provider's absolute per-request ceiling. A chunk
//!   above this limit can never be synthesized and is rejected before any
//!   request is made.
//!
//! # Usage
//!
//! ```rust,ignore
//! use narrator::config::budgets::get_character_budget;
//!
//! let budget = get_character_budget("elevenlabs", "eleven_flash_v2_5");
//! assert_eq!(budget.chunk_chars, 18_000);
//! ```

use std::collections::HashMap;
use std::sync::LazyLock;

/// Character budget for a provider model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharacterBudget {
    /// Target characters per chunk (roughly 5-6 minutes of audio)
    pub chunk_chars: usize,
    /// Hard per-request character limit enforced by the provider
    pub request_limit: usize,
}

impl CharacterBudget {
    pub const fn new(chunk_chars: usize, request_limit: usize) -> Self {
        Self {
            chunk_chars,
            request_limit,
        }
    }
}

/// Budget used for models missing from the table.
pub const DEFAULT_BUDGET: CharacterBudget = CharacterBudget::new(9_500, 10_000);

/// Budget database.
/// Key format: "provider:model" (lowercase)
static BUDGETS: LazyLock<HashMap<&'static str, CharacterBudget>> = LazyLock::new(|| {
    let mut m = HashMap::new();

    // -------------------------------------------------------------------------
    // ElevenLabs
    // https://elevenlabs.io/docs/models
    // -------------------------------------------------------------------------
    // Flash/Turbo accept up to 40K (v2.5) or 30K (v2) characters, but a chunk
    // that large takes too long to render and a single failure is expensive.
    m.insert(
        "elevenlabs:eleven_flash_v2_5",
        CharacterBudget::new(18_000, 40_000),
    );
    m.insert(
        "elevenlabs:eleven_flash_v2",
        CharacterBudget::new(18_000, 30_000),
    );
    m.insert(
        "elevenlabs:eleven_turbo_v2_5",
        CharacterBudget::new(18_000, 40_000),
    );
    m.insert(
        "elevenlabs:eleven_turbo_v2",
        CharacterBudget::new(18_000, 30_000),
    );
    m.insert(
        "elevenlabs:eleven_multilingual_v2",
        CharacterBudget::new(9_500, 10_000),
    );
    m.insert(
        "elevenlabs:eleven_multilingual_v1",
        CharacterBudget::new(9_500, 10_000),
    );
    m.insert(
        "elevenlabs:eleven_monolingual_v1",
        CharacterBudget::new(9_500, 10_000),
    );
    m.insert("elevenlabs:eleven_v3", CharacterBudget::new(2_500, 10_000));

    m
});

/// Get the character budget for a provider and model.
///
/// Unknown models fall back to [`DEFAULT_BUDGET`].
pub fn get_character_budget(provider: &str, model: &str) -> CharacterBudget {
    lookup_character_budget(provider, model).unwrap_or(DEFAULT_BUDGET)
}

/// Get the character budget for a provider and model, if one is known.
fn lookup_character_budget(provider: &str, model: &str) -> Option<CharacterBudget> {
    let key = format!("{}:{}", provider.to_lowercase(), model.to_lowercase());
    BUDGETS.get(key.as_str()).copied()
}
