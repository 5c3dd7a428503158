use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// `$ per million tokens`, input and output priced separately.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Rate {
    pub input_rate_per_million_usd: f64,
    pub output_rate_per_million_usd: f64,
}

/// `provider -> model -> rate`, with CLI-friendly provider aliases (e.g.
/// `claude` -> `anthropic`) and bare-family model aliases (e.g.
/// `claude-3-5-sonnet` -> a pinned revision). Lookups are case-insensitive
/// after alias resolution.
#[derive(Debug, Clone, Default)]
pub struct RateTable {
    rates: BTreeMap<String, BTreeMap<String, Rate>>,
    provider_aliases: BTreeMap<String, String>,
    model_aliases: BTreeMap<String, String>,
}

impl RateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The table the orchestrator ships with: enough providers/models to
    /// make §8.4's worked example (`anthropic`/`claude-3-5-sonnet-20241022`
    /// at $3/$15 per million) resolve out of the box.
    pub fn with_defaults() -> Self {
        let mut table = Self::new();
        table.set_provider_alias("claude", "anthropic");
        table.set_model_alias("claude-3-5-sonnet", "claude-3-5-sonnet-20241022");
        table.set_rate(
            "anthropic",
            "claude-3-5-sonnet-20241022",
            Rate { input_rate_per_million_usd: 3.0, output_rate_per_million_usd: 15.0 },
        );
        table.set_rate(
            "anthropic",
            "claude-3-opus-20240229",
            Rate { input_rate_per_million_usd: 15.0, output_rate_per_million_usd: 75.0 },
        );
        table.set_provider_alias("openai", "openai");
        table.set_model_alias("gpt-4o", "gpt-4o-2024-08-06");
        table.set_rate(
            "openai",
            "gpt-4o-2024-08-06",
            Rate { input_rate_per_million_usd: 2.5, output_rate_per_million_usd: 10.0 },
        );
        table.set_provider_alias("gemini", "google");
        table.set_model_alias("gemini-1.5-pro", "gemini-1.5-pro-002");
        table.set_rate(
            "google",
            "gemini-1.5-pro-002",
            Rate { input_rate_per_million_usd: 1.25, output_rate_per_million_usd: 5.0 },
        );
        table
    }

    pub fn set_provider_alias(&mut self, alias: &str, canonical: &str) {
        self.provider_aliases.insert(alias.to_lowercase(), canonical.to_lowercase());
    }

    pub fn set_model_alias(&mut self, alias: &str, canonical: &str) {
        self.model_aliases.insert(alias.to_lowercase(), canonical.to_lowercase());
    }

    pub fn set_rate(&mut self, provider: &str, model: &str, rate: Rate) {
        self.rates
            .entry(provider.to_lowercase())
            .or_default()
            .insert(model.to_lowercase(), rate);
    }

    fn resolve_provider(&self, provider: &str) -> String {
        let lower = provider.to_lowercase();
        self.provider_aliases.get(&lower).cloned().unwrap_or(lower)
    }

    fn resolve_model(&self, model: &str) -> String {
        let lower = model.to_lowercase();
        self.model_aliases.get(&lower).cloned().unwrap_or(lower)
    }

    pub fn lookup(&self, provider: &str, model: &str) -> Option<Rate> {
        let provider = self.resolve_provider(provider);
        let model = self.resolve_model(model);
        self.rates.get(&provider).and_then(|models| models.get(&model)).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_resolve_case_insensitively() {
        let table = RateTable::with_defaults();
        let direct = table.lookup("anthropic", "claude-3-5-sonnet-20241022").unwrap();
        let aliased = table.lookup("Claude", "claude-3-5-sonnet").unwrap();
        assert_eq!(direct.input_rate_per_million_usd, aliased.input_rate_per_million_usd);
    }

    #[test]
    fn unknown_pair_returns_none() {
        let table = RateTable::with_defaults();
        assert!(table.lookup("unknown", "unknown").is_none());
    }
}
