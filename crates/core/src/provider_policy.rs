//! Per-provider defaults that are policy rather than wire protocol.

/// Default provider call timeout for providers without a longer ceiling.
pub const DEFAULT_TIMEOUT_SECS: u64 = 150;

/// Ceiling for multimodal LLM backends, which routinely take minutes.
pub const LLM_TIMEOUT_SECS: u64 = 500;

/// Providers that get [`LLM_TIMEOUT_SECS`].
const LONG_RUNNING_PROVIDERS: &[&str] = &["gemini", "openai"];

/// Timeout to apply when a provider config has none (or a non-positive one).
pub fn default_timeout_secs(provider_name: &str) -> u64 {
    if LONG_RUNNING_PROVIDERS.contains(&provider_name) {
        LLM_TIMEOUT_SECS
    } else {
        DEFAULT_TIMEOUT_SECS
    }
}

/// Pick the effective timeout from an optional configured value.
pub fn effective_timeout_secs(provider_name: &str, configured: Option<i64>) -> u64 {
    match configured {
        Some(secs) if secs > 0 => secs as u64,
        _ => default_timeout_secs(provider_name),
    }
}
