/// Static parameter compatibility table for OpenAI models
///
/// Some model families reject request parameters that others accept. The
/// table is consulted before every request; anything it misses is learned at
/// runtime by [`crate::fallback`].
///
/// | Models | Omitted |
/// |---|---|
/// | `gpt-5*` except `gpt-5.1*` / `gpt-5.2*` | sampling |
/// | `gpt-5.1*` / `gpt-5.2*` named `*thinking*` or `*pro*`, or with reasoning effort other than `none` | sampling |
/// | `o1*`, `o3*`, `o4*` | sampling and penalties |
///
/// Sampling is `temperature`, `top_p` and `logprobs`; penalties are
/// `frequency_penalty` and `presence_penalty`.

use std::collections::BTreeSet;

use crate::providers::openai::ChatRequest;

const SAMPLING_PARAMS: [&str; 3] = ["temperature", "top_p", "logprobs"];
const PENALTY_PARAMS: [&str; 2] = ["frequency_penalty", "presence_penalty"];

fn is_gpt51_or_gpt52(model: &str) -> bool {
    model.starts_with("gpt-5.1") || model.starts_with("gpt-5.2")
}

/// Chat-completions parameters to omit for `model`
///
/// First matching rule wins. An empty or unknown model omits nothing.
pub fn unsupported_chat_params(model: &str, reasoning_effort: Option<&str>) -> BTreeSet<&'static str> {
    let model = model.trim();
    if model.is_empty() {
        return BTreeSet::new();
    }

    if model.starts_with("gpt-5") && !is_gpt51_or_gpt52(model) {
        return SAMPLING_PARAMS.into_iter().collect();
    }

    if is_gpt51_or_gpt52(model) {
        let lowered = model.to_lowercase();
        let restricted_variant = lowered.contains("thinking") || lowered.contains("pro");
        let reasoning = reasoning_effort.map_or(false, |effort| effort != "none");
        if restricted_variant || reasoning {
            return SAMPLING_PARAMS.into_iter().collect();
        }
    }

    if ["o1", "o3", "o4"].iter().any(|prefix| model.starts_with(prefix)) {
        return SAMPLING_PARAMS.into_iter().chain(PENALTY_PARAMS).collect();
    }

    BTreeSet::new()
}

/// Removes the statically unsupported parameters from a request
///
/// Returns the names actually removed.
pub fn strip_unsupported(request: &mut ChatRequest) -> Vec<&'static str> {
    let unsupported = unsupported_chat_params(request.model(), request.reasoning_effort());

    unsupported
        .into_iter()
        .filter(|param| request.remove(param))
        .collect()
}
