//! System prompt rendering from twin personas.

use wzrd_types::TwinRecord;

/// Name used when a twin record has no usable name.
pub const DEFAULT_TWIN_NAME: &str = "WZRD";

/// Prompt used when there is no persona to render.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are WZRD, a friendly and knowledgeable voice \
assistant. Keep your responses brief and conversational, since they will be spoken aloud. \
Avoid bold and italic text formatting in your responses.";

/// Characters of the rendered prompt included in the debug trace.
const TRACE_PREVIEW_CHARS: usize = 100;

/// Renders the system prompt for a conversation.
///
/// A missing or empty twin yields `fallback` unchanged; pass `""` to get no
/// system prompt at all. Otherwise the persona fills a fixed template: the
/// name falls back to [`DEFAULT_TWIN_NAME`], every other absent field
/// renders as an empty string, and `model_data` is never included.
pub fn build_system_prompt(twin: Option<&TwinRecord>, fallback: &str) -> String {
    let Some(twin) = twin.filter(|t| !t.is_empty()) else {
        return fallback.to_string();
    };

    let name = match twin.name.trim() {
        "" => DEFAULT_TWIN_NAME,
        name => name,
    };
    let description = twin.description.as_deref().unwrap_or_default();
    let features = &twin.features;
    let bio = features.bio.as_deref().unwrap_or_default();
    let lore = features.lore.as_deref().unwrap_or_default();
    let knowledge = features.knowledge.as_deref().unwrap_or_default();

    let prompt = format!(
        "You are {name}, a digital twin with the following traits:\n\
         \n\
         Description: {description}\n\
         \n\
         Bio: {bio}\n\
         \n\
         Lore: {lore}\n\
         \n\
         Knowledge: {knowledge}\n\
         \n\
         Always stay in character as {name} during this conversation. \
         Keep your responses brief when possible. \
         Avoid bold and italic text formatting in your responses. \
         You may reference your background knowledge when answering questions."
    );

    tracing::debug!(
        twin = name,
        preview = %prompt.chars().take(TRACE_PREVIEW_CHARS).collect::<String>(),
        "generated system prompt"
    );

    prompt
}
