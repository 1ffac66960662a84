//! Prompt composition

/// Compose the upstream prompt for one user message
///
/// Stored context is prefixed to every message of a connection, not only the
/// first one.
pub fn compose_prompt(context: Option<&str>, message: &str) -> String {
    match context {
        Some(context) if !context.is_empty() => format!(
            "Based on the following context:\n\n{context}\n\n---\n\n{message}"
        ),
        _ => message.to_string(),
    }
}
