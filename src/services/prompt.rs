pub const BASE_PROMPT: &str = "Describe con detalle y en español lo que observas en esta imagen.";

pub const CONTEXT_HEADER: &str = "Contexto adicional proporcionado por el usuario:";

/// Base instruction, plus the user's context block when the toggle is on
/// and the text has something besides whitespace. The text itself goes in untouched.
pub fn build_prompt(context_enabled: bool, context_text: &str) -> String {
    if context_enabled && !context_text.trim().is_empty() {
        format!("{}\n\n{}\n{}", BASE_PROMPT, CONTEXT_HEADER, context_text)
    } else {
        BASE_PROMPT.to_string()
    }
}
