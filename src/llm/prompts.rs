//! Prompt templates for the policy assistant.
//!
//! Two system prompts (chat and suggestion), the user-content templates
//! that wrap a prompt with the current document, and the enhanced prompt
//! used for inline code suggestions.

use crate::validate::PolicySchema;

/// System prompt for streamed chat turns.
pub const CHAT_SYSTEM_PROMPT: &str = "\
You are an AI assistant that helps with coding and Azure API Management policy development. \
Provide helpful suggestions and answers based on the code context and user messages.";

/// System prompt for single-shot code suggestions.
pub const SUGGESTION_SYSTEM_PROMPT: &str = "You are a helpful assistant that provides code suggestions.";

/// Canned message sent by the "propose fix" action.
pub const PROPOSE_FIX_MESSAGE: &str = "Help me review the code for any syntax errors.";

/// User content for a chat turn.
pub fn chat_user_content(message: &str, code: &str) -> String {
    format!("Here's the current code:\n\n{code}\n\nUser message: {message}")
}

/// User content for a single-shot suggestion.
pub fn suggestion_user_content(prompt: &str, context: &str) -> String {
    format!("Generate code suggestion for the following prompt:\n\n{prompt}\n\nContext:\n{context}")
}

/// Editor context around the cursor for an inline suggestion.
#[derive(Debug, Clone, Default)]
pub struct SuggestionContext<'a> {
    /// Text on the cursor line up to the cursor.
    pub prompt: &'a str,
    /// Whole document.
    pub document: &'a str,
    /// Lines around the cursor.
    pub surrounding: &'a str,
    pub previous_line: &'a str,
    pub next_line: &'a str,
}

/// Build the enhanced suggestion prompt. The policy list comes from the
/// schema so the model sees the same catalog the validator enforces.
pub fn build_suggestion_prompt(ctx: &SuggestionContext<'_>, schema: &PolicySchema) -> String {
    let mut prompt = format!(
        "Generate code suggestion for the following prompt in the context of the provided code snippet:\n\n\
Language: XML (Azure API Management policy code)\n\n\
Prompt: {}\n\n\
Context: {}\n\n\
Surrounding Code: {}\n\n\
Previous Line: {}\n\n\
Next Line: {}\n\n",
        ctx.prompt, ctx.document, ctx.surrounding, ctx.previous_line, ctx.next_line
    );

    prompt.push_str(
        "Considerations:\n\
- Only reply with the code snippet, no comments, no explanations.\n\
- Only generate code that can be inserted as-is at the current position. Don't generate any surrounding code.\n\
- Ensure the generated code is syntactically correct and fits well within the existing code structure.\n\
- Use naming and conventions consistent with the surrounding code.\n\
- If the prompt is ambiguous, provide a best-effort suggestion.\n",
    );

    if !schema.is_empty() {
        prompt.push_str("\nAPI Management policy (XML) may contain the following policies:\n");
        prompt.push_str(&schema.describe());
    }

    prompt
}
