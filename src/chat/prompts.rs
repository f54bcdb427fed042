//! Prompt text
//!
//! Fixed prompt fragments and the plain-text fallback format.

/// Assistant starter appended in Chain of Verification mode
pub const COVE_STARTER: &str =
    "\nLet me provide thoroughly verified cybersecurity guidance.\n\n**Step 1 - Initial Analysis:**";

/// Plain prompt used when the model's chat template cannot be applied.
///
/// Carries only the system prompt and the current input, not earlier turns.
pub fn fallback_prompt(system_prompt: &str, user_input: &str) -> String {
    format!("{system_prompt}\n\nUser: {user_input}\nAssistant: ")
}

/// Append the verification starter when CoVe is on
pub fn with_verification(mut prompt: String, cove: bool) -> String {
    if cove {
        prompt.push_str(COVE_STARTER);
    }
    prompt
}
