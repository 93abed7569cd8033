// Blocking user prompts (confirm / alert dialogs on the page)

/// Yes/no and notice dialogs shown on the page. Both block the page context
/// until the user answers.
pub trait UserPrompt {
    fn confirm(&self, message: &str) -> bool;
    fn alert(&self, message: &str);
}
