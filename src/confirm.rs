/*!
 * Overwrite confirmation
 *
 * Transfers ask a [`Confirm`] implementation before replacing an existing
 * target. A declined confirmation skips the item without recording an error.
 */

use dialoguer::{theme::ColorfulTheme, Confirm as DialoguerConfirm};
use tracing::warn;

use crate::config::OverwritePolicy;

/// Decides whether an existing target may be replaced
pub trait Confirm {
    fn confirm(&mut self, message: &str) -> bool;
}

/// Accept everything; the headless default
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysConfirm;

impl Confirm for AlwaysConfirm {
    fn confirm(&mut self, _message: &str) -> bool {
        true
    }
}

/// Decline everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverConfirm;

impl Confirm for NeverConfirm {
    fn confirm(&mut self, _message: &str) -> bool {
        false
    }
}

/// Ask on the terminal. Answering "all" is not offered; a failed prompt
/// (no terminal attached) counts as "no".
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptConfirm;

impl Confirm for PromptConfirm {
    fn confirm(&mut self, message: &str) -> bool {
        match DialoguerConfirm::with_theme(&ColorfulTheme::default())
            .with_prompt(message)
            .default(false)
            .interact()
        {
            Ok(answer) => answer,
            Err(e) => {
                warn!("Confirmation prompt failed, not overwriting: {}", e);
                false
            }
        }
    }
}

impl<F> Confirm for F
where
    F: FnMut(&str) -> bool,
{
    fn confirm(&mut self, message: &str) -> bool {
        self(message)
    }
}

/// Build the confirmation collaborator for an overwrite policy
pub fn for_policy(policy: OverwritePolicy) -> Box<dyn Confirm> {
    match policy {
        OverwritePolicy::Prompt => Box::new(PromptConfirm),
        OverwritePolicy::Always => Box::new(AlwaysConfirm),
        OverwritePolicy::Never => Box::new(NeverConfirm),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_answers() {
        assert!(AlwaysConfirm.confirm("overwrite /dest/a.txt?"));
        assert!(!NeverConfirm.confirm("overwrite /dest/a.txt?"));
    }

    #[test]
    fn test_closure_records_messages() {
        let mut asked = Vec::new();
        let mut confirm = |message: &str| {
            asked.push(message.to_string());
            message.ends_with("a.txt?")
        };
        assert!(confirm.confirm("overwrite a.txt?"));
        assert!(!confirm.confirm("overwrite b.txt?"));
        assert_eq!(asked.len(), 2);
    }

    #[test]
    fn test_for_policy() {
        assert!(for_policy(OverwritePolicy::Always).confirm("x"));
        assert!(!for_policy(OverwritePolicy::Never).confirm("x"));
    }
}
