//! Interactive prompts
//!
//! Commands ask through the `Prompter` trait so actions can run unattended
//! in tests; the terminal implementation uses dialoguer.

use crate::error::Result;
use dialoguer::{Confirm, Select, theme::ColorfulTheme};

pub trait Prompter: Send + Sync {
    /// Yes/no question, defaulting to no
    fn confirm(&self, message: &str) -> Result<bool>;

    /// Index of the chosen entry in `choices`
    fn select(&self, message: &str, choices: &[String]) -> Result<usize>;
}

/// Prompts on stderr using dialoguer
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn confirm(&self, message: &str) -> Result<bool> {
        let result = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(message)
            .default(false)
            .interact()?;
        Ok(result)
    }

    fn select(&self, message: &str, choices: &[String]) -> Result<usize> {
        let result = Select::with_theme(&ColorfulTheme::default())
            .with_prompt(message)
            .items(choices)
            .default(0)
            .interact()?;
        Ok(result)
    }
}
