//! The input line of a terminal and its lock.

use super::TerminalError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptState {
    /// The user is typing.
    Editing,
    /// A command is with the worker; input is locked.
    Submitted,
    /// A fresh prompt is open.
    Prompting,
}

/// Where the caret lands after input is replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Caret {
    Start,
    End,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Submission {
    Blank,
    Command(String),
}

#[derive(Debug, Clone)]
pub struct Prompt {
    state: PromptState,
    input: String,
    caret: usize,
}

impl Default for Prompt {
    fn default() -> Self {
        Self {
            state: PromptState::Prompting,
            input: String::new(),
            caret: 0,
        }
    }
}

impl Prompt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PromptState {
        self.state
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    /// Caret position in characters.
    pub fn caret(&self) -> usize {
        self.caret
    }

    pub fn is_locked(&self) -> bool {
        self.state == PromptState::Submitted
    }

    fn unlocked(&self) -> Result<(), TerminalError> {
        if self.is_locked() {
            Err(TerminalError::InputLocked)
        } else {
            Ok(())
        }
    }

    /// Replace the input as if typed.
    pub fn edit(&mut self, text: &str) -> Result<(), TerminalError> {
        self.replace(text, Caret::End)
    }

    /// Replace the input, e.g. from history.
    pub fn replace(&mut self, text: &str, caret: Caret) -> Result<(), TerminalError> {
        self.unlocked()?;
        self.input = text.to_string();
        self.caret = match caret {
            Caret::Start => 0,
            Caret::End => self.input.chars().count(),
        };
        self.state = PromptState::Editing;
        Ok(())
    }

    /// Take the input. Blank input re-opens the prompt; anything else locks
    /// it until [`complete`](Self::complete).
    pub fn submit(&mut self) -> Result<Submission, TerminalError> {
        self.unlocked()?;
        let text = std::mem::take(&mut self.input);
        self.caret = 0;
        if text.trim().is_empty() {
            self.state = PromptState::Prompting;
            Ok(Submission::Blank)
        } else {
            self.state = PromptState::Submitted;
            Ok(Submission::Command(text))
        }
    }

    /// The result arrived; open a new prompt.
    pub fn complete(&mut self) {
        self.state = PromptState::Prompting;
        self.input.clear();
        self.caret = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_blank_submit_locks() {
        let mut prompt = Prompt::new();
        prompt.edit("x = 1").unwrap();
        assert_eq!(prompt.state(), PromptState::Editing);
        assert_eq!(prompt.submit().unwrap(), Submission::Command("x = 1".into()));
        assert!(prompt.is_locked());
        assert!(matches!(prompt.edit("y"), Err(TerminalError::InputLocked)));
        assert!(matches!(prompt.submit(), Err(TerminalError::InputLocked)));
    }

    #[test]
    fn blank_submit_reprompts() {
        let mut prompt = Prompt::new();
        prompt.edit("   ").unwrap();
        assert_eq!(prompt.submit().unwrap(), Submission::Blank);
        assert_eq!(prompt.state(), PromptState::Prompting);
    }

    #[test]
    fn complete_reopens() {
        let mut prompt = Prompt::new();
        prompt.edit("1").unwrap();
        prompt.submit().unwrap();
        prompt.complete();
        assert_eq!(prompt.state(), PromptState::Prompting);
        assert_eq!(prompt.input(), "");
    }

    #[test]
    fn caret_placement() {
        let mut prompt = Prompt::new();
        prompt.replace("héllo", Caret::End).unwrap();
        assert_eq!(prompt.caret(), 5);
        prompt.replace("héllo", Caret::Start).unwrap();
        assert_eq!(prompt.caret(), 0);
    }
}
