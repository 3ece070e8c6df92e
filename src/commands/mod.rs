//! Built-in console commands prefixed with `/`.
//!
//! Commands implement the [`Command`] trait and are registered in a
//! [`CommandRegistry`]. The registry handles dispatch, alias resolution,
//! and dynamic help generation. Commands that only report print directly;
//! commands that change the console return a [`ConsoleAction`].

mod close;
mod help;
mod history;
mod list;
mod new;
mod quit;
mod switch;

use async_trait::async_trait;
use std::sync::Arc;

use crate::terminal::{Lifecycle, TerminalId};

/// One line of `/list`.
#[derive(Debug, Clone)]
pub struct TerminalSummary {
    pub id: TerminalId,
    pub lifecycle: Lifecycle,
    pub evaluating: bool,
    pub commands: usize,
}

/// Session info available to commands during execution.
pub struct SessionInfo<'a> {
    pub terminals: &'a [TerminalSummary],
    pub active: Option<TerminalId>,
    /// History of the active terminal.
    pub history: &'a [String],
}

/// A change the console applies after a command runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleAction {
    OpenTerminal,
    Switch(TerminalId),
    /// Close the given terminal, or the active one.
    Close(Option<TerminalId>),
}

/// What the console should do after a command runs.
#[derive(Debug, PartialEq, Eq)]
pub enum CommandResult {
    /// Not a command; evaluate the input in the active terminal.
    NotACommand,
    /// Command handled, continue the loop.
    Handled,
    Action(ConsoleAction),
    /// Exit the console.
    Quit,
}

/// A console command. Implement this trait to add new commands.
#[async_trait]
pub trait Command: Send + Sync {
    /// Primary name, e.g. `"/list"`.
    fn name(&self) -> &str;

    /// Alternative names, e.g. `&["/h", "/?"]`.
    fn aliases(&self) -> &[&str] {
        &[]
    }

    /// Argument synopsis for `/help`, e.g. `"<id>"`.
    fn usage(&self) -> &str {
        ""
    }

    /// One-line description for `/help`.
    fn description(&self) -> &str;

    /// Run the command. `args` is the trimmed text after the name.
    async fn execute(&self, args: &str, info: &SessionInfo<'_>) -> CommandResult;
}

/// Parse a terminal id argument, printing why when it is not one.
pub(crate) fn parse_terminal_id(args: &str) -> Option<TerminalId> {
    match args.trim_start_matches('#').parse::<u64>() {
        Ok(id) => Some(TerminalId(id)),
        Err(_) => {
            println!("  ✗ not a terminal id: {args}");
            None
        }
    }
}

/// Holds registered commands.
pub struct CommandRegistry {
    commands: Vec<Arc<dyn Command>>,
}

impl CommandRegistry {
    /// Create a registry with all built-in commands.
    pub fn new() -> Self {
        let commands: Vec<Arc<dyn Command>> = vec![
            Arc::new(help::HelpCommand),
            Arc::new(new::NewCommand),
            Arc::new(list::ListCommand),
            Arc::new(switch::SwitchCommand),
            Arc::new(close::CloseCommand),
            Arc::new(history::HistoryCommand),
            Arc::new(quit::QuitCommand),
        ];
        Self { commands }
    }

    /// Register an additional command.
    pub fn register(&mut self, command: Arc<dyn Command>) {
        self.commands.push(command);
    }

    /// Dispatch input to a matching command, or return `NotACommand`.
    pub async fn dispatch(&self, input: &str, info: &SessionInfo<'_>) -> CommandResult {
        let input = input.trim();
        let (cmd, args) = input
            .split_once(char::is_whitespace)
            .map_or((input, ""), |(cmd, args)| (cmd, args.trim()));

        for command in &self.commands {
            if cmd == command.name() || command.aliases().contains(&cmd) {
                // /help is special: it needs the registry to list all commands
                if command.name() == "/help" {
                    print!("{}", self.help_text());
                    return CommandResult::Handled;
                }
                return command.execute(args, info).await;
            }
        }

        if cmd.starts_with('/') {
            println!("unknown command: {cmd}");
            println!("type /help for available commands");
            return CommandResult::Handled;
        }

        CommandResult::NotACommand
    }

    /// Generate help text from all registered commands.
    pub fn help_text(&self) -> String {
        let entries: Vec<(String, &str)> = self
            .commands
            .iter()
            .map(|c| (format_label(c.name(), c.usage(), c.aliases()), c.description()))
            .collect();

        let max_width = entries
            .iter()
            .map(|(label, _)| label.len())
            .max()
            .unwrap_or(10);

        let mut out = String::new();
        for (label, desc) in &entries {
            out.push_str(&format!("  {label:<max_width$}  {desc}\n"));
        }
        out
    }

    /// All registered command names (for testing).
    pub fn names(&self) -> Vec<&str> {
        self.commands.iter().map(|c| c.name()).collect()
    }

    /// All registered names and aliases (for duplicate detection).
    pub fn all_triggers(&self) -> Vec<&str> {
        let mut triggers = Vec::new();
        for cmd in &self.commands {
            triggers.push(cmd.name());
            triggers.extend_from_slice(cmd.aliases());
        }
        triggers
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn format_label(name: &str, usage: &str, aliases: &[&str]) -> String {
    let mut label = name.to_string();
    if !usage.is_empty() {
        label.push(' ');
        label.push_str(usage);
    }
    if !aliases.is_empty() {
        label.push_str(&format!(" ({})", aliases.join(", ")));
    }
    label
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn test_info() -> SessionInfo<'static> {
        SessionInfo {
            terminals: &[],
            active: Some(TerminalId(1)),
            history: &[],
        }
    }

    #[test]
    fn all_builtins_registered() {
        let reg = CommandRegistry::new();
        let names = reg.names();
        for name in ["/help", "/new", "/list", "/switch", "/close", "/history", "/quit"] {
            assert!(names.contains(&name), "missing {name}");
        }
    }

    #[test]
    fn no_duplicate_triggers() {
        let reg = CommandRegistry::new();
        let triggers = reg.all_triggers();
        let mut seen = Vec::new();
        for t in &triggers {
            assert!(!seen.contains(t), "duplicate trigger: {t}");
            seen.push(t);
        }
    }

    #[test]
    fn help_text_includes_all_commands_and_usage() {
        let reg = CommandRegistry::new();
        let text = reg.help_text();
        for name in reg.names() {
            assert!(text.contains(name), "help missing: {name}");
        }
        assert!(text.contains("/switch <id>"));
        assert!(text.contains("/?"));
    }

    #[tokio::test]
    async fn arguments_are_split_off() {
        let reg = CommandRegistry::new();
        assert_eq!(
            reg.dispatch("/switch   2 ", &test_info()).await,
            CommandResult::Action(ConsoleAction::Switch(TerminalId(2)))
        );
    }

    #[tokio::test]
    async fn unknown_slash_command_is_handled() {
        let reg = CommandRegistry::new();
        assert_eq!(
            reg.dispatch("/foobar", &test_info()).await,
            CommandResult::Handled
        );
    }

    #[tokio::test]
    async fn non_command_passes_through() {
        let reg = CommandRegistry::new();
        assert_eq!(
            reg.dispatch("x = 1 / 2", &test_info()).await,
            CommandResult::NotACommand
        );
    }

    #[test]
    fn terminal_id_parsing() {
        assert_eq!(parse_terminal_id("3"), Some(TerminalId(3)));
        assert_eq!(parse_terminal_id("#4"), Some(TerminalId(4)));
        assert_eq!(parse_terminal_id("x"), None);
    }
}
