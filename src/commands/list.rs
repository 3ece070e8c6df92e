use async_trait::async_trait;

use super::{Command, CommandResult, SessionInfo};
use crate::consts::format_number;
use crate::terminal::Lifecycle;

pub struct ListCommand;

#[async_trait]
impl Command for ListCommand {
    fn name(&self) -> &str {
        "/list"
    }

    fn aliases(&self) -> &[&str] {
        &["/ls"]
    }

    fn description(&self) -> &str {
        "list open terminals"
    }

    async fn execute(&self, _args: &str, info: &SessionInfo<'_>) -> CommandResult {
        if info.terminals.is_empty() {
            println!("  no terminals open");
            return CommandResult::Handled;
        }
        for terminal in info.terminals {
            let marker = if info.active == Some(terminal.id) { '*' } else { ' ' };
            let state = match (terminal.lifecycle, terminal.evaluating) {
                (Lifecycle::Closing, _) => "closing",
                (_, true) => "evaluating",
                _ => "idle",
            };
            println!(
                "  {marker} [{}]  {state:<10}  {} commands",
                terminal.id,
                format_number(terminal.commands as u64),
            );
        }
        CommandResult::Handled
    }
}
