use async_trait::async_trait;

use super::{Command, CommandResult, ConsoleAction, SessionInfo, parse_terminal_id};

pub struct SwitchCommand;

#[async_trait]
impl Command for SwitchCommand {
    fn name(&self) -> &str {
        "/switch"
    }

    fn aliases(&self) -> &[&str] {
        &["/sw"]
    }

    fn usage(&self) -> &str {
        "<id>"
    }

    fn description(&self) -> &str {
        "make another terminal active"
    }

    async fn execute(&self, args: &str, info: &SessionInfo<'_>) -> CommandResult {
        if args.is_empty() {
            println!("  usage: /switch <id>");
            return CommandResult::Handled;
        }
        let Some(id) = parse_terminal_id(args) else {
            return CommandResult::Handled;
        };
        if !info.terminals.is_empty() && !info.terminals.iter().any(|t| t.id == id) {
            println!("  ✗ no terminal [{id}]");
            return CommandResult::Handled;
        }
        CommandResult::Action(ConsoleAction::Switch(id))
    }
}
