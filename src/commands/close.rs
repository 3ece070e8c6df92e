use async_trait::async_trait;

use super::{Command, CommandResult, ConsoleAction, SessionInfo, parse_terminal_id};

pub struct CloseCommand;

#[async_trait]
impl Command for CloseCommand {
    fn name(&self) -> &str {
        "/close"
    }

    fn usage(&self) -> &str {
        "[id]"
    }

    fn description(&self) -> &str {
        "close a terminal (the active one by default)"
    }

    async fn execute(&self, args: &str, _info: &SessionInfo<'_>) -> CommandResult {
        if args.is_empty() {
            return CommandResult::Action(ConsoleAction::Close(None));
        }
        match parse_terminal_id(args) {
            Some(id) => CommandResult::Action(ConsoleAction::Close(Some(id))),
            None => CommandResult::Handled,
        }
    }
}
