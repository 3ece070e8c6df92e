use async_trait::async_trait;

use super::{Command, CommandResult, ConsoleAction, SessionInfo};

pub struct NewCommand;

#[async_trait]
impl Command for NewCommand {
    fn name(&self) -> &str {
        "/new"
    }

    fn description(&self) -> &str {
        "open a new terminal with a fresh environment"
    }

    async fn execute(&self, _args: &str, _info: &SessionInfo<'_>) -> CommandResult {
        CommandResult::Action(ConsoleAction::OpenTerminal)
    }
}
