use async_trait::async_trait;

use super::{Command, CommandResult, SessionInfo};

pub struct HistoryCommand;

#[async_trait]
impl Command for HistoryCommand {
    fn name(&self) -> &str {
        "/history"
    }

    fn description(&self) -> &str {
        "show commands submitted in the active terminal"
    }

    async fn execute(&self, _args: &str, info: &SessionInfo<'_>) -> CommandResult {
        if info.history.is_empty() {
            println!("  history is empty");
        }
        let width = info.history.len().to_string().len();
        for (i, entry) in info.history.iter().enumerate() {
            println!("  {:>width$}  {entry}", i + 1);
        }
        CommandResult::Handled
    }
}
