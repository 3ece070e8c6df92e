//! Startup banner and session summary display.

use crate::config::ClosePolicy;
use crate::console::SessionStats;
use crate::consts::{AUTHOR, HOMEPAGE, REPO, format_number};

/// Session configuration for display in the startup banner.
pub struct BannerInfo<'a> {
    pub interpreter: &'a str,
    pub close_policy: ClosePolicy,
    pub max_depth: usize,
    pub log: &'a str,
}

fn policy_label(policy: ClosePolicy) -> &'static str {
    match policy {
        ClosePolicy::Ask => "ask",
        ClosePolicy::Kill => "kill",
        ClosePolicy::Background => "background",
    }
}

/// Print the startup banner with session info.
pub fn print_banner(info: &BannerInfo) {
    println!(
        r#"
   ╔═══════════════════════════════════════╗
   ║          H O T C O N S O L E          ║
   ║   every terminal its own warm thread  ║
   ╚═══════════════════════════════════════╝

   version   {}
   by        {}
   home      {}
   repo      {}
   language  {} (max depth {})
   on close  {}
   log       {}

   type /help for commands
"#,
        env!("CARGO_PKG_VERSION"),
        AUTHOR,
        HOMEPAGE,
        REPO,
        info.interpreter,
        info.max_depth,
        policy_label(info.close_policy),
        info.log,
    );
}

/// Print the session summary and farewell.
pub fn print_session_summary(stats: SessionStats) {
    if stats.commands_evaluated > 0 {
        println!(
            "session: {} commands evaluated in {} terminals",
            format_number(stats.commands_evaluated),
            format_number(stats.terminals_opened),
        );
    }
    println!("goodbye.");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn print_banner_does_not_panic() {
        print_banner(&BannerInfo {
            interpreter: "script",
            close_policy: ClosePolicy::Ask,
            max_depth: 256,
            log: "stderr (warn)",
        });
    }

    #[test]
    fn print_session_summary_with_commands() {
        print_session_summary(SessionStats {
            commands_evaluated: 1234,
            terminals_opened: 2,
        });
    }

    #[test]
    fn print_session_summary_empty() {
        // Should only print "goodbye."
        print_session_summary(SessionStats::default());
    }

    #[test]
    fn policy_labels_match_config_names() {
        assert_eq!(policy_label(ClosePolicy::Background), "background");
        assert_eq!(
            serde_json::to_string(&ClosePolicy::Background).unwrap(),
            "\"background\""
        );
    }
}
