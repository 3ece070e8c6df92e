//! Project-wide constants.

pub const AUTHOR: &str = env!("CARGO_PKG_AUTHORS");
pub const HOMEPAGE: &str = env!("CARGO_PKG_HOMEPAGE");
pub const REPO: &str = env!("CARGO_PKG_REPOSITORY");

/// Put in front of every successful result.
pub const RESULT_PREFIX: &str = "=> ";

/// Prompt text after the `[id]` terminal tag.
pub const DEFAULT_PROMPT: &str = "hot> ";

/// File name of evaluated input in failure traces.
pub const DEFAULT_SOURCE_LABEL: &str = "console";

/// Call nesting limit of the built-in language.
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Environment variable holding a `tracing` filter.
pub const LOG_ENV: &str = "HOTCONSOLE_LOG";

/// Filter used when neither `HOTCONSOLE_LOG` nor the config sets one.
pub const DEFAULT_LOG_FILTER: &str = "warn";

/// Largest accepted `max_depth`.
pub const MAX_DEPTH_LIMIT: usize = 2048;

/// Expression recursion allowed on one thread, calls included. Sized so a
/// full evaluation stays well inside [`EVAL_STACK_SIZE`].
pub const MAX_EVAL_NESTING: usize = 8192;

/// Longest string the built-in language will build by repetition.
pub const MAX_STRING_BYTES: usize = 64 * 1024 * 1024;

/// Stack of worker and evaluation threads. Deep recursion in evaluated
/// code needs more than the platform default.
pub const EVAL_STACK_SIZE: usize = 64 * 1024 * 1024;

/// Format a number with comma separators (e.g. 1,234,567).
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i).is_multiple_of(3) {
            result.push(',');
        }
        result.push(c);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consts_are_non_empty() {
        assert!(!AUTHOR.is_empty());
        assert!(!HOMEPAGE.is_empty());
        assert!(!REPO.is_empty());
        assert!(!DEFAULT_PROMPT.is_empty());
    }

    #[test]
    fn consts_from_cargo_toml() {
        assert!(AUTHOR.contains("Assaf Sapir"));
        assert!(HOMEPAGE.contains("sapir.io"));
        assert!(REPO.contains("github.com/assapir/hotconsole"));
    }

    #[test]
    fn depth_limit_fits_nesting_budget() {
        assert!(DEFAULT_MAX_DEPTH <= MAX_DEPTH_LIMIT);
        // Every call level costs at least two expression levels.
        assert!(MAX_DEPTH_LIMIT * 2 <= MAX_EVAL_NESTING);
        assert!(EVAL_STACK_SIZE / MAX_EVAL_NESTING >= 8 * 1024);
    }

    #[test]
    fn format_number_small() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(42), "42");
        assert_eq!(format_number(999), "999");
    }

    #[test]
    fn format_number_thousands() {
        assert_eq!(format_number(1_000), "1,000");
        assert_eq!(format_number(12_345), "12,345");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }
}
