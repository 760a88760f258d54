//! Console output for engage commands
//!
//! Status lines go to stdout, failures to stderr. Tracing output is separate
//! and also goes to stderr.

use std::time::Duration;

use console::{style, StyledObject};
use indicatif::{ProgressBar, ProgressStyle};

#[derive(Debug, Clone, Copy)]
enum Marker {
    Done,
    Failed,
    Note,
}

impl Marker {
    fn styled(self) -> StyledObject<&'static str> {
        match self {
            Marker::Done => style("✓").green().bold(),
            Marker::Failed => style("✗").red().bold(),
            Marker::Note => style("ℹ").blue().bold(),
        }
    }
}

pub fn success(msg: &str) {
    println!("{} {}", Marker::Done.styled(), msg);
}

pub fn error(msg: &str) {
    eprintln!("{} {}", Marker::Failed.styled(), msg);
}

pub fn info(msg: &str) {
    println!("{} {}", Marker::Note.styled(), msg);
}

pub fn header(msg: &str) {
    println!("\n{}", style(msg).bold().underlined());
}

/// Indented `label: value` line
pub fn kv(label: &str, value: &str) {
    println!("  {}: {}", style(label).dim(), value);
}

/// Summary of a finished run: the headline, then each resource id it touched.
///
/// Dry runs get an info marker instead of a check mark.
pub fn run_summary(headline: &str, ids: &[String], dry_run: bool) {
    if dry_run {
        info(&format!("Dry run: {}", headline));
    } else {
        success(headline);
    }
    for id in ids {
        println!("  {} {}", style("•").dim(), id);
    }
}

/// Run `work` behind a spinner on stderr; the spinner is cleared on both outcomes
pub fn with_spinner<T>(msg: impl Into<String>, work: impl FnOnce() -> T) -> T {
    let pb = ProgressBar::new_spinner();
    if let Ok(template) = ProgressStyle::with_template("{spinner:.blue} {msg}") {
        pb.set_style(template.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"));
    }
    pb.set_message(msg.into());
    pb.enable_steady_tick(Duration::from_millis(100));

    let result = work();
    pb.finish_and_clear();
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_spinner_returns_work_result() {
        let value: Result<usize, String> = with_spinner("Counting", || Ok(3));
        assert_eq!(value, Ok(3));

        let failed: Result<usize, String> = with_spinner("Failing", || Err("boom".to_string()));
        assert_eq!(failed, Err("boom".to_string()));
    }
}
