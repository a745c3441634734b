use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
use colored::Colorize;

/// Operator interaction. Kept behind a trait so dialogs run without a console in tests.
pub trait Prompter {
    /// Show `question` and return the raw answer line (empty on end of input).
    fn ask(&mut self, question: &str) -> Result<String>;

    /// Yes/no question; anything but `y`/`j` (case-insensitive) is no.
    fn confirm(&mut self, question: &str) -> Result<bool> {
        let answer = self.ask(&format!("{} [y/N]", question))?;
        Ok(is_affirmative(&answer))
    }
}

pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "j")
}

/// Reads answers from stdin; questions go to stderr so stdout stays clean.
pub struct ConsolePrompter;

impl Prompter for ConsolePrompter {
    fn ask(&mut self, question: &str) -> Result<String> {
        eprint!("{} ", question.bold());
        io::stderr().flush()?;

        let mut line = String::new();
        io::stdin()
            .lock()
            .read_line(&mut line)
            .context("Failed to read answer from stdin")?;
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}


#[cfg(test)]
mod tests {
    use super::scripted::ScriptedPrompter;
    use super::*;

    #[test]
    fn test_affirmative_answers() {
        for answer in ["y", "Y", "j", "J", " y \n"] {
            assert!(is_affirmative(answer), "{:?}", answer);
        }
    }

    #[test]
    fn test_everything_else_is_no() {
        for answer in ["", "n", "yes", "ja", "x", "  "] {
            assert!(!is_affirmative(answer), "{:?}", answer);
        }
    }

    #[test]
    fn test_confirm_appends_default_hint() {
        let mut prompter = ScriptedPrompter::new(&["j"]);
        assert!(prompter.confirm("Remove ENTERPRISEPACK?").unwrap());
        assert_eq!(prompter.asked, vec!["Remove ENTERPRISEPACK? [y/N]"]);

        // Script exhausted: empty input means no.
        assert!(!prompter.confirm("Remove EMS?").unwrap());
    }
}
