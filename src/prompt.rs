//! Operator interaction: confirmations, index selection, manual-stop acknowledgement.
//!
//! Core code talks to `dyn Operator`; the binary uses `TerminalOperator`,
//! tests script answers with `ScriptedOperator`.

use std::collections::VecDeque;
use std::io::{self, BufRead, Write};

use crate::selection::{parse_selection, SelectionSet};

pub trait Operator {
    /// Yes/no question; anything but an explicit yes is a no.
    fn confirm(&mut self, question: &str) -> bool;

    /// Ask for a selection over a numbered list of `max` items.
    fn select(&mut self, prompt: &str, max: usize) -> SelectionSet;

    /// Host could not be stopped automatically; true once the operator says it is stopped.
    fn acknowledge_manual_stop(&mut self) -> bool;
}

/// Reads answers from stdin. `assume_yes` pre-confirms `confirm` only.
pub struct TerminalOperator {
    assume_yes: bool,
}

impl TerminalOperator {
    pub fn new(assume_yes: bool) -> Self {
        Self { assume_yes }
    }

    fn read_line(prompt: &str) -> Option<String> {
        print!("{}", prompt);
        let _ = io::stdout().flush();
        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim().to_string()),
        }
    }
}

impl Operator for TerminalOperator {
    fn confirm(&mut self, question: &str) -> bool {
        if self.assume_yes {
            println!("{} [y/N]: y (--yes)", question);
            return true;
        }
        Self::read_line(&format!("{} [y/N]: ", question))
            .map(|a| is_yes(&a))
            .unwrap_or(false)
    }

    fn select(&mut self, prompt: &str, max: usize) -> SelectionSet {
        let line = Self::read_line(&format!(
            "{} (e.g. 1,3-5 | all | none) [1-{}]: ",
            prompt, max
        ));
        parse_selection(line.as_deref().unwrap_or(""), max)
    }

    fn acknowledge_manual_stop(&mut self) -> bool {
        // --yes сюда намеренно не распространяется
        Self::read_line("Could not stop Home Assistant automatically. Stop it manually, then type 'yes' to continue: ")
            .map(|a| is_yes(&a))
            .unwrap_or(false)
    }
}

/// Pre-recorded answers, consumed in order; an exhausted script answers "no"/empty.
#[derive(Debug, Default)]
pub struct ScriptedOperator {
    answers: VecDeque<String>,
    pub asked: Vec<String>,
}

impl ScriptedOperator {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: answers.into_iter().map(Into::into).collect(),
            asked: Vec::new(),
        }
    }

    fn next(&mut self, q: &str) -> String {
        self.asked.push(q.to_string());
        self.answers.pop_front().unwrap_or_default()
    }
}

impl Operator for ScriptedOperator {
    fn confirm(&mut self, question: &str) -> bool {
        let a = self.next(question);
        is_yes(&a)
    }

    fn select(&mut self, prompt: &str, max: usize) -> SelectionSet {
        let a = self.next(prompt);
        parse_selection(&a, max)
    }

    fn acknowledge_manual_stop(&mut self) -> bool {
        let a = self.next("manual stop");
        is_yes(&a)
    }
}

pub fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
