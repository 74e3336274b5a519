//! Status console text buffers.
//!
//! Two views over the same stream of status lines:
//! - the pause console, which shows everything
//! - the gameplay console, a short ring of the newest lines
//!
//! Lines are also kept in a history that survives a scene reload (a new
//! loop), so the pause console can be rebuilt afterwards.

use deathlink_env::StatusSink;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Default)]
struct ConsoleState {
    history: Vec<String>,
    pause_lines: Vec<String>,
    gameplay_lines: VecDeque<String>,
}

/// In-memory status console.
pub struct StatusConsole {
    state: Mutex<ConsoleState>,
    gameplay_capacity: usize,
    /// Receives every line added, e.g. a log
    mirror: Option<Arc<dyn StatusSink>>,
}

impl StatusConsole {
    /// Creates a console whose gameplay view keeps `gameplay_capacity` lines.
    pub fn new(gameplay_capacity: usize) -> Self {
        Self {
            state: Mutex::new(ConsoleState::default()),
            gameplay_capacity: gameplay_capacity.max(1),
            mirror: None,
        }
    }

    /// Forwards every added line to `mirror` as well.
    pub fn with_mirror(mut self, mirror: Arc<dyn StatusSink>) -> Self {
        self.mirror = Some(mirror);
        self
    }

    fn state(&self) -> std::sync::MutexGuard<'_, ConsoleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a line.
    ///
    /// # Arguments
    /// * `skip_gameplay` - Only show the line on the pause console
    /// * `skip_history` - Do not keep the line across reloads
    pub fn add_text(&self, text: &str, skip_gameplay: bool, skip_history: bool) {
        if let Some(mirror) = &self.mirror {
            mirror.append(text);
        }

        let mut state = self.state();
        if !skip_history {
            state.history.push(text.to_string());
        }
        state.pause_lines.push(text.to_string());

        if !skip_gameplay {
            if state.gameplay_lines.len() == self.gameplay_capacity {
                state.gameplay_lines.pop_front();
            }
            state.gameplay_lines.push_back(text.to_string());
        }
    }

    /// Rebuilds the consoles after a scene load: both views are cleared and
    /// the history is replayed onto the pause console only.
    pub fn reload(&self) {
        let mut state = self.state();
        state.gameplay_lines.clear();
        state.pause_lines = state.history.clone();
    }

    /// Handles a line typed into the console. Returns the response line,
    /// if any.
    pub fn handle_command(&self, input: &str, loop_count: u32) -> Option<String> {
        if input.is_empty() {
            return None;
        }

        // Every `!echo ` is removed, not just the leading one
        let response = if input.starts_with("!echo ") {
            input.replace("!echo ", "")
        } else if input == "!loops" {
            format!("Loops: {}", loop_count)
        } else {
            let command = input.split(' ').next().unwrap_or(input);
            format!("Command {} not recognized.", command)
        };

        self.add_text(&response, false, false);
        Some(response)
    }

    /// Shows the loop greeting on the pause console.
    pub fn greet_loop(&self, loop_count: u32) -> String {
        let greeting = loop_greeting(loop_count);
        self.add_text(&greeting, true, false);
        greeting
    }

    /// Full pause console text, one line per entry.
    pub fn pause_text(&self) -> String {
        self.state().pause_lines.join("\n")
    }

    /// The gameplay console's lines, oldest first.
    pub fn gameplay_lines(&self) -> Vec<String> {
        self.state().gameplay_lines.iter().cloned().collect()
    }

    /// Lines that survive a reload.
    pub fn history(&self) -> Vec<String> {
        self.state().history.clone()
    }

    /// Returns whether any pause-console line contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.state().pause_lines.iter().any(|line| line.contains(needle))
    }
}

impl Default for StatusConsole {
    fn default() -> Self {
        Self::new(6)
    }
}

impl StatusSink for StatusConsole {
    fn append(&self, line: &str) {
        self.add_text(line, false, false);
    }
}

/// `Welcome to your 3rd loop!`
pub fn loop_greeting(loop_count: u32) -> String {
    format!("Welcome to your {} loop!", ordinal(loop_count))
}

/// English ordinal: 1st, 2nd, 3rd, 4th, 11th, 12th, 13th, 21st, 111th.
pub fn ordinal(n: u32) -> String {
    let suffix = match (n % 10, n % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{}{}", n, suffix)
}
