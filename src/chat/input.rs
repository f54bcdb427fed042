//! Line input for the chat loop.
//!
//! Reads one line per turn and classifies it.

use std::io::{self, BufRead};

/// Words that end the session, matched case-insensitively
pub const EXIT_COMMANDS: [&str; 3] = ["exit", "quit", "q"];

/// Events produced by the input handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    /// User submitted a message, exactly as typed.
    Message(String),
    /// User typed an exit command.
    Exit,
    /// End of input (Ctrl+D or closed pipe).
    Eof,
}

/// Exact, case-insensitive match; surrounding whitespace makes it a message.
pub fn is_exit_command(input: &str) -> bool {
    EXIT_COMMANDS
        .iter()
        .any(|cmd| input.eq_ignore_ascii_case(cmd))
}

/// Strip the line terminator (`\n` or `\r\n`) and nothing else
fn strip_line_ending(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

/// Read and classify one line.
pub fn read_input<R: BufRead>(reader: &mut R) -> io::Result<InputEvent> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Ok(InputEvent::Eof);
    }

    let text = strip_line_ending(&line);
    let event = if is_exit_command(text) {
        InputEvent::Exit
    } else {
        InputEvent::Message(text.to_string())
    };
    Ok(event)
}
