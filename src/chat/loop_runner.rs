//! Main chat loop.
//!
//! Alternates between awaiting a line of input and generating a streamed reply
//! until the user exits or input ends.

use std::io::{BufRead, Write};

use console::style;

use crate::chat::banner::print_goodbye;
use crate::chat::input::{read_input, InputEvent};
use crate::chat::session::ChatSession;
use crate::chat::ChatError;
use crate::inference::{ChatModel, TextStreamer};

/// Why the loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// An exit command was typed
    Quit,
    /// Input was closed
    EndOfInput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSummary {
    /// Completed question/answer turns
    pub turns: usize,
    pub exit: LoopExit,
}

/// Run the interactive loop over `input`, writing prompts and replies to `output`.
pub fn run_chat_loop<M, R, W>(
    session: &mut ChatSession<M>,
    input: &mut R,
    output: &mut W,
) -> Result<LoopSummary, ChatError>
where
    M: ChatModel,
    R: BufRead,
    W: Write,
{
    let mut turns = 0;

    loop {
        write!(output, "{} ", style("User:").blue().bold())?;
        output.flush()?;

        let text = match read_input(input)? {
            InputEvent::Message(text) => text,
            InputEvent::Exit => {
                print_goodbye(output)?;
                return Ok(LoopSummary {
                    turns,
                    exit: LoopExit::Quit,
                });
            }
            InputEvent::Eof => {
                writeln!(output)?;
                print_goodbye(output)?;
                return Ok(LoopSummary {
                    turns,
                    exit: LoopExit::EndOfInput,
                });
            }
        };

        writeln!(output, "{}", style("Assistant:").magenta().bold())?;
        let reply = {
            let mut streamer = TextStreamer::new(&mut *output);
            session.respond(&text, &mut streamer)?
        };
        writeln!(output)?;
        writeln!(output)?;

        turns += 1;
        tracing::debug!("Turn {} complete, reply of {} chars", turns, reply.len());
    }
}
