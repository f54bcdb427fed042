//! Token streaming
//!
//! Generated text is pushed to a [`Streamer`] piece by piece while the model runs.

use std::io::{self, Write};

/// A unit of streamed output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamToken {
    /// A decoded text piece
    Token(String),
    /// Generation finished
    Done,
}

/// Receives generated text as it is produced
pub trait Streamer {
    fn on_token(&mut self, token: StreamToken) -> io::Result<()>;
}

/// Writes generated text straight to an output stream, flushing after each piece.
pub struct TextStreamer<W: Write> {
    out: W,
}

impl<W: Write> TextStreamer<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Streamer for TextStreamer<W> {
    fn on_token(&mut self, token: StreamToken) -> io::Result<()> {
        match token {
            StreamToken::Token(text) => {
                self.out.write_all(text.as_bytes())?;
                self.out.flush()
            }
            StreamToken::Done => self.out.flush(),
        }
    }
}

/// Discards everything
pub struct NullStreamer;

impl Streamer for NullStreamer {
    fn on_token(&mut self, _token: StreamToken) -> io::Result<()> {
        Ok(())
    }
}
