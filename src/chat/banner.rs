//! Session banner and status lines.

use std::io::{self, Write};

use console::style;

use crate::types::model::ModelInfo;

/// Print the title panel, plus the CoVe notice when enabled.
pub fn print_welcome_banner<W: Write>(out: &mut W, cove: bool) -> io::Result<()> {
    let title = "HexaSLM Interactive Chat";
    let rule = "─".repeat(title.chars().count() + 2);

    writeln!(out, "{}", style(format!("╭{rule}╮")).cyan())?;
    writeln!(
        out,
        "{}{}{}",
        style("│ ").cyan(),
        style(title).cyan().bold(),
        style(" │").cyan()
    )?;
    writeln!(out, "{}", style(format!("╰{rule}╯")).cyan())?;

    if cove {
        writeln!(
            out,
            "{}",
            style("🧠 Chain of Verification (CoVe) Mode Enabled")
                .yellow()
                .bold()
        )?;
    }
    Ok(())
}

pub fn print_load_success<W: Write>(
    out: &mut W,
    model_path: &str,
    info: Option<&ModelInfo>,
) -> io::Result<()> {
    writeln!(
        out,
        "{}",
        style(format!("✔ Model loaded successfully from {model_path}"))
            .green()
            .bold()
    )?;
    if let Some(info) = info {
        writeln!(out, "  {}  {}", style("Model:").bold(), style(info.summary()).dim())?;
    }
    Ok(())
}

/// Report a load failure, with a hint when the default adapter path was used.
pub fn print_load_failure<W: Write>(
    out: &mut W,
    error: &dyn std::fmt::Display,
    default_path_hint: Option<&str>,
) -> io::Result<()> {
    writeln!(
        out,
        "{}",
        style(format!("✘ Failed to load model: {error}")).red().bold()
    )?;
    if let Some(path) = default_path_hint {
        writeln!(
            out,
            "{}",
            style(format!(
                "Tip: Ensure you have the adapter in '{path}' or specify a valid path."
            ))
            .yellow()
        )?;
    }
    Ok(())
}

pub fn print_exit_hint<W: Write>(out: &mut W) -> io::Result<()> {
    writeln!(
        out,
        "{}",
        style("Type 'exit', 'quit', or 'q' to end the session.").dim()
    )
}

pub fn print_goodbye<W: Write>(out: &mut W) -> io::Result<()> {
    writeln!(out, "{}", style("Goodbye!").cyan().bold())
}
