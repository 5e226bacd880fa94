//! Line-based stdin console for the LCD commands.
//!
//! `<screen> <line> <text...>` writes a line, `clear` blanks both LCDs.

use anyhow::{anyhow, bail, Context, Result};
use gyro_stream::{DisplayCommand, DisplayCommander, Line, Screen};
use std::io::BufRead;
use tracing::{info, warn};

pub const USAGE: &str = "commands: <screen 1|2> <line 0|1> <text>, clear, help";

#[derive(Debug, PartialEq)]
pub enum ConsoleCommand {
    Write(DisplayCommand),
    Clear,
    Help,
}

/// Parse one console line. Blank lines yield `None`.
pub fn parse(line: &str) -> Result<Option<ConsoleCommand>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    match line.to_ascii_lowercase().as_str() {
        "clear" => return Ok(Some(ConsoleCommand::Clear)),
        "help" | "?" => return Ok(Some(ConsoleCommand::Help)),
        _ => {}
    }

    let (screen, rest) = line
        .split_once(char::is_whitespace)
        .ok_or_else(|| anyhow!("expected '<screen> <line> <text>'"))?;
    let rest = rest.trim_start();
    let (line_no, text) = match rest.split_once(char::is_whitespace) {
        Some((line_no, text)) => (line_no, text.trim_start()),
        None => (rest, ""),
    };

    let screen: u8 = screen
        .parse()
        .with_context(|| format!("screen {:?} is not a number", screen))?;
    let line_no: u8 = line_no
        .parse()
        .with_context(|| format!("line {:?} is not a number", line_no))?;
    if text.is_empty() {
        bail!("missing text");
    }

    let command = DisplayCommand::new(Screen::try_from(screen)?, Line::try_from(line_no)?, text);
    Ok(Some(ConsoleCommand::Write(command)))
}

/// Run one parsed command. Returns whether anything was queued.
pub fn execute(commander: &DisplayCommander, command: ConsoleCommand) -> bool {
    match command {
        ConsoleCommand::Write(cmd) => {
            let text = cmd.text().to_string();
            let sent = commander.update_display(cmd);
            if sent {
                info!(%text, "Display update sent");
            } else {
                warn!("Not connected, display update not sent");
            }
            sent
        }
        ConsoleCommand::Clear => {
            let sent = commander.clear_displays();
            if sent {
                info!("Clear displays sent");
            } else {
                warn!("Not connected, clear not sent");
            }
            sent
        }
        ConsoleCommand::Help => {
            info!("{}", USAGE);
            false
        }
    }
}

/// Read commands until `input` ends. Returns the number of commands queued.
pub fn run(commander: &DisplayCommander, input: impl BufRead) -> usize {
    let mut sent = 0;
    for line in input.lines() {
        let Ok(line) = line else { break };
        match parse(&line) {
            Ok(Some(command)) => {
                if execute(commander, command) {
                    sent += 1;
                }
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "{}", USAGE),
        }
    }
    sent
}

/// Serve the console from stdin on its own thread.
///
/// A plain thread rather than a runtime task: a blocking stdin read must
/// not hold up runtime shutdown.
pub fn spawn(commander: DisplayCommander) -> Result<std::thread::JoinHandle<()>> {
    let handle = std::thread::Builder::new()
        .name("console".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            let sent = run(&commander, stdin.lock());
            info!(sent, "Console input closed");
        })?;
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gyro_stream::StreamClient;
    use std::io::Cursor;

    #[test]
    fn parse_write_keeps_inner_spaces() {
        let parsed = parse("2 1 Hola  mundo").unwrap().unwrap();
        assert_eq!(
            parsed,
            ConsoleCommand::Write(DisplayCommand::new(Screen::Two, Line::Second, "Hola  mundo"))
        );
    }

    #[test]
    fn parse_truncates_long_text() {
        match parse("1 0 0123456789abcdefXYZ").unwrap().unwrap() {
            ConsoleCommand::Write(cmd) => assert_eq!(cmd.text(), "0123456789abcdef"),
            other => panic!("expected write, got {:?}", other),
        }
    }

    #[test]
    fn parse_keywords_and_blank() {
        assert_eq!(parse("  CLEAR ").unwrap(), Some(ConsoleCommand::Clear));
        assert_eq!(parse("help").unwrap(), Some(ConsoleCommand::Help));
        assert_eq!(parse("   ").unwrap(), None);
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert!(parse("hello").is_err());
        assert!(parse("3 0 text").is_err());
        assert!(parse("1 2 text").is_err());
        assert!(parse("x 0 text").is_err());
        assert!(parse("1 0").is_err());
    }

    #[test]
    fn nothing_is_sent_while_disconnected() {
        let client = StreamClient::mock();
        let input = Cursor::new("1 0 hello\nclear\nbogus\n\nhelp\n");
        assert_eq!(run(&client.commander(), input), 0);
    }
}
