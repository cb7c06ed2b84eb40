//! Line-oriented console input standing in for the hardware keys,
//! encoder and touchscreen.
//!
//! The input thread only feeds [`SharedInput`] and raises the matching
//! interrupt; all handling happens later on the dispatcher thread.

use std::io::BufRead;

use rxhub_core::widget::{KeyEvent, SharedInput, TouchEvent, TouchKind};
use rxhub_core::{IrqBridge, SleepHandle, StopHandle};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Key(KeyEvent),
    Encoder(i32),
    Touch(i32, i32),
    Sleep,
    Quit,
}

/// Parse one console line. Blank lines yield `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();

    let command = match (verb.to_ascii_lowercase().as_str(), args.as_slice()) {
        ("up" | "u", []) => Command::Key(KeyEvent::Up),
        ("down" | "d", []) => Command::Key(KeyEvent::Down),
        ("left" | "l", []) => Command::Key(KeyEvent::Left),
        ("right" | "r", []) => Command::Key(KeyEvent::Right),
        ("select" | "s" | "ok", []) => Command::Key(KeyEvent::Select),
        ("dfu", []) => Command::Key(KeyEvent::Dfu),
        ("enc", [n]) => Command::Encoder(parse_int(n)?),
        ("touch", [x, y]) => Command::Touch(parse_int(x)?, parse_int(y)?),
        ("sleep", []) => Command::Sleep,
        ("quit" | "q" | "exit", []) => Command::Quit,
        _ => return Err(format!("unrecognized command: {}", line.trim())),
    };
    Ok(Some(command))
}

fn parse_int(s: &str) -> Result<i32, String> {
    s.parse().map_err(|_| format!("not a number: {s}"))
}

/// Everything the console needs to reach the dispatcher.
#[derive(Clone)]
pub struct Console {
    pub input: SharedInput,
    pub irq: IrqBridge,
    pub sleep: SleepHandle,
    pub stop: StopHandle,
}

impl Console {
    /// Apply one command. Returns `false` once the session should end.
    pub fn apply(&self, command: Command) -> bool {
        debug!(?command, "console");
        match command {
            Command::Key(key) => {
                self.input.tap(key);
                self.irq.event_isr_switches();
            }
            Command::Encoder(delta) => {
                self.input.rotate(delta);
                self.irq.event_isr_encoder();
            }
            Command::Touch(x, y) => {
                self.input.touch(TouchEvent::new(TouchKind::Start, x, y));
                self.input.touch(TouchEvent::new(TouchKind::End, x, y));
                self.irq.event_isr_touch();
            }
            Command::Sleep => self.sleep.request_sleep(),
            Command::Quit => {
                self.stop.request_stop();
                return false;
            }
        }
        true
    }

    /// Read commands until `quit` or end of input.
    pub fn run(&self, reader: impl BufRead) {
        for line in reader.lines() {
            let line = match line {
                Ok(l) => l,
                Err(e) => {
                    warn!(error = %e, "console read failed");
                    return;
                }
            };
            match parse_command(&line) {
                Ok(Some(command)) => {
                    if !self.apply(command) {
                        return;
                    }
                }
                Ok(None) => {}
                Err(e) => warn!("{e}"),
            }
        }
        debug!("console input closed");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_keys() {
        assert_eq!(parse_command("up"), Ok(Some(Command::Key(KeyEvent::Up))));
        assert_eq!(parse_command("  SELECT "), Ok(Some(Command::Key(KeyEvent::Select))));
        assert_eq!(parse_command("r"), Ok(Some(Command::Key(KeyEvent::Right))));
    }

    #[test]
    fn test_parse_arguments() {
        assert_eq!(parse_command("enc -3"), Ok(Some(Command::Encoder(-3))));
        assert_eq!(parse_command("touch 10 200"), Ok(Some(Command::Touch(10, 200))));
        assert_eq!(parse_command("quit"), Ok(Some(Command::Quit)));
        assert_eq!(parse_command(""), Ok(None));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_command("enc").is_err());
        assert!(parse_command("enc x").is_err());
        assert!(parse_command("touch 1").is_err());
        assert!(parse_command("up now").is_err());
        assert!(parse_command("fly").is_err());
    }
}
