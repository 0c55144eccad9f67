//! ==============================================================================
//! control.rs - operator console
//! ==============================================================================
//!
//! purpose:
//!     lets the operator change the polling interval or stop the station
//!     while it runs. Ctrl-C does not kill the process: it opens a prompt,
//!     and the answer is sent to the scheduler over a channel.
//!
//! delivery:
//!     the scheduler only looks at the channel while it is waiting for the
//!     next tick, so a command never lands in the middle of a gauge exchange.
//!
//! relationships:
//!     - used by: main.rs (spawns the console), scheduler.rs (consumes commands)
//!
//! ==============================================================================

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const PROMPT: &str = "To end enter Q, or enter a number to alter frequency: ";
pub const HINT: &str = "Please press Ctrl-C to end data collection or alter frequency.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    Quit,
    /// new polling interval in seconds
    SetInterval(u64),
    /// anything else the operator typed
    Invalid(String),
}

pub fn parse_command(line: &str) -> ControlCommand {
    let line = line.trim();
    if line.eq_ignore_ascii_case("q") {
        return ControlCommand::Quit;
    }
    if !line.is_empty() && line.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(seconds) = line.parse() {
            return ControlCommand::SetInterval(seconds);
        }
    }
    ControlCommand::Invalid(line.to_string())
}

/// spawn the Ctrl-C / stdin console
///
/// SIGTERM and a closed stdin both turn into `Quit`, so a station running
/// under a service manager still gets its final flush.
pub fn spawn_console(tx: mpsc::Sender<ControlCommand>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            if !wait_for_interrupt().await {
                let _ = tx.send(ControlCommand::Quit).await;
                return;
            }

            println!();
            print!("{}", PROMPT);
            use std::io::Write as _;
            let _ = std::io::stdout().flush();

            let command = match lines.next_line().await {
                Ok(Some(line)) => parse_command(&line),
                Ok(None) => {
                    tracing::info!("[CONSOLE] stdin closed, stopping");
                    ControlCommand::Quit
                }
                Err(e) => {
                    tracing::warn!("[CONSOLE] failed to read operator input: {}", e);
                    ControlCommand::Invalid(String::new())
                }
            };

            let quitting = command == ControlCommand::Quit;
            if tx.send(command).await.is_err() || quitting {
                return;
            }
        }
    })
}

/// true for Ctrl-C (prompt the operator), false for a termination request
async fn wait_for_interrupt() -> bool {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => tokio::select! {
                result = tokio::signal::ctrl_c() => result.is_ok(),
                _ = sigterm.recv() => {
                    tracing::info!("[CONSOLE] received SIGTERM");
                    false
                }
            },
            Err(e) => {
                tracing::warn!("[CONSOLE] cannot watch SIGTERM: {}", e);
                tokio::signal::ctrl_c().await.is_ok()
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quit() {
        assert_eq!(parse_command("q"), ControlCommand::Quit);
        assert_eq!(parse_command("Q\n"), ControlCommand::Quit);
        assert_eq!(parse_command("  q  "), ControlCommand::Quit);
    }

    #[test]
    fn test_interval() {
        assert_eq!(parse_command("30"), ControlCommand::SetInterval(30));
        assert_eq!(parse_command("5\r\n"), ControlCommand::SetInterval(5));
        assert_eq!(parse_command("0"), ControlCommand::SetInterval(0));
    }

    #[test]
    fn test_invalid() {
        assert_eq!(parse_command("-5"), ControlCommand::Invalid("-5".to_string()));
        assert_eq!(parse_command("+5"), ControlCommand::Invalid("+5".to_string()));
        assert_eq!(parse_command("2.5"), ControlCommand::Invalid("2.5".to_string()));
        assert_eq!(parse_command("quit"), ControlCommand::Invalid("quit".to_string()));
        assert_eq!(parse_command(""), ControlCommand::Invalid(String::new()));
        // digits, but more than fits in a u64
        assert!(matches!(parse_command("99999999999999999999999"), ControlCommand::Invalid(_)));
    }
}
