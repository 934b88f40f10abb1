//! Terminal input
//!
//! Stdin is read by a single task and handed out line by line. The main loop
//! and the confirmation prompt share the receiver, so whoever is waiting
//! gets the next line.

use std::io::Write;
use std::sync::Arc;

use async_trait::async_trait;
use console_core::{ConfirmOverride, GuardrailVerdict};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, Mutex};

/// Lines typed by the user, shared between readers
#[derive(Clone)]
pub struct Lines {
    rx: Arc<Mutex<mpsc::Receiver<String>>>,
}

impl Lines {
    /// Start reading stdin in the background
    pub fn spawn_stdin() -> Self {
        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if tx.send(line).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to read stdin");
                        break;
                    }
                }
            }
            tracing::debug!("Stdin closed");
        });
        Self {
            rx: Arc::new(Mutex::new(rx)),
        }
    }

    /// Next line, `None` once stdin is closed
    pub async fn next(&self) -> Option<String> {
        self.rx.lock().await.recv().await
    }
}

/// Prompt printed before reading a line
pub fn prompt(text: &str) {
    print!("{text}");
    let _ = std::io::stdout().flush();
}

/// Asks on the terminal before sending a risky message
pub struct PromptConfirm {
    lines: Lines,
}

impl PromptConfirm {
    pub fn new(lines: Lines) -> Self {
        Self { lines }
    }
}

#[async_trait]
impl ConfirmOverride for PromptConfirm {
    async fn confirm(&self, _text: &str, verdict: &GuardrailVerdict) -> bool {
        println!(
            "! {} risk: {}",
            verdict.risk_level,
            verdict.reason.as_deref().unwrap_or("this message may change the cluster")
        );
        for tip in verdict.risk_level.recommendations() {
            println!("  - {tip}");
        }
        prompt("Send anyway? [y/N] ");

        let Some(answer) = self.lines.next().await else {
            return false;
        };
        matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
    }
}
