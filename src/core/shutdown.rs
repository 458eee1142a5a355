// Copyright (c) 2026 OneNose Project
// Licensed under the MIT License. See LICENSE file in the project root.

//! Stop requests from any source, observed by the sampling loop

use std::sync::Arc;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{debug, info};

/// Why the run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// Ctrl-C / SIGINT
    Interrupt,
    /// Stop keyword typed on the console
    Console,
    ExitButton,
    PowerOffButton,
    GuiClosed,
}

/// Requests a stop. Cheap to clone; the first reason wins.
#[derive(Clone)]
pub struct ShutdownTrigger {
    tx: Arc<watch::Sender<Option<StopReason>>>,
}

/// Observes stop requests
#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<Option<StopReason>>,
}

pub fn channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = watch::channel(None);
    (ShutdownTrigger { tx: Arc::new(tx) }, ShutdownSignal { rx })
}

impl ShutdownTrigger {
    /// Returns false if a stop had already been requested
    pub fn stop(&self, reason: StopReason) -> bool {
        let accepted = self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        });
        if accepted {
            info!("Stop requested: {:?}", reason);
        } else {
            debug!("Ignoring {:?}, already stopping", reason);
        }
        accepted
    }

    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal { rx: self.tx.subscribe() }
    }
}

impl ShutdownSignal {
    pub fn is_stopping(&self) -> bool {
        self.rx.borrow().is_some()
    }

    pub fn reason(&self) -> Option<StopReason> {
        *self.rx.borrow()
    }

    /// Resolves once a stop is requested
    pub async fn wait(&mut self) -> Option<StopReason> {
        let stopped = self.rx.wait_for(|r| r.is_some()).await.map(|r| *r);
        match stopped {
            Ok(reason) => reason,
            // All triggers dropped; nobody can stop us any more
            Err(_) => std::future::pending().await,
        }
    }
}

/// Stop on Ctrl-C
pub fn watch_interrupt(trigger: ShutdownTrigger) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.stop(StopReason::Interrupt);
        }
    })
}

/// Stop when `keyword` is typed on stdin
pub fn watch_console(trigger: ShutdownTrigger, keyword: String) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if is_stop_command(&line, &keyword) {
                trigger.stop(StopReason::Console);
                break;
            }
        }
    })
}

fn is_stop_command(line: &str, keyword: &str) -> bool {
    line.trim().eq_ignore_ascii_case(keyword)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_reason_wins() {
        let (trigger, mut signal) = channel();
        assert!(!signal.is_stopping());

        assert!(trigger.stop(StopReason::ExitButton));
        assert!(!trigger.clone().stop(StopReason::Interrupt));

        assert_eq!(signal.wait().await, Some(StopReason::ExitButton));
        assert_eq!(signal.reason(), Some(StopReason::ExitButton));
    }

    #[tokio::test]
    async fn test_wait_wakes_on_stop() {
        let (trigger, signal) = channel();
        let mut waiting = signal.clone();
        let handle = tokio::spawn(async move { waiting.wait().await });

        tokio::task::yield_now().await;
        trigger.stop(StopReason::GuiClosed);
        assert_eq!(handle.await.unwrap(), Some(StopReason::GuiClosed));
        assert!(signal.is_stopping());
    }

    #[test]
    fn test_stop_keyword_matching() {
        assert!(is_stop_command("stop", "stop"));
        assert!(is_stop_command("  STOP \n", "stop"));
        assert!(!is_stop_command("stopper", "stop"));
        assert!(!is_stop_command("", "stop"));
    }
}
