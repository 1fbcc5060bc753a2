//! Terminal rendering of payment snapshots.

use bounty_payments::{present, ModalStep, PaymentAttempt, PaymentView, ViewContext};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::warn;

/// Print one view, as text or a JSON line.
pub fn print_view(view: &PaymentView, json: bool) {
    if json {
        match serde_json::to_string(view) {
            Ok(line) => println!("{}", line),
            Err(e) => warn!("Failed to serialize view: {}", e),
        }
    } else {
        println!("{}", view);
    }
}

/// Whether a snapshot should be drawn given the previous view.
///
/// The confirm step is drawn by the caller right before prompting.
fn should_render(view: &PaymentView, last: Option<&PaymentView>) -> bool {
    view.step != ModalStep::Confirm && last != Some(view)
}

/// Render every snapshot published by the orchestrator until it is dropped.
pub fn spawn_renderer(
    mut events: broadcast::Receiver<PaymentAttempt>,
    ctx: ViewContext,
    json: bool,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut last: Option<PaymentView> = None;
        loop {
            match events.recv().await {
                Ok(attempt) => {
                    let view = present(&attempt, &ctx);
                    if should_render(&view, last.as_ref()) {
                        print_view(&view, json);
                        last = Some(view);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Renderer fell behind, skipped {} snapshots", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
