use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;

use tilewalk_core::types::{PromptRequest, WorkflowEvent};
use tilewalk_engine::PromptBroker;

/// Print workflow progress to stderr and answer prompts from the terminal.
pub async fn follow(mut events: broadcast::Receiver<WorkflowEvent>, broker: Arc<PromptBroker>) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Console fell behind workflow events");
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        match event {
            WorkflowEvent::TileStarted {
                tile_id,
                tile_name,
                kind,
                ..
            } => {
                eprintln!("[tile: {} ({}, {})]", tile_name, tile_id, kind);
            }
            WorkflowEvent::TileCompleted {
                tile_id,
                next_tile,
                failure,
                elapsed_ms,
                ..
            } => match failure {
                Some(failure) => eprintln!("[{}: ERROR] {}", tile_id, failure),
                None => eprintln!(
                    "[{}: ok -> {}, {}ms]",
                    tile_id,
                    next_tile.as_deref().unwrap_or("end"),
                    elapsed_ms
                ),
            },
            WorkflowEvent::PromptRequested { request } => {
                let request_id = request.id.clone();
                let answer = tokio::task::spawn_blocking(move || ask(&request))
                    .await
                    .ok()
                    .flatten();
                match answer {
                    Some(answer) => {
                        broker.answer(&request_id, answer);
                    }
                    None => {
                        broker.dismiss(&request_id);
                    }
                }
            }
            WorkflowEvent::RunCompleted { steps, .. } => {
                eprintln!("\n[done: {} tiles]", steps);
            }
            WorkflowEvent::RunFailed { error, .. } => {
                eprintln!("\n[error: {}]", error);
            }
            _ => {}
        }
    }
}

fn ask(request: &PromptRequest) -> Option<String> {
    eprintln!();
    if request.options.is_empty() {
        return dialoguer::Input::<String>::new()
            .with_prompt(&request.prompt)
            .interact_text()
            .ok();
    }
    dialoguer::Select::new()
        .with_prompt(&request.prompt)
        .items(&request.options)
        .default(0)
        .interact()
        .ok()
        .map(|index| request.options[index].clone())
}
