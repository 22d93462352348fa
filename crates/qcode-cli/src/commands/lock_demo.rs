//! Lock demo command handler
//!
//! Two tabs share one bus: the first claims and edits, the second is
//! turned away, then gets the file once the first releases it.

use anyhow::Result;
use serde::Serialize;
use tracing::info;

use qcode_core::{
    BroadcastBus, Config, CoordinatorEvent, Document, EditCoordinator, EditSession,
};

use crate::output::{Output, OutputFormat};

#[derive(Debug, Serialize)]
struct Step {
    tab: &'static str,
    action: String,
    outcome: String,
}

/// Run the claim / reject / release / re-claim walkthrough
pub async fn run(file_id: String, config: &Config, output: &Output) -> Result<()> {
    let (steps, events) = walkthrough(&file_id, config).await?;

    match output.format {
        OutputFormat::Json => output.print_json(&serde_json::json!({
            "file_id": file_id,
            "steps": steps,
            "events": events,
        }))?,
        OutputFormat::Quiet => {
            for step in &steps {
                println!("{}", step.outcome);
            }
        }
        OutputFormat::Human => {
            println!("Edit lock walkthrough for '{}'", file_id);
            println!();
            for (i, step) in steps.iter().enumerate() {
                println!("{}. [{}] {:<28} -> {}", i + 1, step.tab, step.action, step.outcome);
            }
            println!();
            println!("Events:");
            for event in &events {
                println!("  {}", event);
            }
        }
    }
    Ok(())
}

async fn walkthrough(file_id: &str, config: &Config) -> Result<(Vec<Step>, Vec<String>)> {
    let timing = config.coordinator_config();
    let bus = BroadcastBus::default();
    let mut first = EditCoordinator::spawn(&bus, timing);
    let mut second = EditCoordinator::spawn(&bus, timing);
    let mut first_events = first.take_events();
    let mut second_events = second.take_events();
    info!(
        "Lock demo tabs {} and {} on '{}'",
        first.tab_id(),
        second.tab_id(),
        file_id
    );

    let mut steps = Vec::new();
    let mut record = |tab: &'static str, action: &str, outcome: String| {
        steps.push(Step {
            tab,
            action: action.to_string(),
            outcome,
        });
    };

    let mut session = EditSession::new(Document::new("draft"), config.new_history());

    let claimed = first.claim(file_id).await?;
    record("tab 1", "claim", claimed_outcome(claimed));

    session.set_editable(first.ensure_editable(file_id).await.is_ok());
    let edit = session.apply("draft, revised");
    record("tab 1", "edit", outcome_of(edit.map(|_| "edited".to_string())));
    let undo = session.undo();
    record(
        "tab 1",
        "undo",
        outcome_of(undo.map(|_| format!("content is \"{}\"", session.document().content()))),
    );

    let claimed = second.claim(file_id).await?;
    record("tab 2", "claim while tab 1 holds", claimed_outcome(claimed));
    record("tab 2", "status", second.status(file_id).await?.to_string());

    first.release(file_id)?;
    session.set_editable(false);
    let edit = session.apply("late edit");
    record("tab 1", "edit after release", outcome_of(edit.map(|_| "edited".to_string())));

    let claimed = second.claim(file_id).await?;
    record("tab 2", "claim after release", claimed_outcome(claimed));

    first.shutdown().await;
    second.shutdown().await;

    let mut events = Vec::new();
    for (tab, rx) in [("tab 1", &mut first_events), ("tab 2", &mut second_events)] {
        if let Some(rx) = rx {
            while let Ok(event) = rx.try_recv() {
                events.push(format!("{}: {}", tab, describe(&event)));
            }
        }
    }
    Ok((steps, events))
}

fn claimed_outcome(claimed: bool) -> String {
    let outcome = if claimed { "granted" } else { "rejected" };
    outcome.to_string()
}

fn outcome_of(result: qcode_core::CoreResult<String>) -> String {
    match result {
        Ok(outcome) => outcome,
        Err(e) => format!("refused: {}", e),
    }
}

fn describe(event: &CoordinatorEvent) -> String {
    match event {
        CoordinatorEvent::Claimed { file_id } => format!("claimed {}", file_id),
        CoordinatorEvent::Released { file_id } => format!("released {}", file_id),
        CoordinatorEvent::Conflict { file_id, peer } => {
            format!("conflict on {} with {}", file_id, peer)
        }
        CoordinatorEvent::ClaimRejected { file_id, holder } => {
            format!("claim on {} rejected, held by {}", file_id, holder)
        }
    }
}
