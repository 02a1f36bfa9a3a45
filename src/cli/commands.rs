//! Command handlers.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use crate::config::WeftConfig;
use crate::error::{Result, WeftError};
use crate::model::scripted::{ScriptStep, ScriptedModel};
use crate::orchestrator::{Orchestrator, RecordingObserver, RequestStatus};
use crate::projection::{ClientProjection, WireEnvelope};
use crate::repair::repair_with_report;
use crate::tools::{ClosureTool, ToolSet};
use crate::types::Message;

use super::{ProjectArgs, RepairArgs, ReplayArgs};

/// `weft replay`: run the orchestrator against a scripted model with an
/// `echo` tool and print the final history.
pub async fn handle_replay(args: ReplayArgs, config: WeftConfig) -> Result<()> {
    let steps: Vec<ScriptStep> = read_json(&args.script)?;
    let history = match &args.history {
        Some(path) => read_json(path)?,
        None => Vec::new(),
    };

    let model = Arc::new(ScriptedModel::new(steps));
    let orchestrator = Orchestrator::new(model, echo_tools(), config);
    let mut observer = RecordingObserver::default();
    let outcome = orchestrator
        .run(history, Message::user(args.input), &mut observer)
        .await?;

    if let Some(path) = &args.wire {
        let mut lines = String::new();
        for envelope in &observer.wire {
            lines.push_str(&serde_json::to_string(envelope)?);
            lines.push('\n');
        }
        std::fs::write(path, lines)?;
    }

    print_json(&outcome.messages)?;
    match &outcome.status {
        RequestStatus::Completed(reason) => {
            eprintln!("completed ({reason}) in {} step(s)", outcome.steps)
        }
        RequestStatus::Failed(message) => eprintln!("failed: {message}"),
        RequestStatus::Cancelled => eprintln!("stopped"),
    }
    if !outcome.repair.is_empty() {
        eprintln!("repair: {:?}", outcome.repair);
    }
    Ok(())
}

/// `weft repair`: print the repaired history and what was dropped.
pub fn handle_repair(args: RepairArgs) -> Result<()> {
    let history: Vec<Message> = read_json(&args.history)?;
    let (repaired, report) = repair_with_report(&history);
    print_json(&repaired)?;
    eprintln!(
        "dropped {} tool call(s), {} tool result(s), {} message(s)",
        report.dropped_tool_calls, report.dropped_tool_results, report.dropped_messages
    );
    Ok(())
}

/// `weft project`: replay a wire log through the client projection.
pub fn handle_project(args: ProjectArgs) -> Result<()> {
    let history: Vec<Message> = match &args.history {
        Some(path) => read_json(path)?,
        None => Vec::new(),
    };
    let raw = std::fs::read_to_string(&args.wire)?;
    let mut projection = ClientProjection::new(history);
    for (index, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let envelope: WireEnvelope = serde_json::from_str(line).map_err(|err| {
            WeftError::Configuration(format!(
                "{}:{}: {err}",
                args.wire.display(),
                index + 1
            ))
        })?;
        projection.apply_envelope(envelope);
    }
    eprintln!("state: {:?}", projection.state());
    print_json(projection.messages())
}

fn echo_tools() -> ToolSet {
    ToolSet::new().with(Arc::new(ClosureTool::new(
        "echo",
        "Returns its input unchanged",
        serde_json::json!({"type": "object"}),
        |input, _ctx| async move { Ok(input) },
    )))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read(path)?;
    Ok(serde_json::from_slice(&raw)?)
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value)?;
    writeln!(stdout)?;
    Ok(())
}
