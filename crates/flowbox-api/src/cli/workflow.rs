//! CLI workflow commands: validate, order, run.
//!
//! Each command loads the description file through the workflow service, so
//! the CLI sees exactly the validation the HTTP API does.

use std::path::Path;

use anyhow::{Context, Result, bail};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use tokio::sync::broadcast;

use flowbox_core::service::WorkflowService;
use flowbox_infra::workflow_file::load_workflow_file;
use flowbox_types::event::WorkflowEvent;
use flowbox_types::run::{BoxStatus, RunSummary};
use flowbox_types::workflow::WorkflowView;

use crate::state::AppState;

/// Parse a file and install it, turning validation errors into CLI errors.
async fn load(service: &WorkflowService, file: &Path) -> Result<WorkflowView> {
    let parsed = load_workflow_file(file).await?;
    service
        .load_workflow(parsed)
        .await
        .with_context(|| format!("Workflow {} is invalid", file.display()))
}

// ---------------------------------------------------------------------------
// Validate
// ---------------------------------------------------------------------------

pub async fn validate(state: &AppState, file: &Path, json: bool) -> Result<()> {
    let view = load(&state.workflow_service, file).await?;

    if json {
        let out = serde_json::json!({
            "valid": true,
            "boxes": view.nodes.len(),
            "connections": view.edges.len(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} {} is valid ({} boxes, {} connections)",
        style("*").green().bold(),
        style(file.display()).cyan(),
        view.nodes.len(),
        view.edges.len()
    );
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Order
// ---------------------------------------------------------------------------

pub async fn order(state: &AppState, file: &Path, json: bool) -> Result<()> {
    let view = load(&state.workflow_service, file).await?;
    let order = state.workflow_service.execution_order().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&order)?);
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("#"),
            Cell::new("Box").fg(Color::Cyan),
            Cell::new("Inputs"),
            Cell::new("Feeds"),
            Cell::new("Description"),
        ]);

    for (idx, box_id) in order.iter().enumerate() {
        let Some(node) = view.nodes.iter().find(|n| &n.id == box_id) else {
            continue;
        };
        let inputs = node
            .inputs
            .iter()
            .map(|input| match node.input_sources.get(input) {
                Some(source) => format!("{input} <- {source}"),
                None => format!("{input} (unbound)"),
            })
            .collect::<Vec<_>>()
            .join("\n");

        table.add_row(vec![
            Cell::new(idx + 1),
            Cell::new(box_id),
            Cell::new(inputs),
            Cell::new(node.downstream.join(", ")),
            Cell::new(&node.description),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// Full run, then one single-box rerun per `--box`, streaming status events.
///
/// Fails (non-zero exit) if any box failed in any of the runs.
pub async fn run(state: &AppState, file: &Path, boxes: &[String], json: bool) -> Result<()> {
    let service = &state.workflow_service;
    load(service, file).await?;

    // Subscribe before triggering so no event is missed
    let mut rx = service.subscribe();
    let mut summaries = Vec::with_capacity(1 + boxes.len());

    let handle = service.request_run_all().await?;
    stream_until_finished(&mut rx, json).await;
    summaries.push(handle.await.context("Run worker failed")?);

    for box_id in boxes {
        let handle = service.request_run_single(box_id).await?;
        stream_until_finished(&mut rx, json).await;
        summaries.push(handle.await.context("Run worker failed")?);
    }

    if !json {
        print_summaries(&summaries);
    }

    if !summaries.iter().all(RunSummary::all_succeeded) {
        let failed: usize = summaries.iter().map(|s| s.failed.len()).sum();
        bail!("{failed} box execution(s) failed");
    }
    Ok(())
}

/// Print events until the current run reports `run_finished`.
async fn stream_until_finished(rx: &mut broadcast::Receiver<WorkflowEvent>, json: bool) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                let finished = matches!(event, WorkflowEvent::RunFinished { .. });
                print_event(&event, json);
                if finished {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!(skipped = n, "status output lagged, {n} events not shown");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn print_event(event: &WorkflowEvent, json: bool) {
    if json {
        if let Ok(line) = serde_json::to_string(event) {
            println!("{line}");
        }
        return;
    }

    match event {
        WorkflowEvent::RunStarted { kind, box_count, .. } => {
            println!();
            println!(
                "  {} {} run ({} box{})",
                style(">").bold(),
                style(kind).cyan(),
                box_count,
                if *box_count == 1 { "" } else { "es" }
            );
        }
        WorkflowEvent::BoxStatus {
            box_id,
            status,
            data,
            ..
        } => match status {
            BoxStatus::Running => {
                println!("    {} {}", style("~").dim(), style(box_id).dim());
            }
            BoxStatus::Success => {
                let output = data
                    .as_ref()
                    .map(|d| d.to_string())
                    .unwrap_or_default();
                println!(
                    "    {} {} {}",
                    style("✓").green(),
                    style(box_id).cyan(),
                    style(output).dim()
                );
            }
            BoxStatus::Error => {
                let message = data
                    .as_ref()
                    .and_then(|d| d.get("message"))
                    .and_then(|m| m.as_str())
                    .unwrap_or("unknown error");
                println!(
                    "    {} {} {}",
                    style("✗").red(),
                    style(box_id).cyan(),
                    style(message).red()
                );
            }
        },
        WorkflowEvent::RunFinished { duration_ms, .. } => {
            println!("    {}", style(format!("finished in {duration_ms}ms")).dim());
        }
    }
}

fn print_summaries(summaries: &[RunSummary]) {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Run").fg(Color::Cyan),
            Cell::new("State"),
            Cell::new("Succeeded"),
            Cell::new("Failed"),
            Cell::new("Duration"),
        ]);

    for s in summaries {
        let run_id = s.run_id.to_string();
        let failed_cell = if s.failed.is_empty() {
            Cell::new("-")
        } else {
            Cell::new(s.failed.join(", ")).fg(Color::Red)
        };
        table.add_row(vec![
            Cell::new(format!("{} {}", &run_id[..8.min(run_id.len())], s.kind)),
            Cell::new(format!("{:?}", s.state).to_lowercase()),
            Cell::new(s.succeeded.len()),
            failed_cell,
            Cell::new(format!("{}ms", s.duration_ms)),
        ]);
    }

    println!();
    println!("{table}");
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowbox_types::config::EngineConfig;
    use tempfile::TempDir;

    const FLOW: &str = r#"
boxes:
  - id: A
    code: '{"x": 1}'
  - id: B
    inputs: [nums]
    code: '{"y": nums.x + 1}'
connections:
  - source: A
    target: B
    target_input: nums
"#;

    fn state(dir: &TempDir) -> AppState {
        AppState::new(EngineConfig::default(), dir.path().to_path_buf())
    }

    async fn write(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        tokio::fs::write(&path, content).await.unwrap();
        path
    }

    #[tokio::test]
    async fn run_full_then_single() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir);
        let file = write(&dir, "flow.yaml", FLOW).await;

        run(&state, &file, &["B".to_string()], true).await.unwrap();

        let cached = state.workflow_service.get_cached_output("B").unwrap();
        assert_eq!(cached["y"], serde_json::json!(2));
    }

    #[tokio::test]
    async fn demo_fan_out_runs_clean() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir);
        let file = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demos/fan_out.yaml");

        run(&state, &file, &["report".to_string()], true).await.unwrap();

        let report = state.workflow_service.get_cached_output("report").unwrap();
        assert_eq!(report["title"], serde_json::json!("SENSOR A"));
        assert_eq!(report["mean"], serde_json::json!(3.88));
    }

    #[tokio::test]
    async fn run_reports_failed_boxes() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir);
        let file = write(
            &dir,
            "bad.yaml",
            "boxes:\n  - id: broken\n    code: \"'nope'|fail\"\n",
        )
        .await;

        let err = run(&state, &file, &[], true).await.unwrap_err();
        assert!(err.to_string().contains("1 box execution(s) failed"));
    }

    #[tokio::test]
    async fn validate_rejects_cycles() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir);
        let file = write(
            &dir,
            "cycle.json",
            r#"{"boxes": [{"id": "a", "inputs": ["v"], "code": "{}"}],
                "connections": [{"source": "a", "target": "a", "target_input": "v"}]}"#,
        )
        .await;

        let err = validate(&state, &file, true).await.unwrap_err();
        assert!(format!("{err:#}").contains("cycle detected"));
    }
}
