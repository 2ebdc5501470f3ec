//! `smartflow logs`: per-substep telemetry for one run.

use anyhow::{Context, Result};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use smartflow_core::repository::state::StateStore;
use smartflow_types::state::StepLogEntry;

use crate::state::AppState;

pub async fn show_logs(state: &AppState, workflow_id: &str, json: bool) -> Result<()> {
    let logs = state
        .store
        .get_logs(workflow_id)
        .await
        .with_context(|| format!("failed to read logs for {workflow_id}"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&logs)?);
        return Ok(());
    }

    if logs.is_empty() {
        println!();
        println!(
            "  {} No telemetry recorded for {}",
            style("i").blue().bold(),
            style(workflow_id).yellow()
        );
        println!();
        return Ok(());
    }

    println!();
    println!("{}", logs_table(&logs));
    println!();

    let (input_tokens, output_tokens) = token_totals(&logs);
    println!(
        "  {} entries, {} input / {} output tokens",
        style(logs.len()).bold(),
        input_tokens,
        output_tokens
    );
    println!();

    Ok(())
}

fn logs_table(logs: &[StepLogEntry]) -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("Time").fg(Color::White),
        Cell::new("Step").fg(Color::White),
        Cell::new("Substep").fg(Color::White),
        Cell::new("Status").fg(Color::White),
        Cell::new("Score").fg(Color::White),
        Cell::new("Latency").fg(Color::White),
        Cell::new("Tokens").fg(Color::White),
        Cell::new("Explanation").fg(Color::White),
    ]);

    for entry in logs {
        let substep = if entry.is_step_summary() {
            Cell::new("(step)").fg(Color::DarkGrey)
        } else {
            Cell::new(&entry.substep_id).fg(Color::Cyan)
        };
        let status = if entry.success_status {
            Cell::new("● ok").fg(Color::Green)
        } else {
            Cell::new("✗ failed").fg(Color::Red)
        };

        table.add_row(vec![
            Cell::new(entry.timestamp.format("%H:%M:%S").to_string()).fg(Color::DarkGrey),
            Cell::new(&entry.step_id),
            substep,
            status,
            Cell::new(format!("{:.2}", entry.quality_score)),
            Cell::new(format!("{:.2}s", entry.latency)),
            Cell::new(format!("{}/{}", entry.input_tokens, entry.output_tokens)),
            Cell::new(truncate(&entry.evaluation_explanation, 60)),
        ]);
    }

    table
}

fn token_totals(logs: &[StepLogEntry]) -> (u64, u64) {
    // Step summaries repeat their substeps' counts.
    logs.iter()
        .filter(|e| !e.is_step_summary())
        .fold((0, 0), |(i, o), e| {
            (i + u64::from(e.input_tokens), o + u64::from(e.output_tokens))
        })
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let head: String = text.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}
