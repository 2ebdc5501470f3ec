//! `smartflow state` and `smartflow list`.

use anyhow::{Context, Result};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use serde_json::json;

use smartflow_core::repository::state::StateStore;

use crate::state::AppState;

/// Print the stored snapshot for `workflow_id`.
pub async fn show_state(state: &AppState, workflow_id: &str, json: bool) -> Result<()> {
    let snapshot = state
        .store
        .load_state(workflow_id)
        .await
        .with_context(|| format!("failed to load state for {workflow_id}"))?;
    let version = state
        .store
        .load_version(workflow_id)
        .await
        .with_context(|| format!("failed to load state version for {workflow_id}"))?;

    if json {
        let payload = json!({
            "workflow_id": workflow_id,
            "version": version,
            "state": snapshot,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    let Some(version) = version else {
        println!();
        println!(
            "  {} No state stored for {}",
            style("i").blue().bold(),
            style(workflow_id).yellow()
        );
        println!();
        return Ok(());
    };

    println!();
    println!(
        "  {} {} {}",
        style("Workflow").bold(),
        style(workflow_id).cyan(),
        style(format!("(version {version})")).dim()
    );
    println!();
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

/// List every workflow id with a stored snapshot.
pub async fn list_workflows(state: &AppState, json: bool) -> Result<()> {
    let ids = state
        .store
        .list_workflows()
        .await
        .context("failed to list workflows")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&ids)?);
        return Ok(());
    }

    if ids.is_empty() {
        println!();
        println!(
            "  {} No workflow runs found. Start one with: {}",
            style("i").blue().bold(),
            style("smartflow run --input-text \"...\"").yellow()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Workflow").fg(Color::White),
        Cell::new("Version").fg(Color::White),
        Cell::new("Entries").fg(Color::White),
    ]);

    for id in &ids {
        let version = state.store.load_version(id).await?.unwrap_or(0);
        let entries = state.store.load_state(id).await?.len();
        table.add_row(vec![
            Cell::new(id).fg(Color::Cyan),
            Cell::new(version),
            Cell::new(entries),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    println!(
        "  {} workflow{} in {} storage",
        style(ids.len()).bold(),
        if ids.len() == 1 { "" } else { "s" },
        state.config.storage.kind
    );
    println!();

    Ok(())
}
