use anyhow::{Context, Result};
use projtree_core::ai::ToolUseData;
use projtree_core::context::build_project_context;
use projtree_core::file::disk::{reconcile, sync_from, LocalDirectory};
use projtree_core::file::{DiffStatus, VirtualFilesystem};
use projtree_core::tools::executor::apply_batch;
use serde::Deserialize;
use similar::TextDiff;
use std::path::Path;

/// One entry of the calls file.
#[derive(Debug, Deserialize)]
struct RecordedCall {
    name: String,
    #[serde(default)]
    args: Option<serde_json::Value>,
}

fn parse_calls(json: &str) -> Result<Vec<ToolUseData>> {
    let calls: Vec<RecordedCall> =
        serde_json::from_str(json).context("Calls file must be a JSON array of {name, args}")?;
    Ok(calls
        .into_iter()
        .enumerate()
        .map(|(index, call)| ToolUseData {
            id: format!("call_{index}"),
            name: call.name,
            arguments: call.args,
        })
        .collect())
}

async fn load(dir: &Path) -> Result<(VirtualFilesystem, LocalDirectory)> {
    let handle = LocalDirectory::new(dir);
    let mut fs = VirtualFilesystem::new();
    sync_from(&mut fs, &handle).await?;
    Ok((fs, handle))
}

pub async fn print_context(dir: &Path, exclude: &[String]) -> Result<()> {
    let (mut fs, _) = load(dir).await?;
    for path in exclude {
        if !fs.is_excluded(path) {
            fs.toggle_exclusion(path);
        }
    }

    if let Some(context) = build_project_context(&fs) {
        print!("{context}");
    }
    Ok(())
}

pub async fn run_replay(dir: &Path, calls_json: &str, apply: bool, show_diff: bool) -> Result<()> {
    let calls = parse_calls(calls_json)?;
    let (mut fs, handle) = load(dir).await?;

    for record in apply_batch(&mut fs, &calls) {
        match &record.result {
            Ok(message) => println!("[ok]    {}: {message}", record.name),
            Err(e) => println!("[error] {}: {e}", record.name),
        }
    }

    let changes = fs.changes();
    println!();
    if changes.is_empty() {
        println!("No changes");
    }
    for change in &changes {
        println!("{:<10} {}", change.status, change.path);
        if !show_diff || change.status != DiffStatus::Modified {
            continue;
        }
        let (Some(before), Some(after)) = (
            fs.original().and_then(|o| o.files.get(&change.path)),
            fs.current().files.get(&change.path),
        ) else {
            continue;
        };
        let diff = TextDiff::from_lines(before.as_str(), after.as_str());
        print!(
            "{}",
            diff.unified_diff()
                .context_radius(3)
                .header(&format!("a/{}", change.path), &format!("b/{}", change.path))
        );
    }

    if apply {
        let report = reconcile(&mut fs, &handle).await?;
        println!(
            "\nApplied to {}: {} deleted, {} folders created, {} files written",
            dir.display(),
            report.deleted.len(),
            report.created_dirs.len(),
            report.written.len()
        );
    }

    Ok(())
}
