use crate::output::{print_json, print_table};
use anyhow::Context;
use rootcause_core::parser::parse_text;
use std::path::Path;

pub fn run(file: &Path, json: bool) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let record = parse_text(&text).context("failed to parse context")?;

    if json {
        return print_json(&record);
    }

    println!("Error:  {}", record.headline());
    println!(
        "Frames: {} ({} in app)",
        record.frames.len(),
        record.in_app_frames().count()
    );
    println!();

    let frames = record
        .frames
        .iter()
        .enumerate()
        .map(|(i, f)| {
            vec![
                i.to_string(),
                if f.in_app { "yes" } else { "" }.to_string(),
                f.location.clone(),
                f.function.clone().unwrap_or_default(),
            ]
        })
        .collect();
    print_table(&["#", "IN-APP", "LOCATION", "FUNCTION"], frames);

    if !record.breadcrumbs.is_empty() {
        println!();
        let crumbs = record
            .breadcrumbs
            .iter()
            .map(|b| vec![b.timestamp_ordinal.to_string(), b.label(), b.summary.clone()])
            .collect();
        print_table(&["ORDINAL", "CATEGORY", "SUMMARY"], crumbs);
    }

    if !record.tags.is_empty() {
        println!();
        let tags = record
            .tags
            .iter()
            .map(|(k, v)| vec![k.clone(), v.clone()])
            .collect();
        print_table(&["TAG", "VALUE"], tags);
    }

    Ok(())
}
