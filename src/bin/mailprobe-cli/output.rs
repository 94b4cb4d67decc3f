use std::collections::BTreeMap;

use anyhow::Result;
use mailprobe::store::HistoryEntry;
use mailprobe::{TaskResults, Verdict, VerificationResult};

pub fn print_result(result: &VerificationResult, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
    } else {
        println!("{result}");
    }
    Ok(())
}

pub fn print_task_results(results: &TaskResults, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(results)?);
        return Ok(());
    }
    let mut rows: Vec<_> = results.results.values().collect();
    rows.sort_by(|a, b| a.address.cmp(&b.address));
    for result in rows {
        println!("{result}");
    }
    println!(
        "-- {} of {} verified ({:?})",
        results.completed, results.total, results.status
    );
    Ok(())
}

pub fn print_summary(summary: &BTreeMap<Verdict, usize>, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }
    for (verdict, count) in summary {
        println!("{verdict}: {count}");
    }
    Ok(())
}

pub fn print_history(history: &BTreeMap<String, Vec<HistoryEntry>>, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(history)?);
        return Ok(());
    }
    for (address, entries) in history {
        println!("{address}:");
        for entry in entries {
            println!(
                "  {} {}",
                entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                entry.event
            );
        }
    }
    Ok(())
}
