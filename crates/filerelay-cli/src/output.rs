use filerelay_core::engine::CycleReport;
use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Left-aligned columns sized to the widest cell, two spaces apart.
pub fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.len());
        }
    }

    print_row(headers.iter().copied(), &widths);
    let rule: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    print_row(rule.iter().map(String::as_str), &widths);
    for row in rows {
        print_row(row.iter().map(String::as_str), &widths);
    }
}

fn print_row<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize]) {
    let padded: Vec<String> = cells
        .zip(widths)
        .map(|(c, &w)| format!("{c:w$}"))
        .collect();
    println!("{}", padded.join("  ").trim_end());
}

pub fn print_cycle(report: &CycleReport) {
    for f in &report.finalized {
        let tries = if f.attempts == 1 { "try" } else { "tries" };
        println!("{:<7}  {}  ({} {tries})", f.status.as_str(), f.filename, f.attempts);
    }
    for name in &report.operator_marked {
        println!("marked   {name}  (by operator)");
    }
    if report.finalized.is_empty() && report.operator_marked.is_empty() {
        println!("No pending files.");
    }
    if report.interrupted {
        println!(
            "Interrupted with {} file(s) still pending.",
            report.remaining
        );
    }
}
