use crate::types::{CycleReport, SaleEvent};

/// Emit a finished poll cycle as a single JSON line to stdout.
pub fn report_cycle(report: &CycleReport) {
    if let Ok(json) = serde_json::to_string(report) {
        println!("{json}");
    }
}

/// Emit a manually posted sale as pretty-printed JSON to stdout.
pub fn report_posted_sale(sale: &SaleEvent) {
    if let Ok(json) = serde_json::to_string_pretty(sale) {
        println!("{json}");
    }
}
