//! Accounting snapshots and summary output
//!
//! The table format follows strace's `-c` summary; JSON goes through serde.

use serde::{Deserialize, Serialize};

use crate::context::TraceContext;
use crate::duration::CallDuration;

/// Totals for a single operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationSummary {
    pub id: u32,
    pub name: String,
    pub calls: u64,
    pub total: CallDuration,
}

impl OperationSummary {
    /// Mean time per call in nanoseconds
    pub fn avg_nanos(&self) -> u128 {
        if self.calls == 0 {
            0
        } else {
            self.total.as_nanos() / u128::from(self.calls)
        }
    }
}

/// Snapshot of a trace context's accounting state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceSummary {
    pub operations: Vec<OperationSummary>,
    pub total_calls: u64,
    pub total_time: CallDuration,
    /// Clock resolution in nanoseconds, if it could be read
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clock_resolution_ns: Option<u64>,
}

impl TraceSummary {
    pub fn from_context(ctx: &TraceContext<'_>) -> Self {
        let operations: Vec<OperationSummary> = ctx
            .counters()
            .iter()
            .zip(ctx.durations())
            .enumerate()
            .map(|(i, (&calls, &total))| OperationSummary {
                id: i as u32,
                name: ctx.name_at(i).to_string(),
                calls,
                total,
            })
            .collect();

        let total_calls = operations
            .iter()
            .fold(0u64, |acc, op| acc.saturating_add(op.calls));
        let total_time = operations
            .iter()
            .fold(CallDuration::ZERO, |acc, op| acc + op.total);

        TraceSummary {
            operations,
            total_calls,
            total_time,
            clock_resolution_ns: ctx
                .clock_resolution()
                .map(|r| u64::try_from(r.period().as_nanos()).unwrap_or(u64::MAX)),
        }
    }

    pub fn operation(&self, name: &str) -> Option<&OperationSummary> {
        self.operations.iter().find(|op| op.name == name)
    }

    /// Operations that were called at least once, slowest first
    pub fn called(&self) -> Vec<&OperationSummary> {
        let mut called: Vec<_> = self.operations.iter().filter(|op| op.calls > 0).collect();
        called.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| b.calls.cmp(&a.calls)));
        called
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Render the strace-style table
    pub fn render_table(&self) -> String {
        let called = self.called();
        if called.is_empty() {
            return "No operations traced.\n".to_string();
        }

        let total_ns = self.total_time.as_nanos();
        let mut out = String::new();
        out.push_str("% time     seconds  usecs/call     calls operation\n");
        out.push_str("------ ----------- ----------- --------- ----------------\n");

        for op in called {
            let percent = if total_ns > 0 {
                op.total.as_nanos() as f64 / total_ns as f64 * 100.0
            } else {
                0.0
            };
            out.push_str(&format!(
                "{:6.2} {:>11.6} {:>11.3} {:>9} {}\n",
                percent,
                op.total.as_secs_f64(),
                op.avg_nanos() as f64 / 1_000.0,
                op.calls,
                op.name
            ));
        }

        out.push_str("------ ----------- ----------- --------- ----------------\n");
        let avg_us = if self.total_calls > 0 {
            total_ns as f64 / self.total_calls as f64 / 1_000.0
        } else {
            0.0
        };
        out.push_str(&format!(
            "100.00 {:>11.6} {:>11.3} {:>9} total\n",
            self.total_time.as_secs_f64(),
            avg_us,
            self.total_calls
        ));
        out
    }

    /// Print the table to stderr (matching strace behavior)
    pub fn print_summary(&self) {
        eprint!("{}", self.render_table());
    }
}
