//! Optional decision trace. Disabled traces cost one branch per record
//! call, so the engine always threads one through.

use chrono::NaiveDate;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEntry {
    pub date: NaiveDate,
    pub node_id: String,
    pub detail: String,
}

#[derive(Debug, Default)]
pub struct EvalTrace {
    entries: Vec<TraceEntry>,
    enabled: bool,
}

impl EvalTrace {
    pub fn disabled() -> Self {
        EvalTrace::default()
    }

    pub fn enabled() -> Self {
        EvalTrace {
            entries: Vec::new(),
            enabled: true,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn record(&mut self, date: NaiveDate, node_id: &str, detail: impl Into<String>) {
        if self.enabled {
            self.entries.push(TraceEntry {
                date,
                node_id: node_id.to_string(),
                detail: detail.into(),
            });
        }
    }

    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }
}
