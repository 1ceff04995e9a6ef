//! JSON-lines export: one `CycleReport` object per line.

use std::io::{self, Write};

use super::ReportSink;
use crate::types::{CycleReport, MonitorError};

pub struct JsonRenderer {
    out: Box<dyn Write + Send>,
}

impl JsonRenderer {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self { out }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }
}

impl ReportSink for JsonRenderer {
    fn emit(&mut self, report: &CycleReport) -> Result<(), MonitorError> {
        let line = serde_json::to_string(report)
            .map_err(|e| MonitorError::Render(format!("serialize cycle report: {e}")))?;
        writeln!(self.out, "{line}")
            .and_then(|_| self.out.flush())
            .map_err(|e| MonitorError::Render(format!("json write failed: {e}")))
    }
}
