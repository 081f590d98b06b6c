//! Report sink that records what it is given.

use std::sync::Mutex;

use wsload::{FinalReport, ReportSink, Result, Snapshot};

/// One call into the sink.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    Progress(Snapshot),
    Finish(FinalReport),
}

#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn progress_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, SinkEvent::Progress(_)))
            .count()
    }

    pub fn reports(&self) -> Vec<FinalReport> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SinkEvent::Finish(report) => Some(report),
                SinkEvent::Progress(_) => None,
            })
            .collect()
    }
}

impl ReportSink for RecordingSink {
    fn progress(&self, snapshot: &Snapshot) {
        self.events
            .lock()
            .unwrap()
            .push(SinkEvent::Progress(*snapshot));
    }

    fn finish(&self, report: &FinalReport) -> Result<()> {
        self.events
            .lock()
            .unwrap()
            .push(SinkEvent::Finish(report.clone()));
        Ok(())
    }
}
