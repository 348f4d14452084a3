use crate::pipeline::StepRecord;

/// Where the pipeline reports what it is doing. Write-only from the
/// pipeline's point of view.
pub trait ProgressSink {
    /// Append one line to the run log.
    fn write_line(&self, line: &str);
    /// Report that a step reached an outcome.
    fn report_step(&self, record: &StepRecord);
}

/// Writes the run log and step progress to stderr, keeping stdout for the
/// JSON response.
#[derive(Debug, Default)]
pub struct ConsoleProgress {
    pub quiet: bool,
}

impl ConsoleProgress {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }
}

impl ProgressSink for ConsoleProgress {
    fn write_line(&self, line: &str) {
        if !self.quiet {
            eprintln!("{}", line);
        }
    }

    fn report_step(&self, record: &StepRecord) {
        if !self.quiet {
            eprintln!(
                "[{}] {}",
                chrono::Local::now().format("%H:%M:%S"),
                record.status_text()
            );
        }
    }
}
