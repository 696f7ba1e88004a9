//! Stage notifications emitted while a pipeline runs.

/// Receives human-readable stage labels such as `"Processing page 2 of 5..."`.
pub trait ProgressSink {
    fn stage(&mut self, label: &str);
}

impl<F> ProgressSink for F
where
    F: FnMut(&str),
{
    fn stage(&mut self, label: &str) {
        self(label)
    }
}

/// Forwards every stage to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn stage(&mut self, label: &str) {
        log::info!("{}", label);
    }
}

/// Drops every stage.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn stage(&mut self, _label: &str) {}
}
