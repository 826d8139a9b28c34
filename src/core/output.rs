//! Aggregated command output for one pipeline run.

/// Text accumulated across every command of a run, in execution order.
///
/// Dropped without being returned when the run fails.
#[derive(Debug, Default)]
pub struct OutputBuffer {
    text: String,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_str(&mut self, text: &str) {
        self.text.push_str(text);
    }

    /// Append the `Running pipeline P on server S` marker line.
    pub fn push_server_marker(&mut self, pipeline: &str, server: &str) {
        self.text.push_str(&server_marker(pipeline, server));
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

pub fn server_marker(pipeline: &str, server: &str) -> String {
    format!("Running pipeline {} on server {}\n", pipeline, server)
}
