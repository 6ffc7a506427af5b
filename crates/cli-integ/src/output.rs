//! Per-test captured output.
//!
//! Everything a fixture logs and every line its subprocesses print lands in
//! one buffer. The buffer is shown when the test fails, or live when verbose.

use std::sync::Mutex;

use cli_driver::OutputSink;

const RULE: &str = "================================================================";

#[derive(Debug, Default)]
pub struct FixtureOutput {
    buf: Mutex<String>,
    echo: bool,
}

impl FixtureOutput {
    /// `echo` mirrors every line to stderr as it arrives.
    pub fn new(echo: bool) -> Self {
        Self {
            buf: Mutex::new(String::new()),
            echo,
        }
    }

    /// Append raw text.
    pub fn write(&self, text: &str) {
        if self.echo {
            eprint!("{text}");
        }
        let mut buf = self.buf.lock().unwrap_or_else(|p| p.into_inner());
        buf.push_str(text);
    }

    /// Append a timestamped harness message.
    pub fn log(&self, message: &str) {
        let ts = chrono::Local::now().format("%H:%M:%S%.3f");
        self.write(&format!("[{ts}] {message}\n"));
    }

    pub fn header(&self, test_name: &str) {
        self.write(&format!("{RULE}\n{test_name}\n{RULE}\n"));
    }

    pub fn contents(&self) -> String {
        self.buf.lock().map(|b| b.clone()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.lock().map(|b| b.is_empty()).unwrap_or(true)
    }
}

impl OutputSink for FixtureOutput {
    fn write_line(&self, line: &str) {
        self.write(line);
        self.write("\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_then_lines() {
        let out = FixtureOutput::new(false);
        out.header("CDK synth bundled functions");
        out.write_line("$ cdk synth");
        out.log("validating");
        let text = out.contents();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], RULE);
        assert_eq!(lines[1], "CDK synth bundled functions");
        assert_eq!(lines[3], "$ cdk synth");
        assert!(lines[4].starts_with('[') && lines[4].ends_with("] validating"));
    }

    #[test]
    fn starts_empty() {
        assert!(FixtureOutput::default().is_empty());
    }
}
