//! Line renderer for child process output.
//!
//! Primary-channel lines starting with the progress marker overwrite each
//! other in place with `\r`. Anything else terminates the pending progress
//! line first. Diagnostic lines are never coalesced.

use crate::config::EngineConfig;
use std::io::{self, Write};

/// Which stream a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Primary,
    Diagnostic,
}

pub struct OutputRenderer {
    out: Box<dyn Write + Send>,
    err: Box<dyn Write + Send>,
    /// Width of the progress line currently on screen, if any.
    pending: Option<usize>,
}

impl OutputRenderer {
    pub fn new(out: Box<dyn Write + Send>, err: Box<dyn Write + Send>) -> Self {
        Self {
            out,
            err,
            pending: None,
        }
    }

    /// Renderer writing to the process's own stdout/stderr.
    pub fn stdio() -> Self {
        Self::new(Box::new(io::stdout()), Box::new(io::stderr()))
    }

    pub fn line(&mut self, channel: Channel, line: &str) -> io::Result<()> {
        match channel {
            Channel::Primary => self.primary(line),
            Channel::Diagnostic => self.diagnostic(line),
        }
    }

    pub fn primary(&mut self, line: &str) -> io::Result<()> {
        if line.starts_with(EngineConfig::PROGRESS_MARKER) {
            let width = line.chars().count();
            match self.pending {
                Some(previous) => {
                    write!(self.out, "\r{}", line)?;
                    if previous > width {
                        // Blank out the tail of a longer previous line
                        write!(self.out, "{}", " ".repeat(previous - width))?;
                    }
                }
                None => write!(self.out, "{}", line)?,
            }
            self.pending = Some(width);
        } else {
            self.terminate_progress()?;
            writeln!(self.out, "{}", line)?;
        }
        self.out.flush()
    }

    pub fn diagnostic(&mut self, line: &str) -> io::Result<()> {
        self.terminate_progress()?;
        self.out.flush()?;
        writeln!(self.err, "error: {}", line)?;
        self.err.flush()
    }

    /// End a pending progress line, e.g. when the child exits.
    pub fn finish(&mut self) -> io::Result<()> {
        self.terminate_progress()?;
        self.out.flush()
    }

    fn terminate_progress(&mut self) -> io::Result<()> {
        if self.pending.take().is_some() {
            writeln!(self.out)?;
        }
        Ok(())
    }
}

/// Cloneable in-memory sink, handy for capturing rendered output.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        let guard = self.0.lock().unwrap_or_else(|e| e.into_inner());
        String::from_utf8_lossy(&guard).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self.0.lock().unwrap_or_else(|e| e.into_inner());
        guard.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn renderer() -> (OutputRenderer, SharedBuffer) {
        let buf = SharedBuffer::new();
        let r = OutputRenderer::new(Box::new(buf.clone()), Box::new(buf.clone()));
        (r, buf)
    }

    #[test]
    fn test_progress_lines_collapse() {
        let (mut r, buf) = renderer();
        r.primary("Progress: 10%").unwrap();
        r.primary("Progress: 20%").unwrap();
        r.primary("Done").unwrap();
        assert_eq!(buf.contents(), "Progress: 10%\rProgress: 20%\nDone\n");
    }

    #[test]
    fn test_diagnostic_lines_are_marked_and_never_coalesced() {
        let (mut r, buf) = renderer();
        r.primary("Progress: 50%").unwrap();
        r.diagnostic("disk full").unwrap();
        r.diagnostic("disk full").unwrap();
        assert_eq!(
            buf.contents(),
            "Progress: 50%\nerror: disk full\nerror: disk full\n"
        );
    }

    #[test]
    fn test_shorter_progress_line_is_padded() {
        let (mut r, buf) = renderer();
        r.primary("Progress: 100% (10/10)").unwrap();
        r.primary("Progress: 1%").unwrap();
        r.finish().unwrap();
        assert_eq!(
            buf.contents(),
            format!("Progress: 100% (10/10)\rProgress: 1%{}\n", " ".repeat(10))
        );
    }

    #[test]
    fn test_finish_without_progress_is_silent() {
        let (mut r, buf) = renderer();
        r.primary("Listening").unwrap();
        r.finish().unwrap();
        assert_eq!(buf.contents(), "Listening\n");
    }
}
