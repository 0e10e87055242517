use std::io::{self, Write};

use crate::handlers::DisplaySink;
use crate::models::{DisplayUpdate, CURSOR_MARKER};

/// Renders display updates on a terminal: the description grows in place
/// with a trailing cursor, warnings and errors go to the diagnostic stream.
pub struct TerminalSink<O: Write, E: Write> {
    out: O,
    err: E,
    live: bool,
    shown: usize,
    cursor: bool,
    error: Option<io::Error>,
}

impl<O: Write, E: Write> TerminalSink<O, E> {
    /// With `live` off, only the finished description is written
    pub fn new(out: O, err: E, live: bool) -> Self {
        Self {
            out,
            err,
            live,
            shown: 0,
            cursor: false,
            error: None,
        }
    }

    pub fn into_parts(self) -> (O, E) {
        (self.out, self.err)
    }

    /// First write failure, if any (e.g. stdout piped into a closed reader)
    pub fn take_error(&mut self) -> Option<io::Error> {
        self.error.take()
    }

    fn record(&mut self, result: io::Result<()>) {
        if let Err(e) = result {
            if self.error.is_none() {
                log::debug!("Terminal write failed: {}", e);
                self.error = Some(e);
            }
        }
    }

    fn erase_cursor(&mut self) {
        if self.cursor {
            // One column back, blank it, back again
            let result = write!(self.out, "\u{8} \u{8}");
            self.record(result);
            self.cursor = false;
        }
    }

    fn end_line(&mut self) {
        self.erase_cursor();
        if self.shown > 0 {
            let result = writeln!(self.out);
            self.record(result);
            self.shown = 0;
        }
    }
}

impl<O: Write, E: Write> DisplaySink for TerminalSink<O, E> {
    fn render(&mut self, update: DisplayUpdate) {
        if !self.live && !update.is_terminal() {
            return;
        }

        match update {
            DisplayUpdate::Partial(_) | DisplayUpdate::Final(_) if self.error.is_some() => return,
            DisplayUpdate::Partial(text) => {
                let body = text.strip_suffix(CURSOR_MARKER).unwrap_or(&text);
                self.erase_cursor();
                let result = write!(self.out, "{}{}", body.get(self.shown..).unwrap_or(""), CURSOR_MARKER);
                self.record(result);
                self.shown = body.len();
                self.cursor = true;
            }
            DisplayUpdate::Final(text) => {
                self.erase_cursor();
                let result = match text.get(self.shown..) {
                    Some(rest) if self.shown > 0 => writeln!(self.out, "{}", rest),
                    _ => writeln!(self.out, "{}", text),
                };
                self.record(result);
                self.shown = 0;
            }
            DisplayUpdate::Warning(warning) => {
                let result = writeln!(self.err, "{}", warning);
                self.record(result);
            }
            DisplayUpdate::Error(text) => {
                self.end_line();
                let result = writeln!(self.err, "❌ {}", text);
                self.record(result);
            }
        }

        let result = self.out.flush();
        self.record(result);
    }

    fn busy(&mut self, status: &str) {
        let result = writeln!(self.err, "{}", status);
        self.record(result);
    }

    /// Nothing more can be shown once the output is broken
    fn is_closed(&self) -> bool {
        self.error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Warning;

    fn rendered(live: bool, updates: Vec<DisplayUpdate>) -> (String, String) {
        let mut sink = TerminalSink::new(Vec::new(), Vec::new(), live);
        for update in updates {
            sink.render(update);
        }
        let (out, err) = sink.into_parts();
        (String::from_utf8(out).unwrap(), String::from_utf8(err).unwrap())
    }

    fn flor_updates() -> Vec<DisplayUpdate> {
        vec![
            DisplayUpdate::Partial("Una▌".to_string()),
            DisplayUpdate::Partial("Una flor▌".to_string()),
            DisplayUpdate::Final("Una flor".to_string()),
        ]
    }

    #[test]
    fn test_live_rendering_writes_each_delta_once() {
        let (out, err) = rendered(true, flor_updates());

        assert_eq!(out, "Una▌\u{8} \u{8} flor▌\u{8} \u{8}\n");
        assert!(err.is_empty());
    }

    #[test]
    fn test_quiet_rendering_prints_only_final() {
        let (out, _) = rendered(false, flor_updates());
        assert_eq!(out, "Una flor\n");
    }

    #[test]
    fn test_error_closes_line_and_reports() {
        let (out, err) = rendered(
            true,
            vec![
                DisplayUpdate::Partial("Una▌".to_string()),
                DisplayUpdate::Error("Ocurrió un error: timeout".to_string()),
            ],
        );

        assert_eq!(out, "Una▌\u{8} \u{8}\n");
        assert_eq!(err, "❌ Ocurrió un error: timeout\n");
    }

    /// Output whose reader has gone away
    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "reader closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_write_failure_is_kept_and_closes_sink() {
        let mut sink = TerminalSink::new(ClosedPipe, Vec::new(), true);
        assert!(!sink.is_closed());

        sink.render(DisplayUpdate::Partial("Una▌".to_string()));
        assert!(sink.is_closed());

        sink.render(DisplayUpdate::Error("Ocurrió un error: cerrado".to_string()));
        let err = String::from_utf8(sink.err.clone()).unwrap();
        assert_eq!(err, "❌ Ocurrió un error: cerrado\n");

        let error = sink.take_error().unwrap();
        assert_eq!(error.kind(), io::ErrorKind::BrokenPipe);
        assert!(sink.take_error().is_none());
    }

    #[test]
    fn test_healthy_output_has_no_error() {
        let mut sink = TerminalSink::new(Vec::new(), Vec::new(), true);
        for update in flor_updates() {
            sink.render(update);
        }
        assert!(sink.take_error().is_none());
    }

    #[test]
    fn test_warnings_go_to_diagnostics() {
        let (out, err) = rendered(false, vec![DisplayUpdate::Warning(Warning::MissingCredential)]);

        assert!(out.is_empty());
        assert_eq!(err, "🌷 Ingresa tu API key para continuar.\n");
    }
}
