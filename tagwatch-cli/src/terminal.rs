use std::io::Write;

use tagwatch_core::{Alert, AlertError, AlertSink, NotificationEvent};

/// Prints alerts to stdout. Typing an alert number opens its question.
#[derive(Debug, Default)]
pub struct TerminalSink;

impl AlertSink for TerminalSink {
    fn show_alert(&self, alert: &Alert) -> Result<(), AlertError> {
        let mut out = std::io::stdout().lock();
        writeln!(out, "{}", format_alert(alert))?;
        out.flush()?;
        Ok(())
    }

    fn play_sound(&self) -> Result<(), AlertError> {
        let mut out = std::io::stdout().lock();
        out.write_all(b"\x07")?;
        out.flush()?;
        Ok(())
    }
}

pub fn format_alert(alert: &Alert) -> String {
    format!(
        "[#{}] {}: {}\n      {}",
        alert.handle.0, alert.title, alert.message, alert.url
    )
}

pub fn format_notification(event: &NotificationEvent) -> String {
    format!(
        "{} #{} {} ({})",
        event.timestamp.format("%H:%M:%S"),
        event.question_id,
        event.message,
        event.tag
    )
}
