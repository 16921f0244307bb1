//! Turning typed lines into events and events into printable lines.

use crate::config::Cli;
use chrono::{DateTime, Local, Utc};
use hexglobal_common::types::country_flag;
use hexglobal_common::Event;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::debug;

/// Who is sending, and from where. Stamped onto every outgoing event.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    /// Display name.
    pub username: String,
    /// Country name.
    pub country: String,
    /// Two-letter country code.
    pub country_code: String,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
}

impl From<&Cli> for Profile {
    fn from(cli: &Cli) -> Self {
        Self {
            username: cli.username.clone(),
            country: cli.country.clone(),
            country_code: cli.country_code.to_ascii_uppercase(),
            latitude: cli.latitude,
            longitude: cli.longitude,
        }
    }
}

impl Profile {
    /// Build an event carrying `message`, stamped with the current time.
    #[must_use]
    pub fn event(&self, message: &str) -> Event {
        self.event_at(message, Utc::now())
    }

    /// Build an event carrying `message`, stamped with `at`.
    #[must_use]
    pub fn event_at(&self, message: &str, at: DateTime<Utc>) -> Event {
        Event {
            username: self.username.clone(),
            message: message.to_string(),
            country: self.country.clone(),
            country_code: self.country_code.clone(),
            latitude: self.latitude,
            longitude: self.longitude,
            timestamp: at.timestamp_millis(),
        }
    }
}

/// Send every non-blank line of `reader` as an event until input ends or the
/// outbox closes. Waits for room in the outbox rather than dropping lines.
///
/// # Errors
///
/// Returns an error if reading a line fails.
pub async fn forward_lines<R>(
    reader: R,
    profile: &Profile,
    outbox_tx: mpsc::Sender<Event>,
) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if outbox_tx.send(profile.event(text)).await.is_err() {
            debug!("outbox closed, stopping input");
            break;
        }
    }
    Ok(())
}

/// Render an event as `[HH:MM:SS] <flag> <username>: <message>` in local time.
#[must_use]
pub fn format_event(event: &Event) -> String {
    let time = DateTime::from_timestamp_millis(event.timestamp).map_or_else(
        || "--:--:--".to_string(),
        |t| t.with_timezone(&Local).format("%H:%M:%S").to_string(),
    );
    format!(
        "[{time}] {} {}: {}",
        country_flag(&event.country_code),
        event.username,
        event.message
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use hexglobal_common::types::GLOBE;

    fn profile() -> Profile {
        Profile {
            username: "alice".to_string(),
            country: "France".to_string(),
            country_code: "FR".to_string(),
            latitude: 48.85,
            longitude: 2.35,
        }
    }

    #[test]
    fn event_carries_profile_and_timestamp() {
        let at = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        let event = profile().event_at("bonjour", at);
        assert_eq!(event.username, "alice");
        assert_eq!(event.message, "bonjour");
        assert_eq!(event.country_code, "FR");
        assert_eq!(event.latitude, 48.85);
        assert_eq!(event.timestamp, 1_700_000_000_123);
    }

    #[test]
    fn event_uses_current_time() {
        let before = Utc::now().timestamp_millis();
        let event = profile().event("now");
        let after = Utc::now().timestamp_millis();
        assert!(event.timestamp >= before && event.timestamp <= after);
    }

    #[test]
    fn format_shows_flag_user_and_message() {
        let event = profile().event("bonjour");
        let line = format_event(&event);
        assert!(line.starts_with('['));
        assert!(line.ends_with("\u{1F1EB}\u{1F1F7} alice: bonjour"), "{line}");
        // "[HH:MM:SS]" is ten characters.
        assert_eq!(&line[9..10], "]");
    }

    #[test]
    fn format_falls_back_for_unknown_country_and_bad_time() {
        let mut event = profile().event("hi");
        event.country_code = "XXX".to_string();
        event.timestamp = i64::MAX;
        let line = format_event(&event);
        assert_eq!(line, format!("[--:--:--] {GLOBE} alice: hi"));
    }

    #[tokio::test]
    async fn forward_lines_skips_blank_lines_and_trims() {
        let (tx, mut rx) = mpsc::channel(8);
        forward_lines(&b"hello\n\n   \n  there  \n"[..], &profile(), tx)
            .await
            .unwrap();

        assert_eq!(rx.recv().await.unwrap().message, "hello");
        assert_eq!(rx.recv().await.unwrap().message, "there");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn forward_lines_waits_for_room_instead_of_dropping() {
        let (tx, mut rx) = mpsc::channel(1);
        let input: &'static [u8] = b"one\ntwo\nthree\n";
        let forwarder = tokio::spawn(async move { forward_lines(input, &profile(), tx).await });

        let mut received = Vec::new();
        while let Some(event) = rx.recv().await {
            received.push(event.message);
        }
        assert_eq!(received, ["one", "two", "three"]);
        forwarder.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn forward_lines_stops_when_outbox_closes() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        forward_lines(&b"one\ntwo\n"[..], &profile(), tx)
            .await
            .unwrap();
    }
}
