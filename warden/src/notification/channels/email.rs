//! Email notification channel.
//!
//! Hands a plain-text RFC 5322 message to a sendmail-compatible program
//! (`sendmail -t -i`), which takes care of SMTP delivery.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::NotificationChannel;
use crate::notification::events::{OutboundMessage, Severity};
use crate::utils::process::run_command;
use crate::{Error, Result};

/// Email channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    /// Whether the channel is enabled.
    pub enabled: bool,
    /// Path to a sendmail-compatible binary.
    #[serde(default = "default_sendmail_path")]
    pub sendmail_path: String,
    /// Sender email address.
    pub from_address: String,
    /// Additional recipients besides the operator address.
    #[serde(default)]
    pub cc_addresses: Vec<String>,
    /// Minimum severity to send (default: Info, so digests go out).
    #[serde(default)]
    pub min_severity: Severity,
}

fn default_sendmail_path() -> String {
    "/usr/sbin/sendmail".to_string()
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            sendmail_path: default_sendmail_path(),
            from_address: String::new(),
            cc_addresses: Vec::new(),
            min_severity: Severity::Info,
        }
    }
}

/// Email notification channel.
pub struct EmailChannel {
    config: EmailConfig,
}

impl EmailChannel {
    /// Create a new Email channel.
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    /// Render the full message including headers.
    fn build_message(&self, message: &OutboundMessage) -> String {
        let mut headers = vec![
            format!("From: {}", header_value(&self.config.from_address)),
            format!("To: {}", header_value(&message.to)),
        ];
        if !self.config.cc_addresses.is_empty() {
            headers.push(format!(
                "Cc: {}",
                header_value(&self.config.cc_addresses.join(", "))
            ));
        }
        headers.push(format!("Subject: {}", encode_word(&header_value(&message.subject))));
        headers.push(format!("Date: {}", message.timestamp.to_rfc2822()));
        headers.push("MIME-Version: 1.0".to_string());
        headers.push("Content-Type: text/plain; charset=utf-8".to_string());
        headers.push("Content-Transfer-Encoding: 8bit".to_string());
        headers.push(format!("X-Warden-Severity: {}", message.severity));
        if let Some(component) = &message.component {
            headers.push(format!(
                "X-Warden-Component: {}",
                encode_word(&header_value(component))
            ));
        }

        let body = message.body.replace("\r\n", "\n").replace('\n', "\r\n");
        format!("{}\r\n\r\n{}\r\n", headers.join("\r\n"), body)
    }
}

/// Collapse line breaks so values cannot inject extra headers.
fn header_value(value: &str) -> String {
    value
        .split(['\r', '\n'])
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Bytes of UTF-8 per encoded word. 45 bytes become 60 base64 characters,
/// which keeps `=?utf-8?B?...?=` within the 75 character limit of RFC 2047.
const ENCODED_WORD_BYTES: usize = 45;

/// Encode a non-ASCII header value as RFC 2047 `B` encoded words, folded
/// onto continuation lines. ASCII values are returned unchanged.
fn encode_word(value: &str) -> String {
    if value.is_ascii() {
        return value.to_string();
    }

    let mut words = Vec::new();
    let mut start = 0;
    for (idx, ch) in value.char_indices() {
        if idx + ch.len_utf8() - start > ENCODED_WORD_BYTES {
            words.push(&value[start..idx]);
            start = idx;
        }
    }
    words.push(&value[start..]);

    words
        .into_iter()
        .map(|chunk| format!("=?utf-8?B?{}?=", STANDARD.encode(chunk)))
        .collect::<Vec<_>>()
        .join("\r\n ")
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn channel_type(&self) -> &'static str {
        "email"
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
            && !self.config.sendmail_path.is_empty()
            && !self.config.from_address.is_empty()
    }

    async fn send(&self, message: &OutboundMessage) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }

        if message.severity < self.config.min_severity {
            debug!(
                "Skipping email notification (severity {} < {})",
                message.severity, self.config.min_severity
            );
            return Ok(());
        }

        if message.to.trim().is_empty() {
            return Err(Error::notify("email", "no recipient address"));
        }

        let raw = self.build_message(message);
        let argv = vec![
            self.config.sendmail_path.clone(),
            "-t".to_string(),
            "-i".to_string(),
        ];
        let output = run_command(&argv, Some(raw.as_bytes()))
            .await
            .map_err(|e| Error::notify("email", e.to_string()))?;

        if !output.success() {
            return Err(Error::notify("email", output.failure_detail()));
        }

        debug!(to = %message.to, subject = %message.subject, "Email notification sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::events::MessageKind;

    fn message() -> OutboundMessage {
        OutboundMessage::new(
            "ops@example.com",
            "[warden] store restarted",
            "Three consecutive failures.\nLast: timeout",
            Severity::Critical,
            MessageKind::Alert,
        )
        .for_component("store")
    }

    #[test]
    fn test_email_config_default() {
        let config = EmailConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.sendmail_path, "/usr/sbin/sendmail");
        assert_eq!(config.min_severity, Severity::Info);
    }

    #[test]
    fn test_email_channel_disabled() {
        let channel = EmailChannel::new(EmailConfig::default());
        assert!(!channel.is_enabled());
    }

    #[test]
    fn test_build_message_headers() {
        let channel = EmailChannel::new(EmailConfig {
            enabled: true,
            from_address: "warden@example.com".to_string(),
            ..Default::default()
        });
        let raw = channel.build_message(&message());
        assert!(raw.starts_with("From: warden@example.com\r\nTo: ops@example.com\r\n"));
        assert!(raw.contains("Subject: [warden] store restarted\r\n"));
        assert!(raw.contains("X-Warden-Severity: critical\r\n"));
        assert!(raw.contains("X-Warden-Component: store\r\n"));
        assert!(raw.contains("\r\n\r\nThree consecutive failures.\r\nLast: timeout\r\n"));
    }

    #[test]
    fn test_subject_cannot_inject_headers() {
        assert_eq!(header_value("hello\r\nBcc: evil@example.com"), "hello Bcc: evil@example.com");
    }

    #[test]
    fn test_non_ascii_subject_is_encoded() {
        assert_eq!(encode_word("[warden] store restarted"), "[warden] store restarted");

        let encoded = encode_word("[warden] café restarted");
        assert_eq!(encoded, format!("=?utf-8?B?{}?=", STANDARD.encode("[warden] café restarted")));

        let long = "ストア ".repeat(12);
        let encoded = encode_word(&long);
        let mut decoded = Vec::new();
        for word in encoded.split("\r\n ") {
            assert!(word.len() <= 75);
            let b64 = word.strip_prefix("=?utf-8?B?").unwrap().strip_suffix("?=").unwrap();
            decoded.extend(STANDARD.decode(b64).unwrap());
        }
        assert_eq!(String::from_utf8(decoded).unwrap(), long);

        let channel = EmailChannel::new(EmailConfig {
            enabled: true,
            from_address: "warden@example.com".to_string(),
            ..Default::default()
        });
        let mut message = message();
        message.subject = "[warden] Überwachung: store neu gestartet".to_string();
        let raw = channel.build_message(&message);
        let headers = raw.split("\r\n\r\n").next().unwrap();
        assert!(headers.is_ascii());
        assert!(headers.contains("Subject: =?utf-8?B?"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_send_reports_sendmail_failure() {
        let channel = EmailChannel::new(EmailConfig {
            enabled: true,
            sendmail_path: "false".to_string(),
            from_address: "warden@example.com".to_string(),
            ..Default::default()
        });
        let err = channel.send(&message()).await.unwrap_err();
        assert!(matches!(err, Error::NotifyDispatch { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_send_pipes_message_to_program() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-sendmail");
        let captured = dir.path().join("captured.eml");
        std::fs::write(
            &script,
            format!("#!/bin/sh\ncat > '{}'\n", captured.display()),
        )
        .unwrap();
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let channel = EmailChannel::new(EmailConfig {
            enabled: true,
            sendmail_path: script.display().to_string(),
            from_address: "warden@example.com".to_string(),
            ..Default::default()
        });
        channel.send(&message()).await.unwrap();

        let raw = std::fs::read_to_string(&captured).unwrap();
        assert!(raw.contains("To: ops@example.com"));
    }
}
