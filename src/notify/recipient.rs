// src/notify/recipient.rs

use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::event::EventKind;

const EMAIL_PATTERN: &str = r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?)*$";

const SLACK_WEBHOOK_PREFIX: &str = "https://hooks.slack.com/";

/// Transport-specific settings, selected by `type = "..."`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RecipientKind {
    Email {
        #[serde(default)]
        recipients: Vec<String>,
    },
    Slack {
        #[serde(default)]
        webhook_url: String,
    },
    Webhook {
        #[serde(default)]
        url: String,
        #[serde(default)]
        headers: BTreeMap<String, String>,
        /// Attach the last lines of the run log to failure events.
        #[serde(default)]
        include_logs: bool,
    },
}

impl RecipientKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            RecipientKind::Email { .. } => "email",
            RecipientKind::Slack { .. } => "slack",
            RecipientKind::Webhook { .. } => "webhook",
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match self {
            RecipientKind::Email { recipients } => {
                if recipients.is_empty() {
                    return Err("must include at least one recipient email".into());
                }
                let email = Regex::new(EMAIL_PATTERN).map_err(|e| e.to_string())?;
                if let Some(bad) = recipients.iter().find(|r| !email.is_match(r)) {
                    return Err(format!("contains invalid email address '{bad}'"));
                }
            }
            RecipientKind::Slack { webhook_url } => {
                if webhook_url.trim().is_empty() {
                    return Err("must include a Slack webhook URL".into());
                }
                if !webhook_url.starts_with(SLACK_WEBHOOK_PREFIX) {
                    return Err("must be a valid Slack webhook URL".into());
                }
            }
            RecipientKind::Webhook { url, .. } => {
                if url.trim().is_empty() {
                    return Err("must include a webhook URL".into());
                }
                if !url.starts_with("https://") {
                    return Err("must be a valid HTTPS URL".into());
                }
            }
        }
        Ok(())
    }

    pub fn wants_logs(&self) -> bool {
        matches!(self, RecipientKind::Webhook { include_logs: true, .. })
    }
}

/// A configured notification target plus its delivery policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub notify_on_failure: bool,
    pub notify_on_success: bool,
    pub kind: RecipientKind,
}

impl Recipient {
    pub fn wants(&self, event: EventKind) -> bool {
        self.enabled
            && match event {
                EventKind::Success => self.notify_on_success,
                EventKind::Failure => self.notify_on_failure,
            }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_needs_valid_addresses() {
        let ok = RecipientKind::Email {
            recipients: vec!["ops@example.com".into(), "a.b+c@sub.example.org".into()],
        };
        assert!(ok.validate().is_ok());

        let empty = RecipientKind::Email { recipients: vec![] };
        assert!(empty.validate().is_err());

        let bad = RecipientKind::Email {
            recipients: vec!["ops@example.com".into(), "not an email".into()],
        };
        assert!(bad.validate().unwrap_err().contains("not an email"));
    }

    #[test]
    fn slack_needs_hooks_url() {
        let ok = RecipientKind::Slack {
            webhook_url: "https://hooks.slack.com/services/T/B/X".into(),
        };
        assert!(ok.validate().is_ok());
        let bad = RecipientKind::Slack {
            webhook_url: "https://example.com/hook".into(),
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn webhook_needs_https() {
        let kind = |url: &str| RecipientKind::Webhook {
            url: url.into(),
            headers: BTreeMap::new(),
            include_logs: true,
        };
        assert!(kind("https://example.com/hook").validate().is_ok());
        assert!(kind("http://example.com/hook").validate().is_err());
        assert!(kind("").validate().is_err());
        assert!(kind("https://x").wants_logs());
    }

    #[test]
    fn policy_respects_enabled_flag() {
        let mut r = Recipient {
            id: "ops".into(),
            name: "Ops".into(),
            enabled: true,
            notify_on_failure: true,
            notify_on_success: false,
            kind: RecipientKind::Email {
                recipients: vec!["ops@example.com".into()],
            },
        };
        assert!(r.wants(EventKind::Failure));
        assert!(!r.wants(EventKind::Success));
        r.enabled = false;
        assert!(!r.wants(EventKind::Failure));
    }

    #[test]
    fn kind_deserializes_from_tagged_toml() {
        let kind: RecipientKind = toml::from_str(
            r#"
type = "webhook"
url = "https://example.com/hook"
include_logs = true

[headers]
Authorization = "Bearer x"
"#,
        )
        .unwrap();
        match kind {
            RecipientKind::Webhook {
                headers,
                include_logs,
                ..
            } => {
                assert!(include_logs);
                assert_eq!(headers["Authorization"], "Bearer x");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
