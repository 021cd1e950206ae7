//! crates/tutoring_portal_core/src/validation.rs
//!
//! Contact-form validation and the email checks shared by the auth and
//! enrollment flows.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

use crate::domain::{ContactCategory, ContactStatus, NewContactSubmission};

/// Minimum number of characters in a contact message, after trimming.
pub const MIN_MESSAGE_CHARS: usize = 10;

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid"))
}

/// Accepts `foo@bar.com`, rejects `foo@bar`.
pub fn is_valid_email(email: &str) -> bool {
    email_regex().is_match(email)
}

/// Whether `email` belongs to `domain` (given without the leading `@`).
pub fn email_in_domain(email: &str, domain: &str) -> bool {
    email
        .to_ascii_lowercase()
        .ends_with(&format!("@{}", domain.trim_start_matches('@').to_ascii_lowercase()))
}

//=========================================================================================
// Contact Form
//=========================================================================================

/// The contact form as posted by the browser. Missing fields count as empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContactForm {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Every rule the form violated, in field order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactErrors(pub Vec<String>);

impl fmt::Display for ContactErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("、"))
    }
}

impl std::error::Error for ContactErrors {}

fn trimmed(value: &Option<String>) -> &str {
    value.as_deref().map(str::trim).unwrap_or_default()
}

impl ContactForm {
    /// Checks every field and returns the submission to store, with values trimmed.
    pub fn validate(&self) -> Result<NewContactSubmission, ContactErrors> {
        let mut errors = Vec::new();

        let name = trimmed(&self.name);
        if name.is_empty() {
            errors.push("お名前は必須です".to_string());
        }

        // The pattern is checked against the value as sent; only storage is trimmed.
        let email = trimmed(&self.email);
        if email.is_empty() {
            errors.push("メールアドレスは必須です".to_string());
        } else if !is_valid_email(self.email.as_deref().unwrap_or_default()) {
            errors.push("正しいメールアドレスを入力してください".to_string());
        }

        let category = match self.category.as_deref().unwrap_or_default() {
            "" => {
                errors.push("お問い合わせカテゴリは必須です".to_string());
                None
            }
            raw => match raw.parse::<ContactCategory>() {
                Ok(category) => Some(category),
                Err(_) => {
                    errors.push("無効なカテゴリです".to_string());
                    None
                }
            },
        };

        let subject = trimmed(&self.subject);
        if subject.is_empty() {
            errors.push("件名は必須です".to_string());
        }

        let message = trimmed(&self.message);
        if message.is_empty() {
            errors.push("お問い合わせ内容は必須です".to_string());
        } else if message.chars().count() < MIN_MESSAGE_CHARS {
            errors.push(format!(
                "お問い合わせ内容は{MIN_MESSAGE_CHARS}文字以上で入力してください"
            ));
        }

        match category {
            Some(category) if errors.is_empty() => Ok(NewContactSubmission {
                name: name.to_string(),
                email: email.to_string(),
                phone: Some(trimmed(&self.phone))
                    .filter(|p| !p.is_empty())
                    .map(str::to_string),
                category,
                subject: subject.to_string(),
                message: message.to_string(),
                status: ContactStatus::New,
            }),
            _ => Err(ContactErrors(errors)),
        }
    }
}
