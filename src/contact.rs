//! Contact records and their validation.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Minimum length of a full name, in characters.
pub const MIN_NAME_LEN: usize = 2;

static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?[1-9]\d{0,15}$").expect("phone pattern is valid"));

// `;` and `,` are vCard separators and EMAIL is written unescaped.
static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@;,]+@[^\s@;,]+\.[^\s@;,]+$").expect("email pattern is valid"));

/// A contact as submitted by the form.
///
/// Build with [`ContactRecord::new`] and the `with_*` setters so that values
/// are trimmed and blank optional fields collapse to `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactRecord {
    pub full_name: String,
    pub phone: String,
    pub email: String,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub job_title: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl ContactRecord {
    pub fn new(full_name: &str, phone: &str, email: &str) -> Self {
        Self {
            full_name: full_name.trim().to_string(),
            phone: phone.trim().to_string(),
            email: email.trim().to_string(),
            ..Self::default()
        }
    }

    pub fn with_company(mut self, company: &str) -> Self {
        self.company = non_blank(company);
        self
    }

    pub fn with_job_title(mut self, job_title: &str) -> Self {
        self.job_title = non_blank(job_title);
        self
    }

    pub fn with_website(mut self, website: &str) -> Self {
        self.website = non_blank(website);
        self
    }

    pub fn with_address(mut self, address: &str) -> Self {
        self.address = non_blank(address);
        self
    }

    pub fn with_notes(mut self, notes: &str) -> Self {
        self.notes = non_blank(notes);
        self
    }

    /// Trims every field and drops blank optional ones. Records that arrive
    /// through serde go through this before validation.
    pub fn normalized(self) -> Self {
        let opt = |v: Option<String>| v.as_deref().and_then(non_blank);
        Self {
            full_name: self.full_name.trim().to_string(),
            phone: self.phone.trim().to_string(),
            email: self.email.trim().to_string(),
            company: opt(self.company),
            job_title: opt(self.job_title),
            website: opt(self.website),
            address: opt(self.address),
            notes: opt(self.notes),
        }
    }

    /// Phone number with whitespace, hyphens, parentheses and periods removed.
    pub fn normalized_phone(&self) -> String {
        normalize_phone(&self.phone)
    }

    /// Checks the required fields and the format-constrained ones.
    ///
    /// # Errors
    ///
    /// Returns the first failing field, in form order.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let name = self.full_name.trim();
        if name.is_empty() {
            return Err(ValidationError::MissingFullName);
        }
        if name.chars().count() < MIN_NAME_LEN {
            return Err(ValidationError::FullNameTooShort { min: MIN_NAME_LEN });
        }

        let phone = self.phone.trim();
        if phone.is_empty() {
            return Err(ValidationError::MissingPhone);
        }
        if !is_valid_phone(phone) {
            return Err(ValidationError::InvalidPhone(phone.to_string()));
        }

        let email = self.email.trim();
        if email.is_empty() {
            return Err(ValidationError::MissingEmail);
        }
        if !is_valid_email(email) {
            return Err(ValidationError::InvalidEmail(email.to_string()));
        }

        if let Some(website) = self.website.as_deref().map(str::trim) {
            if !website.is_empty() && !is_valid_url(website) {
                return Err(ValidationError::InvalidWebsite(website.to_string()));
            }
        }
        Ok(())
    }
}

fn non_blank(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

pub fn normalize_phone(phone: &str) -> String {
    phone
        .chars()
        .filter(|c| !(c.is_whitespace() || matches!(c, '-' | '(' | ')' | '.')))
        .collect()
}

pub fn is_valid_phone(phone: &str) -> bool {
    PHONE_RE.is_match(&normalize_phone(phone))
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

pub fn is_valid_url(website: &str) -> bool {
    url::Url::parse(website).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jane() -> ContactRecord {
        ContactRecord::new("Jane Doe", "+1 (555) 123-4567", "jane@x.com")
    }

    #[test]
    fn test_normalize_phone_strips_separators() {
        assert_eq!(normalize_phone("+1 (555) 123-4567"), "+15551234567");
        assert_eq!(normalize_phone("555.123.4567"), "5551234567");
    }

    #[test]
    fn test_valid_contact_passes() {
        assert_eq!(jane().validate(), Ok(()));
    }

    #[test]
    fn test_required_fields() {
        let mut c = jane();
        c.full_name = "  ".into();
        assert_eq!(c.validate(), Err(ValidationError::MissingFullName));

        let mut c = jane();
        c.full_name = "J".into();
        assert_eq!(c.validate(), Err(ValidationError::FullNameTooShort { min: 2 }));

        let mut c = jane();
        c.phone = String::new();
        assert_eq!(c.validate(), Err(ValidationError::MissingPhone));

        let mut c = jane();
        c.email = String::new();
        assert_eq!(c.validate(), Err(ValidationError::MissingEmail));
    }

    #[test]
    fn test_phone_format() {
        assert!(is_valid_phone("+44 20 7946 0958"));
        assert!(!is_valid_phone("0123"));
        assert!(!is_valid_phone("call me"));
        assert!(!is_valid_phone("+12345678901234567"));
    }

    #[test]
    fn test_email_format() {
        assert!(is_valid_email("a@b.co"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("a b@c.d"));
    }

    #[test]
    fn test_email_rejects_vcard_separators() {
        assert!(!is_valid_email("a;b@x.co"));
        assert!(!is_valid_email("a,b@x.co"));
        assert!(!is_valid_email("a@x.co;TYPE=WORK"));
        let mut c = jane();
        c.email = "a;b@x.co".into();
        assert!(matches!(c.validate(), Err(ValidationError::InvalidEmail(_))));
    }

    #[test]
    fn test_website_is_optional_but_checked() {
        let c = jane().with_website("https://example.com");
        assert!(c.validate().is_ok());
        let c = jane().with_website("not a url");
        assert!(matches!(c.validate(), Err(ValidationError::InvalidWebsite(_))));
        let c = jane().with_website("   ");
        assert_eq!(c.website, None);
    }

    #[test]
    fn test_normalized_trims_and_drops_blanks() {
        let raw = ContactRecord {
            full_name: " Jane ".into(),
            phone: "555 1234".into(),
            email: "j@x.io ".into(),
            company: Some("  ".into()),
            notes: Some(" hi ".into()),
            ..ContactRecord::default()
        };
        let c = raw.normalized();
        assert_eq!(c.full_name, "Jane");
        assert_eq!(c.company, None);
        assert_eq!(c.notes.as_deref(), Some("hi"));
    }
}
