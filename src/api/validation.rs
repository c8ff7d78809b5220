use super::{ApiError, ContactRequest};
use crate::domain::{AccountId, is_plausible_email, normalize_email};
use crate::services::ContactSubmission;

const MAX_NAME_LEN: usize = 100;
const MAX_SUBJECT_LEN: usize = 200;
const MAX_MESSAGE_LEN: usize = 5000;
const MAX_PHONE_LEN: usize = 30;

pub fn validate_account_id(id: &str) -> Result<AccountId, ApiError> {
    let trimmed = id.trim();
    if trimmed.is_empty() || trimmed.len() > 64 {
        return Err(ApiError::validation(format!("Invalid account ID: {id}")));
    }

    if !trimmed.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(ApiError::validation(format!("Invalid account ID: {id}")));
    }

    Ok(AccountId::new(trimmed))
}

fn required_text(field: &str, value: &str, max_len: usize) -> Result<String, ApiError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::validation(format!("{field} is required")));
    }
    if trimmed.chars().count() > max_len {
        return Err(ApiError::validation(format!(
            "{field} must be {max_len} characters or less"
        )));
    }
    Ok(trimmed.to_string())
}

pub fn validate_contact(request: ContactRequest) -> Result<ContactSubmission, ApiError> {
    let name = required_text("Name", &request.name, MAX_NAME_LEN)?;
    let subject = required_text("Subject", &request.subject, MAX_SUBJECT_LEN)?;
    let message = required_text("Message", &request.message, MAX_MESSAGE_LEN)?;

    let email = normalize_email(&request.email);
    if !is_plausible_email(&email) {
        return Err(ApiError::validation("Invalid email address"));
    }

    let phone = request
        .phone
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty());

    if let Some(phone) = &phone
        && (phone.len() > MAX_PHONE_LEN
            || !phone
                .chars()
                .all(|c| c.is_ascii_digit() || " +-.()".contains(c)))
    {
        return Err(ApiError::validation("Invalid phone number"));
    }

    Ok(ContactSubmission {
        name,
        email,
        phone,
        subject,
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ContactRequest {
        ContactRequest {
            name: "Alice".to_string(),
            email: " Alice@Example.org ".to_string(),
            phone: Some("+33 1 23 45 67 89".to_string()),
            subject: "Rendez-vous".to_string(),
            message: "Bonjour".to_string(),
        }
    }

    #[test]
    fn test_validate_account_id() {
        assert!(validate_account_id("3f2b9c1e-8a5d-4c7e-9f01-23456789abcd").is_ok());
        assert!(validate_account_id("").is_err());
        assert!(validate_account_id("../etc").is_err());
        assert!(validate_account_id(&"a".repeat(65)).is_err());
    }

    #[test]
    fn test_validate_contact_normalizes() {
        let submission = validate_contact(request()).unwrap();
        assert_eq!(submission.email, "alice@example.org");
        assert_eq!(submission.phone.as_deref(), Some("+33 1 23 45 67 89"));
    }

    #[test]
    fn test_validate_contact_rejects_bad_fields() {
        let mut bad = request();
        bad.name = "   ".to_string();
        assert!(validate_contact(bad).is_err());

        let mut bad = request();
        bad.email = "not-an-email".to_string();
        assert!(validate_contact(bad).is_err());

        let mut bad = request();
        bad.phone = Some("call me".to_string());
        assert!(validate_contact(bad).is_err());

        let mut bad = request();
        bad.message = "x".repeat(MAX_MESSAGE_LEN + 1);
        assert!(validate_contact(bad).is_err());
    }

    #[test]
    fn test_blank_phone_is_dropped() {
        let mut req = request();
        req.phone = Some("  ".to_string());
        assert_eq!(validate_contact(req).unwrap().phone, None);
    }
}
