//! Request validation. Only the first violated rule is reported, in the
//! order the request type declares its fields.

use validator::{Validate, ValidationErrors};

use crate::services::ServiceError;

/// A request body checked with `validator` before any store access
pub trait ValidatedRequest: Validate {
    /// Field names in the order their rules are checked
    const FIELD_ORDER: &'static [&'static str];

    fn check(&self) -> Result<(), ServiceError> {
        match self.validate() {
            Ok(()) => Ok(()),
            Err(errors) => {
                let (field, message) = first_violation(&errors, Self::FIELD_ORDER);
                Err(ServiceError::validation(field, message))
            }
        }
    }
}

/// First failing `(field, message)` following `field_order`; fields missing from
/// the order are considered afterwards, alphabetically.
pub fn first_violation(errors: &ValidationErrors, field_order: &[&str]) -> (String, String) {
    let mut failing: Vec<(String, String)> = errors
        .field_errors()
        .into_iter()
        .filter_map(|(field, rules)| {
            let field = field.to_string();
            rules.first().map(|rule| {
                let message = rule
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("{field} is invalid"));
                (field, message)
            })
        })
        .collect();

    failing.sort_by_key(|(field, _)| {
        let rank = field_order
            .iter()
            .position(|name| *name == field.as_str())
            .unwrap_or(field_order.len());
        (rank, field.clone())
    });

    failing
        .into_iter()
        .next()
        .unwrap_or_else(|| ("request".to_string(), "Invalid request".to_string()))
}

/// Canonical form used for every stored and looked-up email address
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Lowercase extension after the last dot, if any
pub fn file_extension(file_name: &str) -> Option<String> {
    let (_, ext) = file_name.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    Some(ext.to_lowercase())
}
