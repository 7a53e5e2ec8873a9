use herald_dispatch::transport::validate_address;

use crate::error::ApiError;

/// Trimmed, non-empty, at most `max` characters.
pub(crate) fn required(field: &str, value: &str, max: usize) -> Result<String, ApiError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::BadRequest(format!("{} is required", field)));
    }
    if value.chars().count() > max {
        return Err(ApiError::BadRequest(format!(
            "{} must be at most {} characters",
            field, max
        )));
    }
    Ok(value.to_string())
}

pub(crate) fn email(value: &str) -> Result<String, ApiError> {
    let value = value.trim();
    validate_address(value).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    Ok(value.to_string())
}

/// Blank optional text collapses to `None`.
pub(crate) fn optional(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_trims_and_bounds() {
        assert_eq!(required("subject", "  Hi  ", 10).unwrap(), "Hi");
        assert!(required("subject", "   ", 10).is_err());
        assert!(required("subject", "abcdef", 5).is_err());
    }

    #[test]
    fn email_rejects_garbage() {
        assert_eq!(email(" ann@example.com ").unwrap(), "ann@example.com");
        assert!(matches!(email("ann@"), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn blank_optional_is_none() {
        assert_eq!(optional(Some("  ")), None);
        assert_eq!(optional(Some(" x ")), Some("x".to_string()));
        assert_eq!(optional(None), None);
    }
}
