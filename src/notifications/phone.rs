use crate::errors::ServiceError;

const MIN_DIGITS: usize = 8;
const MAX_DIGITS: usize = 15;

/// Normalizes a phone number to E.164 (`+` followed by 8 to 15 digits).
///
/// Spaces, dashes, dots and parentheses are dropped; a leading `+` is optional.
pub fn normalize_phone(input: &str) -> Result<String, ServiceError> {
    let trimmed = input.trim();
    let rest = trimmed.strip_prefix('+').unwrap_or(trimmed);

    let mut digits = String::with_capacity(rest.len());
    for c in rest.chars() {
        match c {
            '0'..='9' => digits.push(c),
            ' ' | '-' | '.' | '(' | ')' => {}
            _ => {
                return Err(ServiceError::ValidationError(format!(
                    "phone number contains invalid character '{}'",
                    c
                )))
            }
        }
    }

    if !(MIN_DIGITS..=MAX_DIGITS).contains(&digits.len()) {
        return Err(ServiceError::ValidationError(format!(
            "phone number must have between {} and {} digits",
            MIN_DIGITS, MAX_DIGITS
        )));
    }
    if digits.starts_with('0') {
        return Err(ServiceError::ValidationError(
            "phone number must start with a country code".into(),
        ));
    }

    Ok(format!("+{}", digits))
}
