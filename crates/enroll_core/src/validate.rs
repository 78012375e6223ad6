//! Pure field predicates: emptiness, card expiry, password strength.

use chrono::NaiveDate;

pub const PASSWORD_MIN_LEN: usize = 6;
pub const PASSWORD_TOO_SHORT_MESSAGE: &str = "Password must be at least 6 characters long.";
pub const PASSWORD_WEAK_MESSAGE: &str =
    "Password must contain at least one uppercase letter, one digit, and one special character.";
pub const PASSWORDS_MISMATCH_MESSAGE: &str = "Passwords must match.";
pub const DOB_INVALID_MESSAGE: &str = "Date of birth must be a valid date (YYYY-MM-DD).";

/// Minimum acceptable card expiry, as a two-digit year and a month.
///
/// Carried as data so callers can override the business rule; the default
/// is the current one (March 2025).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryCutoff {
    pub month: u32,
    pub year: u32,
}

impl Default for ExpiryCutoff {
    fn default() -> Self {
        Self { month: 3, year: 25 }
    }
}

impl ExpiryCutoff {
    pub fn message(&self) -> String {
        format!(
            "Expiry date must be {:02}/{:02} or later.",
            self.month, self.year
        )
    }
}

/// A field is empty iff its trimmed value is the empty string.
pub fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

/// Accepts an `MM/YY` expiry at or after the cutoff.
///
/// Rejects on parse failure, month outside 1-12, a year before the cutoff
/// year, or the cutoff year with an earlier month.
pub fn validate_expiry(raw: &str, cutoff: ExpiryCutoff) -> bool {
    let mut parts = raw.trim().splitn(2, '/');
    let month = parts.next().and_then(|p| p.trim().parse::<u32>().ok());
    let year = parts.next().and_then(|p| p.trim().parse::<u32>().ok());
    let (Some(month), Some(year)) = (month, year) else {
        return false;
    };
    if !(1..=12).contains(&month) {
        return false;
    }
    if year < cutoff.year {
        return false;
    }
    if year == cutoff.year && month < cutoff.month {
        return false;
    }
    true
}

/// Strength rule for the password field; `None` means acceptable.
pub fn password_error(password: &str) -> Option<&'static str> {
    if password.len() < PASSWORD_MIN_LEN {
        return Some(PASSWORD_TOO_SHORT_MESSAGE);
    }
    let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_special = password.chars().any(|c| !c.is_ascii_alphanumeric());
    if has_upper && has_digit && has_special {
        None
    } else {
        Some(PASSWORD_WEAK_MESSAGE)
    }
}

pub fn confirm_password_error(password: &str, confirm: &str) -> Option<&'static str> {
    if password == confirm {
        None
    } else {
        Some(PASSWORDS_MISMATCH_MESSAGE)
    }
}

/// Date-of-birth arrives as `YYYY-MM-DD` from a date input.
pub fn dob_error(raw: &str) -> Option<&'static str> {
    match NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d") {
        Ok(_) => None,
        Err(_) => Some(DOB_INVALID_MESSAGE),
    }
}

#[cfg(test)]
#[path = "tests/validate_tests.rs"]
mod tests;
