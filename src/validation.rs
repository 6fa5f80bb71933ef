use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap();
    static ref PHONE_RE: Regex = Regex::new(r"^\d{11}$").unwrap();
}

pub const MIN_PASSWORD_LEN: usize = 6;

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

pub fn is_valid_phone(phone: &str) -> bool {
    PHONE_RE.is_match(phone)
}

/// Room numbers are free text that must read as a number.
pub fn is_valid_room(room: &str) -> bool {
    let room = room.trim();
    !room.is_empty() && room.parse::<f64>().map_or(false, f64::is_finite)
}

/// Profile fields shared by sign-up and admin edits. Messages are shown to
/// the user as-is.
pub fn validate_profile(name: &str, room: &str, phone: &str, email: &str) -> Result<(), &'static str> {
    if name.trim().is_empty() {
        return Err("Name is required.");
    }
    if !is_valid_room(room) {
        return Err("Valid Room No is required.");
    }
    if !is_valid_phone(phone) {
        return Err("Phone number must be 11 digits.");
    }
    if !is_valid_email(email) {
        return Err("Invalid email format.");
    }
    Ok(())
}

pub fn validate_new_password(password: &str, confirm: &str) -> Result<(), &'static str> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err("Password must be at least 6 characters.");
    }
    if password != confirm {
        return Err("Passwords do not match.");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emails() {
        assert!(is_valid_email("someone@hall.edu.bd"));
        assert!(!is_valid_email("someone@hall"));
        assert!(!is_valid_email("some one@hall.org"));
        assert!(!is_valid_email("@hall.org"));
    }

    #[test]
    fn phones_need_exactly_eleven_digits() {
        assert!(is_valid_phone("01712345678"));
        assert!(!is_valid_phone("0171234567"));
        assert!(!is_valid_phone("017123456789"));
        assert!(!is_valid_phone("0171234567a"));
    }

    #[test]
    fn rooms_must_be_numeric() {
        assert!(is_valid_room("204"));
        assert!(is_valid_room(" 12 "));
        assert!(!is_valid_room(""));
        assert!(!is_valid_room("B-12"));
        assert!(!is_valid_room("inf"));
    }

    #[test]
    fn profile_errors_come_in_field_order() {
        assert_eq!(validate_profile(" ", "x", "1", "bad"), Err("Name is required."));
        assert_eq!(validate_profile("A", "x", "1", "bad"), Err("Valid Room No is required."));
        assert_eq!(validate_profile("A", "1", "1", "bad"), Err("Phone number must be 11 digits."));
        assert_eq!(validate_profile("A", "1", "01712345678", "bad"), Err("Invalid email format."));
        assert_eq!(validate_profile("A", "1", "01712345678", "a@b.co"), Ok(()));
    }

    #[test]
    fn passwords() {
        assert_eq!(validate_new_password("12345", "12345"), Err("Password must be at least 6 characters."));
        assert_eq!(validate_new_password("123456", "123457"), Err("Passwords do not match."));
        assert_eq!(validate_new_password("123456", "123456"), Ok(()));
    }
}
