//! Input rules shared by the public and admin handlers.

pub const MIN_PASSWORD_LEN: usize = 6;

/// A QQ id: 5 to 11 digits, no leading zero. Surrounding whitespace is ignored.
pub fn parse_qq(raw: &str) -> Option<i64> {
    let s = raw.trim();
    let mut chars = s.chars();
    let first = chars.next()?;
    if !('1'..='9').contains(&first) || !chars.all(|c| c.is_ascii_digit()) {
        return None;
    }
    if !(5..=11).contains(&s.len()) {
        return None;
    }
    s.parse().ok()
}

pub fn qq_email(qq: i64) -> String {
    format!("{qq}@qq.com")
}

pub fn is_valid_password(password: &str) -> bool {
    password.chars().count() >= MIN_PASSWORD_LEN
}

pub fn is_http_url(raw: &str) -> bool {
    let rest = raw
        .strip_prefix("https://")
        .or_else(|| raw.strip_prefix("http://"));
    matches!(rest, Some(host) if !host.is_empty() && !host.starts_with('/') && !host.contains(char::is_whitespace))
}
