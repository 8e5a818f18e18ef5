use crate::error::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use validator::Validate;

static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap()
});

static NICKNAME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[\w一-龥]{2,20}$").unwrap()
});

/// 执行 derive 校验并把错误转换为统一响应
pub fn validate_request<T: Validate>(request: &T) -> Result<()> {
    request.validate()?;
    Ok(())
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_REGEX.is_match(email)
}

/// 昵称：2-20位的字母、数字、下划线或汉字
pub fn is_valid_nickname(nickname: &str) -> bool {
    NICKNAME_REGEX.is_match(nickname)
}

/// 密码强度：至少6位，且同时含字母与数字
pub fn is_strong_password(password: &str) -> bool {
    password.len() >= 6
        && password.chars().any(|c| c.is_ascii_alphabetic())
        && password.chars().any(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_validation() {
        assert!(is_valid_email("user@example.com"));
        assert!(is_valid_email("a.b+c@mail.example.cn"));
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("user@localhost"));
    }

    #[test]
    fn test_nickname_validation() {
        assert!(is_valid_nickname("小明"));
        assert!(is_valid_nickname("player_01"));
        assert!(!is_valid_nickname("a"));
        assert!(!is_valid_nickname("带 空格"));
    }

    #[test]
    fn test_password_strength() {
        assert!(is_strong_password("abc123"));
        assert!(!is_strong_password("abcdef"));
        assert!(!is_strong_password("123456"));
        assert!(!is_strong_password("a1"));
    }
}
