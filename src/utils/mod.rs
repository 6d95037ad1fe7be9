pub mod ip;
pub mod password;
pub mod url_validator;

/// 生成随机短码（字母 + 数字）
pub fn generate_random_code(length: usize) -> String {
    use std::iter;

    let chars = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

    iter::repeat_with(|| chars[rand::random_range(0..chars.len())] as char)
        .take(length)
        .collect()
}

/// Short code syntax check: alphanumeric only, at most 32 chars.
///
/// Used as a cheap pre-filter before any cache or database lookup.
pub fn is_valid_short_code(code: &str) -> bool {
    !code.is_empty() && code.len() <= 32 && code.bytes().all(|b| b.is_ascii_alphanumeric())
}

/// Generate a URL-safe random token (base64, no padding)
pub fn generate_secure_token(num_bytes: usize) -> String {
    use base64::Engine;

    let bytes: Vec<u8> = (0..num_bytes).map(|_| rand::random::<u8>()).collect();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}
