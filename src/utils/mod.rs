pub mod logging;

const BASE36_DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Encode a counter value in lowercase base-36, the way surrogate ids and
/// tab/window sequence numbers appear in the persisted logs.
pub fn base36(mut n: u64) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while n > 0 {
        digits.push(BASE36_DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    digits.reverse();
    // The digit table is ASCII, so this cannot fail
    String::from_utf8(digits).unwrap_or_default()
}
