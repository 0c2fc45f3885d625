//! Monotonic, url-safe stamps for the `t` cache-busting query parameter.
//!
//! Millisecond timestamps encoded in a 64-symbol alphabet. Two calls landing
//! in the same millisecond get a `.N` counter suffix, so stamps never repeat
//! and stay ordered for the lifetime of the process.

use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

const ALPHABET: &[u8; 64] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz-_";

static LAST: Mutex<(u128, u64)> = Mutex::new((0, 0));

fn encode(mut num: u128) -> String {
    let mut digits = Vec::new();
    loop {
        digits.push(ALPHABET[(num % 64) as usize] as char);
        num /= 64;
        if num == 0 {
            break;
        }
    }
    digits.iter().rev().collect()
}

/// Produce the next stamp.
pub fn yeast() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let mut last = LAST.lock().unwrap();
    if now == last.0 {
        let seed = last.1;
        last.1 += 1;
        format!("{}.{}", encode(now), encode(u128::from(seed)))
    } else {
        *last = (now, 0);
        encode(now)
    }
}
