use crate::{Error, Result};
use chrono::{DateTime, NaiveDateTime, Utc, Weekday};
use sha2::{Digest, Sha256};

/// The `UnixDate` layout (`Mon Jan _2 15:04:05 MST 2006`) that the UI and stored specs use
const UNIX_DATE_FORMAT: &str = "%a %b %e %H:%M:%S UTC %Y";
const UNIX_DATE_PARSE_FORMAT: &str = "%b %d %H:%M:%S %Z %Y";

const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// Build a resource name such as `env-3k2nq5m7wa` from a hash of the current time
pub fn generate_name(prefix: &str) -> String {
    generate_name_from(prefix, &Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Nanos, true))
}

pub fn generate_name_from(prefix: &str, seed: &str) -> String {
    let digest = Sha256::digest(seed.as_bytes());
    let encoded = base32_encode(&digest);
    format!("{}{}", prefix, encoded[..10].to_ascii_lowercase())
}

/// RFC 4648 base32 without padding
fn base32_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len().div_ceil(5) * 8);
    let mut buffer: u64 = 0;
    let mut bits = 0u32;

    for &byte in data {
        buffer = (buffer << 8) | u64::from(byte);
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(BASE32_ALPHABET[((buffer >> bits) & 0x1f) as usize] as char);
        }
    }
    if bits > 0 {
        out.push(BASE32_ALPHABET[((buffer << (5 - bits)) & 0x1f) as usize] as char);
    }

    out
}

pub fn format_unix_date(time: &DateTime<Utc>) -> String {
    time.format(UNIX_DATE_FORMAT).to_string()
}

/// Parse a `UnixDate` string. The zone abbreviation is read as UTC, and the
/// weekday must be a weekday name but is not checked against the date.
pub fn parse_unix_date(value: &str) -> Result<DateTime<Utc>> {
    let invalid = |reason: String| Error::InvalidRequest(format!("invalid timestamp {:?}: {}", value, reason));

    let mut tokens = value.split_whitespace();
    let weekday = tokens.next().unwrap_or_default();
    weekday
        .parse::<Weekday>()
        .map_err(|_| invalid(format!("bad weekday {:?}", weekday)))?;

    let rest = tokens.collect::<Vec<_>>().join(" ");
    NaiveDateTime::parse_from_str(&rest, UNIX_DATE_PARSE_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| invalid(e.to_string()))
}
