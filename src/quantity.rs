//! Parsing for Kubernetes resource quantities and version strings.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/* ============================= QUANTITIES ============================= */

const BINARY_SUFFIXES: &[(&str, u64)] = &[
    ("Ki", 1 << 10),
    ("Mi", 1 << 20),
    ("Gi", 1 << 30),
    ("Ti", 1 << 40),
    ("Pi", 1 << 50),
    ("Ei", 1 << 60),
];

const DECIMAL_SUFFIXES: &[(&str, u64)] = &[
    ("k", 1_000),
    ("M", 1_000_000),
    ("G", 1_000_000_000),
    ("T", 1_000_000_000_000),
    ("P", 1_000_000_000_000_000),
    ("E", 1_000_000_000_000_000_000),
];

/// Parse a memory quantity ("16Gi", "16G", "16384Mi", "17179869184") into bytes.
pub fn parse_memory_bytes(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    for (suffix, factor) in BINARY_SUFFIXES.iter().chain(DECIMAL_SUFFIXES.iter()) {
        if let Some(number) = raw.strip_suffix(suffix) {
            let value: f64 = number.parse().ok()?;
            return Some((value * *factor as f64) as u64);
        }
    }
    if let Some(milli) = raw.strip_suffix('m') {
        let value: f64 = milli.parse().ok()?;
        return Some((value / 1000.0) as u64);
    }
    raw.parse::<f64>().ok().map(|v| v as u64)
}

/// Parse a CPU quantity ("4", "3500m", "0.5") into millicores.
pub fn parse_cpu_millis(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if let Some(milli) = raw.strip_suffix('m') {
        return milli.parse::<f64>().ok().map(|v| v as u64);
    }
    raw.parse::<f64>().ok().map(|v| (v * 1000.0) as u64)
}

/// Render bytes using the largest binary unit that keeps a whole number above one.
pub fn format_bytes(bytes: u64) -> String {
    for (suffix, factor) in BINARY_SUFFIXES.iter().rev() {
        if bytes >= *factor {
            return format!("{:.1}{}", bytes as f64 / *factor as f64, suffix);
        }
    }
    format!("{bytes}")
}

/* ============================= VERSIONS ============================= */

/// A dotted numeric version compared component by component ("1.27", "5.15.0").
/// Missing trailing components compare as zero, so `1.20 == 1.20.0`.
#[derive(Debug, Clone)]
pub struct Version {
    parts: Vec<u64>,
}

impl Version {
    pub fn new(parts: &[u64]) -> Self {
        Self { parts: parts.to_vec() }
    }

    /// Build from separate major/minor strings as returned by the API server,
    /// tolerating vendor suffixes such as `"27+"`.
    pub fn from_major_minor(major: &str, minor: &str) -> Option<Self> {
        Some(Self {
            parts: vec![leading_number(major)?, leading_number(minor)?],
        })
    }

    pub fn major(&self) -> u64 {
        self.parts.first().copied().unwrap_or(0)
    }

    pub fn minor(&self) -> u64 {
        self.parts.get(1).copied().unwrap_or(0)
    }
}

fn leading_number(raw: &str) -> Option<u64> {
    let digits: String = raw.trim().chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

impl FromStr for Version {
    type Err = String;

    /// Reads leading dotted numeric components and stops at the first non-numeric
    /// one, so `"5.15.0-1051-azure"` parses as `5.15.0`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_start_matches('v');
        let mut parts = Vec::new();
        for piece in trimmed.split('.') {
            match leading_number(piece) {
                Some(n) => {
                    parts.push(n);
                    if !piece.chars().all(|c| c.is_ascii_digit()) {
                        break;
                    }
                }
                None => break,
            }
        }
        if parts.is_empty() {
            return Err(format!("'{s}' is not a version"));
        }
        Ok(Self { parts })
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.parts.len().max(other.parts.len());
        for i in 0..len {
            let a = self.parts.get(i).copied().unwrap_or(0);
            let b = other.parts.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                non_eq => return non_eq,
            }
        }
        Ordering::Equal
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<String> = self.parts.iter().map(u64::to_string).collect();
        f.write_str(&joined.join("."))
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/* ============================= TESTS ============================= */

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_binary_suffixes() {
        assert_eq!(parse_memory_bytes("16Gi"), Some(16 * (1 << 30)));
        assert_eq!(parse_memory_bytes("1024Ki"), Some(1 << 20));
        assert_eq!(parse_memory_bytes("16384Mi"), Some(16 * (1 << 30)));
    }

    #[test]
    fn test_memory_decimal_and_plain() {
        assert_eq!(parse_memory_bytes("16G"), Some(16_000_000_000));
        assert_eq!(parse_memory_bytes("500k"), Some(500_000));
        assert_eq!(parse_memory_bytes("17179869184"), Some(17_179_869_184));
    }

    #[test]
    fn test_memory_garbage() {
        assert_eq!(parse_memory_bytes("lots"), None);
        assert_eq!(parse_memory_bytes(""), None);
    }

    #[test]
    fn test_cpu_millis() {
        assert_eq!(parse_cpu_millis("4"), Some(4000));
        assert_eq!(parse_cpu_millis("3500m"), Some(3500));
        assert_eq!(parse_cpu_millis("0.5"), Some(500));
        assert_eq!(parse_cpu_millis("x"), None);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(16 * (1 << 30)), "16.0Gi");
        assert_eq!(format_bytes(512), "512");
    }

    #[test]
    fn test_version_ordering() {
        let a: Version = "1.19".parse().unwrap();
        let b: Version = "1.20".parse().unwrap();
        assert!(a < b);
        assert_eq!("1.20.0".parse::<Version>().unwrap(), b.clone());
        assert!("1.100".parse::<Version>().unwrap() > b);
    }

    #[test]
    fn test_kernel_version_with_suffix() {
        let v: Version = "5.15.0-1051-azure".parse().unwrap();
        assert_eq!(v, Version::new(&[5, 15, 0]));
        assert!(v >= "5.15".parse::<Version>().unwrap());
    }

    #[test]
    fn test_major_minor_with_vendor_suffix() {
        let v = Version::from_major_minor("1", "27+").unwrap();
        assert_eq!(v.to_string(), "1.27");
        assert_eq!(v.minor(), 27);
    }

    #[test]
    fn test_version_serde() {
        let v: Version = serde_json::from_str("\"1.20\"").unwrap();
        assert_eq!(v, Version::new(&[1, 20]));
        assert_eq!(serde_json::to_string(&v).unwrap(), "\"1.20\"");
    }
}
