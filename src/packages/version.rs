// src/packages/version.rs

//! alpm-style version comparison.
//!
//! Implements the ordering used by pacman's `vercmp`: an optional numeric
//! epoch separated by `:`, then alternating numeric/alphabetic segments where
//! numeric segments compare as integers and beat alphabetic ones. Trailing
//! alphabetic segments rank older (`1.0rc` < `1.0`), trailing numeric segments
//! rank newer (`1.0` < `1.0.1`).

use std::cmp::Ordering;

/// Compare two package versions (`[epoch:]pkgver[-pkgrel]`)
pub fn vercmp(a: &str, b: &str) -> Ordering {
    let (epoch_a, rest_a) = split_epoch(a);
    let (epoch_b, rest_b) = split_epoch(b);

    match epoch_a.cmp(&epoch_b) {
        Ordering::Equal => segment_cmp(rest_a, rest_b),
        other => other,
    }
}

fn split_epoch(version: &str) -> (u64, &str) {
    match version.split_once(':') {
        Some((epoch, rest)) => (epoch.parse().unwrap_or(0), rest),
        None => (0, version),
    }
}

fn segment_cmp(a: &str, b: &str) -> Ordering {
    let mut a = a;
    let mut b = b;

    loop {
        a = a.trim_start_matches(|c: char| !c.is_ascii_alphanumeric());
        b = b.trim_start_matches(|c: char| !c.is_ascii_alphanumeric());

        match (a.is_empty(), b.is_empty()) {
            (true, true) => return Ordering::Equal,
            // A trailing alphabetic segment ranks older than nothing at all
            (true, false) => {
                return if b.starts_with(|c: char| c.is_ascii_alphabetic()) {
                    Ordering::Greater
                } else {
                    Ordering::Less
                };
            }
            (false, true) => {
                return if a.starts_with(|c: char| c.is_ascii_alphabetic()) {
                    Ordering::Less
                } else {
                    Ordering::Greater
                };
            }
            (false, false) => {}
        }

        let (seg_a, rest_a) = take_segment(a);
        let (seg_b, rest_b) = take_segment(b);
        a = rest_a;
        b = rest_b;

        let numeric_a = seg_a.starts_with(|c: char| c.is_ascii_digit());
        let numeric_b = seg_b.starts_with(|c: char| c.is_ascii_digit());

        let ordering = match (numeric_a, numeric_b) {
            (true, true) => {
                let trimmed_a = seg_a.trim_start_matches('0');
                let trimmed_b = seg_b.trim_start_matches('0');
                match trimmed_a.len().cmp(&trimmed_b.len()) {
                    Ordering::Equal => trimmed_a.cmp(trimmed_b),
                    other => other,
                }
            }
            // Numeric segments always beat alphabetic ones
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => seg_a.cmp(seg_b),
        };

        if ordering != Ordering::Equal {
            return ordering;
        }
    }
}

/// Split off the leading run of digits or of letters
fn take_segment(s: &str) -> (&str, &str) {
    let numeric = s.starts_with(|c: char| c.is_ascii_digit());
    let end = s
        .find(|c: char| {
            if numeric {
                !c.is_ascii_digit()
            } else {
                !c.is_ascii_alphabetic()
            }
        })
        .unwrap_or(s.len());
    s.split_at(end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_versions() {
        assert_eq!(vercmp("1.0.0-1", "1.0.0-1"), Ordering::Equal);
        assert_eq!(vercmp("1.0", "1.0"), Ordering::Equal);
    }

    #[test]
    fn test_numeric_ordering() {
        assert_eq!(vercmp("1.0.0-1", "1.0.1-1"), Ordering::Less);
        assert_eq!(vercmp("1.10", "1.9"), Ordering::Greater);
        assert_eq!(vercmp("2.0", "10.0"), Ordering::Less);
        assert_eq!(vercmp("1.0-2", "1.0-1"), Ordering::Greater);
    }

    #[test]
    fn test_epoch_wins() {
        assert_eq!(vercmp("1:0.5-1", "2.0-1"), Ordering::Greater);
        assert_eq!(vercmp("1:1.0", "2:0.1"), Ordering::Less);
    }

    #[test]
    fn test_alpha_segments() {
        assert_eq!(vercmp("1.0rc-1", "1.0-1"), Ordering::Less);
        assert_eq!(vercmp("1.0a", "1.0b"), Ordering::Less);
        assert_eq!(vercmp("1.0", "1.0.1"), Ordering::Less);
        assert_eq!(vercmp("1.0alpha", "1.0"), Ordering::Less);
    }

    #[test]
    fn test_leading_zeroes() {
        assert_eq!(vercmp("1.001", "1.1"), Ordering::Equal);
        assert_eq!(vercmp("1.02", "1.10"), Ordering::Less);
    }
}
