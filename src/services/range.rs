//! Parsing of single `Range: bytes=...` request headers.
//!
//! Only one range per request is honored. Multi-range requests, other units
//! and malformed values are treated as if no `Range` header was sent, so the
//! caller falls back to a full `200` response. Well-formed ranges that do not
//! fit inside the file are reported as unsatisfiable instead of being clamped.

use std::fmt;

/// An inclusive byte range inside a file of known size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

/// The requested range lies (partly) outside the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unsatisfiable;

impl ByteRange {
    /// Parse a raw `Range` header value against a file of `size` bytes.
    ///
    /// Returns `Ok(None)` when the header should be ignored and
    /// `Err(Unsatisfiable)` when it names bytes the file does not have.
    /// `end >= size` is rejected rather than clamped to the last byte.
    pub fn parse(header: &str, size: u64) -> Result<Option<Self>, Unsatisfiable> {
        let Some((unit, spec)) = header.trim().split_once('=') else {
            return Ok(None);
        };
        if !unit.trim().eq_ignore_ascii_case("bytes") {
            return Ok(None);
        }
        // Multi-range responses (multipart/byteranges) are not produced.
        if spec.contains(',') {
            return Ok(None);
        }
        let Some((first, last)) = spec.trim().split_once('-') else {
            return Ok(None);
        };
        let (first, last) = (first.trim(), last.trim());

        if first.is_empty() {
            // Suffix form: "-N" asks for the final N bytes.
            let Some(suffix) = parse_offset(last) else {
                return Ok(None);
            };
            if suffix == 0 || size == 0 {
                return Err(Unsatisfiable);
            }
            return Ok(Some(Self {
                start: size.saturating_sub(suffix),
                end: size - 1,
            }));
        }

        let Some(start) = parse_offset(first) else {
            return Ok(None);
        };
        let end = if last.is_empty() {
            size.saturating_sub(1)
        } else {
            match parse_offset(last) {
                Some(end) => end,
                None => return Ok(None),
            }
        };

        if start >= size || end >= size || end < start {
            return Err(Unsatisfiable);
        }
        Ok(Some(Self { start, end }))
    }

    /// Number of bytes covered by the range.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Value for the `Content-Range` header of a `206` response.
    pub fn content_range(&self, size: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, size)
    }

    /// Value for the `Content-Range` header of a `416` response.
    pub fn unsatisfied_content_range(size: u64) -> String {
        format!("bytes */{}", size)
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Digits only; `u64::from_str` would also accept a leading `+`.
fn parse_offset(value: &str) -> Option<u64> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_range_inside_file() {
        let range = ByteRange::parse("bytes=100-199", 1000).unwrap().unwrap();
        assert_eq!(range, ByteRange { start: 100, end: 199 });
        assert_eq!(range.len(), 100);
        assert_eq!(range.content_range(1000), "bytes 100-199/1000");
    }

    #[test]
    fn open_ended_range_runs_to_last_byte() {
        let range = ByteRange::parse("bytes=990-", 1000).unwrap().unwrap();
        assert_eq!(range, ByteRange { start: 990, end: 999 });
        assert_eq!(range.len(), 10);
    }

    #[test]
    fn end_past_eof_is_rejected_not_clamped() {
        assert_eq!(ByteRange::parse("bytes=990-1999", 1000), Err(Unsatisfiable));
        assert_eq!(ByteRange::parse("bytes=0-1000", 1000), Err(Unsatisfiable));
        assert!(ByteRange::parse("bytes=0-999", 1000).unwrap().is_some());
    }

    #[test]
    fn start_at_or_past_eof_is_rejected() {
        assert_eq!(ByteRange::parse("bytes=1000-1005", 1000), Err(Unsatisfiable));
        assert_eq!(ByteRange::parse("bytes=1000-", 1000), Err(Unsatisfiable));
        assert_eq!(ByteRange::parse("bytes=0-", 0), Err(Unsatisfiable));
    }

    #[test]
    fn inverted_range_is_rejected() {
        assert_eq!(ByteRange::parse("bytes=500-100", 1000), Err(Unsatisfiable));
    }

    #[test]
    fn suffix_range_selects_tail() {
        let range = ByteRange::parse("bytes=-100", 1000).unwrap().unwrap();
        assert_eq!(range, ByteRange { start: 900, end: 999 });

        let whole = ByteRange::parse("bytes=-5000", 1000).unwrap().unwrap();
        assert_eq!(whole, ByteRange { start: 0, end: 999 });

        assert_eq!(ByteRange::parse("bytes=-0", 1000), Err(Unsatisfiable));
    }

    #[test]
    fn ignored_headers_fall_back_to_full_body() {
        for header in [
            "bytes=0-99,200-299",
            "items=0-10",
            "bytes=abc-def",
            "bytes=+5-10",
            "bytes=",
            "bytes=-",
            "bytes=10",
            "garbage",
        ] {
            assert_eq!(ByteRange::parse(header, 1000), Ok(None), "header {header:?}");
        }
    }

    #[test]
    fn unit_and_whitespace_are_lenient() {
        let range = ByteRange::parse("  Bytes = 0 - 9 ", 1000).unwrap().unwrap();
        assert_eq!(range, ByteRange { start: 0, end: 9 });
        assert_eq!(ByteRange::unsatisfied_content_range(1000), "bytes */1000");
    }
}
