//! Big-endian primitive reads + Java modified UTF-8.

use std::io::Read;

use super::{MetadataError, MetadataResult};

/// Field-labelled reads over an arbitrary byte source.
///
/// Every primitive takes the name of the field being decoded so a short
/// read surfaces as `read <field>: <io error>` without the call sites
/// wrapping anything.
pub(crate) struct ByteReader<R> {
    inner: R,
}

impl<R: Read> ByteReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    pub fn read_u8(&mut self, field: &'static str) -> MetadataResult<u8> {
        let mut buf = [0u8; 1];
        self.fill(&mut buf, field)?;
        Ok(buf[0])
    }

    pub fn read_bool(&mut self, field: &'static str) -> MetadataResult<bool> {
        Ok(self.read_u8(field)? != 0)
    }

    pub fn read_u16(&mut self, field: &'static str) -> MetadataResult<u16> {
        let mut buf = [0u8; 2];
        self.fill(&mut buf, field)?;
        Ok(u16::from_be_bytes(buf))
    }

    pub fn read_u32(&mut self, field: &'static str) -> MetadataResult<u32> {
        let mut buf = [0u8; 4];
        self.fill(&mut buf, field)?;
        Ok(u32::from_be_bytes(buf))
    }

    pub fn read_i32(&mut self, field: &'static str) -> MetadataResult<i32> {
        Ok(self.read_u32(field)? as i32)
    }

    pub fn read_i64(&mut self, field: &'static str) -> MetadataResult<i64> {
        let mut buf = [0u8; 8];
        self.fill(&mut buf, field)?;
        Ok(i64::from_be_bytes(buf))
    }

    /// Reads an i32 count that must be >= 0.
    pub fn read_count(&mut self, field: &'static str) -> MetadataResult<usize> {
        let raw = self.read_i32(field)?;
        if raw < 0 {
            return Err(MetadataError::NegativeCount { field, got: raw });
        }
        Ok(raw as usize)
    }

    pub fn read_bytes(&mut self, n: usize, field: &'static str) -> MetadataResult<Vec<u8>> {
        let mut buf = vec![0u8; n];
        if n > 0 {
            self.fill(&mut buf, field)?;
        }
        Ok(buf)
    }

    /// Reads a length-prefixed run of i64 offsets, optionally discarding them.
    pub fn read_i64_array(
        &mut self,
        count_field: &'static str,
        item_field: &'static str,
        retain: bool,
    ) -> MetadataResult<Vec<i64>> {
        let count = self.read_count(count_field)?;
        let mut out = Vec::with_capacity(if retain { count } else { 0 });
        for _ in 0..count {
            let value = self.read_i64(item_field)?;
            if retain {
                out.push(value);
            }
        }
        Ok(out)
    }

    /// Reads a `writeUTF` string: u16 byte length + modified UTF-8 body.
    pub fn read_utf(&mut self, field: &'static str) -> MetadataResult<String> {
        let length = self.read_u16(field)? as usize;
        if length == 0 {
            return Ok(String::new());
        }
        let buf = self.read_bytes(length, field)?;
        decode_modified_utf8(field, &buf)
    }

    pub fn read_to_end(&mut self, field: &'static str) -> MetadataResult<Vec<u8>> {
        let mut buf = Vec::new();
        self.inner
            .read_to_end(&mut buf)
            .map_err(|source| MetadataError::Read { field, source })?;
        Ok(buf)
    }

    /// Fails with `PayloadSlack` unless the source is exhausted.
    pub fn expect_end(&mut self, field: &'static str) -> MetadataResult<()> {
        let mut probe = [0u8; 1];
        let n = self
            .inner
            .read(&mut probe)
            .map_err(|source| MetadataError::Read { field, source })?;
        if n != 0 {
            return Err(MetadataError::PayloadSlack { field });
        }
        Ok(())
    }

    fn fill(&mut self, buf: &mut [u8], field: &'static str) -> MetadataResult<()> {
        self.inner
            .read_exact(buf)
            .map_err(|source| MetadataError::Read { field, source })
    }
}

const HIGH_SURROGATE: std::ops::RangeInclusive<u32> = 0xD800..=0xDBFF;
const LOW_SURROGATE: std::ops::RangeInclusive<u32> = 0xDC00..=0xDFFF;

/// Decodes Java's modified UTF-8 (`DataOutputStream.writeUTF` body).
///
/// Differences from standard UTF-8: U+0000 arrives as the overlong pair
/// `C0 80`, and supplementary code points arrive as two 3-byte surrogate
/// encodings, which are recombined here. Four-byte sequences never occur.
pub(crate) fn decode_modified_utf8(field: &'static str, buf: &[u8]) -> MetadataResult<String> {
    let mut out = String::with_capacity(buf.len());
    let mut pending_high: Option<u32> = None;
    let mut i = 0;
    while i < buf.len() {
        let b = buf[i];
        let unit: u32 = if b >> 7 == 0 {
            i += 1;
            u32::from(b)
        } else if b >> 5 == 0b110 {
            if i + 1 >= buf.len() {
                return Err(MetadataError::Utf {
                    field,
                    reason: "truncated 2-byte sequence",
                });
            }
            let b2 = buf[i + 1];
            i += 2;
            if b == 0xC0 && b2 == 0x80 {
                0
            } else {
                (u32::from(b & 0x1F) << 6) | u32::from(b2 & 0x3F)
            }
        } else if b >> 4 == 0b1110 {
            if i + 2 >= buf.len() {
                return Err(MetadataError::Utf {
                    field,
                    reason: "truncated 3-byte sequence",
                });
            }
            let (b2, b3) = (buf[i + 1], buf[i + 2]);
            i += 3;
            (u32::from(b & 0x0F) << 12) | (u32::from(b2 & 0x3F) << 6) | u32::from(b3 & 0x3F)
        } else {
            return Err(MetadataError::Utf {
                field,
                reason: "unsupported start byte",
            });
        };

        if let Some(high) = pending_high.take() {
            if LOW_SURROGATE.contains(&unit) {
                let combined = 0x10000 + (((high - 0xD800) << 10) | (unit - 0xDC00));
                out.push(char::from_u32(combined).unwrap_or(char::REPLACEMENT_CHARACTER));
                continue;
            }
            out.push(char::REPLACEMENT_CHARACTER);
        }

        if HIGH_SURROGATE.contains(&unit) {
            pending_high = Some(unit);
        } else if LOW_SURROGATE.contains(&unit) {
            out.push(char::REPLACEMENT_CHARACTER);
        } else {
            out.push(char::from_u32(unit).unwrap_or(char::REPLACEMENT_CHARACTER));
        }
    }
    if pending_high.is_some() {
        out.push(char::REPLACEMENT_CHARACTER);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use proptest::prelude::*;

    use super::*;

    fn encode_modified_utf8(s: &str) -> Vec<u8> {
        let mut out = Vec::new();
        let push3 = |out: &mut Vec<u8>, cp: u32| {
            out.push(0xE0 | (cp >> 12) as u8);
            out.push(0x80 | ((cp >> 6) & 0x3F) as u8);
            out.push(0x80 | (cp & 0x3F) as u8);
        };
        for c in s.chars() {
            let cp = c as u32;
            if cp == 0 {
                out.extend([0xC0, 0x80]);
            } else if cp < 0x80 {
                out.push(cp as u8);
            } else if cp < 0x800 {
                out.push(0xC0 | (cp >> 6) as u8);
                out.push(0x80 | (cp & 0x3F) as u8);
            } else if cp < 0x10000 {
                push3(&mut out, cp);
            } else {
                let v = cp - 0x10000;
                push3(&mut out, 0xD800 + (v >> 10));
                push3(&mut out, 0xDC00 + (v & 0x3FF));
            }
        }
        out
    }

    #[test]
    fn reads_big_endian_primitives() {
        let bytes = [
            0x01, // u8
            0x00, 0x02, // u16
            0xFF, 0xFF, 0xFF, 0xFE, // i32 -2
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x2A, // i64 42
        ];
        let mut r = ByteReader::new(Cursor::new(bytes));
        assert_eq!(r.read_u8("a").unwrap(), 1);
        assert_eq!(r.read_u16("b").unwrap(), 2);
        assert_eq!(r.read_i32("c").unwrap(), -2);
        assert_eq!(r.read_i64("d").unwrap(), 42);
    }

    #[test]
    fn short_read_names_the_field() {
        let mut r = ByteReader::new(Cursor::new([0x00, 0x01]));
        let err = r.read_i32("operator parallelism").unwrap_err();
        assert_eq!(
            err.to_string(),
            "read operator parallelism: failed to fill whole buffer"
        );
    }

    #[test]
    fn negative_count_is_rejected() {
        let mut r = ByteReader::new(Cursor::new((-3i32).to_be_bytes()));
        let err = r.read_count("master state count").unwrap_err();
        assert!(matches!(
            err,
            MetadataError::NegativeCount {
                field: "master state count",
                got: -3
            }
        ));
    }

    #[test]
    fn utf_decodes_embedded_nul() {
        // "a\0b" as writeUTF: length 4, then 61 C0 80 62.
        let mut r = ByteReader::new(Cursor::new([0x00, 0x04, 0x61, 0xC0, 0x80, 0x62]));
        let s = r.read_utf("name").unwrap();
        assert_eq!(s.chars().collect::<Vec<_>>(), ['a', '\u{0}', 'b']);
    }

    #[test]
    fn utf_decodes_two_and_three_byte_sequences() {
        let body = encode_modified_utf8("é€");
        let mut framed = (body.len() as u16).to_be_bytes().to_vec();
        framed.extend(&body);
        let mut r = ByteReader::new(Cursor::new(framed));
        assert_eq!(r.read_utf("name").unwrap(), "é€");
    }

    #[test]
    fn utf_recombines_surrogate_pairs() {
        let decoded = decode_modified_utf8("s", &encode_modified_utf8("a😀b")).unwrap();
        assert_eq!(decoded, "a😀b");
    }

    #[test]
    fn utf_replaces_unpaired_surrogates() {
        // Lone high surrogate D800 = ED A0 80.
        let decoded = decode_modified_utf8("s", &[0xED, 0xA0, 0x80, 0x61]).unwrap();
        assert_eq!(decoded, "\u{FFFD}a");
        // Lone low surrogate DC00 = ED B0 80.
        let decoded = decode_modified_utf8("s", &[0xED, 0xB0, 0x80]).unwrap();
        assert_eq!(decoded, "\u{FFFD}");
    }

    #[test]
    fn utf_rejects_truncated_sequences() {
        let err = decode_modified_utf8("s", &[0xC3]).unwrap_err();
        assert!(matches!(
            err,
            MetadataError::Utf {
                reason: "truncated 2-byte sequence",
                ..
            }
        ));
        let err = decode_modified_utf8("s", &[0xE2, 0x82]).unwrap_err();
        assert!(matches!(
            err,
            MetadataError::Utf {
                reason: "truncated 3-byte sequence",
                ..
            }
        ));
    }

    #[test]
    fn utf_rejects_four_byte_lead() {
        let err = decode_modified_utf8("s", &[0xF0, 0x9F, 0x98, 0x80]).unwrap_err();
        assert!(matches!(
            err,
            MetadataError::Utf {
                reason: "unsupported start byte",
                ..
            }
        ));
    }

    #[test]
    fn expect_end_flags_slack() {
        let mut r = ByteReader::new(Cursor::new([0x00]));
        assert!(matches!(
            r.expect_end("master state payload").unwrap_err(),
            MetadataError::PayloadSlack { .. }
        ));
        let mut r = ByteReader::new(Cursor::new([]));
        r.expect_end("master state payload").unwrap();
    }

    #[test]
    fn i64_array_discards_without_retain() {
        let mut bytes = 3i32.to_be_bytes().to_vec();
        for v in [7i64, 8, 9] {
            bytes.extend(v.to_be_bytes());
        }
        bytes.extend(0xABu8.to_be_bytes());
        let mut r = ByteReader::new(Cursor::new(bytes));
        let out = r.read_i64_array("offset count", "offset", false).unwrap();
        assert!(out.is_empty());
        // Position is unchanged by retention: the trailing byte is next.
        assert_eq!(r.read_u8("tail").unwrap(), 0xAB);
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 128, .. ProptestConfig::default() })]

        #[test]
        fn utf_round_trips_arbitrary_strings(s in any::<String>()) {
            let decoded = decode_modified_utf8("s", &encode_modified_utf8(&s)).unwrap();
            prop_assert_eq!(decoded, s);
        }
    }
}
