//! Wire encoding of characteristic values
//!
//! Every value travels as the UTF-8 bytes of its text form. Numbers are
//! rounded to five decimal places first.

/// Placeholder sent when a PV cannot be read
pub const INVALID: &str = "Invalid";

/// PV-browser read value while no PV is bound
pub const NO_PV: &str = "No PV";

const DECIMALS: i32 = 5;

pub fn encode(text: &str) -> Vec<u8> {
    text.as_bytes().to_vec()
}

/// Text of a client write. Trailing NUL padding is dropped.
pub fn decode(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches('\0')
        .to_string()
}

pub fn round(value: f64) -> f64 {
    let scale = 10f64.powi(DECIMALS);
    let rounded = (value * scale).round() / scale;
    // -0.0 would print as "-0.0"
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

/// Round to five decimals and print the shortest representation.
///
/// Integral values keep a trailing `.0` so a motor at 2 reads `2.0`.
pub fn format_rounded(value: f64) -> String {
    if !value.is_finite() {
        return if value.is_nan() {
            "nan".to_string()
        } else if value > 0.0 {
            "inf".to_string()
        } else {
            "-inf".to_string()
        };
    }

    let text = round(value).to_string();
    if text.contains('.') {
        text
    } else {
        format!("{}.0", text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rounded_round_trip() {
        for (value, expected) in [
            (0.0, "0.0"),
            (-12.34567, "-12.34567"),
            (1000000.00001, "1000000.00001"),
        ] {
            let text = format_rounded(value);
            assert_eq!(text, expected);
            assert_eq!(decode(&encode(&text)), expected);
        }
    }

    #[test]
    fn test_rounding_drops_extra_decimals() {
        assert_eq!(format_rounded(1.234567), "1.23457");
        assert_eq!(format_rounded(-0.000001), "0.0");
        assert_eq!(format_rounded(42.0), "42.0");
    }

    #[test]
    fn test_one_byte_per_ascii_char() {
        assert_eq!(encode("Invalid"), b"Invalid".to_vec());
        assert_eq!(encode("-1.5").len(), 4);
    }

    #[test]
    fn test_decode_drops_nul_padding() {
        assert_eq!(decode(b"3.25\0"), "3.25");
        assert_eq!(decode(b"IOC:m1\0\0"), "IOC:m1");
        assert_eq!(decode(b"\0"), "");
    }

    #[test]
    fn test_decode_is_lossy() {
        assert_eq!(decode(&[0x49, 0x4f, 0x43, 0xff]), "IOC\u{fffd}");
    }
}
