//! Test helpers for binrw-encoded wire structures.
//!
//! The macros here compare a value against a captured hex dump in both
//! directions. Use [`test_binrw!`] for symmetric types, or the `_read`/`_write`
//! halves when only one direction is derived for the current feature set.

/// Decodes a hex string (no separators) into its bytes.
///
/// Panics on malformed input; this is test-only code.
pub fn decode_hex(hex: &str) -> Vec<u8> {
    assert!(hex.len() % 2 == 0, "hex dump has odd length");
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).expect("bad hex digit"))
        .collect()
}

/// Expands to the byte vector a hex dump literal describes.
#[macro_export]
macro_rules! hex_to_u8_array {
    ($hex:expr) => {
        $crate::decode_hex($hex)
    };
}

/// Generates a test asserting that parsing `$hex` yields `$value`.
#[macro_export]
macro_rules! test_binrw_read {
    ($ty:ident => $name:tt: $value:expr => $hex:expr) => {
        ::pastey::paste! {
            #[test]
            fn [<test_ $ty:snake _ $name _read>]() {
                let data = $crate::hex_to_u8_array!($hex);
                let mut cursor = ::binrw::io::Cursor::new(&data);
                let parsed: $ty = ::binrw::BinRead::read_le(&mut cursor).unwrap();
                assert_eq!(parsed, $value);
            }
        }
    };
    ($ty:ident: $value:expr => $hex:expr) => {
        $crate::test_binrw_read! { $ty => v: $value => $hex }
    };
}

/// Generates a test asserting that writing `$value` produces `$hex`.
#[macro_export]
macro_rules! test_binrw_write {
    ($ty:ident => $name:tt: $value:expr => $hex:expr) => {
        ::pastey::paste! {
            #[test]
            fn [<test_ $ty:snake _ $name _write>]() {
                let value: $ty = $value;
                let mut cursor = ::binrw::io::Cursor::new(Vec::new());
                ::binrw::BinWrite::write_le(&value, &mut cursor).unwrap();
                let expected = $crate::hex_to_u8_array!($hex);
                assert_eq!(cursor.into_inner(), expected);
            }
        }
    };
    ($ty:ident: $value:expr => $hex:expr) => {
        $crate::test_binrw_write! { $ty => v: $value => $hex }
    };
}

/// Generates both the read and the write test for a value/hex pair.
#[macro_export]
macro_rules! test_binrw {
    ($ty:ident => $name:tt: $value:expr => $hex:expr) => {
        $crate::test_binrw_read! { $ty => $name: $value => $hex }
        $crate::test_binrw_write! { $ty => $name: $value => $hex }
    };
    ($ty:ident: $value:expr => $hex:expr) => {
        $crate::test_binrw! { $ty => v: $value => $hex }
    };
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_decode_hex() {
        assert_eq!(super::decode_hex("ff534d42"), vec![0xff, 0x53, 0x4d, 0x42]);
        assert_eq!(super::decode_hex(""), Vec::<u8>::new());
    }
}
