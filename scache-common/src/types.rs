//! # Key/Value Conversions
//!
//! Keys, values, and collection names travel as raw bytes. `IntoBytes` lets
//! every public operation accept strings (UTF-8 encoded) and byte buffers
//! through one byte-oriented code path.

use std::time::Duration;

use bytes::Bytes;

/// Conversion into the byte payload sent on the wire.
///
/// # Examples
/// ```rust
/// use scache_common::IntoBytes;
///
/// assert_eq!("key".into_bytes(), b"key".into_bytes());
/// assert_eq!(String::from("key").into_bytes(), vec![b'k', b'e', b'y'].into_bytes());
/// ```
pub trait IntoBytes {
    fn into_bytes(self) -> Bytes;
}

impl IntoBytes for Bytes {
    fn into_bytes(self) -> Bytes {
        self
    }
}

impl IntoBytes for &Bytes {
    fn into_bytes(self) -> Bytes {
        self.clone()
    }
}

impl IntoBytes for Vec<u8> {
    fn into_bytes(self) -> Bytes {
        Bytes::from(self)
    }
}

impl IntoBytes for &Vec<u8> {
    fn into_bytes(self) -> Bytes {
        Bytes::copy_from_slice(self)
    }
}

impl IntoBytes for &[u8] {
    fn into_bytes(self) -> Bytes {
        Bytes::copy_from_slice(self)
    }
}

impl<const N: usize> IntoBytes for &[u8; N] {
    fn into_bytes(self) -> Bytes {
        Bytes::copy_from_slice(self)
    }
}

impl IntoBytes for String {
    fn into_bytes(self) -> Bytes {
        Bytes::from(self)
    }
}

impl IntoBytes for &String {
    fn into_bytes(self) -> Bytes {
        Bytes::copy_from_slice(self.as_bytes())
    }
}

impl IntoBytes for &str {
    fn into_bytes(self) -> Bytes {
        Bytes::copy_from_slice(self.as_bytes())
    }
}

/// Converts a TTL to the wire's millisecond field, saturating at `u64::MAX`.
#[inline]
pub fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strings_encode_as_utf8() {
        assert_eq!("héllo".into_bytes(), Bytes::from("héllo".as_bytes().to_vec()));
        assert_eq!(String::from("k").into_bytes(), Bytes::from_static(b"k"));
    }

    #[test]
    fn byte_inputs_are_passed_through() {
        let raw = vec![0u8, 159, 146, 150];
        assert_eq!(raw.as_slice().into_bytes(), Bytes::from(raw.clone()));
        assert_eq!((&raw).into_bytes(), Bytes::from(raw.clone()));
        assert_eq!(raw.into_bytes().len(), 4);
        assert_eq!(b"ab".into_bytes(), Bytes::from_static(b"ab"));
    }

    #[test]
    fn ttl_millis_saturates() {
        assert_eq!(ttl_millis(Duration::from_millis(1500)), 1500);
        assert_eq!(ttl_millis(Duration::MAX), u64::MAX);
    }
}
