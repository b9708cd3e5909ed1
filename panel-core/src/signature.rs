//! Partition-Signatur
//!
//! Jede Firmware dieser Familie trägt einen 32-Byte Cookie in einem
//! eigenen 256-Byte Block direkt hinter dem App-Descriptor. Nach dem
//! Schreiben eines neuen Images wird der Cookie aus der inaktiven
//! Partition gelesen und mit dem einkompilierten Cookie verglichen.

use crate::traits::FirmwarePartition;

/// Länge des Cookies in Bytes
pub const COOKIE_LEN: usize = 32;

/// Gesamtgrösse des Signatur-Blocks im Image
pub const SIGNATURE_BLOCK_LEN: usize = 256;

/// Image-Header (24) + erster Segment-Header (8) + App-Descriptor (256)
pub const SIGNATURE_OFFSET: u32 = 24 + 8 + 256;

/// Cookie einer Firmware-Familie
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct PartitionSignature {
    cookie: [u8; COOKIE_LEN],
}

impl PartitionSignature {
    /// Baut den Cookie aus einem Text (nullterminiert, Rest mit 0 gefüllt)
    ///
    /// Texte mit 32 oder mehr Bytes werden auf 31 Bytes gekürzt, damit
    /// das abschliessende Null-Byte erhalten bleibt.
    pub const fn new(text: &str) -> Self {
        let bytes = text.as_bytes();
        let mut cookie = [0u8; COOKIE_LEN];
        let mut i = 0;
        while i < bytes.len() && i < COOKIE_LEN - 1 {
            cookie[i] = bytes[i];
            i += 1;
        }
        Self { cookie }
    }

    pub const fn from_bytes(cookie: [u8; COOKIE_LEN]) -> Self {
        Self { cookie }
    }

    pub fn as_bytes(&self) -> &[u8; COOKIE_LEN] {
        &self.cookie
    }
}

/// Layout des eingebetteten Blocks
///
/// Die Firmware legt eine Instanz in `.rodata_desc.custom` ab, der
/// Linker platziert sie direkt hinter dem App-Descriptor.
#[derive(Debug)]
#[repr(C)]
pub struct SignatureBlock {
    pub signature: PartitionSignature,
    pub reserved: [u8; SIGNATURE_BLOCK_LEN - COOKIE_LEN],
}

impl SignatureBlock {
    pub const fn new(signature: PartitionSignature) -> Self {
        Self {
            signature,
            reserved: [0; SIGNATURE_BLOCK_LEN - COOKIE_LEN],
        }
    }
}

/// Ergebnis von [`verify`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SignatureCheck {
    Match,
    Mismatch,
}

/// Vergleicht den Cookie der geschriebenen Partition mit `expected`
///
/// Ein Lesefehler gilt als `Mismatch`.
pub fn verify<P: FirmwarePartition + ?Sized>(
    partition: &mut P,
    expected: &PartitionSignature,
) -> SignatureCheck {
    let mut candidate = [0u8; COOKIE_LEN];
    if let Err(e) = partition.read(SIGNATURE_OFFSET, &mut candidate) {
        warn!("Signature: read failed: {:?}", e);
        return SignatureCheck::Mismatch;
    }

    if candidate == *expected.as_bytes() {
        SignatureCheck::Match
    } else {
        SignatureCheck::Mismatch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FlashError;

    struct Image {
        bytes: [u8; 512],
        fail_read: bool,
    }

    impl FirmwarePartition for Image {
        fn capacity(&self) -> u32 {
            self.bytes.len() as u32
        }
        fn begin(&mut self, _size: u32) -> Result<(), FlashError> {
            Ok(())
        }
        fn write(&mut self, _data: &[u8]) -> Result<(), FlashError> {
            Ok(())
        }
        fn read(&mut self, offset: u32, buf: &mut [u8]) -> Result<(), FlashError> {
            if self.fail_read {
                return Err(FlashError::ReadFailed);
            }
            let start = offset as usize;
            buf.copy_from_slice(&self.bytes[start..start + buf.len()]);
            Ok(())
        }
        fn mark_bootable(&mut self) -> Result<(), FlashError> {
            Ok(())
        }
        fn abort(&mut self) {}
    }

    fn image_with(cookie: &PartitionSignature) -> Image {
        let mut bytes = [0xFFu8; 512];
        let start = SIGNATURE_OFFSET as usize;
        bytes[start..start + COOKIE_LEN].copy_from_slice(cookie.as_bytes());
        Image { bytes, fail_read: false }
    }

    #[test]
    fn test_signature_offset() {
        assert_eq!(SIGNATURE_OFFSET, 288);
        assert_eq!(core::mem::size_of::<SignatureBlock>(), SIGNATURE_BLOCK_LEN);
    }

    #[test]
    fn test_cookie_is_zero_padded() {
        let sig = PartitionSignature::new("status_FW");
        assert_eq!(&sig.as_bytes()[..9], b"status_FW");
        assert!(sig.as_bytes()[9..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_cookie_keeps_terminator() {
        let sig = PartitionSignature::new("0123456789abcdef0123456789abcdefXYZ");
        assert_eq!(sig.as_bytes()[COOKIE_LEN - 1], 0);
    }

    #[test]
    fn test_verify_match() {
        let expected = PartitionSignature::new("status_FW");
        let mut image = image_with(&expected);
        assert_eq!(verify(&mut image, &expected), SignatureCheck::Match);
    }

    #[test]
    fn test_verify_single_byte_difference() {
        let expected = PartitionSignature::new("status_FW");
        let mut other = *expected.as_bytes();
        other[COOKIE_LEN - 1] = 1;
        let mut image = image_with(&PartitionSignature::from_bytes(other));
        assert_eq!(verify(&mut image, &expected), SignatureCheck::Mismatch);
    }

    #[test]
    fn test_verify_read_error_is_mismatch() {
        let expected = PartitionSignature::new("status_FW");
        let mut image = image_with(&expected);
        image.fail_read = true;
        assert_eq!(verify(&mut image, &expected), SignatureCheck::Mismatch);
    }
}
