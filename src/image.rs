//! Spin program image loading.
//!
//! A program image is the RAM contents starting at address 0. The first
//! sixteen bytes are the header:
//!
//! | offset | size | field                         |
//! |--------|------|-------------------------------|
//! | 0      | u32  | clock frequency               |
//! | 4      | u8   | clock mode                    |
//! | 5      | u8   | checksum byte                 |
//! | 6      | u16  | object base                   |
//! | 8      | u16  | variable base                 |
//! | 10     | u16  | stack base                    |
//! | 12     | u16  | entry bytecode cursor         |
//! | 14     | u16  | initial stack cursor          |
//!
//! The checksum byte is chosen so the whole image sums to the complement
//! of the two boot-marker longs the loader appends below the stack; a
//! mismatch is logged but not fatal, since hand-assembled test images
//! rarely bother with it.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;
use std::path::Path;
use thiserror::Error;

use crate::hub::RAM_SIZE;

/// Size of the image header in bytes.
pub const HEADER_SIZE: usize = 16;

/// Byte-sum target for a well-formed image.
const CHECKSUM_TARGET: u8 = 0x14;

/// Errors raised while loading a program image.
#[derive(Debug, Error)]
pub enum ImageError {
    /// The blob is smaller than the header.
    #[error("image too short: {0} bytes, need at least {HEADER_SIZE}")]
    TooShort(usize),

    /// The blob does not fit in hub RAM.
    #[error("image too large: {0} bytes exceed hub RAM")]
    TooLarge(usize),

    /// The header's stack base would place the init frame inside the
    /// header itself.
    #[error("stack base 0x{0:04X} collides with the image header")]
    BadStackBase(u16),

    /// Underlying I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A parsed program image.
#[derive(Debug, Clone)]
pub struct SpinImage {
    pub clock_frequency: u32,
    pub clock_mode: u8,
    pub checksum: u8,
    pub object_base: u16,
    pub variable_base: u16,
    pub stack_base: u16,
    pub entry_pc: u16,
    pub stack_cursor: u16,
    /// Raw image bytes, header included.
    pub data: Vec<u8>,
}

impl SpinImage {
    /// Parse an image blob.
    pub fn parse(data: &[u8]) -> Result<Self, ImageError> {
        if data.len() < HEADER_SIZE {
            return Err(ImageError::TooShort(data.len()));
        }
        if data.len() > RAM_SIZE {
            return Err(ImageError::TooLarge(data.len()));
        }

        let mut header = Cursor::new(data);
        let clock_frequency = header.read_u32::<LittleEndian>()?;
        let clock_mode = header.read_u8()?;
        let checksum = header.read_u8()?;
        let object_base = header.read_u16::<LittleEndian>()?;
        let variable_base = header.read_u16::<LittleEndian>()?;
        let stack_base = header.read_u16::<LittleEndian>()?;
        let entry_pc = header.read_u16::<LittleEndian>()?;
        let stack_cursor = header.read_u16::<LittleEndian>()?;

        if (stack_base as usize) < HEADER_SIZE {
            return Err(ImageError::BadStackBase(stack_base));
        }

        let image = Self {
            clock_frequency,
            clock_mode,
            checksum,
            object_base,
            variable_base,
            stack_base,
            entry_pc,
            stack_cursor,
            data: data.to_vec(),
        };

        if !image.checksum_ok() {
            log::warn!(
                "image: checksum byte 0x{:02X} does not balance the image",
                image.checksum
            );
        }

        Ok(image)
    }

    /// Read and parse an image file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ImageError> {
        let data = std::fs::read(path)?;
        Self::parse(&data)
    }

    /// Whether the checksum byte balances the image.
    pub fn checksum_ok(&self) -> bool {
        let sum = self
            .data
            .iter()
            .fold(0u8, |sum, byte| sum.wrapping_add(*byte));
        sum.wrapping_add(CHECKSUM_TARGET) == 0
    }

    /// Program bytes (everything past the header).
    pub fn program(&self) -> &[u8] {
        &self.data[HEADER_SIZE..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(stack_base: u16) -> Vec<u8> {
        let mut data = vec![0u8; 0x40];
        data[0..4].copy_from_slice(&80_000_000u32.to_le_bytes());
        data[4] = 0x6F;
        data[6..8].copy_from_slice(&0x0010u16.to_le_bytes());
        data[8..10].copy_from_slice(&0x0020u16.to_le_bytes());
        data[10..12].copy_from_slice(&stack_base.to_le_bytes());
        data[12..14].copy_from_slice(&0x0018u16.to_le_bytes());
        data[14..16].copy_from_slice(&(stack_base + 4).to_le_bytes());
        data
    }

    #[test]
    fn test_parse_header_fields() {
        let image = SpinImage::parse(&header(0x30)).expect("parse");
        assert_eq!(image.clock_frequency, 80_000_000);
        assert_eq!(image.clock_mode, 0x6F);
        assert_eq!(image.object_base, 0x0010);
        assert_eq!(image.variable_base, 0x0020);
        assert_eq!(image.stack_base, 0x0030);
        assert_eq!(image.entry_pc, 0x0018);
        assert_eq!(image.stack_cursor, 0x0034);
        assert_eq!(image.program().len(), 0x40 - HEADER_SIZE);
    }

    #[test]
    fn test_too_short() {
        assert!(matches!(
            SpinImage::parse(&[0u8; 8]),
            Err(ImageError::TooShort(8))
        ));
    }

    #[test]
    fn test_too_large() {
        let data = vec![0u8; RAM_SIZE + 1];
        assert!(matches!(
            SpinImage::parse(&data),
            Err(ImageError::TooLarge(_))
        ));
    }

    #[test]
    fn test_bad_stack_base() {
        assert!(matches!(
            SpinImage::parse(&header(0x8)),
            Err(ImageError::BadStackBase(0x8))
        ));
    }

    #[test]
    fn test_checksum_balance() {
        let mut data = header(0x30);
        let sum = data
            .iter()
            .fold(0u8, |sum, byte| sum.wrapping_add(*byte));
        data[5] = 0u8.wrapping_sub(sum).wrapping_sub(CHECKSUM_TARGET);
        let image = SpinImage::parse(&data).expect("parse");
        assert!(image.checksum_ok());

        let mut broken = data;
        broken[5] = broken[5].wrapping_add(1);
        let image = SpinImage::parse(&broken).expect("parse");
        assert!(!image.checksum_ok());
    }
}
