//! Structured binary I/O with a trailing CRC32.
//!
//! [`StructWriter`] writes little-endian primitives while feeding every byte
//! into a running CRC32; [`StructWriter::finish`] appends the checksum.
//! [`StructReader`] mirrors it and refuses to read past the declared file size,
//! so a corrupt length field surfaces as a truncation error instead of a huge
//! allocation.

use std::io::{Read, Write};

use byteorder::{ByteOrder, LittleEndian};
use crc32fast::Hasher;

use crate::error::{PageSiftError, Result};
use crate::storage::traits::StorageError;

/// Size of the checksum trailer in bytes.
pub const CHECKSUM_LEN: u64 = 4;

/// A structured writer for binary data.
pub struct StructWriter<W: Write> {
    writer: W,
    hasher: Hasher,
    position: u64,
}

impl<W: Write> StructWriter<W> {
    /// Create a new structured writer.
    pub fn new(writer: W) -> Self {
        StructWriter {
            writer,
            hasher: Hasher::new(),
            position: 0,
        }
    }

    /// Write raw bytes without length prefix.
    pub fn write_raw(&mut self, value: &[u8]) -> Result<()> {
        self.writer.write_all(value)?;
        self.hasher.update(value);
        self.position += value.len() as u64;
        Ok(())
    }

    /// Write a u32 value (little-endian).
    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.write_raw(&value.to_le_bytes())
    }

    /// Write a u64 value (little-endian).
    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.write_raw(&value.to_le_bytes())
    }

    /// Write a slice of f32 values (little-endian) in one call.
    pub fn write_f32_slice(&mut self, values: &[f32]) -> Result<()> {
        let mut bytes = vec![0u8; values.len() * 4];
        LittleEndian::write_f32_into(values, &mut bytes);
        self.write_raw(&bytes)
    }

    /// Get current position.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Append the checksum and hand back the underlying writer.
    pub fn finish(mut self) -> Result<W> {
        let checksum = self.hasher.finalize();
        self.writer.write_all(&checksum.to_le_bytes())?;
        Ok(self.writer)
    }
}

/// A structured reader for binary data written by [`StructWriter`].
pub struct StructReader<R: Read> {
    reader: R,
    hasher: Hasher,
    position: u64,
    file_size: u64,
    name: String,
}

impl<R: Read> StructReader<R> {
    /// Create a new structured reader over a file of `file_size` bytes.
    pub fn new(reader: R, file_size: u64, name: impl Into<String>) -> Self {
        StructReader {
            reader,
            hasher: Hasher::new(),
            position: 0,
            file_size,
            name: name.into(),
        }
    }

    /// Bytes left before the checksum trailer.
    pub fn remaining(&self) -> u64 {
        self.file_size
            .saturating_sub(CHECKSUM_LEN)
            .saturating_sub(self.position)
    }

    /// Read exactly `buf.len()` bytes.
    pub fn read_raw(&mut self, buf: &mut [u8]) -> Result<()> {
        if buf.len() as u64 > self.remaining() {
            return Err(StorageError::Truncated(self.name.clone()).into());
        }
        self.reader
            .read_exact(buf)
            .map_err(|e| StorageError::from_io(&self.name, &e))?;
        self.hasher.update(buf);
        self.position += buf.len() as u64;
        Ok(())
    }

    /// Read a u32 value (little-endian).
    pub fn read_u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_raw(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    /// Read a u64 value (little-endian).
    pub fn read_u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read_raw(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    /// Read `count` f32 values (little-endian).
    pub fn read_f32_vec(&mut self, count: usize) -> Result<Vec<f32>> {
        let byte_len = count
            .checked_mul(4)
            .filter(|&len| len as u64 <= self.remaining())
            .ok_or_else(|| StorageError::Truncated(self.name.clone()))?;
        let mut bytes = vec![0u8; byte_len];
        self.read_raw(&mut bytes)?;
        let mut values = vec![0.0f32; count];
        LittleEndian::read_f32_into(&bytes, &mut values);
        Ok(values)
    }

    /// Get current position.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Read the checksum trailer, compare it and make sure nothing follows it.
    pub fn verify_checksum(mut self) -> Result<()> {
        if self.position + CHECKSUM_LEN != self.file_size {
            return Err(PageSiftError::storage(format!(
                "{}: expected checksum at offset {}, file is {} bytes",
                self.name, self.position, self.file_size
            )));
        }

        let mut buf = [0u8; 4];
        self.reader
            .read_exact(&mut buf)
            .map_err(|e| StorageError::from_io(&self.name, &e))?;
        let stored = u32::from_le_bytes(buf);

        if stored != self.hasher.finalize() {
            return Err(StorageError::ChecksumMismatch(self.name).into());
        }
        Ok(())
    }
}
