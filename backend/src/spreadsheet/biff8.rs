//! BIFF8 record stream reader.
//!
//! A record is a `u16` type, a `u16` length and a body. Bodies longer than
//! 8224 bytes spill into `CONTINUE` records, which are read here as chunks
//! of the preceding record. A string cut by a chunk boundary resumes in the
//! next chunk after a fresh option byte that restates its character width.

use std::ops::Range;

use crate::error::{SheetError, SheetResult};

const CONTINUE: u16 = 0x003C;

/// Cursor over the records of one workbook stream.
pub(crate) struct RecordReader<'a> {
    data: &'a [u8],
    pointer: usize,
    chunks: Vec<Range<usize>>,
    chunk: usize,
    offset: usize,
}

fn truncated(needed: usize) -> SheetError {
    SheetError::Xls(format!("record truncated, {} more bytes expected", needed))
}

impl<'a> RecordReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pointer: 0,
            chunks: Vec::new(),
            chunk: 0,
            offset: 0,
        }
    }

    /// Continue reading at absolute stream position `pointer`.
    pub(crate) fn goto(&mut self, pointer: usize) {
        self.pointer = pointer;
        self.chunks.clear();
    }

    fn header_at(&self, pointer: usize) -> Option<(u16, usize)> {
        let bytes = self.data.get(pointer..pointer.checked_add(4)?)?;
        let kind = u16::from_le_bytes([bytes[0], bytes[1]]);
        let size = u16::from_le_bytes([bytes[2], bytes[3]]);
        Some((kind, usize::from(size)))
    }

    /// Type of the record after the current one, without moving.
    pub(crate) fn peek(&self) -> Option<u16> {
        self.header_at(self.pointer).map(|(kind, _)| kind)
    }

    /// Move to the next record and return its type, or `None` at the end
    /// of the stream.
    pub(crate) fn next(&mut self) -> SheetResult<Option<u16>> {
        let Some((kind, size)) = self.header_at(self.pointer) else {
            return Ok(None);
        };
        self.chunks.clear();
        self.chunk = 0;
        self.offset = 0;
        self.pointer = self.push_chunk(self.pointer, size)?;
        while let Some((CONTINUE, size)) = self.header_at(self.pointer) {
            self.pointer = self.push_chunk(self.pointer, size)?;
        }
        Ok(Some(kind))
    }

    fn push_chunk(&mut self, pointer: usize, size: usize) -> SheetResult<usize> {
        let start = pointer + 4;
        let end = start + size;
        if end > self.data.len() {
            return Err(truncated(end - self.data.len()));
        }
        self.chunks.push(start..end);
        Ok(end)
    }

    /// Up to `length` bytes from the current chunk.
    fn take(&mut self, length: usize) -> &'a [u8] {
        let Some(chunk) = self.chunks.get(self.chunk) else {
            return &[];
        };
        if length == 0 {
            return &[];
        }
        let start = chunk.start + self.offset;
        let end = chunk.end.min(start.saturating_add(length));
        if end == chunk.end {
            self.chunk += 1;
            self.offset = 0;
        } else {
            self.offset += end - start;
        }
        &self.data[start..end]
    }

    fn read_exact(&mut self, length: usize) -> SheetResult<&'a [u8]> {
        let bytes = self.take(length);
        if bytes.len() == length {
            Ok(bytes)
        } else {
            Err(truncated(length - bytes.len()))
        }
    }

    pub(crate) fn read_array<const N: usize>(&mut self) -> SheetResult<[u8; N]> {
        let bytes = self.read_exact(N)?;
        bytes.try_into().map_err(|_| truncated(N))
    }

    pub(crate) fn read_u8(&mut self) -> SheetResult<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    pub(crate) fn read_u16(&mut self) -> SheetResult<u16> {
        self.read_array().map(u16::from_le_bytes)
    }

    pub(crate) fn read_u32(&mut self) -> SheetResult<u32> {
        self.read_array().map(u32::from_le_bytes)
    }

    pub(crate) fn read_f64(&mut self) -> SheetResult<f64> {
        self.read_array().map(f64::from_le_bytes)
    }

    /// Skip `length` bytes, crossing chunk boundaries.
    pub(crate) fn skip(&mut self, length: usize) -> SheetResult<()> {
        let mut remaining = length;
        while remaining > 0 {
            let skipped = self.take(remaining).len();
            if skipped == 0 {
                return Err(truncated(remaining));
            }
            remaining -= skipped;
        }
        Ok(())
    }

    /// The last two bytes of the current record.
    pub(crate) fn last_u16(&self) -> SheetResult<u16> {
        let chunk = self.chunks.last().ok_or_else(|| truncated(2))?;
        if chunk.len() < 2 {
            return Err(truncated(2));
        }
        let bytes = &self.data[chunk.end - 2..chunk.end];
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    /// `XLUnicodeString`: 16-bit character count, option byte, characters.
    pub(crate) fn read_unicode_string(&mut self) -> SheetResult<String> {
        let count = usize::from(self.read_u16()?);
        let options = self.read_u8()?;
        self.read_characters(count, options)
    }

    /// `ShortXLUnicodeString`: 8-bit character count, option byte, characters.
    pub(crate) fn read_short_unicode_string(&mut self) -> SheetResult<String> {
        let count = usize::from(self.read_u8()?);
        let options = self.read_u8()?;
        self.read_characters(count, options)
    }

    /// `XLUnicodeRichExtendedString` as stored in the shared string table.
    /// Formatting runs and phonetic data are skipped.
    pub(crate) fn read_rich_string(&mut self) -> SheetResult<String> {
        let count = usize::from(self.read_u16()?);
        let options = self.read_u8()?;
        let runs = if options & 0x08 != 0 { usize::from(self.read_u16()?) } else { 0 };
        let phonetic = if options & 0x04 != 0 { self.read_u32()? as usize } else { 0 };
        let text = self.read_characters(count, options)?;
        self.skip(runs * 4)?;
        self.skip(phonetic)?;
        Ok(text)
    }

    /// `count` characters, 1 byte each (Latin-1) unless bit 0 of `options`
    /// selects UTF-16LE.
    fn read_characters(&mut self, count: usize, options: u8) -> SheetResult<String> {
        let mut text = String::new();
        let mut wide = options & 0x01 != 0;
        let mut remaining = count;
        while remaining > 0 {
            let width = if wide { 2 } else { 1 };
            let bytes = self.take(remaining * width);
            if bytes.is_empty() && self.chunk >= self.chunks.len() {
                return Err(truncated(remaining * width));
            }
            if wide {
                let units: Vec<u16> = bytes
                    .chunks_exact(2)
                    .map(|unit| u16::from_le_bytes([unit[0], unit[1]]))
                    .collect();
                text.push_str(&String::from_utf16_lossy(&units));
                remaining -= units.len();
            } else {
                text.extend(bytes.iter().map(|&b| char::from(b)));
                remaining -= bytes.len();
            }
            if remaining > 0 {
                wide = self.read_u8()? & 0x01 != 0;
            }
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(kind: u16, body: &[u8]) -> Vec<u8> {
        let mut bytes = kind.to_le_bytes().to_vec();
        bytes.extend((body.len() as u16).to_le_bytes());
        bytes.extend(body);
        bytes
    }

    #[test]
    fn test_records_and_values() {
        let mut body = 7u16.to_le_bytes().to_vec();
        body.extend(1.5f64.to_le_bytes());
        let mut stream = record(0x0203, &body);
        stream.extend(record(0x000A, &[]));

        let mut reader = RecordReader::new(&stream);

        assert_eq!(reader.next().unwrap(), Some(0x0203));
        assert_eq!(reader.read_u16().unwrap(), 7);
        assert_eq!(reader.read_f64().unwrap(), 1.5);
        assert!(reader.read_u8().is_err());
        assert_eq!(reader.next().unwrap(), Some(0x000A));
        assert_eq!(reader.next().unwrap(), None);
    }

    #[test]
    fn test_string_continues_across_records() {
        // "Hello" split after "He"; the continuation switches to UTF-16.
        let mut head = 5u16.to_le_bytes().to_vec();
        head.push(0x00);
        head.extend(b"He");
        let mut tail = vec![0x01];
        for unit in "llo".encode_utf16() {
            tail.extend(unit.to_le_bytes());
        }
        let mut stream = record(0x0204, &head);
        stream.extend(record(CONTINUE, &tail));

        let mut reader = RecordReader::new(&stream);
        assert_eq!(reader.next().unwrap(), Some(0x0204));
        assert_eq!(reader.read_unicode_string().unwrap(), "Hello");
        assert_eq!(reader.next().unwrap(), None);
    }

    #[test]
    fn test_rich_string_skips_runs_and_phonetics() {
        let mut body = 2u16.to_le_bytes().to_vec();
        body.push(0x0C);
        body.extend(1u16.to_le_bytes());
        body.extend(3u32.to_le_bytes());
        body.extend(b"ab");
        body.extend([0u8; 4]);
        body.extend([9u8; 3]);
        body.extend(1u16.to_le_bytes());
        body.push(0x00);
        body.push(b'c');

        let stream = record(0x00FC, &body);
        let mut reader = RecordReader::new(&stream);
        reader.next().unwrap();

        assert_eq!(reader.read_rich_string().unwrap(), "ab");
        assert_eq!(reader.read_unicode_string().unwrap(), "c");
    }

    #[test]
    fn test_truncated_record_rejected() {
        let mut stream = record(0x0203, &[0u8; 8]);
        stream.truncate(6);

        let mut reader = RecordReader::new(&stream);
        assert!(matches!(reader.next(), Err(SheetError::Xls(_))));
    }

    #[test]
    fn test_last_u16() {
        let stream = record(0x00BD, &[1, 0, 2, 0, 9, 0]);
        let mut reader = RecordReader::new(&stream);
        reader.next().unwrap();

        assert_eq!(reader.last_u16().unwrap(), 9);
        assert_eq!(reader.peek(), None);
    }
}
