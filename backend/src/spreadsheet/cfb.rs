//! Streams of an OLE compound file, the container of `.xls` workbooks.
//!
//! ```text
//! ┌──────────┬──────────┬──────────┬─────┐
//! │  header  │ sector 0 │ sector 1 │ ... │
//! └──────────┴──────────┴──────────┴─────┘
//! ```
//!
//! The FAT chains sectors into streams and the directory maps stream names
//! to their first sector. Streams shorter than 4096 bytes live inside the
//! mini stream instead, in 64-byte sectors chained by the mini FAT.
//!
//! Every offset comes from the file itself, so lookups are bounds checked
//! and chains stop with an error once they visit more sectors than exist.

use crate::error::{SheetError, SheetResult};

const SIGNATURE: u64 = 0xE11A_B1A1_E011_CFD0;
const HEADER_DIFAT_ENTRIES: usize = 109;
/// Larger sector ids are markers (end of chain, free, FAT).
const MAX_REGULAR_SECTOR: u32 = 0xFFFF_FFFA;
const DIRECTORY_ENTRY_SIZE: usize = 128;
const MINI_STREAM_CUTOFF: u64 = 4096;
const MINI_SECTOR_SIZE: usize = 64;

const ENTRY_STREAM: u8 = 2;
const ENTRY_ROOT: u8 = 5;

#[derive(Debug, Clone)]
struct DirectoryEntry {
    name: String,
    kind: u8,
    start: u32,
    size: u64,
}

/// A parsed compound file borrowing the raw bytes.
pub(crate) struct CompoundFile<'a> {
    data: &'a [u8],
    sector_size: usize,
    fat: Vec<u32>,
    mini_fat: Vec<u32>,
    mini_stream: Vec<u8>,
    entries: Vec<DirectoryEntry>,
}

fn invalid(message: impl Into<String>) -> SheetError {
    SheetError::Xls(message.into())
}

fn read_u16(data: &[u8], offset: usize) -> Option<u16> {
    let bytes = data.get(offset..offset.checked_add(2)?)?;
    Some(u16::from_le_bytes(bytes.try_into().ok()?))
}

fn read_u32(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset.checked_add(4)?)?;
    Some(u32::from_le_bytes(bytes.try_into().ok()?))
}

fn read_u64(data: &[u8], offset: usize) -> Option<u64> {
    let bytes = data.get(offset..offset.checked_add(8)?)?;
    Some(u64::from_le_bytes(bytes.try_into().ok()?))
}

fn sector_ids(bytes: &[u8]) -> impl Iterator<Item = u32> + '_ {
    bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
}

impl<'a> CompoundFile<'a> {
    pub(crate) fn open(data: &'a [u8]) -> SheetResult<Self> {
        if read_u64(data, 0) != Some(SIGNATURE) {
            return Err(invalid("not an OLE compound file"));
        }
        let header = |offset: usize| read_u32(data, offset).ok_or_else(|| invalid("truncated header"));

        let sector_size = match read_u16(data, 30) {
            Some(9) => 512,
            Some(12) => 4096,
            _ => return Err(invalid("unsupported sector size")),
        };
        let fat_sectors = header(44)? as usize;
        let directory_start = header(48)?;
        let mini_fat_start = header(60)?;
        let mut difat_sector = header(68)?;

        let mut file = CompoundFile {
            data,
            sector_size,
            fat: Vec::new(),
            mini_fat: Vec::new(),
            mini_stream: Vec::new(),
            entries: Vec::new(),
        };

        let mut difat = (0..HEADER_DIFAT_ENTRIES)
            .map(|i| header(76 + i * 4))
            .collect::<SheetResult<Vec<u32>>>()?;
        let mut budget = file.sector_count();
        while difat_sector <= MAX_REGULAR_SECTOR && difat.len() < fat_sectors {
            budget = budget.checked_sub(1).ok_or_else(|| invalid("DIFAT chain loops"))?;
            let sector = file.sector(difat_sector)?;
            if sector.len() < 4 {
                return Err(invalid("truncated DIFAT sector"));
            }
            let (ids, next) = sector.split_at(sector.len() - 4);
            difat.extend(sector_ids(ids));
            difat_sector = sector_ids(next).next().unwrap_or(u32::MAX);
        }

        for &id in difat.iter().take(fat_sectors) {
            if id > MAX_REGULAR_SECTOR {
                break;
            }
            let sector = file.sector(id)?;
            file.fat.extend(sector_ids(sector));
        }

        let directory = file.regular_chain(directory_start)?;
        file.entries = parse_directory(&directory, sector_size);

        file.mini_fat = sector_ids(&file.regular_chain(mini_fat_start)?).collect();
        if let Some(root) = file.entries.iter().find(|e| e.kind == ENTRY_ROOT).cloned() {
            let mut mini_stream = file.regular_chain(root.start)?;
            mini_stream.truncate(usize::try_from(root.size).unwrap_or(usize::MAX));
            file.mini_stream = mini_stream;
        }
        Ok(file)
    }

    /// Contents of the stream named `name` (ASCII case-insensitive).
    pub(crate) fn stream(&self, name: &str) -> SheetResult<Option<Vec<u8>>> {
        let Some(entry) = self
            .entries
            .iter()
            .find(|e| e.kind == ENTRY_STREAM && e.name.eq_ignore_ascii_case(name))
        else {
            return Ok(None);
        };
        let mut bytes = if entry.size < MINI_STREAM_CUTOFF {
            self.mini_chain(entry.start)?
        } else {
            self.regular_chain(entry.start)?
        };
        let size = usize::try_from(entry.size).map_err(|_| invalid("stream size overflows"))?;
        if bytes.len() < size {
            return Err(invalid(format!("stream {} is truncated", entry.name)));
        }
        bytes.truncate(size);
        Ok(Some(bytes))
    }

    fn sector_count(&self) -> usize {
        (self.data.len() / self.sector_size).saturating_sub(1)
    }

    fn sector(&self, id: u32) -> SheetResult<&'a [u8]> {
        let start = (id as usize)
            .checked_add(1)
            .and_then(|n| n.checked_mul(self.sector_size))
            .ok_or_else(|| invalid("sector id overflows"))?;
        let end = start.saturating_add(self.sector_size).min(self.data.len());
        self.data
            .get(start..end)
            .filter(|sector| !sector.is_empty())
            .ok_or_else(|| invalid(format!("sector {} is outside the file", id)))
    }

    fn regular_chain(&self, start: u32) -> SheetResult<Vec<u8>> {
        let mut bytes = Vec::new();
        let mut id = start;
        let mut budget = self.fat.len();
        while id <= MAX_REGULAR_SECTOR {
            budget = budget.checked_sub(1).ok_or_else(|| invalid("sector chain loops"))?;
            bytes.extend_from_slice(self.sector(id)?);
            id = *self
                .fat
                .get(id as usize)
                .ok_or_else(|| invalid(format!("sector {} is outside the FAT", id)))?;
        }
        Ok(bytes)
    }

    fn mini_chain(&self, start: u32) -> SheetResult<Vec<u8>> {
        let mut bytes = Vec::new();
        let mut id = start;
        let mut budget = self.mini_fat.len();
        while id <= MAX_REGULAR_SECTOR {
            budget = budget.checked_sub(1).ok_or_else(|| invalid("mini sector chain loops"))?;
            let begin = (id as usize).saturating_mul(MINI_SECTOR_SIZE);
            let end = begin.saturating_add(MINI_SECTOR_SIZE).min(self.mini_stream.len());
            let sector = self
                .mini_stream
                .get(begin..end)
                .filter(|sector| !sector.is_empty())
                .ok_or_else(|| invalid(format!("mini sector {} is outside the mini stream", id)))?;
            bytes.extend_from_slice(sector);
            id = *self
                .mini_fat
                .get(id as usize)
                .ok_or_else(|| invalid(format!("mini sector {} is outside the mini FAT", id)))?;
        }
        Ok(bytes)
    }
}

fn parse_directory(bytes: &[u8], sector_size: usize) -> Vec<DirectoryEntry> {
    bytes
        .chunks_exact(DIRECTORY_ENTRY_SIZE)
        .map(|entry| {
            let name_len = usize::from(u16::from_le_bytes([entry[64], entry[65]])).min(64);
            let units: Vec<u16> = entry[..name_len]
                .chunks_exact(2)
                .map(|unit| u16::from_le_bytes([unit[0], unit[1]]))
                .take_while(|&unit| unit != 0)
                .collect();
            let mut size = read_u64(entry, 120).unwrap_or(0);
            // Version 3 files leave the high half undefined.
            if sector_size == 512 {
                size &= 0xFFFF_FFFF;
            }
            DirectoryEntry {
                name: String::from_utf16_lossy(&units),
                kind: entry[66],
                start: read_u32(entry, 116).unwrap_or(u32::MAX),
                size,
            }
        })
        .collect()
}
