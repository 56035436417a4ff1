//! Disk device driver: a filesystem over the track/sector/block store.
//!
//! Track 0 is the directory; tracks 1.. hold file data as chains of blocks
//! linked through their headers. A header is either unlinked, a pointer to
//! the next block, or the chain terminator. Record 0:0:0 is the master boot
//! record and never participates in allocation.
//!
//! Successor searches are forward-only in TSB order and preferentially
//! adjacent: they start right after the current block and climb through the
//! tracks without ever wrapping back into the directory.

use crate::{CoreError, Result};
use std::fmt;

pub const TRACKS: u8 = 4;
pub const SECTORS: u8 = 8;
pub const BLOCKS: u8 = 8;
pub const BLOCK_DATA_LEN: usize = 60;

/// Filenames and file data pad with ASCII '0', not NUL.
const PAD_BYTE: u8 = b'0';

const RECORD_COUNT: usize = TRACKS as usize * SECTORS as usize * BLOCKS as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tsb {
    pub track: u8,
    pub sector: u8,
    pub block: u8,
}

impl Tsb {
    pub const MBR: Tsb = Tsb { track: 0, sector: 0, block: 0 };

    pub fn new(track: u8, sector: u8, block: u8) -> Self {
        debug_assert!(track < TRACKS && sector < SECTORS && block < BLOCKS);
        Self { track, sector, block }
    }

    fn index(self) -> usize {
        (self.track as usize * SECTORS as usize + self.sector as usize) * BLOCKS as usize
            + self.block as usize
    }

    fn from_index(index: usize) -> Self {
        let block = (index % BLOCKS as usize) as u8;
        let sector = ((index / BLOCKS as usize) % SECTORS as usize) as u8;
        let track = (index / (BLOCKS as usize * SECTORS as usize)) as u8;
        Self { track, sector, block }
    }

    /// Lexicographic successor, `None` past the last block of the last track.
    pub fn next(self) -> Option<Tsb> {
        let index = self.index() + 1;
        if index >= RECORD_COUNT {
            None
        } else {
            Some(Tsb::from_index(index))
        }
    }

    pub fn all() -> impl Iterator<Item = Tsb> {
        (0..RECORD_COUNT).map(Tsb::from_index)
    }

    pub fn directory() -> impl Iterator<Item = Tsb> {
        Tsb::all().take_while(|tsb| tsb.track == 0)
    }
}

impl fmt::Display for Tsb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.track, self.sector, self.block)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockHeader {
    /// Not part of any chain.
    Unlinked,
    Next(Tsb),
    /// Chain terminator.
    End,
}

impl BlockHeader {
    /// Three-digit external form: `000`, `999`, or the pointed-at TSB.
    pub fn encode(self) -> String {
        match self {
            BlockHeader::Unlinked => "000".to_string(),
            BlockHeader::End => "999".to_string(),
            BlockHeader::Next(tsb) => format!("{}{}{}", tsb.track, tsb.sector, tsb.block),
        }
    }

    pub fn decode(text: &str) -> Result<Self> {
        match text {
            "000" => return Ok(BlockHeader::Unlinked),
            "999" => return Ok(BlockHeader::End),
            _ => {}
        }
        let digits: Vec<u8> = text
            .chars()
            .map(|c| c.to_digit(10).map(|d| d as u8))
            .collect::<Option<_>>()
            .ok_or_else(|| CoreError::InvalidImage(format!("bad block header {text:?}")))?;
        match digits.as_slice() {
            [t, s, b] if *t > 0 && *t < TRACKS && *s < SECTORS && *b < BLOCKS => {
                Ok(BlockHeader::Next(Tsb::new(*t, *s, *b)))
            }
            _ => Err(CoreError::InvalidImage(format!("bad block header {text:?}"))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BlockRecord {
    pub active: bool,
    pub header: BlockHeader,
    pub data: [u8; BLOCK_DATA_LEN],
}

impl Default for BlockRecord {
    fn default() -> Self {
        Self { active: false, header: BlockHeader::Unlinked, data: [0; BLOCK_DATA_LEN] }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskStats {
    pub directory_used: usize,
    pub directory_free: usize,
    pub data_used: usize,
    pub data_free: usize,
}

pub struct DiskDriver {
    formatted: bool,
    rename_collision_check: bool,
    records: Vec<BlockRecord>,
}

impl Default for DiskDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl DiskDriver {
    pub fn new() -> Self {
        Self {
            formatted: false,
            rename_collision_check: true,
            records: vec![BlockRecord::default(); RECORD_COUNT],
        }
    }

    /// Disable the rename collision check to match systems that allow
    /// renaming onto an existing name.
    pub fn set_rename_collision_check(&mut self, enabled: bool) {
        self.rename_collision_check = enabled;
    }

    pub fn is_formatted(&self) -> bool {
        self.formatted
    }

    pub fn record(&self, tsb: Tsb) -> &BlockRecord {
        &self.records[tsb.index()]
    }

    fn record_mut(&mut self, tsb: Tsb) -> &mut BlockRecord {
        &mut self.records[tsb.index()]
    }

    pub(crate) fn records(&self) -> &[BlockRecord] {
        &self.records
    }

    pub(crate) fn from_parts(formatted: bool, records: Vec<BlockRecord>) -> Result<Self> {
        if records.len() != RECORD_COUNT {
            return Err(CoreError::InvalidImage(format!(
                "expected {RECORD_COUNT} records, got {}",
                records.len()
            )));
        }
        Ok(Self { formatted, rename_collision_check: true, records })
    }

    fn ensure_formatted(&self) -> Result<()> {
        if self.formatted {
            Ok(())
        } else {
            Err(CoreError::NotFormatted)
        }
    }

    /// Zero every record, re-establish the MBR, and mark the disk formatted.
    pub fn format(&mut self) {
        for record in &mut self.records {
            *record = BlockRecord::default();
        }
        let mbr = self.record_mut(Tsb::MBR);
        mbr.active = true;
        self.formatted = true;
        log::debug!("disk formatted ({TRACKS} tracks, {SECTORS} sectors, {BLOCKS} blocks)");
    }

    /// Reset flags and headers but keep every data field, so deleted content
    /// stays recoverable.
    pub fn format_quick(&mut self) -> Result<()> {
        self.ensure_formatted()?;
        for record in &mut self.records {
            record.active = false;
            record.header = BlockHeader::Unlinked;
        }
        self.record_mut(Tsb::MBR).active = true;
        Ok(())
    }

    fn pad_name(name: &str) -> Result<[u8; BLOCK_DATA_LEN]> {
        let bytes = name.as_bytes();
        if bytes.is_empty() || bytes.len() > BLOCK_DATA_LEN {
            return Err(CoreError::InvalidName { name: name.to_string() });
        }
        let mut padded = [PAD_BYTE; BLOCK_DATA_LEN];
        padded[..bytes.len()].copy_from_slice(bytes);
        Ok(padded)
    }

    /// Strip the trailing '0' padding (and the zeroed fill of blocks that
    /// were never written).
    fn decode_padded(bytes: &[u8]) -> String {
        let end = bytes
            .iter()
            .rposition(|b| *b != PAD_BYTE && *b != 0)
            .map_or(0, |p| p + 1);
        String::from_utf8_lossy(&bytes[..end]).into_owned()
    }

    fn find_entry(&self, padded: &[u8; BLOCK_DATA_LEN]) -> Option<Tsb> {
        Tsb::directory().find(|tsb| {
            let record = self.record(*tsb);
            record.active && record.data == *padded
        })
    }

    fn first_free_directory_entry(&self) -> Option<Tsb> {
        Tsb::directory().find(|tsb| !self.record(*tsb).active)
    }

    /// First inactive data block at or after `start` (TSB order, tracks 1..).
    fn next_free_data_block(&self, after: Option<Tsb>) -> Option<Tsb> {
        let mut cursor = match after {
            None => Some(Tsb::new(1, 0, 0)),
            Some(tsb) => tsb.next(),
        };
        while let Some(tsb) = cursor {
            if tsb.track > 0 && !self.record(tsb).active {
                return Some(tsb);
            }
            cursor = tsb.next();
        }
        None
    }

    fn first_block_of(&self, entry: Tsb) -> Result<Tsb> {
        match self.record(entry).header {
            BlockHeader::Next(tsb) => Ok(tsb),
            other => Err(CoreError::CorruptChain(format!(
                "directory entry {entry} has header {}",
                other.encode()
            ))),
        }
    }

    pub fn create(&mut self, name: &str) -> Result<()> {
        self.ensure_formatted()?;
        let padded = Self::pad_name(name)?;
        if self.find_entry(&padded).is_some() {
            return Err(CoreError::NameInUse { name: name.to_string() });
        }
        let first = self.next_free_data_block(None).ok_or(CoreError::NoSpace)?;
        let entry = self.first_free_directory_entry().ok_or(CoreError::NoSpace)?;

        let record = self.record_mut(entry);
        record.active = true;
        record.header = BlockHeader::Next(first);
        record.data = padded;

        let block = self.record_mut(first);
        block.active = true;
        block.header = BlockHeader::End;

        log::debug!("create {name:?}: entry {entry}, first block {first}");
        Ok(())
    }

    /// Raw file contents: every chained block's data field, in order.
    pub fn read(&self, name: &str) -> Result<Vec<u8>> {
        self.ensure_formatted()?;
        let padded = Self::pad_name(name)?;
        let entry = self
            .find_entry(&padded)
            .ok_or_else(|| CoreError::NotFound { name: name.to_string() })?;
        let mut out = Vec::new();
        let mut cursor = self.first_block_of(entry)?;
        for _ in 0..RECORD_COUNT {
            let record = self.record(cursor);
            out.extend_from_slice(&record.data);
            match record.header {
                BlockHeader::End => return Ok(out),
                BlockHeader::Next(next) => cursor = next,
                BlockHeader::Unlinked => {
                    return Err(CoreError::CorruptChain(format!("block {cursor} is unlinked")))
                }
            }
        }
        Err(CoreError::CorruptChain(format!("no terminator reachable from {name:?}")))
    }

    /// File contents as text, with the trailing '0' padding trimmed.
    pub fn read_string(&self, name: &str) -> Result<String> {
        Ok(Self::decode_padded(&self.read(name)?))
    }

    pub fn write(&mut self, name: &str, data: &[u8]) -> Result<()> {
        self.ensure_formatted()?;
        let padded = Self::pad_name(name)?;
        let entry = self
            .find_entry(&padded)
            .ok_or_else(|| CoreError::NotFound { name: name.to_string() })?;

        let chunk_count = (data.len().max(1)).div_ceil(BLOCK_DATA_LEN);
        let mut cursor = self.first_block_of(entry)?;
        for chunk_index in 0..chunk_count {
            let previous = self.record(cursor).header;
            let start = chunk_index * BLOCK_DATA_LEN;
            let chunk = &data[start.min(data.len())..(start + BLOCK_DATA_LEN).min(data.len())];

            let record = self.record_mut(cursor);
            record.active = true;
            record.data = [PAD_BYTE; BLOCK_DATA_LEN];
            record.data[..chunk.len()].copy_from_slice(chunk);

            if chunk_index + 1 == chunk_count {
                // Shrinking rewrite: release whatever the old chain still held.
                if let BlockHeader::Next(tail) = previous {
                    self.release_chain(tail);
                }
                self.record_mut(cursor).header = BlockHeader::End;
            } else {
                // Walk the old chain while it lasts, extend past its end.
                let next = match previous {
                    BlockHeader::Next(tsb) => tsb,
                    _ => match self.next_free_data_block(Some(cursor)) {
                        Some(tsb) => tsb,
                        None => {
                            // Keep the chain terminated even when truncated.
                            self.record_mut(cursor).header = BlockHeader::End;
                            return Err(CoreError::NoSpace);
                        }
                    },
                };
                self.record_mut(cursor).header = BlockHeader::Next(next);
                cursor = next;
            }
        }
        Ok(())
    }

    /// Deactivate a chain without touching data or headers, so a quick
    /// format can still be followed by recovery.
    fn release_chain(&mut self, start: Tsb) {
        let mut cursor = start;
        for _ in 0..RECORD_COUNT {
            let record = self.record_mut(cursor);
            if !record.active {
                return;
            }
            record.active = false;
            match record.header {
                BlockHeader::Next(next) => cursor = next,
                _ => return,
            }
        }
        log::warn!("chain starting at {start} exceeded the record count while releasing");
    }

    pub fn delete(&mut self, name: &str) -> Result<()> {
        self.ensure_formatted()?;
        let padded = Self::pad_name(name)?;
        let entry = self
            .find_entry(&padded)
            .ok_or_else(|| CoreError::NotFound { name: name.to_string() })?;
        let first = self.first_block_of(entry)?;
        self.record_mut(entry).active = false;
        self.release_chain(first);
        Ok(())
    }

    pub fn copy(&mut self, existing: &str, new: &str) -> Result<()> {
        let contents = self.read(existing)?;
        self.create(new)?;
        self.write(new, &contents)
    }

    pub fn rename(&mut self, old: &str, new: &str) -> Result<()> {
        self.ensure_formatted()?;
        let old_padded = Self::pad_name(old)?;
        let new_padded = Self::pad_name(new)?;
        let entry = self
            .find_entry(&old_padded)
            .ok_or_else(|| CoreError::NotFound { name: old.to_string() })?;
        if self.rename_collision_check {
            if let Some(other) = self.find_entry(&new_padded) {
                if other != entry {
                    return Err(CoreError::NameInUse { name: new.to_string() });
                }
            }
        }
        self.record_mut(entry).data = new_padded;
        Ok(())
    }

    /// Active directory entries in TSB order. Hidden files (leading `.`)
    /// only show up when `show_hidden` is set.
    pub fn ls(&self, show_hidden: bool) -> Result<Vec<String>> {
        self.ensure_formatted()?;
        let mut names = Vec::new();
        for tsb in Tsb::directory() {
            if tsb == Tsb::MBR {
                continue;
            }
            let record = self.record(tsb);
            if !record.active {
                continue;
            }
            let name = Self::decode_padded(&record.data);
            if name.is_empty() || (!show_hidden && name.starts_with('.')) {
                continue;
            }
            names.push(name);
        }
        Ok(names)
    }

    pub fn stats(&self) -> DiskStats {
        let mut stats =
            DiskStats { directory_used: 0, directory_free: 0, data_used: 0, data_free: 0 };
        for tsb in Tsb::all() {
            if tsb == Tsb::MBR {
                continue;
            }
            let active = self.record(tsb).active;
            if tsb.track == 0 {
                if active {
                    stats.directory_used += 1;
                } else {
                    stats.directory_free += 1;
                }
            } else if active {
                stats.data_used += 1;
            } else {
                stats.data_free += 1;
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tsb_order_is_lexicographic() {
        let mut cursor = Some(Tsb::MBR);
        let mut count = 0;
        let mut last = Tsb::MBR;
        while let Some(tsb) = cursor {
            assert!(count == 0 || last < tsb);
            last = tsb;
            count += 1;
            cursor = tsb.next();
        }
        assert_eq!(count, RECORD_COUNT);
        assert_eq!(last, Tsb::new(TRACKS - 1, SECTORS - 1, BLOCKS - 1));
    }

    #[test]
    fn header_encoding_round_trips() {
        for header in
            [BlockHeader::Unlinked, BlockHeader::End, BlockHeader::Next(Tsb::new(2, 7, 3))]
        {
            assert_eq!(BlockHeader::decode(&header.encode()).unwrap(), header);
        }
        assert!(BlockHeader::decode("007").is_err());
        assert!(BlockHeader::decode("abc").is_err());
    }

    #[test]
    fn operations_fail_before_format() {
        let mut disk = DiskDriver::new();
        assert!(matches!(disk.create("foo"), Err(CoreError::NotFormatted)));
        assert!(matches!(disk.ls(false), Err(CoreError::NotFormatted)));
        assert!(matches!(disk.format_quick(), Err(CoreError::NotFormatted)));
    }

    #[test]
    fn format_establishes_the_mbr_and_is_idempotent() {
        let mut disk = DiskDriver::new();
        disk.format();
        disk.create("foo").unwrap();
        disk.format();
        let mbr = disk.record(Tsb::MBR);
        assert!(mbr.active);
        assert_eq!(mbr.header, BlockHeader::Unlinked);
        assert!(mbr.data.iter().all(|b| *b == 0));
        assert_eq!(disk.ls(true).unwrap(), Vec::<String>::new());
    }

    #[test]
    fn create_links_the_first_adjacent_data_block() {
        let mut disk = DiskDriver::new();
        disk.format();
        disk.create("foo").unwrap();
        disk.create("bar").unwrap();
        let foo_entry = disk.record(Tsb::new(0, 0, 1));
        let bar_entry = disk.record(Tsb::new(0, 0, 2));
        assert_eq!(foo_entry.header, BlockHeader::Next(Tsb::new(1, 0, 0)));
        assert_eq!(bar_entry.header, BlockHeader::Next(Tsb::new(1, 0, 1)));
    }

    #[test]
    fn shrinking_rewrite_releases_the_old_tail() {
        let mut disk = DiskDriver::new();
        disk.format();
        disk.create("foo").unwrap();
        let long = vec![0x41; BLOCK_DATA_LEN * 3];
        disk.write("foo", &long).unwrap();
        assert_eq!(disk.stats().data_used, 3);
        disk.write("foo", b"tiny").unwrap();
        assert_eq!(disk.stats().data_used, 1);
        assert_eq!(disk.read_string("foo").unwrap(), "tiny");
    }

    #[test]
    fn growing_rewrite_walks_the_existing_chain_first() {
        let mut disk = DiskDriver::new();
        disk.format();
        disk.create("foo").unwrap();
        disk.create("bar").unwrap();
        let two = vec![0x42; BLOCK_DATA_LEN * 2];
        disk.write("foo", &two).unwrap();
        let used_before = disk.stats().data_used;
        let four = vec![0x43; BLOCK_DATA_LEN * 4];
        disk.write("foo", &four).unwrap();
        // foo grew by two blocks; bar's single block is untouched.
        assert_eq!(disk.stats().data_used, used_before + 2);
        assert_eq!(disk.read("foo").unwrap(), four);
        assert_eq!(disk.read("bar").unwrap().len(), BLOCK_DATA_LEN);
    }

    #[test]
    fn quick_format_preserves_data_for_recovery() {
        let mut disk = DiskDriver::new();
        disk.format();
        disk.create("foo").unwrap();
        disk.write("foo", b"evidence").unwrap();
        disk.format_quick().unwrap();
        assert_eq!(disk.ls(true).unwrap(), Vec::<String>::new());
        let block = disk.record(Tsb::new(1, 0, 0));
        assert!(!block.active);
        assert_eq!(&block.data[..8], b"evidence");
    }

    #[test]
    fn rename_checks_collisions_but_allows_identity() {
        let mut disk = DiskDriver::new();
        disk.format();
        disk.create("foo").unwrap();
        disk.create("bar").unwrap();
        assert!(matches!(disk.rename("foo", "bar"), Err(CoreError::NameInUse { .. })));
        disk.rename("foo", "foo").unwrap();
        disk.rename("foo", "baz").unwrap();
        // The renamed entry keeps its directory slot, so it still lists first.
        assert_eq!(disk.ls(false).unwrap(), vec!["baz".to_string(), "bar".to_string()]);
    }

    #[test]
    fn rename_clobbers_when_the_collision_check_is_off() {
        let mut disk = DiskDriver::new();
        disk.format();
        disk.set_rename_collision_check(false);
        disk.create("foo").unwrap();
        disk.create("bar").unwrap();
        disk.rename("foo", "bar").unwrap();
        assert_eq!(disk.ls(false).unwrap(), vec!["bar".to_string(), "bar".to_string()]);
    }

    #[test]
    fn directory_fills_up_to_no_space() {
        let mut disk = DiskDriver::new();
        disk.format();
        // 63 usable directory entries (track 0 minus the MBR). Letter pairs
        // keep the names distinct under the '0' padding.
        for i in 0..63u8 {
            let name = format!("{}{}", (b'a' + i / 26) as char, (b'a' + i % 26) as char);
            disk.create(&name).unwrap();
        }
        assert!(matches!(disk.create("overflow"), Err(CoreError::NoSpace)));
    }
}
