//! Disk-image persistence.
//!
//! The image is a single JSON document holding every record in its external
//! form: the active flag, the three-digit header, and the data field as 120
//! hex characters. Geometry and a magic/version pair are checked on load so
//! a stale or foreign image fails loudly instead of corrupting the store.

use crate::disk::{BlockHeader, BlockRecord, DiskDriver, BLOCKS, BLOCK_DATA_LEN, SECTORS, TRACKS};
use crate::{now_timestamp, CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

pub const IMAGE_MAGIC: &str = "minos.disk-image";
pub const IMAGE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
pub struct DiskImage {
    pub magic: String,
    pub version: u32,
    pub created: String,
    pub formatted: bool,
    pub tracks: u8,
    pub sectors: u8,
    pub blocks: u8,
    pub block_data_len: usize,
    pub records: Vec<RecordImage>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecordImage {
    pub active: u8,
    pub header: String,
    pub data: String,
}

fn encode_data(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02X}")).collect()
}

fn decode_data(text: &str) -> Result<[u8; BLOCK_DATA_LEN]> {
    if text.len() != BLOCK_DATA_LEN * 2 || !text.is_ascii() {
        return Err(CoreError::InvalidImage(format!(
            "record data must be {} hex characters",
            BLOCK_DATA_LEN * 2
        )));
    }
    let mut data = [0u8; BLOCK_DATA_LEN];
    for (i, slot) in data.iter_mut().enumerate() {
        *slot = u8::from_str_radix(&text[i * 2..i * 2 + 2], 16)
            .map_err(|_| CoreError::InvalidImage(format!("bad hex in record data: {text:?}")))?;
    }
    Ok(data)
}

pub fn image_from(disk: &DiskDriver) -> DiskImage {
    DiskImage {
        magic: IMAGE_MAGIC.to_string(),
        version: IMAGE_VERSION,
        created: now_timestamp(),
        formatted: disk.is_formatted(),
        tracks: TRACKS,
        sectors: SECTORS,
        blocks: BLOCKS,
        block_data_len: BLOCK_DATA_LEN,
        records: disk
            .records()
            .iter()
            .map(|record| RecordImage {
                active: u8::from(record.active),
                header: record.header.encode(),
                data: encode_data(&record.data),
            })
            .collect(),
    }
}

pub fn apply(image: &DiskImage) -> Result<DiskDriver> {
    if image.magic != IMAGE_MAGIC {
        return Err(CoreError::InvalidImage(format!("unexpected magic {:?}", image.magic)));
    }
    if image.version != IMAGE_VERSION {
        return Err(CoreError::InvalidImage(format!("unsupported version {}", image.version)));
    }
    if (image.tracks, image.sectors, image.blocks, image.block_data_len)
        != (TRACKS, SECTORS, BLOCKS, BLOCK_DATA_LEN)
    {
        return Err(CoreError::InvalidImage(format!(
            "geometry {}x{}x{}x{} does not match this machine",
            image.tracks, image.sectors, image.blocks, image.block_data_len
        )));
    }
    let records = image
        .records
        .iter()
        .map(|record| {
            Ok(BlockRecord {
                active: record.active != 0,
                header: BlockHeader::decode(&record.header)?,
                data: decode_data(&record.data)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    DiskDriver::from_parts(image.formatted, records)
}

pub fn save_image(path: &Path, disk: &DiskDriver) -> Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer(BufWriter::new(file), &image_from(disk))?;
    log::debug!("disk image saved to {}", path.display());
    Ok(())
}

pub fn load_image(path: &Path) -> Result<DiskDriver> {
    let file = File::open(path)?;
    let image: DiskImage = serde_json::from_reader(BufReader::new(file))?;
    apply(&image)
}
