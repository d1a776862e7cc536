//! CIFAR-10 binary distribution reader.
//!
//! The binary version ships as `data_batch_1.bin` .. `data_batch_5.bin` and
//! `test_batch.bin`. Every record is one label byte followed by a 32x32 image
//! stored as 1024 red, 1024 green and 1024 blue bytes.

use std::fs;
use std::path::{Path, PathBuf};

use fedvision_core::{DataSplit, Error, Result};
use image::{Rgb, RgbImage};
use tracing::info;

use crate::source::{check_index, DatasetSource};

pub const CIFAR10_SIDE: u32 = 32;
pub const CIFAR10_CLASSES: usize = 10;
const PIXELS: usize = (CIFAR10_SIDE * CIFAR10_SIDE) as usize;
pub const CIFAR10_RECORD_LEN: usize = 1 + 3 * PIXELS;

const ARCHIVE_DIR: &str = "cifar-10-batches-bin";
const TRAIN_FILES: [&str; 5] = [
    "data_batch_1.bin",
    "data_batch_2.bin",
    "data_batch_3.bin",
    "data_batch_4.bin",
    "data_batch_5.bin",
];
const TEST_FILES: [&str; 1] = ["test_batch.bin"];

/// One split of CIFAR-10 held in memory as raw records
#[derive(Clone)]
pub struct Cifar10Source {
    records: Vec<u8>,
    len: usize,
}

impl std::fmt::Debug for Cifar10Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cifar10Source").field("len", &self.len).finish()
    }
}

impl Cifar10Source {
    /// Loads a split from `data_dir` (or `data_dir/cifar-10-batches-bin`)
    pub fn load(data_dir: &Path, split: DataSplit) -> Result<Self> {
        let dir = resolve_dir(data_dir);
        let files: &[&str] = match split {
            DataSplit::Train => &TRAIN_FILES,
            DataSplit::Test => &TEST_FILES,
        };

        let mut records = Vec::new();
        for name in files {
            let path = dir.join(name);
            if !path.exists() {
                return Err(Error::NotFound(format!(
                    "CIFAR-10 batch file not found: {}",
                    path.display()
                )));
            }
            records.extend(fs::read(&path)?);
        }

        let source = Self::from_records(records)?;
        info!(
            "Loaded CIFAR-10 {} split: {} samples from {}",
            split,
            source.len,
            dir.display()
        );
        Ok(source)
    }

    /// Wraps concatenated binary records
    pub fn from_records(records: Vec<u8>) -> Result<Self> {
        if records.len() % CIFAR10_RECORD_LEN != 0 {
            return Err(Error::Dataset(format!(
                "CIFAR-10 data length {} is not a multiple of the record size {}",
                records.len(),
                CIFAR10_RECORD_LEN
            )));
        }

        let len = records.len() / CIFAR10_RECORD_LEN;
        if let Some(bad) = records
            .chunks_exact(CIFAR10_RECORD_LEN)
            .position(|record| record[0] as usize >= CIFAR10_CLASSES)
        {
            return Err(Error::Dataset(format!(
                "CIFAR-10 record {bad} has label {} (expected < {CIFAR10_CLASSES})",
                records[bad * CIFAR10_RECORD_LEN]
            )));
        }

        Ok(Self { records, len })
    }

    fn record(&self, index: usize) -> &[u8] {
        let start = index * CIFAR10_RECORD_LEN;
        &self.records[start..start + CIFAR10_RECORD_LEN]
    }
}

fn resolve_dir(data_dir: &Path) -> PathBuf {
    let nested = data_dir.join(ARCHIVE_DIR);
    if nested.is_dir() {
        nested
    } else {
        data_dir.to_path_buf()
    }
}

impl DatasetSource for Cifar10Source {
    fn len(&self) -> usize {
        self.len
    }

    fn label(&self, index: usize) -> Result<usize> {
        check_index(index, self.len)?;
        Ok(self.record(index)[0] as usize)
    }

    fn image(&self, index: usize) -> Result<RgbImage> {
        check_index(index, self.len)?;
        let planes = &self.record(index)[1..];
        let (red, rest) = planes.split_at(PIXELS);
        let (green, blue) = rest.split_at(PIXELS);

        Ok(RgbImage::from_fn(CIFAR10_SIDE, CIFAR10_SIDE, |x, y| {
            let i = (y * CIFAR10_SIDE + x) as usize;
            Rgb([red[i], green[i], blue[i]])
        }))
    }
}
