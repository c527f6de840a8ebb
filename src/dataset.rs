//! Loading the CIFAR-10 image dataset from its binary distribution.
//!
//! Each `.bin` file is a sequence of 3073-byte records: one label byte followed by the 32x32 image stored as three 1024-byte colour planes (red, green, blue), each row-major.
//! Images are converted to height-width-channel order on load, matching a `[32, 32, 3]` network input.

use std::{
    fmt,
    fs::File,
    io::{self, BufReader, Read},
    path::{Path, PathBuf},
};

use log::debug;
use rand::Rng;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use statrs::statistics::Statistics;
use strum::{Display, EnumString};

use crate::Sample;

/// CIFAR-10 class names, indexed by label
pub const CLASS_NAMES: [&str; 10] = [
    "airplane",
    "automobile",
    "bird",
    "cat",
    "deer",
    "dog",
    "frog",
    "horse",
    "ship",
    "truck",
];

/// height and width of every image
pub const IMAGE_SIDE: usize = 32;
/// colour channels per pixel
pub const CHANNELS: usize = 3;
/// bytes of pixel data per image
pub const IMAGE_BYTES: usize = IMAGE_SIDE * IMAGE_SIDE * CHANNELS;
const PLANE_BYTES: usize = IMAGE_SIDE * IMAGE_SIDE;
const RECORD_BYTES: usize = IMAGE_BYTES + 1;

/// The two halves of the dataset as distributed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Split {
    /// 50,000 images in five files
    Train,
    /// 10,000 images in one file
    Test,
}

impl Split {
    /// the names of the binary files making up this split, in load order
    pub fn file_names(&self) -> Vec<String> {
        match self {
            Split::Train => (1..=5).map(|i| format!("data_batch_{}.bin", i)).collect(),
            Split::Test => vec!["test_batch.bin".to_string()],
        }
    }
}

/// A single raw image, with pixels in height-width-channel order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    label: u8,
    pixels: Vec<u8>,
}

impl Image {
    /// the class label, an index into [`CLASS_NAMES`]
    pub fn label(&self) -> usize {
        self.label as usize
    }

    /// the human-readable class name
    pub fn class_name(&self) -> &'static str {
        CLASS_NAMES[self.label()]
    }

    /// raw pixel bytes, height-width-channel order
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Convert to a [`Sample`] with every pixel scaled from 0..=255 to 0.0..=1.0
    pub fn normalized(&self) -> Sample {
        Sample::new(
            self.pixels.iter().map(|&p| p as f32 / 255.0).collect(),
            self.label(),
        )
    }
}

/// Normalize every image into a training [`Sample`]. See [`Image::normalized`]
pub fn normalize(images: &[Image]) -> Vec<Sample> {
    images.iter().map(Image::normalized).collect()
}

/// Read CIFAR-10 records from `reader` until it is exhausted, or until `limit` images have been read.
///
/// # Errors
/// Returns a [`DatasetError`] if the reader fails, ends partway through a record, or a record carries a label outside 0..=9.
pub fn read_batch<R: Read>(mut reader: R, limit: Option<usize>) -> Result<Vec<Image>, DatasetError> {
    let mut images = Vec::new();
    let mut record = [0u8; RECORD_BYTES];
    while limit.map_or(true, |limit| images.len() < limit) {
        let filled = fill_record(&mut reader, &mut record)?;
        if filled == 0 {
            break;
        }
        if filled < RECORD_BYTES {
            return Err(DatasetError::TruncatedRecord {
                record: images.len(),
                bytes: filled,
            });
        }
        let label = record[0];
        if label as usize >= CLASS_NAMES.len() {
            return Err(DatasetError::BadLabel {
                record: images.len(),
                label,
            });
        }
        images.push(Image {
            label,
            pixels: planar_to_interleaved(&record[1..]),
        });
    }
    Ok(images)
}

/// read until `record` is full or the reader is exhausted, returning the number of bytes read
fn fill_record<R: Read>(reader: &mut R, record: &mut [u8]) -> Result<usize, DatasetError> {
    let mut filled = 0;
    while filled < record.len() {
        match reader.read(&mut record[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(DatasetError::Io(e)),
        }
    }
    Ok(filled)
}

/// [R plane, G plane, B plane] -> [r, g, b, r, g, b, ...]
fn planar_to_interleaved(planes: &[u8]) -> Vec<u8> {
    let mut pixels = Vec::with_capacity(IMAGE_BYTES);
    for pixel in 0..PLANE_BYTES {
        for channel in 0..CHANNELS {
            pixels.push(planes[channel * PLANE_BYTES + pixel]);
        }
    }
    pixels
}

/// Load every file of `split` from `data_dir`, stopping once `limit` images have been read.
///
/// # Errors
/// Returns [`DatasetError::MissingFile`] if one of the split's files does not exist, or any error from [`read_batch`].
pub fn load_split(
    data_dir: &Path,
    split: Split,
    limit: Option<usize>,
) -> Result<Vec<Image>, DatasetError> {
    let mut images = Vec::new();
    for file_name in split.file_names() {
        let remaining = limit.map(|limit| limit - images.len());
        if remaining == Some(0) {
            break;
        }
        let path = data_dir.join(&file_name);
        let file = File::open(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => DatasetError::MissingFile(path.clone()),
            _ => DatasetError::Io(e),
        })?;
        let batch = read_batch(BufReader::new(file), remaining)?;
        debug!("read {} images from {}", batch.len(), path.display());
        images.extend(batch);
    }
    Ok(images)
}

/// Count the samples of each class
pub fn class_distribution(samples: &[Sample]) -> FxHashMap<usize, usize> {
    let mut counts = FxHashMap::default();
    for sample in samples {
        *counts.entry(sample.label()).or_insert(0) += 1;
    }
    counts
}

/// Summary statistics over every feature value of a data set
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PixelStatistics {
    /// mean feature value
    pub mean: f64,
    /// sample standard deviation of the feature values
    pub std_dev: f64,
    /// smallest feature value
    pub min: f64,
    /// largest feature value
    pub max: f64,
}

/// Compute [`PixelStatistics`] over every feature of every sample. All fields are NaN for an empty data set
pub fn pixel_statistics(samples: &[Sample]) -> PixelStatistics {
    let values = samples
        .iter()
        .flat_map(|sample| sample.features().iter().map(|&x| x as f64));
    PixelStatistics {
        mean: values.clone().mean(),
        std_dev: values.clone().std_dev(),
        min: Statistics::min(values.clone()),
        max: Statistics::max(values),
    }
}

/// Randomly hold out `validation_split` of `data` (clamped to 0.0..=1.0) as a validation set.
///
/// Returns `(training_data, validation_data)`; relative order within each set is preserved.
pub fn split_data<R: Rng + ?Sized>(
    data: Vec<Sample>,
    validation_split: f64,
    rng: &mut R,
) -> (Vec<Sample>, Vec<Sample>) {
    let total = data.len();
    let validation_count = (validation_split.clamp(0.0, 1.0) * total as f64) as usize;
    let mut validation_indecies: FxHashSet<usize> = FxHashSet::default();
    while validation_indecies.len() < validation_count {
        validation_indecies.insert(rng.gen_range(0..total));
    }
    let mut training_data = Vec::with_capacity(total - validation_count);
    let mut validation_data = Vec::with_capacity(validation_count);
    for (i, sample) in data.into_iter().enumerate() {
        if validation_indecies.contains(&i) {
            validation_data.push(sample);
        } else {
            training_data.push(sample);
        }
    }
    debug!(
        "split data. Training: {}, Validation: {}",
        training_data.len(),
        validation_data.len()
    );
    (training_data, validation_data)
}

/// An error encountered while loading the dataset
#[derive(Debug)]
pub enum DatasetError {
    /// The underlying reader failed
    Io(io::Error),
    /// A file the split needs was not found
    MissingFile(PathBuf),
    /// The input ended partway through a record
    TruncatedRecord {
        /// zero-based index of the incomplete record
        record: usize,
        /// bytes of the record that were present
        bytes: usize,
    },
    /// A record's label byte does not name a class
    BadLabel {
        /// zero-based index of the record
        record: usize,
        /// the label byte found
        label: u8,
    },
}

impl fmt::Display for DatasetError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DatasetError::Io(e) => write!(f, "error reading dataset: {}", e),
            DatasetError::MissingFile(path) => {
                write!(f, "dataset file not found: {}", path.display())
            }
            DatasetError::TruncatedRecord { record, bytes } => write!(
                f,
                "record {} is truncated: {} of {} bytes present",
                record, bytes, RECORD_BYTES
            ),
            DatasetError::BadLabel { record, label } => write!(
                f,
                "record {} has label {}, expected 0-{}",
                record,
                label,
                CLASS_NAMES.len() - 1
            ),
        }
    }
}

impl std::error::Error for DatasetError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DatasetError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for DatasetError {
    fn from(e: io::Error) -> Self {
        DatasetError::Io(e)
    }
}
