// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! Annotation metadata serialization and deserialization.
//!
//! This module maps typed annotations to and from the flat JSON records
//! stored in an image's metadata file. Reconstruction dispatches on the
//! `type` discriminator through a closed set of variants; unknown
//! discriminators are rejected rather than interpreted.

use crate::models::annotation::{Annotation, Shape};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// A metadata record could not be decoded into an annotation.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The record is not an object, the `type` discriminator is missing
    /// or unrecognized, or a required field is missing or mistyped.
    #[error("invalid annotation record: {0}")]
    Invalid(#[from] serde_json::Error),
    /// Same failure, with the position of the record in its file.
    #[error("annotation record {index}: {source}")]
    InvalidAt {
        index: usize,
        #[source]
        source: serde_json::Error,
    },
}

impl DecodeError {
    fn at(self, index: usize) -> Self {
        match self {
            DecodeError::Invalid(source) => DecodeError::InvalidAt { index, source },
            other => other,
        }
    }
}

/// The metadata file could not be read or parsed at all.
///
/// Recovered at the store level: a missing or garbled file means "no
/// annotations yet".
#[derive(Debug, Error)]
pub enum MetadataLoadError {
    #[error("cannot read metadata file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("metadata file {} is not a JSON array: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// The metadata file could not be written.
#[derive(Debug, Error)]
pub enum MetadataSaveError {
    #[error("cannot serialize annotations for {}: {source}", path.display())]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("cannot write metadata file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One persisted metadata record: the label plus the discriminated
/// geometry fields, flattened into a single mapping.
#[derive(Serialize, Deserialize)]
struct Record {
    label: String,
    #[serde(flatten)]
    shape: Shape,
}

/// Decode one metadata record into an annotation.
///
/// The reconstructed annotation gets a fresh identity and cleared
/// transient state.
pub fn decode(value: &Value) -> Result<Annotation, DecodeError> {
    let record: Record = serde_json::from_value(value.clone())?;
    Ok(Annotation::new(record.label, record.shape))
}

/// Encode an annotation as a flat metadata record.
///
/// Covers exactly the persisted attributes; the transient selection and
/// removal flags never reach disk.
pub fn encode(annotation: &Annotation) -> Value {
    let record = Record {
        label: annotation.label.clone(),
        shape: annotation.shape().clone(),
    };
    // Struct-to-value conversion only fails on non-string map keys.
    serde_json::to_value(record).expect("annotation records serialize to JSON objects")
}

/// Read the raw metadata records from a file.
pub fn read_records(path: &Path) -> Result<Vec<Value>, MetadataLoadError> {
    let text = std::fs::read_to_string(path).map_err(|source| MetadataLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    serde_json::from_str(&text).map_err(|source| MetadataLoadError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Decode a sequence of metadata records, aborting on the first invalid
/// one.
pub fn decode_records(records: &[Value]) -> Result<Vec<Annotation>, DecodeError> {
    records
        .iter()
        .enumerate()
        .map(|(index, value)| decode(value).map_err(|e| e.at(index)))
        .collect()
}

/// Serialize annotations to a metadata file, overwriting it.
///
/// Output is a JSON array indented with four spaces, one record per
/// annotation, keys in a stable order for reviewable diffs.
pub fn write_metadata(path: &Path, annotations: &[Annotation]) -> Result<(), MetadataSaveError> {
    let records: Vec<Value> = annotations.iter().map(encode).collect();

    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    records
        .serialize(&mut ser)
        .map_err(|source| MetadataSaveError::Serialize {
            path: path.to_path_buf(),
            source,
        })?;

    std::fs::write(path, buf).map_err(|source| MetadataSaveError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Field (de)serializer that keeps integral coordinates as JSON
/// integers, so an untouched metadata file survives a load/save cycle
/// byte for byte.
pub(crate) mod coord {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.fract() == 0.0 && value.is_finite() && value.abs() < i64::MAX as f64 {
            serializer.serialize_i64(*value as i64)
        } else {
            serializer.serialize_f64(*value)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        f64::deserialize(deserializer)
    }
}
