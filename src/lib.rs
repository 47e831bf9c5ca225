// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! DIMARK - Annotation data model for medical images.
//!
//! Labeled rectangles and point markers are held in an ordered,
//! hit-testable sequence bound to one image and persisted as a JSON
//! array next to the image file. Rendering, mouse tools and dialogs are
//! external collaborators: they drive this crate through
//! [`AnnotationStore`] and observe it through [`StoreEvent`]
//! notifications.

pub mod io;
pub mod models;
pub mod util;

pub use io::media::{ImageLoadError, LoadedImage};
pub use io::serialization::{DecodeError, MetadataLoadError, MetadataSaveError};
pub use models::annotation::{Annotation, AnnotationId, Point, Shape, MARKER_HIT_RADIUS};
pub use models::store::{AnnotationStore, StoreError, StoreEvent};
