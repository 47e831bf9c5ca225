// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! Annotation store bound to one medical image.
//!
//! This module owns the ordered annotation sequence for an image, its
//! selection state, and the load/save lifecycle of the JSON metadata
//! file sitting next to the image. Rendering is left entirely to
//! external collaborators, which observe mutations through
//! [`StoreEvent`] notifications.

use crate::io::media::{self, ImageLoadError, LoadedImage};
use crate::io::serialization::{self, DecodeError, MetadataSaveError};
use crate::models::annotation::{Annotation, AnnotationId, Point};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// A store could not be constructed.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The bound image could not be loaded.
    #[error(transparent)]
    ImageLoad(#[from] ImageLoadError),
    /// The metadata file parsed as JSON but holds an invalid record.
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Notification emitted by [`AnnotationStore`] mutations.
///
/// A renderer subscribes with [`AnnotationStore::subscribe`] and reacts
/// by creating, restyling or tearing down the visual representation
/// correlated by annotation id.
#[derive(Debug)]
pub enum StoreEvent {
    /// An annotation was appended to the sequence.
    AnnotationAdded { id: AnnotationId },
    /// The selection changed; `selected` is the new selection, if any.
    SelectionChanged { selected: Option<AnnotationId> },
    /// An annotation was deleted. Carries the annotation, with its
    /// `removed` flag set, for teardown of its visuals.
    AnnotationRemoved { annotation: Annotation },
    /// The selected annotation's label was replaced.
    AnnotationRelabeled { id: AnnotationId },
}

type Listener = Box<dyn FnMut(&StoreEvent)>;

/// Annotation data model for one medical image.
///
/// Holds the decoded image, the ordered annotation sequence (insertion
/// order doubles as hit-testing precedence) and at most one selection.
/// All operations are synchronous and run on the caller's thread.
pub struct AnnotationStore {
    image_path: PathBuf,
    metadata_path: PathBuf,
    image: LoadedImage,
    annotations: Vec<Annotation>,
    /// Index into `annotations`; kept in bounds by every mutation.
    selected: Option<usize>,
    listeners: Vec<Listener>,
}

impl std::fmt::Debug for AnnotationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnnotationStore")
            .field("image_path", &self.image_path)
            .field("metadata_path", &self.metadata_path)
            .field("image", &self.image)
            .field("annotations", &self.annotations)
            .field("selected", &self.selected)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl AnnotationStore {
    /// Bind a store to an image file and load any existing annotations.
    ///
    /// The metadata path defaults to the image path with its extension
    /// replaced by `.json`. A missing or unparsable metadata file is
    /// not an error: annotating starts from an empty sequence. A
    /// parsable file containing an invalid record aborts the load
    /// instead, so no sibling records are silently dropped.
    pub fn load(
        image_path: impl Into<PathBuf>,
        metadata_path: Option<PathBuf>,
    ) -> Result<Self, StoreError> {
        let image_path = image_path.into();
        let metadata_path = metadata_path.unwrap_or_else(|| image_path.with_extension("json"));

        let image = media::load_image(&image_path)?;

        let annotations = match serialization::read_records(&metadata_path) {
            Ok(records) => serialization::decode_records(&records)?,
            Err(e) => {
                log::warn!("starting without annotations: {e}");
                Vec::new()
            }
        };
        log::info!(
            "loaded {} annotations for {}",
            annotations.len(),
            image_path.display()
        );

        Ok(Self {
            image_path,
            metadata_path,
            image,
            annotations,
            selected: None,
            listeners: Vec::new(),
        })
    }

    /// Path of the bound image file.
    pub fn image_path(&self) -> &Path {
        &self.image_path
    }

    /// Path annotations are loaded from and saved to.
    pub fn metadata_path(&self) -> &Path {
        &self.metadata_path
    }

    /// The decoded image data.
    pub fn image(&self) -> &LoadedImage {
        &self.image
    }

    /// Dimensions of the bound image as (width, height).
    pub fn shape(&self) -> (u32, u32) {
        self.image.shape()
    }

    /// Number of annotations currently held.
    pub fn annotation_count(&self) -> usize {
        self.annotations.len()
    }

    /// The annotation sequence, in insertion order.
    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    /// Look up an annotation by its id.
    pub fn get(&self, id: AnnotationId) -> Option<&Annotation> {
        self.annotations.iter().find(|a| a.id() == id)
    }

    /// The selected annotation, if any.
    pub fn selected(&self) -> Option<&Annotation> {
        self.selected.map(|i| &self.annotations[i])
    }

    /// Register a listener for store events.
    pub fn subscribe(&mut self, listener: impl FnMut(&StoreEvent) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    fn emit(&mut self, event: StoreEvent) {
        for listener in &mut self.listeners {
            listener(&event);
        }
    }

    /// Append an annotation to the end of the sequence.
    pub fn add_annotation(&mut self, annotation: Annotation) {
        let id = annotation.id();
        self.annotations.push(annotation);
        log::info!("added annotation, total: {}", self.annotations.len());
        self.emit(StoreEvent::AnnotationAdded { id });
    }

    /// Update the selection by hit-testing against `p`.
    ///
    /// The previous selection is cleared first; the sequence is then
    /// scanned in insertion order and the earliest-added annotation
    /// whose hit-test succeeds becomes the selection. Returns the new
    /// selection, if any.
    pub fn select_at(&mut self, p: Point) -> Option<&Annotation> {
        let previous = self.selected.take();
        if let Some(i) = previous {
            self.annotations[i].selected = false;
        }

        let hit = self.annotations.iter().position(|a| a.hit_test(p));
        if let Some(i) = hit {
            self.annotations[i].selected = true;
            self.selected = Some(i);
        }

        if hit != previous {
            let selected = hit.map(|i| self.annotations[i].id());
            self.emit(StoreEvent::SelectionChanged { selected });
        }

        self.selected.map(|i| &self.annotations[i])
    }

    /// Delete the selected annotation, if any.
    ///
    /// The annotation leaves the sequence with its `removed` flag set
    /// and travels in the [`StoreEvent::AnnotationRemoved`] event so
    /// visual collaborators can tear down its rendering. Returns
    /// whether anything was deleted.
    pub fn delete_selected(&mut self) -> bool {
        let Some(i) = self.selected.take() else {
            return false;
        };

        let mut annotation = self.annotations.remove(i);
        annotation.selected = false;
        annotation.removed = true;
        log::info!("deleted annotation, total: {}", self.annotations.len());

        self.emit(StoreEvent::AnnotationRemoved { annotation });
        self.emit(StoreEvent::SelectionChanged { selected: None });
        true
    }

    /// Replace the selected annotation's label.
    ///
    /// The string is taken as-is; the empty string is allowed. Returns
    /// whether a selection existed.
    pub fn relabel_selected(&mut self, label: impl Into<String>) -> bool {
        let Some(i) = self.selected else {
            return false;
        };

        self.annotations[i].label = label.into();
        let id = self.annotations[i].id();
        self.emit(StoreEvent::AnnotationRelabeled { id });
        true
    }

    /// Write the annotation sequence to the bound metadata path,
    /// overwriting it.
    ///
    /// In-memory state is untouched by a failure; the error carries a
    /// short human-readable message for the caller to present.
    pub fn save(&self) -> Result<(), MetadataSaveError> {
        serialization::write_metadata(&self.metadata_path, &self.annotations)?;
        log::info!(
            "saved {} annotations to {}",
            self.annotations.len(),
            self.metadata_path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use tempfile::TempDir;

    // Hand-written two-record metadata file covering both variants.
    const EXAMPLE_METADATA: &str = r#"[
    {
        "h0": 734,
        "h1": 2003,
        "label": "arect",
        "l0": 303,
        "l1": 1263,
        "type": "Rectangle"
    },
    {
        "c1": 969,
        "c0": 1633,
        "type": "Marker",
        "label": "amarker"
    }
]"#;

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn write_image(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("scan.png");
        image::RgbaImage::new(16, 16).save(&path).unwrap();
        path
    }

    fn example_store(dir: &TempDir) -> AnnotationStore {
        let image_path = write_image(dir);
        let metadata_path = image_path.with_extension("json");
        std::fs::write(&metadata_path, EXAMPLE_METADATA).unwrap();
        AnnotationStore::load(image_path, None).unwrap()
    }

    #[test]
    fn test_metadata_path_defaults_to_json_extension() {
        let dir = tempfile::tempdir().unwrap();
        let image_path = write_image(&dir);

        let store = AnnotationStore::load(image_path.clone(), None).unwrap();
        assert_eq!(store.metadata_path(), image_path.with_extension("json"));
        assert_eq!(store.image_path(), image_path);
    }

    #[test]
    fn test_metadata_path_override() {
        let dir = tempfile::tempdir().unwrap();
        let image_path = write_image(&dir);
        let override_path = dir.path().join("elsewhere.json");
        std::fs::write(&override_path, EXAMPLE_METADATA).unwrap();

        let store = AnnotationStore::load(image_path, Some(override_path.clone())).unwrap();
        assert_eq!(store.metadata_path(), override_path);
        assert_eq!(store.annotation_count(), 2);
    }

    #[test]
    fn test_missing_metadata_starts_empty() {
        init_logging();
        let dir = tempfile::tempdir().unwrap();

        let store = AnnotationStore::load(write_image(&dir), None).unwrap();
        assert_eq!(store.annotation_count(), 0);
    }

    #[test]
    fn test_unparsable_metadata_starts_empty() {
        init_logging();
        let dir = tempfile::tempdir().unwrap();
        let image_path = write_image(&dir);
        std::fs::write(image_path.with_extension("json"), "not json at all").unwrap();

        let store = AnnotationStore::load(image_path, None).unwrap();
        assert_eq!(store.annotation_count(), 0);
    }

    #[test]
    fn test_invalid_record_aborts_load() {
        let dir = tempfile::tempdir().unwrap();
        let image_path = write_image(&dir);
        std::fs::write(
            image_path.with_extension("json"),
            r#"[{"type": "Blob", "label": "bad"}]"#,
        )
        .unwrap();

        let err = AnnotationStore::load(image_path, None).unwrap_err();
        assert!(matches!(err, StoreError::Decode(_)));
    }

    #[test]
    fn test_missing_image_is_fatal() {
        let err = AnnotationStore::load("no_such_scan.png", None).unwrap_err();
        assert!(matches!(err, StoreError::ImageLoad(_)));
    }

    #[test]
    fn test_image_shape_exposed() {
        let dir = tempfile::tempdir().unwrap();

        let store = AnnotationStore::load(write_image(&dir), None).unwrap();
        assert_eq!(store.shape(), (16, 16));
        assert_eq!(store.image().pixels.len(), 16 * 16 * 4);
    }

    #[test]
    fn test_load_save_reproduces_records() {
        init_logging();
        let dir = tempfile::tempdir().unwrap();
        let store = example_store(&dir);

        store.save().unwrap();

        let expected: Vec<serde_json::Value> = serde_json::from_str(EXAMPLE_METADATA).unwrap();
        let saved: Vec<serde_json::Value> =
            serde_json::from_str(&std::fs::read_to_string(store.metadata_path()).unwrap()).unwrap();
        assert_eq!(saved, expected);
    }

    #[test]
    fn test_select_at_rectangle_center_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = example_store(&dir);
        assert_eq!(store.annotation_count(), 2);

        let selected = store.select_at(Point::new(518.5, 1633.0)).unwrap();
        assert_eq!(selected.label, "arect");
        assert!(selected.selected);

        assert!(store.delete_selected());
        assert_eq!(store.annotation_count(), 1);
        assert!(store.selected().is_none());
        assert_eq!(store.annotations()[0].label, "amarker");
    }

    #[test]
    fn test_selection_prefers_earliest_added() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = AnnotationStore::load(write_image(&dir), None).unwrap();

        let first = Annotation::rectangle("first", Point::new(0.0, 0.0), Point::new(100.0, 100.0));
        let first_id = first.id();
        store.add_annotation(first);
        store.add_annotation(Annotation::rectangle(
            "second",
            Point::new(0.0, 0.0),
            Point::new(100.0, 100.0),
        ));

        let selected = store.select_at(Point::new(50.0, 50.0)).unwrap();
        assert_eq!(selected.id(), first_id);
    }

    #[test]
    fn test_select_miss_clears_selection() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = AnnotationStore::load(write_image(&dir), None).unwrap();
        store.add_annotation(Annotation::marker("m", Point::new(0.0, 0.0)));

        assert!(store.select_at(Point::new(0.0, 0.0)).is_some());
        assert!(store.select_at(Point::new(500.0, 500.0)).is_none());
        assert!(store.selected().is_none());
        assert!(!store.annotations()[0].selected);
    }

    #[test]
    fn test_add_select_delete_counts() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = example_store(&dir);
        let count = store.annotation_count();

        let marker = Annotation::marker("new", Point::new(5.0, 5.0));
        store.add_annotation(marker);
        assert_eq!(store.annotation_count(), count + 1);

        store.select_at(Point::new(5.0, 5.0));
        assert!(store.delete_selected());
        assert_eq!(store.annotation_count(), count);
        assert!(store.selected().is_none());
    }

    #[test]
    fn test_delete_without_selection_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = example_store(&dir);

        assert!(!store.delete_selected());
        assert_eq!(store.annotation_count(), 2);
    }

    #[test]
    fn test_relabel_selected() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = example_store(&dir);

        assert!(!store.relabel_selected("nothing selected"));

        store.select_at(Point::new(1633.0, 969.0));
        assert!(store.relabel_selected("renamed"));
        assert_eq!(store.selected().unwrap().label, "renamed");
    }

    #[test]
    fn test_events_are_emitted_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = AnnotationStore::load(write_image(&dir), None).unwrap();

        let seen: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        store.subscribe(move |event| {
            let tag = match event {
                StoreEvent::AnnotationAdded { .. } => "added",
                StoreEvent::SelectionChanged { .. } => "selection",
                StoreEvent::AnnotationRemoved { .. } => "removed",
                StoreEvent::AnnotationRelabeled { .. } => "relabeled",
            };
            sink.borrow_mut().push(tag.to_string());
        });

        store.add_annotation(Annotation::marker("m", Point::new(0.0, 0.0)));
        store.select_at(Point::new(0.0, 0.0));
        // Re-selecting the same annotation is silent.
        store.select_at(Point::new(1.0, 1.0));
        store.relabel_selected("renamed");
        store.delete_selected();

        assert_eq!(
            *seen.borrow(),
            ["added", "selection", "relabeled", "removed", "selection"]
        );
    }

    #[test]
    fn test_removed_annotation_travels_in_event() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = AnnotationStore::load(write_image(&dir), None).unwrap();
        store.add_annotation(Annotation::marker("m", Point::new(0.0, 0.0)));

        let removed: Rc<RefCell<Option<(AnnotationId, bool)>>> = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&removed);
        store.subscribe(move |event| {
            if let StoreEvent::AnnotationRemoved { annotation } = event {
                *sink.borrow_mut() = Some((annotation.id(), annotation.removed));
            }
        });

        let id = store.select_at(Point::new(0.0, 0.0)).unwrap().id();
        store.delete_selected();

        assert_eq!(*removed.borrow(), Some((id, true)));
        assert!(store.get(id).is_none());
    }

    #[test]
    fn test_failed_save_leaves_state_intact() {
        init_logging();
        let dir = tempfile::tempdir().unwrap();
        let image_path = write_image(&dir);
        let unwritable = dir.path().join("missing_dir").join("scan.json");

        let mut store = AnnotationStore::load(image_path, Some(unwritable)).unwrap();
        store.add_annotation(Annotation::marker("m", Point::new(1.0, 2.0)));

        assert!(store.save().is_err());
        assert_eq!(store.annotation_count(), 1);
    }
}
