// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! Annotation data structures.
//!
//! This module defines the core data structures for representing
//! labeled rectangles and point markers on a medical image, along with
//! their hit-testing predicates.

use crate::io::serialization::coord;
use crate::util::geometry;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Radius within which a position hit-tests against a marker, in image
/// coordinate units.
pub const MARKER_HIT_RADIUS: f64 = 50.0;

/// A 2D point in image coordinates (axis 0 = x, axis 1 = y).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    /// Create a new point.
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Process-lifetime-unique annotation identity.
///
/// Correlates an annotation with its visual representation in an
/// external renderer. Never persisted, not meaningful across runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AnnotationId(u64);

fn next_id() -> AnnotationId {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    AnnotationId(COUNTER.fetch_add(1, Ordering::Relaxed))
}

/// Annotation geometry, tagged by the `type` discriminator used in the
/// persisted JSON records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Shape {
    /// Axis-aligned bounding rectangle. Invariant: `l0 <= h0` and
    /// `l1 <= h1`.
    Rectangle {
        #[serde(with = "coord")]
        l0: f64,
        #[serde(with = "coord")]
        h0: f64,
        #[serde(with = "coord")]
        l1: f64,
        #[serde(with = "coord")]
        h1: f64,
    },
    /// Single-point marker.
    Marker {
        #[serde(with = "coord")]
        c0: f64,
        #[serde(with = "coord")]
        c1: f64,
    },
}

impl Shape {
    /// Rectangle spanned by two arbitrary corner points; the bounds are
    /// normalized by taking the min/max along each axis.
    pub fn rectangle(a: Point, b: Point) -> Self {
        let (l0, h0, l1, h1) = geometry::normalized_bounds(&a, &b);
        Shape::Rectangle { l0, h0, l1, h1 }
    }

    /// Marker at the given point.
    pub fn marker(at: Point) -> Self {
        Shape::Marker {
            c0: at.x,
            c1: at.y,
        }
    }

    /// Re-establish the rectangle bound ordering, e.g. after
    /// deserializing a hand-edited record.
    pub(crate) fn normalize(&mut self) {
        if let Shape::Rectangle { l0, h0, l1, h1 } = self {
            if l0 > h0 {
                std::mem::swap(l0, h0);
            }
            if l1 > h1 {
                std::mem::swap(l1, h1);
            }
        }
    }
}

/// A labeled geometric marker associated with an image.
#[derive(Debug, Clone)]
pub struct Annotation {
    id: AnnotationId,
    /// User-supplied label; the empty string is allowed.
    pub label: String,
    shape: Shape,
    /// Transient selection flag, maintained by the store. Never
    /// persisted.
    pub selected: bool,
    /// Set once the annotation has been deleted from its store, as a
    /// signal for visual collaborators to tear down their rendering.
    pub removed: bool,
}

impl Annotation {
    /// Create a new annotation with a fresh identity.
    pub fn new(label: impl Into<String>, mut shape: Shape) -> Self {
        shape.normalize();
        Self {
            id: next_id(),
            label: label.into(),
            shape,
            selected: false,
            removed: false,
        }
    }

    /// Rectangle annotation spanned by two arbitrary corner points.
    pub fn rectangle(label: impl Into<String>, a: Point, b: Point) -> Self {
        Self::new(label, Shape::rectangle(a, b))
    }

    /// Point marker annotation.
    pub fn marker(label: impl Into<String>, at: Point) -> Self {
        Self::new(label, Shape::marker(at))
    }

    /// The annotation's process-lifetime-unique identity.
    pub fn id(&self) -> AnnotationId {
        self.id
    }

    /// The annotation's geometry.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Center of the annotation geometry.
    pub fn center(&self) -> Point {
        match self.shape {
            Shape::Rectangle { l0, h0, l1, h1 } => Point::new((l0 + h0) / 2.0, (l1 + h1) / 2.0),
            Shape::Marker { c0, c1 } => Point::new(c0, c1),
        }
    }

    /// Hit-test the annotation against a position.
    ///
    /// Rectangles hit strictly inside their bounds; a point exactly on
    /// an edge does not hit. Markers hit strictly within
    /// [`MARKER_HIT_RADIUS`] of their center.
    pub fn hit_test(&self, p: Point) -> bool {
        match self.shape {
            Shape::Rectangle { l0, h0, l1, h1 } => p.x > l0 && p.x < h0 && p.y > l1 && p.y < h1,
            Shape::Marker { c0, c1 } => {
                geometry::distance_squared(&p, &Point::new(c0, c1))
                    < MARKER_HIT_RADIUS * MARKER_HIT_RADIUS
            }
        }
    }
}
