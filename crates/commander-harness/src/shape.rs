#![forbid(unsafe_code)]

//! Reference domain: movable, titled shapes.

use std::fmt;
use std::ops::{Add, Neg, Sub};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

static NEXT_SHAPE_ID: AtomicU64 = AtomicU64::new(1);

/// A position in the plane.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// A relative displacement.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vector {
    pub dx: f64,
    pub dy: f64,
}

impl Vector {
    #[must_use]
    pub const fn new(dx: f64, dy: f64) -> Self {
        Self { dx, dy }
    }
}

impl fmt::Display for Vector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.dx, self.dy)
    }
}

impl Neg for Vector {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.dx, -self.dy)
    }
}

impl Add<Vector> for Point {
    type Output = Self;

    fn add(self, offset: Vector) -> Self {
        Self::new(self.x + offset.dx, self.y + offset.dy)
    }
}

impl Sub for Point {
    type Output = Vector;

    fn sub(self, other: Self) -> Vector {
        Vector::new(self.x - other.x, self.y - other.y)
    }
}

/// Process-unique shape identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShapeId(u64);

impl ShapeId {
    fn next() -> Self {
        Self(NEXT_SHAPE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ShapeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "shape-{}", self.0)
    }
}

/// Something that has a center and can be moved by an offset.
pub trait Moveable: Send + Sync {
    fn id(&self) -> ShapeId;

    fn center(&self) -> Point;

    fn move_by(&self, offset: Vector);
}

/// Something with an editable title.
pub trait Displayable: Send + Sync {
    fn title(&self) -> String;

    fn set_title(&self, title: &str);
}

#[derive(Debug)]
struct Shape {
    center: Point,
    title: String,
}

/// Shared handle to a shape.
///
/// Clones refer to the same shape, so commands can hold one while the test
/// inspects another.
#[derive(Debug, Clone)]
pub struct ShapeHandle {
    id: ShapeId,
    inner: Arc<Mutex<Shape>>,
}

impl ShapeHandle {
    /// A shape at the origin with an empty title.
    #[must_use]
    pub fn new() -> Self {
        Self::with_title("")
    }

    #[must_use]
    pub fn with_title(title: &str) -> Self {
        Self {
            id: ShapeId::next(),
            inner: Arc::new(Mutex::new(Shape {
                center: Point::ZERO,
                title: title.to_owned(),
            })),
        }
    }

    /// Erase the concrete type for commands that take any moveable.
    #[must_use]
    pub fn as_moveable(&self) -> Arc<dyn Moveable> {
        Arc::new(self.clone())
    }

    #[must_use]
    pub fn as_displayable(&self) -> Arc<dyn Displayable> {
        Arc::new(self.clone())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Shape> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ShapeHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl Moveable for ShapeHandle {
    fn id(&self) -> ShapeId {
        self.id
    }

    fn center(&self) -> Point {
        self.lock().center
    }

    fn move_by(&self, offset: Vector) {
        let mut shape = self.lock();
        shape.center = shape.center + offset;
    }
}

impl Displayable for ShapeHandle {
    fn title(&self) -> String {
        self.lock().title.clone()
    }

    fn set_title(&self, title: &str) {
        title.clone_into(&mut self.lock().title);
    }
}

impl fmt::Display for ShapeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shape = self.lock();
        write!(f, "<Shape {:?}, center = {}, {}>", shape.title, shape.center, self.id)
    }
}
