#![forbid(unsafe_code)]

//! Reference fixtures for the commander engine.
//!
//! A small shape-editing domain ([`ShapeHandle`], [`Moveable`],
//! [`Displayable`]) with commands over it, used by the scenario binary and
//! the end-to-end tests.

pub mod commands;
pub mod shape;

pub use commands::{
    DisplayQuery, MoveCommand, UpdateTitleCommand, collision_detection, layout_command,
};
pub use shape::{Displayable, Moveable, Point, ShapeHandle, ShapeId, Vector};
