#![forbid(unsafe_code)]

//! Commands and queries over the shape domain.
//!
//! | Item | Kind | Effect |
//! |------|------|--------|
//! | [`MoveCommand`] | command | move a shape by an offset |
//! | [`UpdateTitleCommand`] | command | set a title, undo restores the old one |
//! | [`collision_detection`] | deferred command | spread shapes apart on the work queue |
//! | [`layout_command`] | produced group | stack shapes vertically, then resolve collisions |
//! | [`DisplayQuery`] | query | print a title to a text sink |

use std::fmt;
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

use commander_runtime::{
    Command, DeferredCommand, DeferredEffect, Description, GroupCommand, InvocationId, Invokeable,
    Lifecycle, ProduceCommand, Query, State, TextSink, WorkQueueHandle,
};

use crate::shape::{Displayable, Moveable, Point, Vector};

/// Moves a shape by a fixed offset.
pub struct MoveCommand {
    moveable: Arc<dyn Moveable>,
    offset: Vector,
    id: InvocationId,
    lifecycle: Lifecycle,
}

impl MoveCommand {
    #[must_use]
    pub fn new(moveable: Arc<dyn Moveable>, offset: Vector) -> Self {
        Self {
            moveable,
            offset,
            id: InvocationId::next(),
            lifecycle: Lifecycle::new(),
        }
    }

    /// Move to `target`. The offset is fixed from the shape's current center.
    #[must_use]
    pub fn to_target(moveable: Arc<dyn Moveable>, target: Point) -> Self {
        let offset = target - moveable.center();
        Self::new(moveable, offset)
    }

    #[must_use]
    pub fn offset(&self) -> Vector {
        self.offset
    }
}

impl Invokeable for MoveCommand {
    fn invoke(&self) {
        if !self.lifecycle.start(self.type_name()) {
            return;
        }
        self.moveable.move_by(self.offset);
        self.lifecycle.finish();
    }

    fn state(&self) -> State {
        self.lifecycle.get()
    }

    fn forbid(&self) -> bool {
        self.lifecycle.forbid()
    }

    fn describe(&self) -> Description {
        Description::new(self.type_name(), self.state())
            .with_id(Some(self.id))
            .field("shape", self.moveable.id())
            .field("offset", self.offset)
    }

    fn id(&self) -> Option<InvocationId> {
        Some(self.id)
    }

    fn type_name(&self) -> &'static str {
        "MoveCommand"
    }
}

impl Command for MoveCommand {
    fn inversed(&self) -> Arc<dyn Command> {
        Arc::new(Self::new(Arc::clone(&self.moveable), -self.offset))
    }
}

impl fmt::Debug for MoveCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MoveCommand")
            .field("shape", &self.moveable.id())
            .field("offset", &self.offset)
            .field("state", &self.state())
            .finish()
    }
}

/// Sets a title. The title it overwrites is recorded when the command runs.
pub struct UpdateTitleCommand {
    displayable: Arc<dyn Displayable>,
    title: String,
    previous: Mutex<Option<String>>,
    id: InvocationId,
    lifecycle: Lifecycle,
}

impl UpdateTitleCommand {
    pub fn new(displayable: Arc<dyn Displayable>, title: impl Into<String>) -> Self {
        Self {
            displayable,
            title: title.into(),
            previous: Mutex::new(None),
            id: InvocationId::next(),
            lifecycle: Lifecycle::new(),
        }
    }

    /// The title `invoke` replaced. Before the command has run, the current
    /// title.
    fn previous(&self) -> String {
        self.previous
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .unwrap_or_else(|| self.displayable.title())
    }
}

impl Invokeable for UpdateTitleCommand {
    fn invoke(&self) {
        if !self.lifecycle.start(self.type_name()) {
            return;
        }
        *self.previous.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(self.displayable.title());
        self.displayable.set_title(&self.title);
        self.lifecycle.finish();
    }

    fn state(&self) -> State {
        self.lifecycle.get()
    }

    fn forbid(&self) -> bool {
        self.lifecycle.forbid()
    }

    fn describe(&self) -> Description {
        Description::new(self.type_name(), self.state())
            .with_id(Some(self.id))
            .field("title", &self.title)
    }

    fn id(&self) -> Option<InvocationId> {
        Some(self.id)
    }

    fn type_name(&self) -> &'static str {
        "UpdateTitleCommand"
    }
}

impl Command for UpdateTitleCommand {
    fn inversed(&self) -> Arc<dyn Command> {
        Arc::new(Self::new(Arc::clone(&self.displayable), self.previous()))
    }
}

/// Spreads `moveables` apart after the queue's default delay: shape `i`
/// moves by `(100 * i, 0)`.
///
/// Undo puts every shape back where it was when the command was invoked.
#[must_use]
pub fn collision_detection(
    moveables: Vec<Arc<dyn Moveable>>,
    queue: WorkQueueHandle,
) -> DeferredCommand<Vec<Point>> {
    let capture_from = moveables.clone();
    let apply_to = moveables.clone();
    let restore_to = moveables;

    let effect = DeferredEffect::new(
        "collision detection",
        move || capture_from.iter().map(|moveable| moveable.center()).collect(),
        move |_: &Vec<Point>| {
            let moves = apply_to
                .iter()
                .enumerate()
                .map(|(index, moveable)| {
                    let offset = Vector::new(100.0 * index as f64, 0.0);
                    Arc::new(MoveCommand::new(Arc::clone(moveable), offset)) as Arc<dyn Command>
                })
                .collect();
            GroupCommand::new(moves).invoke();
        },
        move |centers: &Vec<Point>| {
            let moves = restore_to
                .iter()
                .zip(centers)
                .map(|(moveable, center)| {
                    Arc::new(MoveCommand::to_target(Arc::clone(moveable), *center))
                        as Arc<dyn Command>
                })
                .collect();
            GroupCommand::new(moves).invoke();
        },
    );
    DeferredCommand::new(effect, queue)
}

/// Stacks `moveables` at `target`, 10 units apart vertically, then runs
/// [`collision_detection`] over them.
///
/// The moves are computed from the shapes' positions when the layout first
/// runs.
#[must_use]
pub fn layout_command(
    moveables: Vec<Arc<dyn Moveable>>,
    target: Point,
    queue: WorkQueueHandle,
) -> ProduceCommand {
    ProduceCommand::new(move || {
        let mut members: Vec<Arc<dyn Command>> = moveables
            .iter()
            .enumerate()
            .map(|(index, moveable)| {
                let slot = Point::new(target.x, target.y + 10.0 * index as f64);
                Arc::new(MoveCommand::to_target(Arc::clone(moveable), slot)) as Arc<dyn Command>
            })
            .collect();
        members.push(Arc::new(collision_detection(moveables, queue)));
        Arc::new(GroupCommand::new(members))
    })
    .with_label("layout")
}

/// Writes `Printing displayable with title: <title>` to a text sink.
pub struct DisplayQuery {
    displayable: Arc<dyn Displayable>,
    output: TextSink,
    id: InvocationId,
    lifecycle: Lifecycle,
}

impl DisplayQuery {
    #[must_use]
    pub fn new(displayable: Arc<dyn Displayable>, output: TextSink) -> Self {
        Self {
            displayable,
            output,
            id: InvocationId::next(),
            lifecycle: Lifecycle::new(),
        }
    }
}

impl Invokeable for DisplayQuery {
    fn invoke(&self) {
        if !self.lifecycle.start(self.type_name()) {
            return;
        }
        let mut output = self.output.clone();
        if let Err(err) = writeln!(
            output,
            "Printing displayable with title: {}",
            self.displayable.title()
        ) {
            tracing::warn!(error = %err, "display query failed to write");
        }
        self.lifecycle.finish();
    }

    fn state(&self) -> State {
        self.lifecycle.get()
    }

    fn forbid(&self) -> bool {
        self.lifecycle.forbid()
    }

    fn describe(&self) -> Description {
        Description::new(self.type_name(), self.state()).with_id(Some(self.id))
    }

    fn id(&self) -> Option<InvocationId> {
        Some(self.id)
    }

    fn is_mutating(&self) -> bool {
        false
    }

    fn type_name(&self) -> &'static str {
        "DisplayQuery"
    }
}

impl Query for DisplayQuery {}
