// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
//! Linear undo/redo history of arrangement edits.
use std::fmt;

use tracing::{debug, error};

use crate::arrangement::{Arrangement, ArrangementError};

mod commands;

pub use commands::{
    AddSlicePoint, CreateSlices, DeleteSlicePoint, JoinSegments, MoveSegments, MoveSlicePoint,
    RemoveSegments, SplitSegment,
};

/// An invertible edit of an [`Arrangement`].
///
/// `apply` is called once when the command is pushed and again on every redo, so
/// implementations remember whatever identities they created the first time.
pub trait EditCommand: fmt::Debug + Send {
    fn apply(&mut self, arrangement: &mut Arrangement) -> Result<(), ArrangementError>;

    fn undo(&mut self, arrangement: &mut Arrangement) -> Result<(), ArrangementError>;

    /// Human readable name, e.g. "Move Slice Point".
    fn description(&self) -> &str;
}

/// Several commands undone and redone as one.
#[derive(Debug)]
pub struct CommandGroup {
    description: String,
    commands: Vec<Box<dyn EditCommand>>,
}

impl CommandGroup {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            commands: Vec::new(),
        }
    }

    pub fn push(&mut self, command: Box<dyn EditCommand>) {
        self.commands.push(command);
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl EditCommand for CommandGroup {
    fn apply(&mut self, arrangement: &mut Arrangement) -> Result<(), ArrangementError> {
        for applied in 0..self.commands.len() {
            if let Err(e) = self.commands[applied].apply(arrangement) {
                // Leave nothing half done.
                for command in self.commands[..applied].iter_mut().rev() {
                    command.undo(arrangement)?;
                }
                return Err(e);
            }
        }
        Ok(())
    }

    fn undo(&mut self, arrangement: &mut Arrangement) -> Result<(), ArrangementError> {
        for command in self.commands.iter_mut().rev() {
            command.undo(arrangement)?;
        }
        Ok(())
    }

    fn description(&self) -> &str {
        &self.description
    }
}

/// The undo stack. Commands before the cursor are applied, commands after it
/// have been undone and can be redone until something new is pushed.
#[derive(Default)]
pub struct History {
    commands: Vec<Box<dyn EditCommand>>,
    cursor: usize,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a command and records it. A command that fails to apply is not
    /// recorded. Anything that was undone is discarded.
    pub fn push(
        &mut self,
        mut command: Box<dyn EditCommand>,
        arrangement: &mut Arrangement,
    ) -> Result<(), ArrangementError> {
        command.apply(arrangement)?;
        let discarded = self.commands.len() - self.cursor;
        self.commands.truncate(self.cursor);
        debug!(
            command = command.description(),
            discarded, "Pushed edit onto history"
        );
        self.commands.push(command);
        self.cursor = self.commands.len();
        Ok(())
    }

    /// Reverts the most recent command, returning its description.
    pub fn undo(&mut self, arrangement: &mut Arrangement) -> Result<Option<String>, ArrangementError> {
        if !self.can_undo() {
            return Ok(None);
        }
        let command = &mut self.commands[self.cursor - 1];
        if let Err(e) = command.undo(arrangement) {
            error!(command = command.description(), err = %e, "Undo failed");
            return Err(e);
        }
        self.cursor -= 1;
        Ok(Some(command.description().to_string()))
    }

    /// Re-applies the most recently undone command, returning its description.
    pub fn redo(&mut self, arrangement: &mut Arrangement) -> Result<Option<String>, ArrangementError> {
        if !self.can_redo() {
            return Ok(None);
        }
        let command = &mut self.commands[self.cursor];
        if let Err(e) = command.apply(arrangement) {
            error!(command = command.description(), err = %e, "Redo failed");
            return Err(e);
        }
        self.cursor += 1;
        Ok(Some(command.description().to_string()))
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor < self.commands.len()
    }

    pub fn undo_description(&self) -> Option<&str> {
        self.cursor
            .checked_sub(1)
            .and_then(|i| self.commands.get(i))
            .map(|c| c.description())
    }

    pub fn redo_description(&self) -> Option<&str> {
        self.commands.get(self.cursor).map(|c| c.description())
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
        self.cursor = 0;
    }
}

impl fmt::Debug for History {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("History")
            .field(
                "commands",
                &self.commands.iter().map(|c| c.description()).collect::<Vec<_>>(),
            )
            .field("cursor", &self.cursor)
            .finish()
    }
}
