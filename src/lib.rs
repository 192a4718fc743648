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
//! Beat slicing: onset and beat detection, a non-destructive slice arrangement
//! with undo, and pitched polyphonic playback of the slices.
pub mod arrangement;
pub mod audio;
pub mod config;
pub mod detection;
pub mod editor;
pub mod history;
pub mod sampler;

#[cfg(test)]
mod testutil;
