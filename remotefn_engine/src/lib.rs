// SPDX-FileCopyrightText: © 2024 The remotefn authors
// SPDX-License-Identifier: MIT

pub mod convert;
pub mod demux;
pub mod invocation;
pub mod merge;
pub mod planner;
pub mod render;

pub use invocation::{EngineContext, Invocation};
