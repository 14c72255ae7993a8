// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

/// Represents errors that can occur while reclaiming segments.
#[derive(Debug)]
pub enum Error {
    /// I/O error reported by a collaborator (node/page/device layer)
    Io(std::io::Error),

    /// A collaborator reported a failure that isn't I/O (e.g. allocation
    /// failure for a twin encrypted page, a node lookup miss)
    Collaborator(String),

    /// No victim segment could be selected (empty or fully-ineligible
    /// dirty set)
    NoVictim,

    /// The filesystem is frozen for writes or has a latched checkpoint
    /// error; the round must abort
    FsFrozen,

    /// The filesystem is unmounting; the round must abort
    Unmounting,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReclaimError: {self:?}")
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// Reclaim engine result.
pub type Result<T> = std::result::Result<T, Error>;
