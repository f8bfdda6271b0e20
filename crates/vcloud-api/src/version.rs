// Version stamps and the read / mutate / resubmit discipline
//
// Mutable resources embed `"version": {"version": N}`. The server assigns the
// first stamp and bumps it on every successful mutation; the client only
// ever copies a stamp it was given back to the server.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Error;

/// Optimistic-concurrency stamp carried by a mutable resource.
///
/// There is no public constructor. A `Version` only comes from a decoded
/// server response and is passed back unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version {
    version: u64,
}

impl Version {
    pub fn get(self) -> u64 {
        self.version
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.version)
    }
}

/// A resource that embeds a version stamp.
pub trait Versioned {
    fn version(&self) -> Option<Version>;

    fn version_mut(&mut self) -> &mut Option<Version>;
}

// ── Snapshot ─────────────────────────────────────────────────────────

/// A resource as read, together with the stamp it was read at.
///
/// Mutate it through [`Snapshot::resource_mut`] and hand both halves of
/// [`Snapshot::into_parts`] to an update.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<T> {
    resource: T,
    version: Option<Version>,
}

impl<T: Versioned> Snapshot<T> {
    pub fn new(resource: T) -> Self {
        let version = resource.version();
        Self { resource, version }
    }

    /// Stamp the resource carried when it was read.
    pub fn version(&self) -> Option<Version> {
        self.version
    }

    pub fn resource(&self) -> &T {
        &self.resource
    }

    pub fn resource_mut(&mut self) -> &mut T {
        &mut self.resource
    }

    pub fn into_parts(self) -> (T, Option<Version>) {
        (self.resource, self.version)
    }
}

// ── Outgoing bodies ──────────────────────────────────────────────────

/// Check a resource about to be created. It must not carry a stamp.
pub fn prepare_create<T: Versioned>(resource: &T) -> Result<(), Error> {
    if let Some(version) = resource.version() {
        return Err(Error::VersionOnCreate(version));
    }
    debug!("create body carries no version stamp");
    Ok(())
}

/// Reconcile a resource about to be updated with the stamp it was read at.
///
/// A resource without a stamp receives `read`. A resource whose stamp
/// differs from `read` is rejected. With neither, the body goes out as is
/// and the server decides.
pub fn prepare_update<T: Versioned>(resource: &mut T, read: Option<Version>) -> Result<(), Error> {
    match (resource.version(), read) {
        (None, Some(version)) => {
            debug!(%version, "inserting read version into update body");
            *resource.version_mut() = Some(version);
            Ok(())
        }
        (Some(embedded), Some(version)) if embedded == version => {
            debug!(%version, "update body carries read version");
            Ok(())
        }
        (None, None) => {
            debug!("update body has no version stamp");
            Ok(())
        }
        (embedded, read) => Err(Error::VersionMismatch { read, embedded }),
    }
}
