//! OpenJLC - Repackage Gerber bundles for LCEDA ordering
//!
//! A Gerber bundle exported by Altium Designer or KiCad is identified by its
//! board outline, classified role by role against a per-tool rule file,
//! renamed into the LCEDA layout with an EasyEDA header stamped on every
//! layer, and zipped under a name carrying the tool and copper layer count.
//! Bundles already in the LCEDA layout are passed through unchanged.

#![allow(non_snake_case)]

pub mod archive;
pub mod classify;
pub mod config;
pub mod error;
pub mod header;
pub mod job;
pub mod package;
pub mod pipeline;
pub mod progress;
pub mod rules;
pub mod stamp;
pub mod target;
pub mod workspace;
