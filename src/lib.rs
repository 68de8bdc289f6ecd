// src/lib.rs

//! mpd-kitchen: recipe-driven installer and verifier for the Music Player Daemon
//!
//! Takes a declarative recipe for MPD (or any meson-built daemon), resolves
//! its dependencies, drives the build through a fixed feature matrix,
//! installs the result into a prefix, registers it with the host's process
//! supervisor and smoke-tests it over TCP.
//!
//! # Architecture
//!
//! - Recipes: TOML, parsed once and never mutated
//! - Kitchen: strictly sequential resolve -> plan -> build -> install -> register
//! - Seams: dependency resolution, build execution, process supervision and
//!   daemon launching are traits, so each stage can run against fakes
//! - Platform quirks: a strategy table evaluated once when planning

mod error;
pub mod livecheck;
pub mod mpdconf;
pub mod platform;
pub mod recipe;
pub mod service;
pub mod verify;

pub use error::{Error, Result};
pub use platform::{OsFamily, Platform};
pub use recipe::{Cook, CookResult, Kitchen, KitchenConfig, Recipe};
pub use service::{ProcessSupervisor, ServiceDescriptor};
pub use verify::{Verifier, VerifyReport, VerifyState};
