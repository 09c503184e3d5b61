//! corkboard — the posting and moderation core of an imageboard.
//!
//! The crate takes raw submissions into threaded boards, keeps the post
//! store and the rendered static pages consistent with each other, and
//! carries the moderation surface: delete, sticky, lock, report, and the
//! backup/restore archival cycle. HTTP framing, templates, staff
//! authentication, and the spam/ban/captcha oracles live outside and are
//! consumed through seams.
//!
//! The entry points are [`board::Core`] and [`board::Board`]: `submit`,
//! `delete`, `restore_backups`, `report`, and `rebuild_caches`.

pub mod assemble;
pub mod board;
pub mod cache;
pub mod config;
pub mod error;
pub mod files;
pub mod flood;
pub mod hooks;
pub mod models;
pub mod normalize;
pub mod schema;

pub use crate::board::{Board, Core};
pub use crate::config::Config;
pub use crate::error::{Error, Result};
