//! File deployment engine.
//!
//! Rule-driven copy and install of files, symlinks and directory trees,
//! verified HTTP(S)/file transfers, and scoped advisory path locks, all
//! driven by keyword-argument invocations.
//!
//! The public API is organised into layers:
//!
//! - **[`rules`]**, **[`permissions`]**, **[`platform`]**: match rules, mode
//!   bits and the immutable platform description they are resolved against
//! - **[`copier`]**, **[`transfer`]**, **[`lock`]**: the engines, each with a
//!   keyword parser producing an immutable invocation value
//! - **[`session`]**, **[`config`]**: run-scoped variables, locks and settings
//! - **[`commands`]**: top-level subcommand orchestration (`copy`, `install`,
//!   `download`, `upload`, `lock`)
#![deny(clippy::or_fun_call)]
#![deny(clippy::bool_to_int_with_if)]

pub mod cli;
pub mod commands;
pub mod config;
pub mod copier;
pub mod error;
pub mod exec;
pub mod lock;
pub mod logging;
pub mod permissions;
pub mod platform;
pub mod rules;
pub mod session;
pub mod transfer;
