#![deny(unused)]
//! Sandbox backends for Cellbox.
//!
//! This crate defines the three-operation [`Sandbox`] contract (execute a
//! command, read a file, write a batch of files) and the backends that
//! implement it. The toolkit layer never talks to a backend directly; it only
//! sees the contract.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  Toolkit (pipeline, ingestion, accessors)   │
//! │    ↓ drives the contract                    │
//! ├─────────────────────────────────────────────┤
//! │  Sandbox: execute / read / write-batch      │
//! ├──────────────┬───────────────┬──────────────┤
//! │ Virtual      │ Remote        │ Custom       │
//! │ scratch dir  │ container via │ caller-      │
//! │ + host sh    │ Docker API    │ supplied     │
//! └──────────────┴───────────────┴──────────────┘
//! ```
//!
//! All three backends agree on exit-code semantics (0 = success) and report a
//! missing file as [`cellbox_core::Error::NotFound`], never as empty content.

pub mod engine;
pub mod overlay;
pub mod remote;

pub use engine::{Backend, BackendKind, CommandResult, FileEntry, MockSandbox, Sandbox};
pub use overlay::{VirtualSandbox, EXCLUDED_SCAN_DIRS};
pub use remote::{RemoteConfig, RemoteSandbox};
