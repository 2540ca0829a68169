#![deny(unused)]
//! Sandbox toolkit for Cellbox.
//!
//! Wires one [`cellbox_sandbox::Backend`] and one destination into a bundle
//! that answers repeated command, read, and write requests while bounding
//! how much raw output ever leaves the backend.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  Toolkit (destination, options)              │
//! │    ├─ ingest: inline map + directory globs   │
//! │    │    → batched writes into the sandbox    │
//! │    ├─ pipeline: hooks → cd injection →       │
//! │    │    direct or scripted execution →       │
//! │    │    truncation → response                │
//! │    └─ accessors: read_file / write_file      │
//! ├──────────────────────────────────────────────┤
//! │  invocation: replayable per-command log      │
//! │  script: quoting + generated shell scripts   │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use cellbox_sandbox::VirtualSandbox;
//! use cellbox_toolkit::{Toolkit, ToolkitOptions};
//!
//! let sandbox = VirtualSandbox::new()?;
//! let toolkit = Toolkit::new(sandbox, ToolkitOptions::default()).await?;
//!
//! let response = toolkit.run_command("ls -la", Some("tail -5")).await?;
//! println!("{}", response.stdout);
//! ```

pub mod ingest;
pub mod invocation;
pub mod pipeline;
pub mod script;
pub mod toolkit;
pub mod tools;

pub use ingest::{DirUpload, FileOrigin, IngestSources, PlannedFile};
pub use invocation::{InvocationLog, LOG_EXTENSION, STDERR_MARKER, STDOUT_MARKER};
pub use pipeline::{
    truncate_output, AfterHook, BeforeHook, CommandPipeline, ExecResponse, PipelineConfig,
};
pub use toolkit::{
    Toolkit, ToolkitOptions, DEFAULT_LOG_DIR, DEFAULT_MAX_FILES, DEFAULT_MAX_OUTPUT_LENGTH,
    WRITE_BATCH_SIZE,
};
pub use tools::{ReadFileTool, RunCommandTool, WriteFileTool};
