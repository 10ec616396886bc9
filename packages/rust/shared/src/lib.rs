//! Shared types, error model, and configuration for ThreadSync.
//!
//! This crate is the foundation depended on by all other ThreadSync crates.
//! It provides:
//! - [`ThreadSyncError`] — the unified error type
//! - Domain types ([`Node`], [`Annotation`], [`Thread`], [`TargetRecord`],
//!   [`WorkItem`], [`SyncReport`])
//! - Prefix classification ([`classify`], [`AnnotationClass`])
//! - Configuration ([`AppConfig`], [`SyncConfig`], config loading)

pub mod classify;
pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use classify::{AnnotationClass, classify, split_prefixed};
pub use config::{
    ApiConfig, AppConfig, DocumentEntry, NotifyConfig, StoreConfig, SyncConfig,
    SyncDefaultsConfig, config_dir, config_file_path, init_config, load_config,
    load_config_from, resolve_api_token, validate_sync_targets,
};
pub use error::{Result, ThreadSyncError};
pub use types::{
    Annotation, Author, Block, DiscussionId, DocStatus, DocumentRef, NewWorkItem, Node,
    NodeKind, Notification, SyncReport, TargetRecord, Thread, WorkCategory, WorkItem,
    WorkStatus,
};
