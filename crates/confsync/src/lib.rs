//! Hot-reloadable, schema-validated configuration sets.
//!
//! Sources (a directory tree, a Kubernetes ConfigMap, ...) report whole-file
//! changes; each file is validated as a unit and reconciled into an
//! item-level state, and the resulting add/update/moved/remove actions are
//! broadcast to subscribers.

pub mod broadcast;
pub mod config;
pub mod error;
pub mod reconcile;
pub mod service;
pub mod source;
pub mod validation;

pub use broadcast::{ActionBroadcaster, Notice, NoticeBroadcaster, NoticeKind};
pub use config::{load_config, SourceConfig, SyncConfig};
pub use error::{Result, SyncError};
pub use reconcile::{Action, ConfigSet, Reassignment, Reconciler};
pub use service::{ConfigItem, ConfigSync};
pub use source::{
    ChangeKind, ChannelSourceDriver, ConfigFileChange, FileSourceDriver, ResourceClient,
    ResourceSourceDriver, SourceDriver,
};
pub use validation::{JsonSchemaValidator, ValidationPipeline, YamlParser};
