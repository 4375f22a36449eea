//! # deployment-state
//!
//! Persisted records of the resources a single-VM deployment owns.
//!
//! The state document tracks:
//! - the current VM (by provider CID, no history)
//! - every disk and stemcell that has been created and not yet deleted
//! - "current" pointers selecting the disk and stemcell in active use
//!
//! Records that are not referenced by a current pointer are orphans. They are
//! kept until they are deleted explicitly, which is what lets a teardown that
//! failed half way be re-run safely.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use deployment_state::{DiskRepo, FileStateService, StateService, UuidGenerator};
//!
//! let ids = Arc::new(UuidGenerator);
//! let service: Arc<dyn StateService> =
//!     Arc::new(FileStateService::new("/deployments/app-state.json", ids.clone()));
//!
//! let disks = DiskRepo::new(service.clone(), ids);
//! let record = disks.save("disk-cid", 1024, serde_json::Value::Null).unwrap();
//! disks.update_current(&record.id).unwrap();
//!
//! assert_eq!(disks.find_current().unwrap().unwrap().cid, "disk-cid");
//! ```
//!
//! ## Concurrency
//!
//! The state file has a single writer. Every mutation is a load, modify,
//! save cycle with no file locking, so two processes operating on the same
//! deployment at once are unsupported.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod id;
pub mod repo;
pub mod service;
pub mod types;

pub use error::{Error, Result};
pub use id::{IdGenerator, SequentialIdGenerator, UuidGenerator};
pub use repo::{DiskRepo, StemcellRepo, VmRepo};
pub use service::{FileStateService, MemoryStateService, StateService, state_path_for_manifest};
pub use types::{DeploymentState, DiskRecord, StemcellRecord};
