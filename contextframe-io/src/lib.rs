// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The ContextFrame Authors

//! Storage backend abstraction (§6.4): a minimal object-store interface
//! (`put_if_absent`, `get_range`, `list_prefix`, `delete`,
//! `atomic_rename_or_cas`) plus the external commit-lock adapter for
//! backends that cannot provide atomic rename natively.

pub mod commit;
pub mod object_store;

pub use commit::{CommitLock, CommitLockGuard, InMemoryCommitLock};
pub use object_store::{AtomicRenameSupport, FrameObjectStore, ObjectStoreParams};
