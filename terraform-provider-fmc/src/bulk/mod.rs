//! Bulk reconciliation of child items
//!
//! Several FMC resources manage a whole collection of objects from one
//! Terraform resource. They share this engine:
//!
//! * [`diff`] classifies items into delete / update / create
//! * [`batch`] groups deletes and creates under FMC's bulk limits
//! * [`reconcile`] issues the calls and keeps a running state that
//!   survives partial failure
//! * [`ordered`] does the same for positional lists such as rules

pub mod batch;
pub mod diff;
pub mod ordered;
pub mod reconcile;

pub use batch::{batches, BatchLimits, BULK_CREATE_LIMITS, BULK_DELETE_LIMITS, ID_FILTER_PREFIX};
pub use diff::{carry_ids, diff_items, item_id, items_from_value, items_to_value, ChangeSet, ItemMap};
pub use ordered::{diff_ordered, plan_ordered, reconcile_ordered, OrderedChanges};
pub use reconcile::{delete_all, ids_by_name, reconcile, BulkApi, PartialFailure};
