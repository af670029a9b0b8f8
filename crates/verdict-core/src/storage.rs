//! Tagged, transactional policy storage.
//!
//! A [`PolicyStorage`] is an immutable snapshot: an optional version tag,
//! the attribute dictionary and the root evaluable. Updates run inside a
//! [`PolicyStorageTransaction`] which edits a working copy by
//! copy-on-write and commits a new snapshot; the original storage keeps
//! evaluating exactly as before. Optimistic concurrency rides on the
//! tags: a transaction bound to a stale tag fails at apply time and never
//! commits.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::attr::Attribute;
use crate::policy_set::{Evaluable, PolicyItem};

/// Error raised by storage and transaction operations.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum StorageError {
    /// The storage carries no tag and is frozen against updates.
    #[error("can't modify policies with no tag")]
    UntaggedPolicyModification,

    /// The caller supplied no tag for a tagged storage.
    #[error("update has no previous policy tag")]
    MissingPolicyTag,

    /// The supplied tag does not match the storage or transaction tag.
    #[error("update tag {update} doesn't match policies tag {storage}")]
    PolicyTagsNotMatch {
        /// Tag held by the storage or transaction.
        storage: Uuid,
        /// Tag supplied by the update.
        update: Uuid,
    },

    /// The transaction already failed and refuses further work.
    #[error("transaction {tag} failed and can't be applied or committed: {source}")]
    FailedPolicyTransaction {
        /// The transaction's tag.
        tag: Uuid,
        /// The error that made the transaction sticky.
        source: Box<StorageError>,
    },

    /// The first path element does not name the root.
    #[error("root policy is {actual:?} but update refers to {expected:?}")]
    InvalidRootPolicy {
        /// Id the update referred to.
        expected: String,
        /// Description of the actual root.
        actual: String,
    },

    /// A delete command carried an empty path.
    #[error("can't delete root policy with no path")]
    EmptyPathModification,

    /// No child of a policy set has the named id.
    #[error("policy set has no child policy or policy set with id {id:?}")]
    MissingPolicySetChild {
        /// The id that did not resolve.
        id: String,
    },

    /// No rule of a policy has the named id.
    #[error("policy has no rule with id {id:?}")]
    MissingPolicyChild {
        /// The id that did not resolve.
        id: String,
    },

    /// A hidden evaluable cannot become the root.
    #[error("can't append hidden policy or policy set to root")]
    HiddenRootPolicyAppend,

    /// A hidden policy or policy set cannot be appended to a set.
    #[error("can't append hidden policy or policy set to policy set")]
    HiddenPolicyAppend,

    /// A hidden rule cannot be appended to a policy.
    #[error("can't append hidden rule to policy")]
    HiddenRuleAppend,

    /// A hidden policy set cannot be modified.
    #[error("can't modify hidden policy set")]
    HiddenPolicySetModification,

    /// A hidden policy cannot be modified.
    #[error("can't modify hidden policy")]
    HiddenPolicyModification,

    /// The root can only be replaced by a policy or policy set.
    #[error("expected policy or policy set as new root but got {actual}")]
    InvalidRootPolicyItemType {
        /// Kind of the rejected entity.
        actual: &'static str,
    },

    /// A policy set can only hold policies and policy sets.
    #[error("expected policy or policy set to append to policy set but got {actual}")]
    InvalidPolicySetItemType {
        /// Kind of the rejected entity.
        actual: &'static str,
    },

    /// A policy can only hold rules.
    #[error("expected rule to append to policy but got {actual}")]
    InvalidPolicyItemType {
        /// Kind of the rejected entity.
        actual: &'static str,
    },

    /// A decoded update command carried an unknown operation code.
    #[error("unknown policy update operation {op}")]
    UnknownPolicyUpdateOperation {
        /// The unrecognized code.
        op: u8,
    },

    /// A policy set delete needs at least one path element.
    #[error("path to policy set modification is too short")]
    TooShortPathPolicySetModification,

    /// A policy delete needs exactly one path element.
    #[error("path to policy modification is too short")]
    TooShortPathPolicyModification,

    /// The path descends below a rule level.
    #[error("path to policy modification is too long, {id:?} is not expected")]
    TooLongPathPolicyModification {
        /// The first surplus path element.
        id: String,
    },

    /// A command inside an update failed.
    #[error("command {index}: {source}")]
    Command {
        /// Zero-based position of the failing command.
        index: usize,
        /// The command's error.
        source: Box<StorageError>,
    },
}

/// Operation of a policy update command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOp {
    /// Insert or replace an entity under a path.
    Add,
    /// Remove the entity addressed by a path.
    Delete,
}

impl UpdateOp {
    /// Lookup by the lower-case identifier used by control front-ends.
    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "add" => Some(Self::Add),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }

    /// The operation's wire code.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Add => 0,
            Self::Delete => 1,
        }
    }

    /// Decodes an operation from its wire code.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::UnknownPolicyUpdateOperation`] for any
    /// other code.
    pub const fn from_code(op: u8) -> Result<Self, StorageError> {
        match op {
            0 => Ok(Self::Add),
            1 => Ok(Self::Delete),
            op => Err(StorageError::UnknownPolicyUpdateOperation { op }),
        }
    }
}

impl fmt::Display for UpdateOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Add => "Add",
            Self::Delete => "Delete",
        })
    }
}

#[derive(Debug, Clone)]
struct Command {
    op: UpdateOp,
    path: Vec<String>,
    entity: Option<PolicyItem>,
}

/// Ordered list of commands moving storage from one tag to another.
#[derive(Debug, Clone)]
pub struct PolicyUpdate {
    old_tag: Uuid,
    new_tag: Uuid,
    cmds: Vec<Command>,
}

impl PolicyUpdate {
    /// Creates an empty update between two tags.
    #[must_use]
    pub fn new(old_tag: Uuid, new_tag: Uuid) -> Self {
        Self {
            old_tag,
            new_tag,
            cmds: Vec::new(),
        }
    }

    /// Appends a command.
    ///
    /// Add commands carry the entity to insert; delete commands pass
    /// `None`.
    pub fn push(&mut self, op: UpdateOp, path: Vec<String>, entity: Option<PolicyItem>) {
        self.cmds.push(Command { op, path, entity });
    }

    /// The tag this update expects the storage to carry.
    #[must_use]
    pub const fn old_tag(&self) -> Uuid {
        self.old_tag
    }

    /// The tag the storage carries after this update.
    #[must_use]
    pub const fn new_tag(&self) -> Uuid {
        self.new_tag
    }
}

/// Immutable snapshot of the policy tree with its attribute dictionary.
#[derive(Debug, Clone)]
pub struct PolicyStorage {
    tag: Option<Uuid>,
    attrs: Arc<HashMap<String, Attribute>>,
    root: Option<Evaluable>,
}

impl PolicyStorage {
    /// Creates a snapshot.
    ///
    /// A storage without a tag is frozen: no transaction can be opened
    /// against it.
    #[must_use]
    pub fn new(
        root: Evaluable,
        attrs: HashMap<String, Attribute>,
        tag: Option<Uuid>,
    ) -> Self {
        Self {
            tag,
            attrs: Arc::new(attrs),
            root: Some(root),
        }
    }

    /// Creates a snapshot with no policies at all.
    #[must_use]
    pub fn empty(tag: Option<Uuid>) -> Self {
        Self {
            tag,
            attrs: Arc::new(HashMap::new()),
            root: None,
        }
    }

    /// The snapshot's tag, if any.
    #[must_use]
    pub const fn tag(&self) -> Option<Uuid> {
        self.tag
    }

    /// A copy of the attribute dictionary.
    #[must_use]
    pub fn attributes(&self) -> HashMap<String, Attribute> {
        self.attrs.as_ref().clone()
    }

    /// The root evaluable, if any policy is installed.
    #[must_use]
    pub const fn root(&self) -> Option<&Evaluable> {
        self.root.as_ref()
    }

    /// Validates a caller-supplied tag against the snapshot's tag.
    ///
    /// # Errors
    ///
    /// [`StorageError::UntaggedPolicyModification`] when the storage is
    /// frozen, [`StorageError::MissingPolicyTag`] when the caller gave
    /// none and [`StorageError::PolicyTagsNotMatch`] on mismatch.
    pub fn check_tag(&self, tag: Option<&Uuid>) -> Result<(), StorageError> {
        let Some(own) = self.tag else {
            return Err(StorageError::UntaggedPolicyModification);
        };

        let Some(tag) = tag else {
            return Err(StorageError::MissingPolicyTag);
        };

        if own != *tag {
            return Err(StorageError::PolicyTagsNotMatch {
                storage: own,
                update: *tag,
            });
        }

        Ok(())
    }

    /// Opens a transaction bound to the given tag.
    ///
    /// # Errors
    ///
    /// Propagates [`check_tag`](Self::check_tag) failures.
    pub fn new_transaction(&self, tag: &Uuid) -> Result<PolicyStorageTransaction, StorageError> {
        self.check_tag(Some(tag))?;

        Ok(PolicyStorageTransaction {
            tag: *tag,
            attrs: Arc::clone(&self.attrs),
            root: self.root.clone(),
            err: None,
        })
    }
}

/// Working copy of a storage edited by update commands.
///
/// The first failing command makes the transaction sticky: every further
/// apply and the final commit fail with
/// [`StorageError::FailedPolicyTransaction`].
#[derive(Debug)]
pub struct PolicyStorageTransaction {
    tag: Uuid,
    attrs: Arc<HashMap<String, Attribute>>,
    root: Option<Evaluable>,
    err: Option<StorageError>,
}

impl PolicyStorageTransaction {
    /// The tag the transaction currently carries.
    #[must_use]
    pub const fn tag(&self) -> Uuid {
        self.tag
    }

    /// Applies an update, command by command, in order.
    ///
    /// On success the transaction adopts the update's new tag.
    ///
    /// # Errors
    ///
    /// Fails when the transaction is sticky, when the update's old tag
    /// does not match, or when a command fails; command failures are
    /// wrapped with the command's position and recorded as the sticky
    /// error.
    pub fn apply(&mut self, update: &PolicyUpdate) -> Result<(), StorageError> {
        if let Some(err) = &self.err {
            return Err(StorageError::FailedPolicyTransaction {
                tag: self.tag,
                source: Box::new(err.clone()),
            });
        }

        if self.tag != update.old_tag {
            return Err(StorageError::PolicyTagsNotMatch {
                storage: self.tag,
                update: update.old_tag,
            });
        }

        for (i, cmd) in update.cmds.iter().enumerate() {
            if let Err(err) = self.apply_cmd(cmd) {
                self.err = Some(err.clone());
                return Err(StorageError::Command {
                    index: i,
                    source: Box::new(err),
                });
            }
        }

        self.tag = update.new_tag;
        Ok(())
    }

    /// Produces the new snapshot.
    ///
    /// The snapshot shares the attribute dictionary with its ancestors;
    /// the storage the transaction was opened on is untouched.
    ///
    /// # Errors
    ///
    /// Fails with [`StorageError::FailedPolicyTransaction`] when the
    /// transaction is sticky.
    pub fn commit(self) -> Result<PolicyStorage, StorageError> {
        if let Some(err) = self.err {
            return Err(StorageError::FailedPolicyTransaction {
                tag: self.tag,
                source: Box::new(err),
            });
        }

        Ok(PolicyStorage {
            tag: Some(self.tag),
            attrs: self.attrs,
            root: self.root,
        })
    }

    fn apply_cmd(&mut self, cmd: &Command) -> Result<(), StorageError> {
        match cmd.op {
            UpdateOp::Add => {
                let entity = cmd
                    .entity
                    .as_ref()
                    .ok_or(StorageError::InvalidRootPolicyItemType { actual: "nothing" })?;
                self.append_item(&cmd.path, entity)
            }
            UpdateOp::Delete => self.delete_item(&cmd.path),
        }
    }

    fn check_root(&self, id: &str) -> Result<Evaluable, StorageError> {
        let root = self
            .root
            .as_ref()
            .ok_or_else(|| StorageError::InvalidRootPolicy {
                expected: id.to_string(),
                actual: "no policy".to_string(),
            })?;

        if let Some(root_id) = root.id() {
            if root_id != id {
                return Err(StorageError::InvalidRootPolicy {
                    expected: id.to_string(),
                    actual: root_id.to_string(),
                });
            }
        }

        Ok(root.clone())
    }

    fn append_item(&mut self, path: &[String], entity: &PolicyItem) -> Result<(), StorageError> {
        let Some((first, rest)) = path.split_first() else {
            let Some(root) = entity.as_evaluable() else {
                return Err(StorageError::InvalidRootPolicyItemType {
                    actual: entity.kind_name(),
                });
            };

            if root.id().is_none() {
                return Err(StorageError::HiddenRootPolicyAppend);
            }

            self.root = Some(root);
            return Ok(());
        };

        let root = self.check_root(first)?;
        self.root = Some(root.append(rest, entity)?);
        Ok(())
    }

    fn delete_item(&mut self, path: &[String]) -> Result<(), StorageError> {
        let Some((first, rest)) = path.split_first() else {
            return Err(StorageError::EmptyPathModification);
        };

        let root = self.check_root(first)?;
        if rest.is_empty() {
            self.root = None;
            return Ok(());
        }

        self.root = Some(root.delete(rest)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combiners::Combiner;
    use crate::context::Context;
    use crate::policy::Policy;
    use crate::policy_set::PolicySet;
    use crate::response::{Effect, RuleEffect};
    use crate::rule::Rule;

    fn leaf_policy(id: &str, effect: RuleEffect) -> Policy {
        Policy::new(
            id,
            vec![Rule::hidden(effect)],
            Combiner::FirstApplicableEffect,
        )
    }

    fn tagged_storage(tag: Uuid) -> PolicyStorage {
        let root = PolicySet::new(
            "root",
            vec![leaf_policy("u", RuleEffect::Permit).into()],
            Combiner::FirstApplicableEffect,
        );
        PolicyStorage::new(root.into(), HashMap::new(), Some(tag))
    }

    fn effect_of(storage: &PolicyStorage) -> Effect {
        storage
            .root()
            .map_or(Effect::NotApplicable, |r| {
                r.calculate(&Context::empty()).effect
            })
    }

    #[test]
    fn check_tag_errors() {
        let tag = Uuid::new_v4();
        let storage = tagged_storage(tag);

        assert!(storage.check_tag(Some(&tag)).is_ok());
        assert!(matches!(
            storage.check_tag(None),
            Err(StorageError::MissingPolicyTag)
        ));
        let other = Uuid::new_v4();
        assert!(matches!(
            storage.check_tag(Some(&other)),
            Err(StorageError::PolicyTagsNotMatch { .. })
        ));

        let frozen = PolicyStorage::empty(None);
        assert!(matches!(
            frozen.check_tag(Some(&tag)),
            Err(StorageError::UntaggedPolicyModification)
        ));
    }

    #[test]
    fn transactional_delete_leaves_original_snapshot_intact() {
        let t0 = Uuid::new_v4();
        let t1 = Uuid::new_v4();
        let storage = tagged_storage(t0);

        let mut update = PolicyUpdate::new(t0, t1);
        update.push(
            UpdateOp::Delete,
            vec!["root".to_string(), "u".to_string()],
            None,
        );

        let mut tx = storage.new_transaction(&t0).unwrap();
        tx.apply(&update).unwrap();
        let committed = tx.commit().unwrap();

        assert_eq!(committed.tag(), Some(t1));
        assert_eq!(effect_of(&committed), Effect::NotApplicable);
        // The prior snapshot still evaluates exactly as before.
        assert_eq!(effect_of(&storage), Effect::Permit);
    }

    #[test]
    fn stale_tag_fails_at_apply() {
        let t0 = Uuid::new_v4();
        let storage = tagged_storage(t0);
        let mut tx = storage.new_transaction(&t0).unwrap();

        let stale = PolicyUpdate::new(Uuid::new_v4(), Uuid::new_v4());
        assert!(matches!(
            tx.apply(&stale),
            Err(StorageError::PolicyTagsNotMatch { .. })
        ));
    }

    #[test]
    fn failed_command_makes_transaction_sticky() {
        let t0 = Uuid::new_v4();
        let t1 = Uuid::new_v4();
        let storage = tagged_storage(t0);
        let mut tx = storage.new_transaction(&t0).unwrap();

        let mut bad = PolicyUpdate::new(t0, t1);
        bad.push(
            UpdateOp::Delete,
            vec!["root".to_string(), "nope".to_string()],
            None,
        );

        let err = tx.apply(&bad).unwrap_err();
        assert_eq!(
            err.to_string(),
            "command 0: policy set has no child policy or policy set with id \"nope\""
        );

        // Both further applies and commit refuse.
        let good = PolicyUpdate::new(t0, t1);
        assert!(matches!(
            tx.apply(&good),
            Err(StorageError::FailedPolicyTransaction { .. })
        ));
        assert!(matches!(
            tx.commit(),
            Err(StorageError::FailedPolicyTransaction { .. })
        ));
    }

    #[test]
    fn root_replacement_and_root_id_check() {
        let t0 = Uuid::new_v4();
        let t1 = Uuid::new_v4();
        let storage = tagged_storage(t0);

        let mut update = PolicyUpdate::new(t0, t1);
        update.push(
            UpdateOp::Add,
            Vec::new(),
            Some(PolicyItem::from(leaf_policy("other", RuleEffect::Deny))),
        );

        let mut tx = storage.new_transaction(&t0).unwrap();
        tx.apply(&update).unwrap();
        let committed = tx.commit().unwrap();
        assert_eq!(effect_of(&committed), Effect::Deny);

        // A path must start at the (new) root id.
        let t2 = Uuid::new_v4();
        let mut wrong = PolicyUpdate::new(t1, t2);
        wrong.push(
            UpdateOp::Add,
            vec!["root".to_string()],
            Some(PolicyItem::from(Rule::new("r", RuleEffect::Permit))),
        );
        let mut tx = committed.new_transaction(&t1).unwrap();
        let err = tx.apply(&wrong).unwrap_err();
        assert!(err.to_string().contains("root policy is \"other\""));
    }

    #[test]
    fn hidden_root_replacement_is_rejected() {
        let t0 = Uuid::new_v4();
        let storage = tagged_storage(t0);
        let mut tx = storage.new_transaction(&t0).unwrap();

        let mut update = PolicyUpdate::new(t0, Uuid::new_v4());
        update.push(
            UpdateOp::Add,
            Vec::new(),
            Some(PolicyItem::from(Policy::hidden(
                Vec::new(),
                Combiner::FirstApplicableEffect,
            ))),
        );

        let err = tx.apply(&update).unwrap_err();
        assert!(err.to_string().contains("hidden policy"));
    }

    #[test]
    fn empty_delete_path_is_rejected() {
        let t0 = Uuid::new_v4();
        let storage = tagged_storage(t0);
        let mut tx = storage.new_transaction(&t0).unwrap();

        let mut update = PolicyUpdate::new(t0, Uuid::new_v4());
        update.push(UpdateOp::Delete, Vec::new(), None);

        let err = tx.apply(&update).unwrap_err();
        assert_eq!(
            err.to_string(),
            "command 0: can't delete root policy with no path"
        );
    }

    #[test]
    fn update_composition_matches_sequential_applies() {
        let t0 = Uuid::new_v4();
        let t1 = Uuid::new_v4();
        let t2 = Uuid::new_v4();
        let storage = tagged_storage(t0);

        let add_cmd = |u: &mut PolicyUpdate| {
            u.push(
                UpdateOp::Add,
                vec!["root".to_string()],
                Some(PolicyItem::from(leaf_policy("v", RuleEffect::Deny))),
            );
        };
        let del_cmd = |u: &mut PolicyUpdate| {
            u.push(
                UpdateOp::Delete,
                vec!["root".to_string(), "u".to_string()],
                None,
            );
        };

        // Two updates applied in sequence.
        let mut u1 = PolicyUpdate::new(t0, t1);
        add_cmd(&mut u1);
        let mut u2 = PolicyUpdate::new(t1, t2);
        del_cmd(&mut u2);

        let mut tx = storage.new_transaction(&t0).unwrap();
        tx.apply(&u1).unwrap();
        tx.apply(&u2).unwrap();
        let sequential = tx.commit().unwrap();

        // One update carrying the composed command list.
        let mut composed = PolicyUpdate::new(t0, t2);
        add_cmd(&mut composed);
        del_cmd(&mut composed);

        let mut tx = storage.new_transaction(&t0).unwrap();
        tx.apply(&composed).unwrap();
        let combined = tx.commit().unwrap();

        assert_eq!(sequential.tag(), combined.tag());
        assert_eq!(effect_of(&sequential), effect_of(&combined));
        assert_eq!(effect_of(&sequential), Effect::Deny);
    }

    #[test]
    fn update_op_codes() {
        assert_eq!(UpdateOp::from_key("add"), Some(UpdateOp::Add));
        assert_eq!(UpdateOp::from_key("delete"), Some(UpdateOp::Delete));
        assert_eq!(UpdateOp::from_key("rename"), None);
        assert_eq!(UpdateOp::from_code(1).unwrap(), UpdateOp::Delete);
        assert!(matches!(
            UpdateOp::from_code(9),
            Err(StorageError::UnknownPolicyUpdateOperation { op: 9 })
        ));
        assert_eq!(UpdateOp::Add.to_string(), "Add");
    }
}
