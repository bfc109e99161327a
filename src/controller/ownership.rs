//! Ownership guard
//!
//! Templates and executions are bound to their request through a
//! controller owner reference. Anything carrying a different controller
//! reference belongs to someone else and is never mutated.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};

use crate::error::{BuildError, Result};
use crate::models::BuildRequest;
use crate::store::StoreError;

/// Who controls an object, relative to a given request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ownership {
    Owned,
    /// No controller reference at all
    Unowned,
    /// Controlled by another object, as `{kind}/{name}`
    Foreign(String),
}

impl Ownership {
    /// Owner label used in conflict reports
    pub fn owner(&self) -> &str {
        match self {
            Ownership::Owned => "this request",
            Ownership::Unowned => "nobody",
            Ownership::Foreign(owner) => owner,
        }
    }
}

/// Classify `obj` against the request identified by `owner_uid`
pub fn ownership_of<K: Resource>(obj: &K, owner_uid: &str) -> Ownership {
    let controller = obj
        .owner_references()
        .iter()
        .find(|r| r.controller == Some(true));
    match controller {
        Some(r) if r.uid == owner_uid => Ownership::Owned,
        Some(r) => Ownership::Foreign(format!("{}/{}", r.kind, r.name)),
        None => Ownership::Unowned,
    }
}

/// Uid of a request as persisted by the store
pub fn request_uid(request: &BuildRequest) -> Result<String> {
    request.uid().ok_or_else(|| {
        BuildError::BuildReconcileFailed(StoreError::Backend(format!(
            "BuildRequest {} has no uid",
            request.name_any()
        )))
    })
}

/// Controller reference pointing at the request
pub fn owner_reference(request: &BuildRequest) -> Result<OwnerReference> {
    request.controller_owner_ref(&()).ok_or_else(|| {
        BuildError::BuildReconcileFailed(StoreError::Backend(format!(
            "BuildRequest {} has no uid",
            request.name_any()
        )))
    })
}

/// Fail with `BuildConflict` unless the object is controlled by the request
pub fn ensure_owned<K: Resource>(obj: &K, owner_uid: &str, kind: &'static str) -> Result<()> {
    match ownership_of(obj, owner_uid) {
        Ownership::Owned => Ok(()),
        other => Err(BuildError::BuildConflict {
            kind,
            name: obj.name_any(),
            owner: other.owner().to_string(),
        }),
    }
}
