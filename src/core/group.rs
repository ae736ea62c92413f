//! Role membership: a copy-on-write list of backend handles
use crate::core::{Backend, BackendHandle, Construction, IdentityKey};
use crate::error::SwitchyardError;
use crate::routing::Role;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared, immutable snapshot of a group's members
pub type Members<B> = Arc<Vec<Arc<BackendHandle<B>>>>;

/// The backends serving one role
///
/// The member list is only ever replaced wholesale, so a reader holding a
/// snapshot never sees a half-applied update. The lock is held just long
/// enough to clone or swap the snapshot pointer.
pub struct Group<B: Backend> {
    role: Role,
    members: RwLock<Members<B>>,
}

/// Result of one membership update
pub struct MembershipChange<B: Backend> {
    /// Construction errors of rejected candidates
    pub errors: Vec<SwitchyardError>,
    /// Handles no longer referenced by the group, to be closed later
    pub retired: Vec<Arc<BackendHandle<B>>>,
    /// Whether the member list was replaced
    pub swapped: bool,
    /// Member count after the update
    pub size: usize,
}

impl<B: Backend> Group<B> {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            members: RwLock::new(Arc::new(Vec::new())),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Current member snapshot
    pub async fn members(&self) -> Members<B> {
        Arc::clone(&*self.members.read().await)
    }

    pub async fn len(&self) -> usize {
        self.members.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.members.read().await.is_empty()
    }

    /// Replace the membership with `candidates`
    ///
    /// Failed constructions are reported and left out. A candidate whose
    /// identity key matches a current member keeps that key in the group;
    /// the candidate instance is the one admitted. Current members whose key
    /// is gone, or whose instance was replaced by a different one with the
    /// same key, are returned as retired. Nothing is swapped when the
    /// admitted list is identical to the current one.
    ///
    /// Callers must serialize updates of the same group.
    pub async fn update(&self, candidates: Vec<Construction<B>>) -> MembershipChange<B> {
        let current = self.members().await;

        let mut retiring: HashMap<IdentityKey, Arc<BackendHandle<B>>> = current
            .iter()
            .map(|handle| (handle.key().clone(), Arc::clone(handle)))
            .collect();
        let mut seen = HashSet::new();
        let mut admitted = Vec::with_capacity(candidates.len());
        let mut displaced = Vec::new();
        let mut errors = Vec::new();

        for candidate in candidates {
            let handle = match candidate {
                Ok(handle) => handle,
                Err(e) => {
                    tracing::warn!(role = %self.role, error = %e, "broken backend not admitted");
                    errors.push(e);
                    continue;
                }
            };

            if !seen.insert(handle.key().clone()) {
                continue;
            }

            if let Some(previous) = retiring.remove(handle.key()) {
                if !Arc::ptr_eq(&previous, &handle) {
                    displaced.push(previous);
                }
            }
            admitted.push(handle);
        }

        let unchanged = admitted.len() == current.len()
            && admitted
                .iter()
                .zip(current.iter())
                .all(|(new, old)| Arc::ptr_eq(new, old));
        if unchanged {
            return MembershipChange {
                errors,
                retired: Vec::new(),
                swapped: false,
                size: current.len(),
            };
        }

        let size = admitted.len();
        {
            let mut members = self.members.write().await;
            *members = Arc::new(admitted);
        }

        let mut retired: Vec<_> = retiring.into_values().collect();
        retired.extend(displaced);

        tracing::info!(
            role = %self.role,
            members = size,
            retired = retired.len(),
            "group membership replaced"
        );

        MembershipChange {
            errors,
            retired,
            swapped: true,
            size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::InstanceRegistry;
    use crate::testutil::{settings, MockBackend, MockFactory};

    async fn build(
        registry: &InstanceRegistry<MockBackend>,
        factory: &MockFactory,
        names: &[&str],
    ) -> Vec<Construction<MockBackend>> {
        let mut out = Vec::new();
        for (i, name) in names.iter().enumerate() {
            let address = format!("10.0.0.{}:3306", i + 1);
            let address = if *name == "broken" { "10.0.0.99:3306".to_string() } else { address };
            out.push(registry.construct(factory, &settings(name, &address)).await);
        }
        out
    }

    fn names(members: &Members<MockBackend>) -> Vec<String> {
        members.iter().map(|h| h.name().to_string()).collect()
    }

    #[tokio::test]
    async fn test_initial_membership() {
        let registry = InstanceRegistry::new();
        let factory = MockFactory::new();
        let group = Group::new(Role::Write);
        assert!(group.is_empty().await);

        let change = group.update(build(&registry, &factory, &["a", "b"]).await).await;

        assert!(change.swapped);
        assert!(change.retired.is_empty());
        assert_eq!(change.size, 2);
        assert_eq!(names(&group.members().await), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_identical_update_is_noop() {
        let registry = InstanceRegistry::new();
        let factory = MockFactory::new();
        let group = Group::new(Role::Read);

        group.update(build(&registry, &factory, &["a", "b"]).await).await;
        let before = group.members().await;

        let change = group.update(build(&registry, &factory, &["a", "b"]).await).await;

        assert!(!change.swapped);
        assert!(change.retired.is_empty());
        assert!(Arc::ptr_eq(&before, &group.members().await));
        assert_eq!(factory.opens(), 2);
    }

    #[tokio::test]
    async fn test_partial_swap_retires_removed_only() {
        let registry = InstanceRegistry::new();
        let factory = MockFactory::new();
        let group = Group::new(Role::Write);

        let first = build(&registry, &factory, &["a", "b"]).await;
        let b = first[1].as_ref().unwrap().clone();
        group.update(first).await;

        let a = registry
            .construct(&factory, &settings("a", "10.0.0.1:3306"))
            .await
            .unwrap();
        let b_again = registry
            .construct(&factory, &settings("b", "10.0.0.2:3306"))
            .await
            .unwrap();
        let c = registry
            .construct(&factory, &settings("c", "10.0.0.3:3306"))
            .await
            .unwrap();

        let change = group.update(vec![Ok(b_again), Ok(c)]).await;

        assert!(change.swapped);
        assert_eq!(change.retired.len(), 1);
        assert!(Arc::ptr_eq(&change.retired[0], &a));

        let members = group.members().await;
        assert_eq!(names(&members), vec!["b", "c"]);
        assert!(Arc::ptr_eq(&members[0], &b));
        assert!(!b.is_closed());
    }

    #[tokio::test]
    async fn test_broken_candidate_excluded() {
        let registry = InstanceRegistry::new();
        let factory = MockFactory::new().failing("10.0.0.99:3306");
        let group = Group::new(Role::Write);

        let change = group.update(build(&registry, &factory, &["a", "broken"]).await).await;

        assert_eq!(change.errors.len(), 1);
        assert_eq!(change.size, 1);
        assert_eq!(names(&group.members().await), vec!["a"]);
    }

    #[tokio::test]
    async fn test_empty_update_retires_everything() {
        let registry = InstanceRegistry::new();
        let factory = MockFactory::new();
        let group = Group::new(Role::Gray);
        group.update(build(&registry, &factory, &["a"]).await).await;

        let change = group.update(Vec::new()).await;

        assert!(change.swapped);
        assert_eq!(change.retired.len(), 1);
        assert!(group.is_empty().await);
        // retirement only schedules; closing is not the group's job
        assert!(!change.retired[0].is_closed());
    }

    #[tokio::test]
    async fn test_duplicate_candidates_collapsed() {
        let registry = InstanceRegistry::new();
        let factory = MockFactory::new();
        let group = Group::new(Role::Write);

        let a = registry
            .construct(&factory, &settings("a", "10.0.0.1:3306"))
            .await
            .unwrap();
        group.update(vec![Ok(Arc::clone(&a)), Ok(a)]).await;

        assert_eq!(group.len().await, 1);
    }
}
