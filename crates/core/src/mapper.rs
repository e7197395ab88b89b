//! Namespace mapper
//!
//! Converts flat key listings into a [`VirtualTree`] and resolves tree nodes
//! back to the backend container and key they stand for.
//!
//! For example the keys
//!
//! ```text
//! vdir1/vdir2/blob1
//! vdir1/blob2
//! vdir1/vdir3/blob3
//! blob4
//! ```
//!
//! become a container `vdir1` (holding `blob2`, `vdir2/blob1`, `vdir3/blob3`)
//! next to a blob `blob4`.

use std::sync::Arc;

use crate::address::{ResolveMode, VirtualAddress};
use crate::error::{Error, Result};
use crate::traits::{CloudBackend, ObjectEntry};
use crate::tree::{BlobId, ContainerId, NodeRef, VirtualTree};

/// Delimiter used by every supported backend
pub const DEFAULT_DELIMITER: &str = "/";

/// Real location of a tree node in the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendAddress {
    /// Real backend container name
    pub container: String,
    /// Full key for a blob, or key prefix (empty or ending in `/`) for a
    /// container
    pub key: String,
}

/// Add every key of a flat listing below `container`
///
/// Re-running with keys already present reuses the existing nodes.
/// `container` and every container below it are marked populated.
pub fn build_from_flat_listing<S: AsRef<str>>(
    tree: &mut VirtualTree,
    container: ContainerId,
    flat_keys: &[S],
    delimiter: &str,
) -> Vec<BlobId> {
    let ids = flat_keys
        .iter()
        .map(|key| insert_key(tree, container, key.as_ref(), delimiter, None))
        .collect();
    mark_populated(tree, container);
    ids
}

/// Same as [`build_from_flat_listing`], also recording object sizes
pub fn build_from_entries(
    tree: &mut VirtualTree,
    container: ContainerId,
    entries: &[ObjectEntry],
    delimiter: &str,
) -> Vec<BlobId> {
    let ids = insert_entries(tree, container, entries, delimiter);
    mark_populated(tree, container);
    ids
}

fn insert_entries(
    tree: &mut VirtualTree,
    container: ContainerId,
    entries: &[ObjectEntry],
    delimiter: &str,
) -> Vec<BlobId> {
    entries
        .iter()
        .map(|entry| insert_key(tree, container, &entry.key, delimiter, Some(entry.size)))
        .collect()
}

/// Mark `container` and its whole subtree as populated
fn mark_populated(tree: &mut VirtualTree, container: ContainerId) {
    let mut pending = vec![container];
    while let Some(id) = pending.pop() {
        tree.container_mut(id).populated = true;
        pending.extend_from_slice(tree.container(id).containers());
    }
}

fn insert_key(
    tree: &mut VirtualTree,
    container: ContainerId,
    key: &str,
    delimiter: &str,
    size: Option<u64>,
) -> BlobId {
    let segments: Vec<&str> = if delimiter.is_empty() {
        vec![key]
    } else {
        key.split(delimiter).collect()
    };
    let (leaf, dirs) = segments
        .split_last()
        .map(|(leaf, dirs)| (*leaf, dirs))
        .unwrap_or((key, &[]));

    let mut current = container;
    for segment in dirs {
        current = tree.find_or_add_container(current, segment);
    }

    let blob = match tree.find_blob(current, leaf) {
        Some(existing) => existing,
        None => tree.add_blob(current, leaf, key),
    };
    if size.is_some() {
        tree.blob_mut(blob).size = size;
    }
    tracing::trace!(key, "mapped key into tree");
    blob
}

/// Resolve a node to its backend container and key
///
/// Blobs resolve to their full key; containers resolve to a prefix that is
/// empty for root-level containers and ends in `/` otherwise.
pub fn resolve_backend_address(tree: &VirtualTree, node: impl Into<NodeRef>) -> Result<BackendAddress> {
    let node = node.into();
    let root = tree.root();
    if node == NodeRef::Container(root) {
        return Err(Error::MalformedAddress(
            "the tree root has no backend address".into(),
        ));
    }

    let path = tree.virtual_path(node);
    let Some((container, rest)) = path.split_first() else {
        return Err(Error::MalformedAddress("node is not attached to the tree".into()));
    };

    let key = match node {
        NodeRef::Blob(_) => rest.join(DEFAULT_DELIMITER),
        NodeRef::Container(_) => rest
            .iter()
            .map(|segment| format!("{segment}{DEFAULT_DELIMITER}"))
            .collect(),
    };

    Ok(BackendAddress {
        container: container.to_string(),
        key,
    })
}

/// Walk from `container` through `segments`, creating missing containers
pub fn ensure_path<S: AsRef<str>>(
    tree: &mut VirtualTree,
    container: ContainerId,
    segments: &[S],
) -> ContainerId {
    segments.iter().fold(container, |current, segment| {
        tree.find_or_add_container(current, segment.as_ref())
    })
}

/// Namespace mapper bound to one backend
pub struct NamespaceMapper {
    backend: Arc<dyn CloudBackend>,
}

impl NamespaceMapper {
    /// Create a mapper over an already constructed backend client
    pub fn new(backend: Arc<dyn CloudBackend>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &Arc<dyn CloudBackend> {
        &self.backend
    }

    /// Create an empty tree tagged with this backend's origin
    pub fn new_tree(&self) -> VirtualTree {
        VirtualTree::new(self.backend.origin())
    }

    /// Add a root-level container for every real backend container
    pub async fn load_root(&self, tree: &mut VirtualTree) -> Result<Vec<ContainerId>> {
        let names = self.backend.list_containers().await?;
        let root = tree.root();
        let ids = names
            .iter()
            .map(|name| tree.find_or_add_container(root, name))
            .collect();
        tree.container_mut(root).populated = true;
        Ok(ids)
    }

    /// Fetch the contents of `container` from the backend
    ///
    /// Keys come back in full, so they are added below the real backend
    /// container; the virtual containers on the way are reused.
    pub async fn populate(&self, tree: &mut VirtualTree, container: ContainerId) -> Result<()> {
        if container == tree.root() {
            self.load_root(tree).await?;
            return Ok(());
        }

        let address = resolve_backend_address(tree, container)?;
        let entries = self
            .backend
            .list_objects_with_prefix(&address.container, &address.key)
            .await?;
        tracing::debug!(
            container = %address.container,
            prefix = %address.key,
            count = entries.len(),
            "populating container"
        );

        let anchor = backend_container_of(tree, container);
        insert_entries(tree, anchor, &entries, DEFAULT_DELIMITER);
        mark_populated(tree, container);
        Ok(())
    }

    /// Resolve a container address (trailing `/`) into the tree
    ///
    /// The real container is created in the backend when it does not exist
    /// yet; virtual containers are created in the tree only.
    pub async fn resolve_container(
        &self,
        tree: &mut VirtualTree,
        address: &str,
    ) -> Result<ContainerId> {
        let parsed = VirtualAddress::parse(address, ResolveMode::Container)?;
        let anchor = self.root_container(tree, &parsed.container, true).await?;
        Ok(ensure_path(tree, anchor, &parsed.segments))
    }

    /// Resolve a container address without creating anything in the backend
    ///
    /// Fails with `NotFound` when the real container does not exist.
    pub async fn resolve_existing_container(
        &self,
        tree: &mut VirtualTree,
        address: &str,
    ) -> Result<ContainerId> {
        let parsed = VirtualAddress::parse(address, ResolveMode::Container)?;
        let anchor = self.root_container(tree, &parsed.container, false).await?;
        Ok(ensure_path(tree, anchor, &parsed.segments))
    }

    /// Resolve a blob address (no trailing `/`) into the tree
    pub async fn resolve_blob(&self, tree: &mut VirtualTree, address: &str) -> Result<BlobId> {
        let parsed = VirtualAddress::parse(address, ResolveMode::Blob)?;
        let (Some(leaf), Some(key)) = (parsed.leaf.clone(), parsed.key()) else {
            return Err(Error::MalformedAddress(address.to_string()));
        };

        let anchor = self.root_container(tree, &parsed.container, false).await?;
        let known_parent = parsed
            .segments
            .iter()
            .try_fold(anchor, |current, segment| tree.find_container(current, segment));
        if let Some(existing) = known_parent.and_then(|p| tree.find_blob(p, &leaf)) {
            return Ok(existing);
        }

        let entries = self
            .backend
            .list_objects_with_prefix(&parsed.container, &key)
            .await?;
        let entry = entries
            .into_iter()
            .find(|e| e.key == key)
            .ok_or_else(|| Error::NotFound(format!("{}/{key}", parsed.container)))?;

        // Virtual containers are only added once the key is known to exist
        let parent = ensure_path(tree, anchor, &parsed.segments);
        let blob = tree.add_blob(parent, leaf, key);
        tree.blob_mut(blob).size = Some(entry.size);
        Ok(blob)
    }

    /// Backend URL of a blob, fetched once and cached on the node
    pub async fn blob_url(&self, tree: &mut VirtualTree, blob: BlobId) -> Result<String> {
        if let Some(url) = &tree.blob(blob).url {
            return Ok(url.clone());
        }
        let address = resolve_backend_address(tree, blob)?;
        let url = self
            .backend
            .get_object_url(&address.container, &address.key)
            .await?;
        tree.blob_mut(blob).url = Some(url.clone());
        Ok(url)
    }

    async fn root_container(
        &self,
        tree: &mut VirtualTree,
        name: &str,
        create: bool,
    ) -> Result<ContainerId> {
        let root = tree.root();
        if let Some(id) = tree.find_container(root, name) {
            return Ok(id);
        }

        let known = self.backend.list_containers().await?;
        if !known.iter().any(|c| c == name) {
            if !create {
                return Err(Error::NotFound(format!("container {name}")));
            }
            tracing::info!(container = name, "creating container");
            self.backend.create_container(name).await?;
        }
        Ok(tree.add_container(root, name))
    }
}

/// The root-level ancestor of a container (the container itself if it is
/// root-level)
fn backend_container_of(tree: &VirtualTree, container: ContainerId) -> ContainerId {
    let root = tree.root();
    std::iter::once(container)
        .chain(tree.ancestors(container.into()))
        .find(|c| tree.container(*c).parent() == Some(root))
        .unwrap_or(container)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::memory::MemoryBackend;
    use crate::tree::Origin;

    const SCENARIO: [&str; 4] = ["blob4", "vdir1/blob2", "vdir1/vdir2/blob1", "vdir1/vdir3/blob3"];

    fn tree_with_container() -> (VirtualTree, ContainerId) {
        let mut tree = VirtualTree::new(Origin::Memory);
        let container = tree.add_container(tree.root(), "container");
        (tree, container)
    }

    fn names<'a>(tree: &'a VirtualTree, ids: impl IntoIterator<Item = NodeRef>) -> Vec<&'a str> {
        ids.into_iter().map(|id| tree.name(id)).collect()
    }

    #[test]
    fn test_build_scenario_tree() {
        let (mut tree, c) = tree_with_container();
        build_from_flat_listing(&mut tree, c, &SCENARIO, "/");

        let top = tree.container(c);
        assert_eq!(names(&tree, top.blobs().iter().map(|b| (*b).into())), vec!["blob4"]);
        assert_eq!(names(&tree, top.containers().iter().map(|c| (*c).into())), vec!["vdir1"]);

        let vdir1 = tree.find_container(c, "vdir1").unwrap();
        assert_eq!(
            names(&tree, tree.container(vdir1).blobs().iter().map(|b| (*b).into())),
            vec!["blob2"]
        );
        assert_eq!(
            names(&tree, tree.container(vdir1).containers().iter().map(|c| (*c).into())),
            vec!["vdir2", "vdir3"]
        );

        let vdir2 = tree.find_container(vdir1, "vdir2").unwrap();
        let blob1 = tree.find_blob(vdir2, "blob1").unwrap();
        assert_eq!(tree.blob(blob1).backend_key, "vdir1/vdir2/blob1");

        let vdir3 = tree.find_container(vdir1, "vdir3").unwrap();
        assert!(tree.find_blob(vdir3, "blob3").is_some());

        for id in [c, vdir1, vdir2, vdir3] {
            assert!(tree.container(id).populated);
        }
    }

    #[test]
    fn test_single_segment_key_is_direct_child() {
        let (mut tree, c) = tree_with_container();
        let ids = build_from_flat_listing(&mut tree, c, &["blob4"], "/");
        let blob = tree.blob(ids[0]);
        assert_eq!(blob.name, "blob4");
        assert_eq!(blob.backend_key, "blob4");
        assert_eq!(blob.parent(), c);
    }

    #[test]
    fn test_build_is_idempotent() {
        let (mut tree, c) = tree_with_container();
        let first = build_from_flat_listing(&mut tree, c, &SCENARIO, "/");
        let containers = tree.container_count();
        let blobs = tree.blob_count();

        let second = build_from_flat_listing(&mut tree, c, &SCENARIO, "/");
        assert_eq!(first, second);
        assert_eq!(tree.container_count(), containers);
        assert_eq!(tree.blob_count(), blobs);
    }

    #[test]
    fn test_segment_matching_is_case_sensitive() {
        let (mut tree, c) = tree_with_container();
        build_from_flat_listing(&mut tree, c, &["Dir/a", "dir/b"], "/");
        assert_eq!(tree.container(c).containers().len(), 2);
    }

    #[test]
    fn test_listing_round_trip_reconstructs_keys() {
        let keys = [
            "a",
            "a/b",
            "a/b/c",
            "x/y/z/w",
            "x/y/other",
            "trailing/",
            "MiXeD/Case",
        ];
        let (mut tree, c) = tree_with_container();
        build_from_flat_listing(&mut tree, c, &keys, "/");

        let rebuilt: HashSet<String> = tree
            .blob_paths(c)
            .into_iter()
            .map(|(_, path)| path.join("/"))
            .collect();
        let expected: HashSet<String> = keys.iter().map(|k| k.to_string()).collect();
        assert_eq!(rebuilt, expected);
    }

    #[test]
    fn test_custom_delimiter() {
        let (mut tree, c) = tree_with_container();
        let ids = build_from_flat_listing(&mut tree, c, &["a|b|c"], "|");
        let blob = tree.blob(ids[0]);
        assert_eq!(blob.name, "c");
        assert_eq!(blob.backend_key, "a|b|c");
        assert_eq!(tree.virtual_path(ids[0].into()), vec!["container", "a", "b", "c"]);
    }

    #[test]
    fn test_resolve_blob_address_matches_original_key() {
        let (mut tree, c) = tree_with_container();
        let ids = build_from_flat_listing(&mut tree, c, &SCENARIO, "/");

        for (id, key) in ids.iter().zip(SCENARIO) {
            let address = resolve_backend_address(&tree, *id).unwrap();
            assert_eq!(address.container, "container");
            assert_eq!(address.key, key);
            assert_eq!(address.key, tree.blob(*id).backend_key);
        }
    }

    #[test]
    fn test_resolve_container_address_is_prefix() {
        let (mut tree, c) = tree_with_container();
        build_from_flat_listing(&mut tree, c, &SCENARIO, "/");
        let vdir1 = tree.find_container(c, "vdir1").unwrap();
        let vdir2 = tree.find_container(vdir1, "vdir2").unwrap();

        let address = resolve_backend_address(&tree, vdir2).unwrap();
        assert_eq!(address.container, "container");
        assert_eq!(address.key, "vdir1/vdir2/");

        let address = resolve_backend_address(&tree, c).unwrap();
        assert_eq!(address.key, "");
    }

    #[test]
    fn test_resolve_root_is_malformed() {
        let (tree, _) = tree_with_container();
        let result = resolve_backend_address(&tree, tree.root());
        assert!(matches!(result, Err(Error::MalformedAddress(_))));
    }

    fn mapper_with(backend: &Arc<MemoryBackend>) -> NamespaceMapper {
        NamespaceMapper::new(backend.clone())
    }

    #[tokio::test]
    async fn test_load_root_and_populate() {
        let backend = Arc::new(MemoryBackend::new());
        for key in SCENARIO {
            backend.insert("container", key, key.as_bytes().to_vec());
        }
        backend.insert("other", "x", b"x".to_vec());

        let mapper = mapper_with(&backend);
        let mut tree = mapper.new_tree();
        let ids = mapper.load_root(&mut tree).await.unwrap();
        assert_eq!(names(&tree, ids.iter().map(|c| (*c).into())), vec!["container", "other"]);
        assert!(tree.container(tree.root()).populated);

        let c = ids[0];
        mapper.populate(&mut tree, c).await.unwrap();
        assert!(tree.container(c).populated);
        assert_eq!(tree.blob_paths(c).len(), 4);
        let blob4 = tree.find_blob(c, "blob4").unwrap();
        assert_eq!(tree.blob(blob4).size, Some(5));

        // Populating again reuses every node
        let blobs = tree.blob_count();
        mapper.populate(&mut tree, c).await.unwrap();
        assert_eq!(tree.blob_count(), blobs);
    }

    #[tokio::test]
    async fn test_populate_virtual_container_uses_prefix() {
        let backend = Arc::new(MemoryBackend::new());
        for key in SCENARIO {
            backend.insert("container", key, Vec::new());
        }
        let mapper = mapper_with(&backend);
        let mut tree = mapper.new_tree();

        let vdir1 = mapper
            .resolve_container(&mut tree, "https://acct.host/container/vdir1/")
            .await
            .unwrap();
        mapper.populate(&mut tree, vdir1).await.unwrap();

        let c = tree.find_container(tree.root(), "container").unwrap();
        assert!(tree.find_blob(c, "blob4").is_none());
        assert_eq!(tree.blob_paths(vdir1).len(), 3);
        assert_eq!(tree.container(c).containers(), &[vdir1]);

        // Only the listed prefix counts as populated
        assert!(!tree.container(c).populated);
        assert!(tree.container(vdir1).populated);
        let vdir2 = tree.find_container(vdir1, "vdir2").unwrap();
        assert!(tree.container(vdir2).populated);
    }

    #[tokio::test]
    async fn test_populate_nested_container_leaves_ancestors_unpopulated() {
        let backend = Arc::new(MemoryBackend::new());
        for key in SCENARIO {
            backend.insert("container", key, Vec::new());
        }
        let mapper = mapper_with(&backend);
        let mut tree = mapper.new_tree();

        let vdir2 = mapper
            .resolve_existing_container(&mut tree, "https://acct.host/container/vdir1/vdir2/")
            .await
            .unwrap();
        mapper.populate(&mut tree, vdir2).await.unwrap();

        let vdir1 = tree.parent(vdir2.into()).unwrap();
        assert!(tree.container(vdir2).populated);
        assert!(!tree.container(vdir1).populated);
        assert!(tree.find_blob(vdir1, "blob2").is_none());
    }

    #[tokio::test]
    async fn test_resolve_container_creates_missing_backend_container() {
        let backend = Arc::new(MemoryBackend::new());
        let mapper = mapper_with(&backend);
        let mut tree = mapper.new_tree();

        let deepest = mapper
            .resolve_container(&mut tree, "https://acct.host/fresh/vdir1/vdir2/")
            .await
            .unwrap();

        assert_eq!(backend.list_containers().await.unwrap(), vec!["fresh"]);
        assert_eq!(tree.name(deepest.into()), "vdir2");
        let address = resolve_backend_address(&tree, deepest).unwrap();
        assert_eq!(address.container, "fresh");
        assert_eq!(address.key, "vdir1/vdir2/");

        // Resolving again walks the same nodes
        let again = mapper
            .resolve_container(&mut tree, "https://acct.host/fresh/vdir1/vdir2/")
            .await
            .unwrap();
        assert_eq!(deepest, again);
    }

    #[tokio::test]
    async fn test_resolve_existing_container_does_not_create() {
        let backend = Arc::new(MemoryBackend::new());
        backend.insert("container", "vdir1/blob2", Vec::new());
        let mapper = mapper_with(&backend);
        let mut tree = mapper.new_tree();

        let vdir1 = mapper
            .resolve_existing_container(&mut tree, "https://acct.host/container/vdir1/")
            .await
            .unwrap();
        assert_eq!(resolve_backend_address(&tree, vdir1).unwrap().key, "vdir1/");

        let missing = mapper
            .resolve_existing_container(&mut tree, "https://acct.host/absent/")
            .await;
        assert!(matches!(missing, Err(Error::NotFound(_))));
        assert_eq!(backend.list_containers().await.unwrap(), vec!["container"]);
    }

    #[tokio::test]
    async fn test_malformed_container_address_fails_before_backend_call() {
        let mut mock = crate::traits::MockCloudBackend::new();
        mock.expect_list_containers().never();
        mock.expect_create_container().never();
        let mapper = NamespaceMapper::new(Arc::new(mock));
        let mut tree = VirtualTree::new(Origin::Memory);

        let result = mapper
            .resolve_container(&mut tree, "https://acct.host/container/vdir1/vdir2")
            .await;
        assert!(matches!(result, Err(Error::MalformedAddress(_))));
        assert_eq!(tree.container_count(), 1);
    }

    #[tokio::test]
    async fn test_resolve_blob() {
        let backend = Arc::new(MemoryBackend::new());
        backend.insert("container", "vdir1/blob2", b"abc".to_vec());
        backend.insert("container", "vdir1/blob2-longer", b"abcdef".to_vec());
        let mapper = mapper_with(&backend);
        let mut tree = mapper.new_tree();

        let blob = mapper
            .resolve_blob(&mut tree, "https://acct.host/container/vdir1/blob2")
            .await
            .unwrap();
        assert_eq!(tree.blob(blob).backend_key, "vdir1/blob2");
        assert_eq!(tree.blob(blob).size, Some(3));

        let missing = mapper
            .resolve_blob(&mut tree, "https://acct.host/container/vdir1/nope")
            .await;
        assert!(matches!(missing, Err(Error::NotFound(_))));

        let no_container = mapper
            .resolve_blob(&mut tree, "https://acct.host/absent/blob")
            .await;
        assert!(matches!(no_container, Err(Error::NotFound(_))));
        assert!(backend.list_containers().await.unwrap() == vec!["container"]);
    }

    #[tokio::test]
    async fn test_missing_blob_adds_no_virtual_containers() {
        let backend = Arc::new(MemoryBackend::new());
        backend.insert("container", "real/blob", b"x".to_vec());
        let mapper = mapper_with(&backend);
        let mut tree = mapper.new_tree();
        mapper
            .resolve_blob(&mut tree, "https://acct.host/container/real/blob")
            .await
            .unwrap();
        let containers = tree.container_count();

        let missing = mapper
            .resolve_blob(&mut tree, "https://acct.host/container/ghost1/ghost2/nope")
            .await;
        assert!(matches!(missing, Err(Error::NotFound(_))));
        assert_eq!(tree.container_count(), containers);

        let c = tree.find_container(tree.root(), "container").unwrap();
        assert_eq!(
            names(&tree, tree.container(c).containers().iter().map(|c| (*c).into())),
            vec!["real"]
        );
    }

    #[tokio::test]
    async fn test_blob_url_is_cached() {
        let backend = Arc::new(MemoryBackend::new());
        backend.insert("container", "a/b", Vec::new());
        let mapper = mapper_with(&backend);
        let mut tree = mapper.new_tree();
        let blob = mapper
            .resolve_blob(&mut tree, "https://acct.host/container/a/b")
            .await
            .unwrap();

        let url = mapper.blob_url(&mut tree, blob).await.unwrap();
        assert_eq!(url, "memory://local/container/a/b");
        assert_eq!(tree.blob(blob).url.as_deref(), Some(url.as_str()));
    }

    #[tokio::test]
    async fn test_listing_error_keeps_existing_tree() {
        let mut mock = crate::traits::MockCloudBackend::new();
        mock.expect_list_objects_with_prefix()
            .returning(|_, _| Err(Error::BackendUnavailable("connection reset".into())));
        let mapper = NamespaceMapper::new(Arc::new(mock));

        let (mut tree, c) = tree_with_container();
        build_from_flat_listing(&mut tree, c, &SCENARIO, "/");
        let blobs = tree.blob_count();

        let result = mapper.populate(&mut tree, c).await;
        assert!(matches!(result, Err(Error::BackendUnavailable(_))));
        assert_eq!(tree.blob_count(), blobs);
        assert!(tree.find_container(c, "vdir1").is_some());
    }
}
