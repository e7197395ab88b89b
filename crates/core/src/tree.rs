//! Virtual tree model
//!
//! A flat object listing presented as directories. Nodes live in an arena
//! owned by [`VirtualTree`] and refer to each other by index, so parent links
//! are plain back-references and dropping the tree drops every node.
//!
//! Containers directly under the root are real backend containers; deeper
//! containers only exist as path segments of blob keys.

use std::fmt;
use std::path::PathBuf;

/// Tag identifying which backend a tree belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    S3,
    Memory,
}

impl Origin {
    pub const fn as_str(self) -> &'static str {
        match self {
            Origin::S3 => "s3",
            Origin::Memory => "memory",
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Index of a container node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContainerId(usize);

/// Index of a blob node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlobId(usize);

/// Either kind of node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRef {
    Container(ContainerId),
    Blob(BlobId),
}

impl From<ContainerId> for NodeRef {
    fn from(id: ContainerId) -> Self {
        NodeRef::Container(id)
    }
}

impl From<BlobId> for NodeRef {
    fn from(id: BlobId) -> Self {
        NodeRef::Blob(id)
    }
}

/// Content held for a blob while it is in flight
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CachedContent {
    /// Nothing downloaded yet, or already released
    #[default]
    Empty,
    /// Whole content held in memory
    InMemory(Vec<u8>),
    /// Content spilled to a file in the cache directory
    Spilled { path: PathBuf, len: u64 },
}

impl CachedContent {
    pub fn is_empty(&self) -> bool {
        matches!(self, CachedContent::Empty)
    }

    /// Length of the cached content in bytes
    pub fn len(&self) -> Option<u64> {
        match self {
            CachedContent::Empty => None,
            CachedContent::InMemory(data) => Some(data.len() as u64),
            CachedContent::Spilled { len, .. } => Some(*len),
        }
    }
}

/// A container node
#[derive(Debug, Clone)]
pub struct Container {
    pub name: String,
    pub origin: Origin,
    parent: Option<ContainerId>,
    containers: Vec<ContainerId>,
    blobs: Vec<BlobId>,
    /// Whether children have been fetched from the backend
    pub populated: bool,
}

impl Container {
    pub fn parent(&self) -> Option<ContainerId> {
        self.parent
    }

    pub fn containers(&self) -> &[ContainerId] {
        &self.containers
    }

    pub fn blobs(&self) -> &[BlobId] {
        &self.blobs
    }
}

/// A blob node
#[derive(Debug, Clone)]
pub struct Blob {
    pub name: String,
    pub origin: Origin,
    parent: ContainerId,
    /// Full key as stored in the backend
    pub backend_key: String,
    /// Backend URL, resolved lazily
    pub url: Option<String>,
    /// Size reported by the listing, if any
    pub size: Option<u64>,
    /// Transient transfer state
    pub content: CachedContent,
}

impl Blob {
    pub fn parent(&self) -> ContainerId {
        self.parent
    }
}

/// Arena holding one backend's virtual tree
///
/// Ids are only meaningful for the tree that issued them; passing an id from
/// another tree is a logic error and may panic.
#[derive(Debug, Clone)]
pub struct VirtualTree {
    origin: Origin,
    containers: Vec<Container>,
    blobs: Vec<Blob>,
}

impl VirtualTree {
    /// Create a tree holding only its root container
    pub fn new(origin: Origin) -> Self {
        let root = Container {
            name: String::new(),
            origin,
            parent: None,
            containers: Vec::new(),
            blobs: Vec::new(),
            populated: false,
        };
        Self {
            origin,
            containers: vec![root],
            blobs: Vec::new(),
        }
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn root(&self) -> ContainerId {
        ContainerId(0)
    }

    pub fn container(&self, id: ContainerId) -> &Container {
        &self.containers[id.0]
    }

    pub fn container_mut(&mut self, id: ContainerId) -> &mut Container {
        &mut self.containers[id.0]
    }

    pub fn blob(&self, id: BlobId) -> &Blob {
        &self.blobs[id.0]
    }

    pub fn blob_mut(&mut self, id: BlobId) -> &mut Blob {
        &mut self.blobs[id.0]
    }

    /// Name of any node
    pub fn name(&self, node: NodeRef) -> &str {
        match node {
            NodeRef::Container(id) => &self.container(id).name,
            NodeRef::Blob(id) => &self.blob(id).name,
        }
    }

    /// Parent of any node; `None` only for the root
    pub fn parent(&self, node: NodeRef) -> Option<ContainerId> {
        match node {
            NodeRef::Container(id) => self.container(id).parent,
            NodeRef::Blob(id) => Some(self.blob(id).parent),
        }
    }

    /// Append a child container
    pub fn add_container(&mut self, parent: ContainerId, name: impl Into<String>) -> ContainerId {
        let id = ContainerId(self.containers.len());
        let origin = self.container(parent).origin;
        self.containers.push(Container {
            name: name.into(),
            origin,
            parent: Some(parent),
            containers: Vec::new(),
            blobs: Vec::new(),
            populated: false,
        });
        self.containers[parent.0].containers.push(id);
        id
    }

    /// Append a child blob
    pub fn add_blob(
        &mut self,
        parent: ContainerId,
        name: impl Into<String>,
        backend_key: impl Into<String>,
    ) -> BlobId {
        let id = BlobId(self.blobs.len());
        let origin = self.container(parent).origin;
        self.blobs.push(Blob {
            name: name.into(),
            origin,
            parent,
            backend_key: backend_key.into(),
            url: None,
            size: None,
            content: CachedContent::Empty,
        });
        self.containers[parent.0].blobs.push(id);
        id
    }

    /// Find a direct child container by exact name
    pub fn find_container(&self, parent: ContainerId, name: &str) -> Option<ContainerId> {
        self.container(parent)
            .containers
            .iter()
            .copied()
            .find(|c| self.container(*c).name == name)
    }

    /// Find a direct child blob by exact name
    pub fn find_blob(&self, parent: ContainerId, name: &str) -> Option<BlobId> {
        self.container(parent)
            .blobs
            .iter()
            .copied()
            .find(|b| self.blob(*b).name == name)
    }

    /// Find a child container or append a new one
    pub fn find_or_add_container(&mut self, parent: ContainerId, name: &str) -> ContainerId {
        match self.find_container(parent, name) {
            Some(id) => id,
            None => self.add_container(parent, name),
        }
    }

    /// Containers from `node`'s parent up to and including the root
    pub fn ancestors(&self, node: NodeRef) -> Ancestors<'_> {
        Ancestors {
            tree: self,
            next: self.parent(node),
        }
    }

    /// Segment names from the root-level container down to `node`
    ///
    /// The root itself contributes no segment.
    pub fn virtual_path(&self, node: NodeRef) -> Vec<&str> {
        let mut segments: Vec<&str> = self
            .ancestors(node)
            .filter(|c| *c != self.root())
            .map(|c| self.container(c).name.as_str())
            .collect();
        segments.reverse();
        if node != NodeRef::Container(self.root()) {
            segments.push(self.name(node));
        }
        segments
    }

    /// Every blob below `container`, depth first, with its segment path
    /// relative to `container`
    pub fn blob_paths(&self, container: ContainerId) -> Vec<(BlobId, Vec<String>)> {
        let mut out = Vec::new();
        self.collect_blobs(container, &mut Vec::new(), &mut out);
        out
    }

    fn collect_blobs(
        &self,
        container: ContainerId,
        prefix: &mut Vec<String>,
        out: &mut Vec<(BlobId, Vec<String>)>,
    ) {
        let node = self.container(container);
        for blob in &node.blobs {
            let mut path = prefix.clone();
            path.push(self.blob(*blob).name.clone());
            out.push((*blob, path));
        }
        for child in &node.containers {
            prefix.push(self.container(*child).name.clone());
            self.collect_blobs(*child, prefix, out);
            prefix.pop();
        }
    }

    /// Total number of blob nodes
    pub fn blob_count(&self) -> usize {
        self.blobs.len()
    }

    /// Total number of container nodes, root included
    pub fn container_count(&self) -> usize {
        self.containers.len()
    }
}

/// Iterator over the ancestors of a node
pub struct Ancestors<'a> {
    tree: &'a VirtualTree,
    next: Option<ContainerId>,
}

impl Iterator for Ancestors<'_> {
    type Item = ContainerId;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = self.tree.container(current).parent;
        Some(current)
    }
}
