//! Test registry
//!
//! An append-only catalogue of [`TestDescriptor`]s. Every descriptor links to
//! the one registered before it, and the registry remembers the most recent
//! one (the *tail*). Walking `previous` links from the tail visits every
//! descriptor exactly once, newest first.
//!
//! Descriptors are never removed; the registry owns them for its whole
//! lifetime.
//!
//! ## Registration
//!
//! Tests are registered by an explicit startup routine rather than by static
//! constructors, so registration order is simply call order:
//!
//! ```
//! use enginetest::registry::{TestDescriptor, TestRegistry};
//!
//! fn add() {}
//!
//! let mut registry = TestRegistry::new();
//! registry.register(TestDescriptor::new("tests/math.rs", "add", add));
//! assert_eq!(registry.tail().map(|t| t.group()), Some("math"));
//! ```

use std::fmt;

/// Index of a descriptor inside its registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorId(usize);

/// The body of a test.
pub type EntryPoint = Box<dyn Fn() + Send + Sync + 'static>;

/// A registered test: metadata plus its entry point.
pub struct TestDescriptor {
    group: String,
    name: String,
    enabled: bool,
    requires_runtime: bool,
    entry_point: EntryPoint,
    previous: Option<DescriptorId>,
}

impl fmt::Debug for TestDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestDescriptor")
            .field("group", &self.group)
            .field("name", &self.name)
            .field("enabled", &self.enabled)
            .field("requires_runtime", &self.requires_runtime)
            .field("previous", &self.previous)
            .finish_non_exhaustive()
    }
}

impl TestDescriptor {
    /// Describe an enabled test that runs inside the shared runtime instance.
    ///
    /// `source` is the path of the file that defines the test (usually
    /// `file!()`); its basename without extension becomes the group.
    pub fn new(source: &str, name: impl Into<String>, entry_point: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            group: group_from_source(source).to_string(),
            name: name.into(),
            enabled: true,
            requires_runtime: true,
            entry_point: Box::new(entry_point),
            previous: None,
        }
    }

    /// Run this test without a shared runtime instance.
    pub fn without_runtime(mut self) -> Self {
        self.requires_runtime = false;
        self
    }

    /// Keep this test registered but exclude it from selection.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn requires_runtime(&self) -> bool {
        self.requires_runtime
    }

    /// The descriptor registered just before this one.
    pub fn previous(&self) -> Option<DescriptorId> {
        self.previous
    }

    /// `group/name`, the form accepted on the command line.
    pub fn qualified_name(&self) -> String {
        format!("{}/{}", self.group, self.name)
    }

    /// Call the test body.
    pub fn invoke(&self) {
        (self.entry_point)()
    }
}

/// Derive a group from a source path: basename, extension dropped.
///
/// Both `/` and `\` count as separators. Only the last extension is removed.
pub fn group_from_source(source: &str) -> &str {
    let basename = source.rsplit(['/', '\\']).next().unwrap_or(source);
    match basename.rfind('.') {
        Some(dot) => &basename[..dot],
        None => basename,
    }
}

/// Append-only store of descriptors.
#[derive(Debug, Default)]
pub struct TestRegistry {
    descriptors: Vec<TestDescriptor>,
    tail: Option<DescriptorId>,
}

impl TestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a descriptor, linking it to the current tail. O(1).
    pub fn register(&mut self, mut descriptor: TestDescriptor) -> DescriptorId {
        let id = DescriptorId(self.descriptors.len());
        descriptor.previous = self.tail;
        self.descriptors.push(descriptor);
        self.tail = Some(id);
        id
    }

    /// The most recently registered descriptor.
    pub fn tail(&self) -> Option<&TestDescriptor> {
        self.tail.map(|id| self.get(id))
    }

    pub fn get(&self, id: DescriptorId) -> &TestDescriptor {
        &self.descriptors[id.0]
    }

    /// Walk from the tail through `previous` links (newest first).
    pub fn iter(&self) -> Traversal<'_> {
        Traversal {
            registry: self,
            next: self.tail,
        }
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// Tail-to-head iterator over a registry.
#[derive(Debug, Clone)]
pub struct Traversal<'a> {
    registry: &'a TestRegistry,
    next: Option<DescriptorId>,
}

impl<'a> Iterator for Traversal<'a> {
    type Item = &'a TestDescriptor;

    fn next(&mut self) -> Option<Self::Item> {
        let descriptor = self.registry.get(self.next?);
        self.next = descriptor.previous;
        Some(descriptor)
    }
}

impl<'a> IntoIterator for &'a TestRegistry {
    type Item = &'a TestDescriptor;
    type IntoIter = Traversal<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Build a descriptor for a function, grouped by the calling file.
///
/// `descriptor!(name)` expands to `TestDescriptor::new(file!(), "name", name)`.
#[macro_export]
macro_rules! descriptor {
    ($name:ident) => {
        $crate::registry::TestDescriptor::new(file!(), stringify!($name), $name)
    };
}
