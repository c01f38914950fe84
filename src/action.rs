// src/action.rs

//! Action identity: the canonical key for one unit of build work.
//!
//! An *action* is a pair `(operation, component)`. Keys are value-typed and
//! hashable; two action values with equal keys denote the same action.

use std::fmt;

/// Kind of operation performed on a component.
///
/// Each kind answers two scheduling questions:
/// - is it safe to perform in a forked worker?
/// - must its effects persist in the coordinator process?
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OperationKind {
    /// Produce the component's compiled artifact. Image-polluting but
    /// side-effect-free for the coordinator, so safe to fork.
    Compile,
    /// Bring the compiled artifact into the live image. Must run in the
    /// coordinator.
    Load,
}

impl OperationKind {
    pub fn can_run_in_background(self) -> bool {
        matches!(self, OperationKind::Compile)
    }

    pub fn needed_in_image(self) -> bool {
        matches!(self, OperationKind::Load)
    }

    /// Stable lowercase tag used in breadcrumb records and result-file
    /// names.
    pub fn tag(self) -> &'static str {
        match self {
            OperationKind::Compile => "compile",
            OperationKind::Load => "load",
        }
    }

    /// Inverse of [`tag`](Self::tag).
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "compile" => Some(OperationKind::Compile),
            "load" => Some(OperationKind::Load),
            _ => None,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Canonical address of a buildable unit: the system name followed by the
/// component names on the path from the system root.
///
/// Equality is by canonical path. Whatever metadata the performer needs to
/// actually do the work lives with the collaborators, not here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentPath {
    system: String,
    path: Vec<String>,
}

impl ComponentPath {
    pub fn new<S, I, T>(system: S, path: I) -> Self
    where
        S: Into<String>,
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            system: system.into(),
            path: path.into_iter().map(Into::into).collect(),
        }
    }

    pub fn system(&self) -> &str {
        &self.system
    }

    /// All segments, system name first.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.system.as_str()).chain(self.path.iter().map(String::as_str))
    }

    /// Innermost component name (the system name for a bare system path).
    pub fn leaf(&self) -> &str {
        self.path.last().map(String::as_str).unwrap_or(&self.system)
    }

    /// Flat name usable as a file stem. All segments are joined with `-` so
    /// two components with the same leaf name map to distinct files.
    pub fn file_stem(&self) -> String {
        self.segments().collect::<Vec<_>>().join("-")
    }
}

impl fmt::Display for ComponentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments().collect::<Vec<_>>().join("/"))
    }
}

/// Key identifying one action.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActionKey {
    pub op: OperationKind,
    pub component: ComponentPath,
}

impl ActionKey {
    pub fn new(op: OperationKind, component: ComponentPath) -> Self {
        Self { op, component }
    }

    /// Decompose into the `(kind-tag, path-segments)` form used by
    /// breadcrumb records.
    pub fn reify(&self) -> (&'static str, Vec<&str>) {
        (self.op.tag(), self.component.segments().collect())
    }

    /// Inverse of [`reify`](Self::reify), used by the breadcrumb replay
    /// driver. `segments` must carry at least the system name.
    pub fn from_reified(tag: &str, segments: &[&str]) -> Option<Self> {
        let op = OperationKind::from_tag(tag)?;
        let (system, rest) = segments.split_first()?;
        Some(Self::new(op, ComponentPath::new(*system, rest.iter().copied())))
    }
}

impl fmt::Display for ActionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.op, self.component)
    }
}
