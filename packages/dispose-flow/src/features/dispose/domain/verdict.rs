/*
 * Dispose Verdicts
 *
 * One verdict per tracked disposable location that may still be open when
 * its last reference disappears.
 */

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::features::flow_graph::domain::{OperationRef, SourceSpan};
use crate::features::points_to::domain::LocationId;

/// Verdict classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Classification {
    /// Open on every path
    NotDisposed,
    /// Open on some paths, released or handed off on others
    MaybeDisposed,
}

/// Which paths the verdict covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PathKind {
    AllPaths,
    ExceptionPathsOnly,
}

/// Diagnostic kind, one per (classification, path kind)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticKind {
    NotDisposed,
    MaybeNotDisposed,
    NotDisposedOnExceptionPaths,
    MaybeNotDisposedOnExceptionPaths,
}

impl DiagnosticKind {
    pub fn from_parts(classification: Classification, path_kind: PathKind) -> Self {
        match (classification, path_kind) {
            (Classification::NotDisposed, PathKind::AllPaths) => DiagnosticKind::NotDisposed,
            (Classification::MaybeDisposed, PathKind::AllPaths) => DiagnosticKind::MaybeNotDisposed,
            (Classification::NotDisposed, PathKind::ExceptionPathsOnly) => {
                DiagnosticKind::NotDisposedOnExceptionPaths
            }
            (Classification::MaybeDisposed, PathKind::ExceptionPathsOnly) => {
                DiagnosticKind::MaybeNotDisposedOnExceptionPaths
            }
        }
    }

    /// Message for an object created by `creation`
    pub fn message(&self, creation: &str) -> String {
        match self {
            DiagnosticKind::NotDisposed => format!(
                "Call Dispose on object created by '{}' before all references to it are out of scope",
                creation
            ),
            DiagnosticKind::MaybeNotDisposed => format!(
                "Object created by '{}' is not disposed along all paths. Wrap the creation in a \
                 'using' statement, or dispose it unconditionally in a 'finally' region and clear \
                 the local after any ownership transfer",
                creation
            ),
            DiagnosticKind::NotDisposedOnExceptionPaths => format!(
                "Object created by '{}' is not disposed along all exception paths. Call Dispose \
                 on the object before all references to it are out of scope",
                creation
            ),
            DiagnosticKind::MaybeNotDisposedOnExceptionPaths => format!(
                "Object created by '{}' is not disposed along all exception paths. Dispose it \
                 unconditionally in a 'finally' region",
                creation
            ),
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticKind::NotDisposed => write!(f, "Not Disposed"),
            DiagnosticKind::MaybeNotDisposed => write!(f, "Maybe Not Disposed"),
            DiagnosticKind::NotDisposedOnExceptionPaths => {
                write!(f, "Not Disposed On Exception Paths")
            }
            DiagnosticKind::MaybeNotDisposedOnExceptionPaths => {
                write!(f, "Maybe Not Disposed On Exception Paths")
            }
        }
    }
}

/// Dispose verdict
///
/// # Example
/// ```ignore
/// let verdict = Verdict {
///     location: 1,
///     site: OperationRef::new(ProcedureId(0), 0),
///     classification: Classification::NotDisposed,
///     path_kind: PathKind::AllPaths,
///     kind: DiagnosticKind::NotDisposed,
///     creation: "new FileStream(path)".to_string(),
///     span: None,
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Verdict {
    pub location: LocationId,
    /// Creation operation in the analyzed procedure
    pub site: OperationRef,
    pub classification: Classification,
    pub path_kind: PathKind,
    pub kind: DiagnosticKind,
    /// First line of the creation syntax
    pub creation: String,
    pub span: Option<SourceSpan>,
}

impl Verdict {
    pub fn new(
        location: LocationId,
        site: OperationRef,
        classification: Classification,
        path_kind: PathKind,
        creation: impl Into<String>,
        span: Option<SourceSpan>,
    ) -> Self {
        Self {
            location,
            site,
            classification,
            path_kind,
            kind: DiagnosticKind::from_parts(classification, path_kind),
            creation: creation.into(),
            span,
        }
    }

    /// Strength rank: lower is stronger (not-disposed first, then all-paths)
    pub fn rank(&self) -> (Classification, PathKind) {
        (self.classification, self.path_kind)
    }

    pub fn message(&self) -> String {
        self.kind.message(&self.creation)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.span {
            Some(span) => write!(f, "{}: {}: {}", span, self.kind, self.message()),
            None => write!(f, "op {}: {}: {}", self.site.operation, self.kind, self.message()),
        }
    }
}
