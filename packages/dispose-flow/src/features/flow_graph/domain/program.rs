//! Program model
//!
//! An immutable arena of procedures. Each procedure owns its symbol table,
//! parameter list and CFG. Procedures reference each other only through
//! [`ProcedureId`] indices carried by call operations.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::cfg::ControlFlowGraph;

/// Index of a procedure in [`Program::procedures`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProcedureId(pub u32);

impl ProcedureId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a symbol in a procedure's symbol table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SymbolId(pub u32);

impl SymbolId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Fully qualified type name as written by the front end (e.g. `System.IO.FileStream`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeName(pub String);

impl TypeName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TypeName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

/// 1-based source span of an operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceSpan {
    pub start_line: u32,
    pub start_column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

impl SourceSpan {
    pub fn new(start_line: u32, start_column: u32, end_line: u32, end_column: u32) -> Self {
        Self {
            start_line,
            start_column,
            end_line,
            end_column,
        }
    }
}

impl fmt::Display for SourceSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start_line, self.start_column)
    }
}

/// Fully qualified procedure name
///
/// Used for symbol exclusions, ownership rule matching and reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QualifiedName {
    /// Dotted namespace, empty for the global namespace
    #[serde(default)]
    pub namespace: String,
    /// Containing type (nested types joined with '.')
    #[serde(default)]
    pub containing_type: String,
    /// Simple procedure name
    pub name: String,
    /// Parameter signature, e.g. `(System.String,System.Int32)`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl QualifiedName {
    pub fn new(
        namespace: impl Into<String>,
        containing_type: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            containing_type: containing_type.into(),
            name: name.into(),
            signature: None,
        }
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    /// `Namespace.Type`
    pub fn type_path(&self) -> String {
        join_dotted(&[&self.namespace, &self.containing_type])
    }

    /// `Namespace.Type.Name`
    pub fn method_path(&self) -> String {
        join_dotted(&[&self.namespace, &self.containing_type, &self.name])
    }

    /// `Namespace.Type.Name(signature)`, falls back to [`Self::method_path`]
    pub fn method_path_with_signature(&self) -> String {
        match &self.signature {
            Some(sig) => format!("{}{}", self.method_path(), sig),
            None => self.method_path(),
        }
    }

    /// Simple name of the innermost containing type
    pub fn type_simple_name(&self) -> &str {
        self.containing_type
            .rsplit('.')
            .next()
            .unwrap_or(&self.containing_type)
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.method_path())
    }
}

fn join_dotted(parts: &[&str]) -> String {
    parts
        .iter()
        .filter(|p| !p.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(".")
}

/// Symbol kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SymbolKind {
    Local,
    Parameter,
    This,
    Temporary,
}

/// Entry of a procedure symbol table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ty: Option<TypeName>,
}

/// Parameter passing mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParameterMode {
    #[default]
    Value,
    Ref,
    Out,
}

/// Formal parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub symbol: SymbolId,
    pub ty: TypeName,
    #[serde(default)]
    pub mode: ParameterMode,
}

/// Procedure kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcedureKind {
    #[default]
    Method,
    Constructor,
}

/// A procedure: symbols, parameters and its CFG
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Procedure {
    pub name: QualifiedName,
    #[serde(default)]
    pub kind: ProcedureKind,
    pub symbols: Vec<Symbol>,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub this_symbol: Option<SymbolId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_type: Option<TypeName>,
    pub cfg: ControlFlowGraph,
}

impl Procedure {
    pub fn symbol(&self, id: SymbolId) -> Option<&Symbol> {
        self.symbols.get(id.index())
    }

    /// Symbol name for logging, `?` when the id is out of range
    pub fn symbol_name(&self, id: SymbolId) -> &str {
        self.symbol(id).map(|s| s.name.as_str()).unwrap_or("?")
    }

    pub fn is_constructor(&self) -> bool {
        self.kind == ProcedureKind::Constructor
    }

    /// Position of `symbol` in the parameter list
    pub fn parameter_index(&self, symbol: SymbolId) -> Option<usize> {
        self.parameters.iter().position(|p| p.symbol == symbol)
    }
}

/// Immutable arena of procedures
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Program {
    pub procedures: Vec<Procedure>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a procedure and return its id
    pub fn add(&mut self, procedure: Procedure) -> ProcedureId {
        let id = ProcedureId(self.procedures.len() as u32);
        self.procedures.push(procedure);
        id
    }

    pub fn procedure(&self, id: ProcedureId) -> Option<&Procedure> {
        self.procedures.get(id.index())
    }

    /// Look up a procedure by `Namespace.Type.Name`
    pub fn find(&self, method_path: &str) -> Option<ProcedureId> {
        self.procedures
            .iter()
            .position(|p| p.name.method_path() == method_path)
            .map(|i| ProcedureId(i as u32))
    }

    pub fn iter(&self) -> impl Iterator<Item = (ProcedureId, &Procedure)> {
        self.procedures
            .iter()
            .enumerate()
            .map(|(i, p)| (ProcedureId(i as u32), p))
    }

    pub fn len(&self) -> usize {
        self.procedures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.procedures.is_empty()
    }
}
