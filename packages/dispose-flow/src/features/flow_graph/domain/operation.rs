//! Operations
//!
//! Tagged operation model consumed by the transfer functions. The front end
//! lowers every statement of interest into one of these variants; anything it
//! does not understand becomes [`OperationKind::Opaque`].

use serde::{Deserialize, Serialize};

use super::cfg::RegionId;
use super::program::{ProcedureId, SourceSpan, SymbolId, TypeName};

/// Operation id, unique within its procedure and increasing in source order
pub type OperationId = u32;

/// Globally unique reference to an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OperationRef {
    pub procedure: ProcedureId,
    pub operation: OperationId,
}

impl OperationRef {
    pub fn new(procedure: ProcedureId, operation: OperationId) -> Self {
        Self {
            procedure,
            operation,
        }
    }
}

/// Value read by an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    Symbol(SymbolId),
    Null,
    /// Literal or expression the front end does not model
    Unknown,
}

/// Field receiver
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Receiver {
    Local(SymbolId),
    This,
    Static(TypeName),
}

/// Argument passing mode at a call site
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgumentMode {
    #[default]
    Value,
    Ref,
    Out,
}

/// Call argument. `Ref`/`Out` arguments carry the written-back symbol as operand.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Argument {
    pub value: Operand,
    #[serde(default)]
    pub mode: ArgumentMode,
}

impl Argument {
    pub fn value(value: Operand) -> Self {
        Self {
            value,
            mode: ArgumentMode::Value,
        }
    }

    pub fn symbol(symbol: SymbolId) -> Self {
        Self::value(Operand::Symbol(symbol))
    }

    pub fn out(symbol: SymbolId) -> Self {
        Self {
            value: Operand::Symbol(symbol),
            mode: ArgumentMode::Out,
        }
    }

    pub fn by_ref(symbol: SymbolId) -> Self {
        Self {
            value: Operand::Symbol(symbol),
            mode: ArgumentMode::Ref,
        }
    }

    /// Symbol written back by a `ref`/`out` argument
    pub fn written_symbol(&self) -> Option<SymbolId> {
        match (self.mode, self.value) {
            (ArgumentMode::Ref | ArgumentMode::Out, Operand::Symbol(s)) => Some(s),
            _ => None,
        }
    }
}

/// How the call target is selected at runtime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dispatch {
    #[default]
    Static,
    Virtual,
    Dynamic,
}

/// Callee of a call, constructor or release operation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CalleeRef {
    /// `Namespace.Type.Name`, matched against ownership rules
    pub name: String,
    /// Resolved procedure in the same program
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub procedure: Option<ProcedureId>,
    #[serde(default)]
    pub dispatch: Dispatch,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_type: Option<TypeName>,
}

impl CalleeRef {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            procedure: None,
            dispatch: Dispatch::Static,
            return_type: None,
        }
    }

    pub fn resolved(name: impl Into<String>, procedure: ProcedureId) -> Self {
        Self {
            procedure: Some(procedure),
            ..Self::named(name)
        }
    }

    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub fn with_return_type(mut self, ty: impl Into<TypeName>) -> Self {
        self.return_type = Some(ty.into());
        self
    }

    /// Procedure that can be re-analyzed in place of this call
    pub fn analyzable_target(&self) -> Option<ProcedureId> {
        match self.dispatch {
            Dispatch::Static => self.procedure,
            Dispatch::Virtual | Dispatch::Dynamic => None,
        }
    }
}

/// Branch condition on the last operation of a block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    /// `WhenTrue` edge taken when the symbol is null
    IsNull(SymbolId),
    /// `WhenTrue` edge taken when the symbol is not null
    IsNotNull(SymbolId),
    Opaque,
}

/// Region boundary marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Boundary {
    Enter,
    Exit,
}

/// Operation variants
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum OperationKind {
    /// `target = new ty(arguments)`
    Allocation {
        target: SymbolId,
        ty: TypeName,
        #[serde(default)]
        arguments: Vec<Argument>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        constructor: Option<CalleeRef>,
    },
    /// `receiver.Dispose()` or `receiver?.Dispose()`
    ReleaseCall {
        receiver: SymbolId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        method: Option<CalleeRef>,
    },
    /// `target = value`
    Assignment { target: SymbolId, value: Operand },
    /// `target = a ?? b`, `target = c ? a : b`
    Select {
        target: SymbolId,
        operands: Vec<Operand>,
    },
    /// `receiver.field = value`
    FieldWrite {
        receiver: Receiver,
        field: String,
        value: Operand,
    },
    /// `target = receiver.field`
    FieldRead {
        target: SymbolId,
        receiver: Receiver,
        field: String,
    },
    /// `collection.Add(value)`, `collection[i] = value`
    ElementWrite { collection: SymbolId, value: Operand },
    /// `target = collection[i]`
    ElementRead { target: SymbolId, collection: SymbolId },
    /// `target = (e0, e1, ...)`
    TupleCreate {
        target: SymbolId,
        elements: Vec<Operand>,
    },
    /// `(t0, t1, ...) = tuple`; `None` discards
    Deconstruct {
        targets: Vec<Option<SymbolId>>,
        tuple: SymbolId,
    },
    /// `target = receiver.callee(arguments)`
    Call {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<SymbolId>,
        callee: CalleeRef,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        receiver: Option<Operand>,
        #[serde(default)]
        arguments: Vec<Argument>,
    },
    Return {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<Operand>,
    },
    Throw {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<Operand>,
    },
    /// Terminates a block with `WhenTrue`/`WhenFalse` successors
    Branch { condition: Condition },
    RegionBoundary { region: RegionId, boundary: Boundary },
    /// Anything else; operands escape, target becomes unknown
    Opaque {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<SymbolId>,
        #[serde(default)]
        operands: Vec<Operand>,
    },
}

/// Operation with its id and the syntax it was lowered from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Operation {
    pub id: OperationId,
    #[serde(flatten)]
    pub kind: OperationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub syntax: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span: Option<SourceSpan>,
}

impl Operation {
    pub fn new(id: OperationId, kind: OperationKind) -> Self {
        Self {
            id,
            kind,
            syntax: None,
            span: None,
        }
    }

    pub fn with_syntax(mut self, syntax: impl Into<String>) -> Self {
        self.syntax = Some(syntax.into());
        self
    }

    pub fn with_span(mut self, span: SourceSpan) -> Self {
        self.span = Some(span);
        self
    }

    /// Allocations, calls and throws may transfer control to an exception handler
    pub fn may_throw(&self) -> bool {
        matches!(
            self.kind,
            OperationKind::Allocation { .. } | OperationKind::Call { .. } | OperationKind::Throw { .. }
        )
    }

    /// First line of the creation syntax, used in diagnostic messages
    pub fn syntax_first_line(&self) -> Option<&str> {
        self.syntax
            .as_deref()
            .and_then(|s| s.lines().map(str::trim).find(|l| !l.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syntax_first_line() {
        let op = Operation::new(
            0,
            OperationKind::Opaque {
                target: None,
                operands: vec![],
            },
        )
        .with_syntax("\n  new Reader(\n    path)");
        assert_eq!(op.syntax_first_line(), Some("new Reader("));
    }

    #[test]
    fn test_analyzable_target_requires_static_dispatch() {
        let callee = CalleeRef::resolved("C.M", ProcedureId(2));
        assert_eq!(callee.analyzable_target(), Some(ProcedureId(2)));
        let callee = callee.with_dispatch(Dispatch::Virtual);
        assert_eq!(callee.analyzable_target(), None);
    }

    #[test]
    fn test_operation_json_shape() {
        let json = r#"{"id":3,"op":"assignment","target":1,"value":"null","syntax":"a = null"}"#;
        let op: Operation = serde_json::from_str(json).unwrap();
        assert_eq!(
            op.kind,
            OperationKind::Assignment {
                target: SymbolId(1),
                value: Operand::Null
            }
        );
        assert!(!op.may_throw());
    }
}
