//! Variable flavors, origins, and the scope chain used for target-specific
//! variables.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use indexmap::IndexMap;
use smol_str::SmolStr;

use crate::expr::Value;
use crate::loc::Loc;
use crate::symtab::Symbol;

/// Precedence order for where a variable's value came from. Higher values
/// win ties when a variable is (re-)assigned; `Override` and `CommandLine`
/// can only be replaced by an equal-or-higher origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum VarOrigin {
    Undefined,
    Default,
    Environment,
    EnvironmentOverride,
    File,
    CommandLine,
    Override,
    Automatic,
}

impl VarOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            VarOrigin::Undefined => "undefined",
            VarOrigin::Default => "default",
            VarOrigin::Environment => "environment",
            VarOrigin::EnvironmentOverride => "environment override",
            VarOrigin::File => "file",
            VarOrigin::CommandLine => "command line",
            VarOrigin::Override => "override",
            VarOrigin::Automatic => "automatic",
        }
    }
}

/// The operator used for the most recent assignment (`$(origin)` reports it
/// indirectly via the value; `SetAssignOp` drives `+=` semantics).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Recursive,
    Simple,
    Append,
    Conditional,
    Final,
}

#[derive(Debug)]
pub enum VarFlavor {
    Simple(SmolStr),
    Recursive(Rc<Value>, SmolStr),
    Undefined,
}

/// A single variable binding. Mutable bookkeeping fields (readonly,
/// deprecated, self-referential) use `Cell`/`RefCell` rather than `&mut`
/// access because the same `Rc<Var>` is shared across scope chains.
#[derive(Debug)]
pub struct Var {
    pub flavor: VarFlavor,
    pub origin: VarOrigin,
    pub assign_op: Cell<AssignOp>,
    pub readonly: Cell<bool>,
    pub deprecated: RefCell<Option<SmolStr>>,
    pub obsolete: RefCell<Option<SmolStr>>,
    pub self_referential: Cell<bool>,
    pub loc: Loc,
}

impl Var {
    pub fn undefined() -> Self {
        Var {
            flavor: VarFlavor::Undefined,
            origin: VarOrigin::Undefined,
            assign_op: Cell::new(AssignOp::Recursive),
            readonly: Cell::new(false),
            deprecated: RefCell::new(None),
            obsolete: RefCell::new(None),
            self_referential: Cell::new(false),
            loc: Loc::unknown(),
        }
    }

    pub fn simple(text: impl Into<SmolStr>, origin: VarOrigin, op: AssignOp, loc: Loc) -> Self {
        Var {
            flavor: VarFlavor::Simple(text.into()),
            origin,
            assign_op: Cell::new(op),
            readonly: Cell::new(false),
            deprecated: RefCell::new(None),
            obsolete: RefCell::new(None),
            self_referential: Cell::new(false),
            loc,
        }
    }

    pub fn recursive(
        expr: Rc<Value>,
        orig_text: impl Into<SmolStr>,
        origin: VarOrigin,
        op: AssignOp,
        loc: Loc,
    ) -> Self {
        Var {
            flavor: VarFlavor::Recursive(expr, orig_text.into()),
            origin,
            assign_op: Cell::new(op),
            readonly: Cell::new(false),
            deprecated: RefCell::new(None),
            obsolete: RefCell::new(None),
            self_referential: Cell::new(false),
            loc,
        }
    }

    pub fn is_defined(&self) -> bool {
        !matches!(self.flavor, VarFlavor::Undefined)
    }

    pub fn flavor_name(&self) -> &'static str {
        match self.flavor {
            VarFlavor::Simple(_) => "simple",
            VarFlavor::Recursive(..) => "recursive",
            VarFlavor::Undefined => "undefined",
        }
    }

    /// The variable's defining text, unexpanded for recursive variables —
    /// used by the `value` builtin and `.VARIABLES` listing.
    pub fn orig_text(&self) -> SmolStr {
        match &self.flavor {
            VarFlavor::Simple(s) => s.clone(),
            VarFlavor::Recursive(_, orig) => orig.clone(),
            VarFlavor::Undefined => SmolStr::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("overriding readonly variable")]
pub struct ReadonlyViolation;

/// A target-specific (or `$(eval)`-scoped) chain of variable bindings.
/// Lookup walks outward through `parent` scopes, ending at the global
/// symbol table. Insertion order is preserved (`.VARIABLES` relies on it
/// transitively through the symbol table, not this map, but IndexMap keeps
/// iteration deterministic for debugging).
#[derive(Debug, Default)]
pub struct Vars {
    map: IndexMap<Symbol, Rc<Var>>,
}

impl Vars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, sym: Symbol) -> Option<Rc<Var>> {
        self.map.get(&sym).cloned()
    }

    pub fn peek(&self, sym: Symbol) -> Option<Rc<Var>> {
        self.map.get(&sym).cloned()
    }

    pub fn assign(&mut self, sym: Symbol, var: Rc<Var>) -> Result<(), ReadonlyViolation> {
        if let Some(existing) = self.map.get(&sym) {
            if existing.readonly.get() {
                return Err(ReadonlyViolation);
            }
        }
        self.map.insert(sym, var);
        Ok(())
    }

    pub fn remove(&mut self, sym: Symbol) -> Option<Rc<Var>> {
        self.map.shift_remove(&sym)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Symbol, &Rc<Var>)> {
        self.map.iter().map(|(s, v)| (*s, v))
    }
}

/// RAII scope guard: binds `name` to `var` in `vars` for the guard's
/// lifetime, restoring (or removing) the previous binding on drop. Used for
/// target-specific variables and `$(call)`'s `$1..$9` parameters.
pub struct ScopedVar<'a> {
    vars: &'a mut Vars,
    sym: Symbol,
    prev: Option<Rc<Var>>,
}

impl<'a> ScopedVar<'a> {
    pub fn new(vars: &'a mut Vars, sym: Symbol, var: Rc<Var>) -> Self {
        let prev = vars.map.insert(sym, var);
        ScopedVar { vars, sym, prev }
    }
}

impl Drop for ScopedVar<'_> {
    fn drop(&mut self) {
        match self.prev.take() {
            Some(v) => {
                self.vars.map.insert(self.sym, v);
            }
            None => {
                self.vars.map.shift_remove(&self.sym);
            }
        }
    }
}
