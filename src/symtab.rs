//! Symbol interning and the per-symbol global variable slot.
//!
//! Parsing and evaluation are single-threaded (spec invariant), so the
//! interner uses `RefCell`, not a `Mutex`, matching the teacher's preference
//! for cheap interior mutability over locking where threads never cross.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use smol_str::SmolStr;

use crate::var::Var;

/// An interned name: a variable, a target, an automatic-variable letter.
/// Single ASCII characters are reserved to ids `0..256` so automatic
/// variables like `$@`/`$<` never need a hash lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(u32);

impl Symbol {
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

struct Slot {
    name: SmolStr,
    global: RefCell<Option<Rc<Var>>>,
}

/// Raised when an assignment tries to clobber a `.KATI_READONLY` variable.
#[derive(Debug, thiserror::Error)]
#[error("overriding readonly variable '{name}'")]
pub struct ReadonlyViolation {
    pub name: SmolStr,
}

pub struct Symtab {
    slots: RefCell<Vec<Slot>>,
    by_name: RefCell<HashMap<SmolStr, Symbol>>,
    undefined: Rc<Var>,
}

impl Default for Symtab {
    fn default() -> Self {
        Self::new()
    }
}

impl Symtab {
    pub fn new() -> Self {
        let t = Symtab {
            slots: RefCell::new(Vec::with_capacity(256)),
            by_name: RefCell::new(HashMap::new()),
            undefined: Rc::new(Var::undefined()),
        };
        for b in 0u32..256 {
            let ch = char::from_u32(b).unwrap();
            let name = SmolStr::new(ch.to_string());
            t.intern_fresh(name);
        }
        t
    }

    fn intern_fresh(&self, name: SmolStr) -> Symbol {
        let mut slots = self.slots.borrow_mut();
        let id = Symbol(slots.len() as u32);
        slots.push(Slot {
            name: name.clone(),
            global: RefCell::new(None),
        });
        self.by_name.borrow_mut().insert(name, id);
        id
    }

    /// Interns `text`, returning a stable [`Symbol`].
    pub fn intern(&self, text: &str) -> Symbol {
        if text.chars().count() == 1 {
            let ch = text.chars().next().unwrap();
            if (ch as u32) < 256 {
                return Symbol(ch as u32);
            }
        }
        if let Some(&sym) = self.by_name.borrow().get(text) {
            return sym;
        }
        self.intern_fresh(SmolStr::new(text))
    }

    pub fn str(&self, sym: Symbol) -> SmolStr {
        self.slots.borrow()[sym.0 as usize].name.clone()
    }

    /// Returns the global variable bound to `sym`, or the shared `Undefined`
    /// singleton if it was never assigned.
    pub fn get_global_var(&self, sym: Symbol) -> Rc<Var> {
        let slots = self.slots.borrow();
        match slots[sym.0 as usize].global.borrow().as_ref() {
            Some(v) => Rc::clone(v),
            None => Rc::clone(&self.undefined),
        }
    }

    pub fn peek_global_var(&self, sym: Symbol) -> Option<Rc<Var>> {
        self.slots.borrow()[sym.0 as usize].global.borrow().clone()
    }

    /// Binds `var` as the global value of `sym`, honoring override/readonly
    /// precedence: a `.KATI_READONLY` variable rejects any non-override
    /// assignment, and an `OVERRIDE`-origin variable can only be replaced by
    /// another override (command-line assignments always win).
    pub fn set_global_var(
        &self,
        sym: Symbol,
        var: Rc<Var>,
        is_override: bool,
    ) -> Result<(), ReadonlyViolation> {
        let slots = self.slots.borrow();
        let slot = &slots[sym.0 as usize];
        let mut g = slot.global.borrow_mut();
        if let Some(existing) = g.as_ref() {
            if existing.readonly.get() && !is_override {
                return Err(ReadonlyViolation {
                    name: slot.name.clone(),
                });
            }
            if existing.origin == crate::var::VarOrigin::Override && !is_override {
                return Ok(());
            }
        }
        *g = Some(var);
        Ok(())
    }

    pub fn all_symbols(&self) -> Vec<Symbol> {
        (0..self.slots.borrow().len() as u32).map(Symbol).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_char_symbols_skip_the_hash_map() {
        let t = Symtab::new();
        let a = t.intern("@");
        let b = t.intern("@");
        assert_eq!(a, b);
        assert_eq!(a.as_u32(), b'@' as u32);
    }

    #[test]
    fn multi_char_names_intern_stably() {
        let t = Symtab::new();
        let a = t.intern("CFLAGS");
        let b = t.intern("CFLAGS");
        let c = t.intern("LDFLAGS");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(t.str(a).as_str(), "CFLAGS");
    }

    #[test]
    fn undefined_is_shared_until_assigned() {
        let t = Symtab::new();
        let sym = t.intern("UNSET");
        assert!(!t.get_global_var(sym).is_defined());
        assert!(t.peek_global_var(sym).is_none());
    }
}
