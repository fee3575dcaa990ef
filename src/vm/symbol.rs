//! Lexically scoped symbol resolution.
//!
//! Each function gets its own table; blocks push lightweight tables that
//! share the enclosing function's index space so shadowing works without
//! restarting slot numbering. Resolving a name through one or more
//! enclosing function scopes promotes the binding to an upvalue, once,
//! in every function table the lookup crossed.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Where a resolved name lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolScope {
    Global,
    Local,
    Builtin,
    Upvalue,
}

/// A resolved binding: its name, its index within its scope kind, and the
/// scope kind itself.
#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub name: String,
    pub index: u16,
    pub scope: SymbolScope,
}

pub struct SymbolTable {
    pub outer: Option<Rc<RefCell<SymbolTable>>>,
    store: HashMap<String, Symbol>,
    /// Next definition index. Block tables start from the outer table's
    /// counter; function tables start from zero.
    pub num_definitions: u16,
    num_builtins: u16,
    /// Symbols captured from enclosing function scopes, in capture order.
    /// Each entry is the *original* enclosing symbol, which tells the
    /// compiler which getter to emit below OP_CLOSURE.
    pub upvalues: Vec<Symbol>,
    is_block: bool,
    global_space: bool,
}

impl SymbolTable {
    /// The root (top-level) table. Definitions here are globals.
    pub fn new() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self {
            outer: None,
            store: HashMap::new(),
            num_definitions: 0,
            num_builtins: 0,
            upvalues: Vec::new(),
            is_block: false,
            global_space: true,
        }))
    }

    /// A new function scope nested in `outer`.
    pub fn new_enclosed(outer: Rc<RefCell<SymbolTable>>) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self {
            outer: Some(outer),
            store: HashMap::new(),
            num_definitions: 0,
            num_builtins: 0,
            upvalues: Vec::new(),
            is_block: false,
            global_space: false,
        }))
    }

    /// A block scope: same index space as `outer`, own name store.
    pub fn new_block(outer: Rc<RefCell<SymbolTable>>) -> Rc<RefCell<Self>> {
        let (num_definitions, global_space) = {
            let outer_ref = outer.borrow();
            (outer_ref.num_definitions, outer_ref.global_space)
        };
        Rc::new(RefCell::new(Self {
            outer: Some(outer),
            store: HashMap::new(),
            num_definitions,
            num_builtins: 0,
            upvalues: Vec::new(),
            is_block: true,
            global_space,
        }))
    }

    /// Allocate the next index for `name`. Global at top level (including
    /// blocks at top level), local inside functions.
    pub fn define(&mut self, name: impl Into<String>) -> Symbol {
        let scope = if self.global_space {
            SymbolScope::Global
        } else {
            SymbolScope::Local
        };
        let symbol = Symbol {
            name: name.into(),
            index: self.num_definitions,
            scope,
        };
        self.num_definitions += 1;
        self.store.insert(symbol.name.clone(), symbol.clone());
        symbol
    }

    /// Register a builtin; builtins index a separate pool.
    pub fn define_builtin(&mut self, name: impl Into<String>) -> Symbol {
        let symbol = Symbol {
            name: name.into(),
            index: self.num_builtins,
            scope: SymbolScope::Builtin,
        };
        self.num_builtins += 1;
        self.store.insert(symbol.name.clone(), symbol.clone());
        symbol
    }

    /// Look up in this table only.
    pub fn resolve_inner(&self, name: &str) -> Option<Symbol> {
        self.store.get(name).cloned()
    }

    /// Look up through the scope chain. Globals and builtins come back
    /// unchanged; an enclosing local (or upvalue) is promoted to an
    /// upvalue of the requesting function, and the promotion is cached so
    /// it happens at most once per table.
    pub fn resolve(table: &Rc<RefCell<SymbolTable>>, name: &str) -> Option<Symbol> {
        if let Some(symbol) = table.borrow().store.get(name) {
            return Some(symbol.clone());
        }

        let outer = table.borrow().outer.clone()?;
        let symbol = Self::resolve(&outer, name)?;

        match symbol.scope {
            SymbolScope::Global | SymbolScope::Builtin => Some(symbol),
            SymbolScope::Local | SymbolScope::Upvalue => {
                if table.borrow().is_block {
                    // Same function, just an enclosing block
                    Some(symbol)
                } else {
                    Some(table.borrow_mut().define_upvalue(symbol))
                }
            }
        }
    }

    fn define_upvalue(&mut self, original: Symbol) -> Symbol {
        self.upvalues.push(original.clone());
        let symbol = Symbol {
            name: original.name,
            index: (self.upvalues.len() - 1) as u16,
            scope: SymbolScope::Upvalue,
        };
        self.store.insert(symbol.name.clone(), symbol.clone());
        symbol
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defines_globals_at_top_level() {
        let table = SymbolTable::new();
        let a = table.borrow_mut().define("a");
        let b = table.borrow_mut().define("b");
        assert_eq!(a.scope, SymbolScope::Global);
        assert_eq!(a.index, 0);
        assert_eq!(b.index, 1);
    }

    #[test]
    fn builtins_index_a_separate_pool() {
        let table = SymbolTable::new();
        table.borrow_mut().define("a");
        let builtin = table.borrow_mut().define_builtin("print");
        assert_eq!(builtin.scope, SymbolScope::Builtin);
        assert_eq!(builtin.index, 0);
    }

    #[test]
    fn function_scopes_define_locals_from_zero() {
        let root = SymbolTable::new();
        root.borrow_mut().define("g");
        let inner = SymbolTable::new_enclosed(root);
        let local = inner.borrow_mut().define("x");
        assert_eq!(local.scope, SymbolScope::Local);
        assert_eq!(local.index, 0);
    }

    #[test]
    fn globals_resolve_unchanged_through_nesting() {
        let root = SymbolTable::new();
        let g = root.borrow_mut().define("g");
        let inner = SymbolTable::new_enclosed(root);
        let deeper = SymbolTable::new_enclosed(inner);
        let resolved = SymbolTable::resolve(&deeper, "g").unwrap();
        assert_eq!(resolved, g);
        assert!(deeper.borrow().upvalues.is_empty());
    }

    #[test]
    fn enclosing_local_is_promoted_to_upvalue_once() {
        let root = SymbolTable::new();
        let outer_fn = SymbolTable::new_enclosed(root);
        outer_fn.borrow_mut().define("x");
        let inner_fn = SymbolTable::new_enclosed(outer_fn.clone());

        let first = SymbolTable::resolve(&inner_fn, "x").unwrap();
        assert_eq!(first.scope, SymbolScope::Upvalue);
        assert_eq!(first.index, 0);

        // Second resolution hits the cached entry, not the outer chain
        let second = SymbolTable::resolve(&inner_fn, "x").unwrap();
        assert_eq!(second, first);
        assert_eq!(inner_fn.borrow().upvalues.len(), 1);
        assert_eq!(inner_fn.borrow().upvalues[0].scope, SymbolScope::Local);
    }

    #[test]
    fn promotion_is_transitive_through_function_scopes() {
        let root = SymbolTable::new();
        let f = SymbolTable::new_enclosed(root);
        f.borrow_mut().define("x");
        let g = SymbolTable::new_enclosed(f.clone());
        let h = SymbolTable::new_enclosed(g.clone());

        let resolved = SymbolTable::resolve(&h, "x").unwrap();
        assert_eq!(resolved.scope, SymbolScope::Upvalue);

        // g captured the local; h captured g's upvalue
        assert_eq!(g.borrow().upvalues[0].scope, SymbolScope::Local);
        assert_eq!(h.borrow().upvalues[0].scope, SymbolScope::Upvalue);
    }

    #[test]
    fn blocks_share_the_function_index_space() {
        let root = SymbolTable::new();
        let func = SymbolTable::new_enclosed(root);
        func.borrow_mut().define("a"); // slot 0
        let block = SymbolTable::new_block(func.clone());
        let shadow = block.borrow_mut().define("a");
        assert_eq!(shadow.scope, SymbolScope::Local);
        assert_eq!(shadow.index, 1, "shadow gets a fresh slot, not slot 0");

        // The outer binding is untouched
        let outer = func.borrow().resolve_inner("a").unwrap();
        assert_eq!(outer.index, 0);
    }

    #[test]
    fn blocks_do_not_promote_within_the_same_function() {
        let root = SymbolTable::new();
        let func = SymbolTable::new_enclosed(root);
        func.borrow_mut().define("a");
        let block = SymbolTable::new_block(func.clone());
        let resolved = SymbolTable::resolve(&block, "a").unwrap();
        assert_eq!(resolved.scope, SymbolScope::Local);
        assert!(func.borrow().upvalues.is_empty());
    }

    #[test]
    fn capture_through_a_block_targets_the_function_slot() {
        // function f { var x; { function g() { x } } }
        let root = SymbolTable::new();
        let f = SymbolTable::new_enclosed(root);
        f.borrow_mut().define("x");
        let block = SymbolTable::new_block(f);
        let g = SymbolTable::new_enclosed(block);

        let resolved = SymbolTable::resolve(&g, "x").unwrap();
        assert_eq!(resolved.scope, SymbolScope::Upvalue);
        assert_eq!(g.borrow().upvalues[0].scope, SymbolScope::Local);
        assert_eq!(g.borrow().upvalues[0].index, 0);
    }

    #[test]
    fn top_level_blocks_define_globals() {
        let root = SymbolTable::new();
        root.borrow_mut().define("a"); // global 0
        let block = SymbolTable::new_block(root);
        let shadow = block.borrow_mut().define("a");
        assert_eq!(shadow.scope, SymbolScope::Global);
        assert_eq!(shadow.index, 1);
    }
}
