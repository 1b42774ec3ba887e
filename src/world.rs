//! A World holds everything a running program can see: interned names, the
//! symbol and arity tables, symbol aliases, memoized results and compiled
//! translations

use std::{collections::HashMap, rc::Rc};

use lasso::{Rodeo, Spur};

use crate::{
    compiler::TranslationCache,
    runtime::{
        builtins::{Alias, ALIASES, BUILTINS},
        suggest, RuntimeError,
    },
    value::{Function, SymbolKind, Value},
};

pub mod memo;
pub mod value;

use memo::Memoizer;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// reuse translations of identical static blocks
    pub cache_translations: bool,
    /// memoized results kept before the least recently used is evicted
    pub memo_capacity: usize,
    /// nested blocks and calls allowed before a run fails; every level costs
    /// several native frames, so this has to fit the host thread's stack
    pub max_call_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_translations: true,
            memo_capacity: 4096,
            max_call_depth: 256,
        }
    }
}

/// A saved copy of the symbol and arity tables
#[derive(Debug, Clone, Default)]
pub struct Scope {
    syms: HashMap<Spur, Value>,
    arities: HashMap<Spur, usize>,
}

pub struct World {
    /// interner
    rodeo: Rodeo,
    /// visible bindings
    syms: HashMap<Spur, Value>,
    /// arity of every binding currently known to be callable
    arities: HashMap<Spur, usize>,
    aliases: HashMap<SymbolKind, &'static Alias>,
    pub(crate) memoizer: Memoizer,
    pub(crate) cache: TranslationCache,
    config: Config,
}

impl Default for World {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl World {
    pub fn new(config: Config) -> Self {
        let mut world = Self {
            rodeo: Rodeo::default(),
            syms: HashMap::new(),
            arities: HashMap::new(),
            aliases: ALIASES.iter().map(|(symbol, alias)| (*symbol, alias)).collect(),
            memoizer: Memoizer::new(config.memo_capacity),
            cache: TranslationCache::default(),
            config,
        };
        for builtin in BUILTINS {
            let name = world.rodeo.get_or_intern_static(builtin.name);
            world.set(name, Value::Function(Rc::new(Function::builtin(builtin))));
        }
        world
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn rodeo(&self) -> &Rodeo {
        &self.rodeo
    }

    pub fn intern(&mut self, name: impl AsRef<str>) -> Spur {
        self.rodeo.get_or_intern(name.as_ref())
    }

    /// The interned key for `name`, if it was ever interned
    pub fn lookup(&self, name: &str) -> Option<Spur> {
        self.rodeo.get(name)
    }

    pub fn resolve(&self, name: Spur) -> &str {
        self.rodeo.resolve(&name)
    }

    pub fn get(&self, name: Spur) -> Option<&Value> {
        self.syms.get(&name)
    }

    pub fn get_named(&self, name: &str) -> Option<&Value> {
        self.get(self.lookup(name)?)
    }

    /// Binds `name`, keeping the arity table in step with the value
    pub fn set(&mut self, name: Spur, value: Value) {
        match &value {
            Value::Function(func) => _ = self.arities.insert(name, func.arity),
            _ => _ = self.arities.remove(&name),
        }
        self.syms.insert(name, value);
    }

    pub fn unset(&mut self, name: Spur) -> Option<Value> {
        self.arities.remove(&name);
        self.syms.remove(&name)
    }

    pub fn arity(&self, name: Spur) -> Option<usize> {
        self.arities.get(&name).copied()
    }

    /// Declares `name` callable before its value exists
    pub(crate) fn set_arity(&mut self, name: Spur, arity: usize) {
        self.arities.insert(name, arity);
    }

    /// Forgets a declared arity, as when `name` is about to hold a plain value
    pub(crate) fn unset_arity(&mut self, name: Spur) {
        self.arities.remove(&name);
    }

    pub fn alias(&self, symbol: SymbolKind) -> Option<&'static Alias> {
        self.aliases.get(&symbol).copied()
    }

    pub fn memoizer(&self) -> &Memoizer {
        &self.memoizer
    }

    pub fn cache(&self) -> &TranslationCache {
        &self.cache
    }

    pub(crate) fn undefined(&self, name: Spur) -> RuntimeError {
        let name = self.resolve(name);
        RuntimeError::UndefinedSymbol {
            name: name.into(),
            suggestions: suggest(name, self.syms.keys().map(|key| self.rodeo.resolve(key))),
        }
    }

    pub(crate) fn save_scope(&self) -> Scope {
        Scope {
            syms: self.syms.clone(),
            arities: self.arities.clone(),
        }
    }

    /// Saves only the bindings of `names`
    pub(crate) fn snapshot(&self, names: &[Spur]) -> Scope {
        let mut scope = Scope::default();
        for name in names {
            if let Some(value) = self.syms.get(name) {
                scope.syms.insert(*name, value.clone());
            }
            if let Some(arity) = self.arities.get(name) {
                scope.arities.insert(*name, *arity);
            }
        }
        scope
    }

    pub(crate) fn restore_scope(&mut self, scope: Scope) {
        self.syms = scope.syms;
        self.arities = scope.arities;
    }

    /// Puts `names` back the way `scope` had them, leaving everything else
    pub(crate) fn restore_names(&mut self, scope: &Scope, names: &[Spur]) {
        for name in names {
            match scope.syms.get(name) {
                Some(value) => _ = self.syms.insert(*name, value.clone()),
                None => _ = self.syms.remove(name),
            }
            match scope.arities.get(name) {
                Some(arity) => _ = self.arities.insert(*name, *arity),
                None => _ = self.arities.remove(name),
            }
        }
    }

    /// Copies the live bindings of `names` into `scope`
    pub(crate) fn export_into(&self, scope: &mut Scope, names: &[Spur]) {
        for name in names {
            if let Some(value) = self.syms.get(name) {
                scope.syms.insert(*name, value.clone());
                match self.arities.get(name) {
                    Some(arity) => _ = scope.arities.insert(*name, *arity),
                    None => _ = scope.arities.remove(name),
                }
            }
        }
    }
}
