//! Reference JIT backend
//!
//! "Compiles" a lowered [`CodeUnit`] by validating it and installing its
//! functions as shared, immutable trees that the [`exec`] evaluator walks.
//! Every module owns its symbols and its slice of global storage, so
//! unloading a module makes exactly its symbols unresolvable.

pub mod exec;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::rc::Rc;

use tracing::debug;

use super::ir::{body_references, expr_references, CodeUnit, Function, Initializer};
use super::{
    CodegenError, ExecFault, JitBackend, ModuleHandle, RuntimeHost, StaticInitializer,
    SymbolAddress, SymbolKind, Value,
};
use exec::Evaluator;

/// Maximum call depth
const DEFAULT_MAX_CALL_DEPTH: usize = 512;

/// Maximum number of frame slots of a single function
const DEFAULT_MAX_FRAME_SLOTS: usize = 256;

/// Limits enforced by the JIT
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JitConfig {
    pub max_call_depth: usize,
    pub max_frame_slots: usize,
}

impl Default for JitConfig {
    fn default() -> Self {
        Self {
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            max_frame_slots: DEFAULT_MAX_FRAME_SLOTS,
        }
    }
}

#[derive(Debug)]
struct Module {
    functions: Vec<Rc<Function>>,
    function_refs: Vec<Vec<String>>,
    globals: Vec<String>,
    initializers: Vec<Initializer>,
    initializer_refs: Vec<Vec<String>>,
    /// Referenced symbols the module does not define
    references: Vec<String>,
}

impl Module {
    fn symbols(&self) -> Vec<String> {
        self.globals
            .iter()
            .cloned()
            .chain(self.functions.iter().map(|f| f.name.clone()))
            .collect()
    }
}

/// Closure-tree JIT
#[derive(Debug, Default)]
pub struct TreeJit {
    config: JitConfig,
    modules: BTreeMap<ModuleHandle, Module>,
    symbols: HashMap<String, SymbolAddress>,
    globals: HashMap<String, i64>,
    next_module: u32,
}

impl TreeJit {
    /// Create a JIT with default limits
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a JIT with custom limits
    pub fn with_config(config: JitConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Current value of a live global
    pub fn global_value(
        &self,
        name: &str,
    ) -> Option<i64> {
        self.globals.get(name).copied()
    }

    /// Number of live modules
    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    fn validate(
        &self,
        unit: &CodeUnit,
    ) -> Result<(), CodegenError> {
        let mut seen = BTreeSet::new();
        for name in unit.defined_symbols() {
            if self.symbols.contains_key(&name) || !seen.insert(name.clone()) {
                return Err(CodegenError::DuplicateSymbol(name));
            }
        }
        for function in &unit.functions {
            if function.frame_size > self.config.max_frame_slots {
                return Err(CodegenError::FrameTooLarge {
                    name: function.name.clone(),
                    slots: function.frame_size,
                    limit: self.config.max_frame_slots,
                });
            }
        }
        Ok(())
    }

    fn module(
        &self,
        handle: ModuleHandle,
    ) -> Option<&Module> {
        self.modules.get(&handle)
    }
}

fn sorted(refs: BTreeSet<String>) -> Vec<String> {
    refs.into_iter().collect()
}

impl JitBackend for TreeJit {
    type Unit = CodeUnit;

    fn emit(
        &mut self,
        unit: &CodeUnit,
    ) -> Result<ModuleHandle, CodegenError> {
        self.validate(unit)?;

        let handle = ModuleHandle(self.next_module);
        self.next_module += 1;

        let function_refs: Vec<Vec<String>> = unit
            .functions
            .iter()
            .map(|f| {
                let mut refs = BTreeSet::new();
                body_references(&f.body, &mut refs);
                sorted(refs)
            })
            .collect();
        let initializer_refs: Vec<Vec<String>> = unit
            .initializers
            .iter()
            .map(|init| {
                let mut refs = BTreeSet::new();
                refs.insert(init.global.clone());
                expr_references(&init.value, &mut refs);
                sorted(refs)
            })
            .collect();

        let defined: BTreeSet<String> = unit.defined_symbols().into_iter().collect();
        let references = function_refs
            .iter()
            .chain(initializer_refs.iter())
            .flatten()
            .filter(|name| !defined.contains(*name))
            .cloned()
            .collect::<BTreeSet<_>>();

        for (index, global) in unit.globals.iter().enumerate() {
            self.symbols.insert(
                global.name.clone(),
                SymbolAddress {
                    module: handle,
                    kind: SymbolKind::Global,
                    index: index as u32,
                },
            );
            self.globals
                .insert(global.name.clone(), global.constant.unwrap_or(0));
        }
        for (index, function) in unit.functions.iter().enumerate() {
            self.symbols.insert(
                function.name.clone(),
                SymbolAddress {
                    module: handle,
                    kind: SymbolKind::Function,
                    index: index as u32,
                },
            );
        }

        debug!(
            "emitted module {} ({} functions, {} globals, {} initializers)",
            handle.0,
            unit.functions.len(),
            unit.globals.len(),
            unit.initializers.len()
        );
        self.modules.insert(
            handle,
            Module {
                functions: unit.functions.iter().cloned().map(Rc::new).collect(),
                function_refs,
                globals: unit.globals.iter().map(|g| g.name.clone()).collect(),
                initializers: unit.initializers.clone(),
                initializer_refs,
                references: sorted(references),
            },
        );
        Ok(handle)
    }

    fn module_symbols(
        &self,
        module: ModuleHandle,
    ) -> Vec<String> {
        self.module(module).map(Module::symbols).unwrap_or_default()
    }

    fn module_references(
        &self,
        module: ModuleHandle,
    ) -> Vec<String> {
        self.module(module)
            .map(|m| m.references.clone())
            .unwrap_or_default()
    }

    fn references(
        &self,
        address: SymbolAddress,
    ) -> Vec<String> {
        let Some(module) = self.module(address.module) else {
            return Vec::new();
        };
        let index = address.index as usize;
        match address.kind {
            SymbolKind::Function => module.function_refs.get(index).cloned(),
            SymbolKind::Initializer => module.initializer_refs.get(index).cloned(),
            SymbolKind::Global => None,
        }
        .unwrap_or_default()
    }

    fn static_initializers(
        &self,
        module: ModuleHandle,
    ) -> Vec<StaticInitializer> {
        let Some(m) = self.module(module) else {
            return Vec::new();
        };
        m.initializers
            .iter()
            .enumerate()
            .map(|(index, init)| StaticInitializer {
                address: SymbolAddress {
                    module,
                    kind: SymbolKind::Initializer,
                    index: index as u32,
                },
                decl: init.decl,
            })
            .collect()
    }

    fn resolve_symbol(
        &self,
        name: &str,
    ) -> Option<SymbolAddress> {
        self.symbols.get(name).copied()
    }

    fn run(
        &mut self,
        address: SymbolAddress,
        args: &[Value],
        host: &mut dyn RuntimeHost,
    ) -> Result<Value, ExecFault> {
        let index = address.index as usize;
        let unknown = || ExecFault::Unresolved(address.to_string());
        match address.kind {
            SymbolKind::Function => {
                let function = self
                    .module(address.module)
                    .and_then(|m| m.functions.get(index))
                    .cloned()
                    .ok_or_else(unknown)?;
                let args: Vec<i64> = args.iter().map(|v| v.as_int().unwrap_or(0)).collect();
                Evaluator::new(self, host).call_function(&function, &args)
            }
            SymbolKind::Initializer => {
                let init = self
                    .module(address.module)
                    .and_then(|m| m.initializers.get(index))
                    .cloned()
                    .ok_or_else(unknown)?;
                let mut evaluator = Evaluator::new(self, host);
                let value = evaluator.eval_detached(&init.value)?;
                evaluator.store_global(&init.global, value)?;
                Ok(Value::Void)
            }
            SymbolKind::Global => {
                let name = self
                    .module(address.module)
                    .and_then(|m| m.globals.get(index))
                    .ok_or_else(unknown)?;
                self.global_value(name).map(Value::Int).ok_or_else(unknown)
            }
        }
    }

    fn is_live(
        &self,
        module: ModuleHandle,
    ) -> bool {
        self.modules.contains_key(&module)
    }

    fn unload_module(
        &mut self,
        module: ModuleHandle,
    ) {
        let Some(removed) = self.modules.remove(&module) else {
            return;
        };
        for name in removed.symbols() {
            if self.symbols.get(&name).map(|a| a.module) == Some(module) {
                self.symbols.remove(&name);
            }
        }
        for name in &removed.globals {
            self.globals.remove(name);
        }
        debug!("unloaded module {}", module.0);
    }
}
