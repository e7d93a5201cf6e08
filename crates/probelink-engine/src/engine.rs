//! Compile-cache-execute engine
//!
//! `execute` computes a content hash of the raw source text, compiles on a
//! cache miss, and invokes the unit's entry point against the injected
//! context. The unit cache is unbounded and lives for the engine's (and
//! therefore the agent's) lifetime; failed compilations are never cached.

use crate::context::ExecutionContext;
use crate::error::EngineError;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use wasmtime::{Engine, Global, GlobalType, Linker, Module, Mutability, Store, Val, ValType};

/// Exported entry function every compiled unit provides, by convention
pub const ENTRY_POINT: &str = "run";

/// Import namespace under which context bindings are exposed
const IMPORT_MODULE: &str = "env";

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Optional instruction budget per invocation. Off by default: a hung
    /// snippet blocks the executor turn, and the facility relies on
    /// injected code being short-running.
    pub fuel_limit: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { fuel_limit: None }
    }
}

/// A cached, invokable artifact produced from a source-text string
struct CompiledUnit {
    module: Module,
}

/// Snippet engine with an unbounded, content-hash-keyed unit cache.
///
/// Execution is synchronous by design; callers run it on the single
/// executor turn that owns the context.
pub struct ScriptEngine {
    engine: Engine,
    config: EngineConfig,
    cache: HashMap<String, CompiledUnit>,
    compilations: u64,
}

impl ScriptEngine {
    /// Create an engine with default configuration
    pub fn new() -> Result<Self, EngineError> {
        Self::with_config(EngineConfig::default())
    }

    /// Create an engine with custom configuration
    pub fn with_config(config: EngineConfig) -> Result<Self, EngineError> {
        let mut wasmtime_config = wasmtime::Config::new();
        if config.fuel_limit.is_some() {
            wasmtime_config.consume_fuel(true);
        }
        let engine =
            Engine::new(&wasmtime_config).map_err(|e| EngineError::Init(e.to_string()))?;
        Ok(Self {
            engine,
            config,
            cache: HashMap::new(),
            compilations: 0,
        })
    }

    /// Compile (or reuse) the unit for `source` and invoke its entry point
    /// against `ctx`. On success, snippet writes to context bindings are
    /// visible through `ctx` afterwards.
    pub fn execute(
        &mut self,
        source: &str,
        ctx: &mut ExecutionContext,
    ) -> Result<i64, EngineError> {
        let key = content_hash(source);
        if !self.cache.contains_key(&key) {
            let unit = self.compile(source, ctx)?;
            self.cache.insert(key.clone(), unit);
        }
        let unit = self
            .cache
            .get(&key)
            .ok_or_else(|| EngineError::Execution("compiled unit missing from cache".to_string()))?;
        Self::invoke(&self.engine, &self.config, unit, ctx)
    }

    /// Total compilation attempts, successful or not. Test observability
    /// for the cache contract; not used for eviction.
    pub fn compilations(&self) -> u64 {
        self.compilations
    }

    /// Number of cached compiled units
    pub fn cached_units(&self) -> usize {
        self.cache.len()
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn compile(
        &mut self,
        source: &str,
        ctx: &ExecutionContext,
    ) -> Result<CompiledUnit, EngineError> {
        self.compilations += 1;
        let rendered = render_template(source, ctx);
        let wasm = wat::parse_str(&rendered).map_err(|e| {
            EngineError::Compile(e.to_string().lines().map(str::to_string).collect())
        })?;
        let module = Module::from_binary(&self.engine, &wasm)
            .map_err(|e| EngineError::Compile(e.chain().map(|c| c.to_string()).collect()))?;
        Ok(CompiledUnit { module })
    }

    fn invoke(
        engine: &Engine,
        config: &EngineConfig,
        unit: &CompiledUnit,
        ctx: &mut ExecutionContext,
    ) -> Result<i64, EngineError> {
        let mut store = Store::new(engine, ());
        if let Some(fuel) = config.fuel_limit {
            store.add_fuel(fuel).map_err(execution_error)?;
        }

        // One mutable host global per binding; the snippet reads and writes
        // them, and the final values flow back into the context.
        let mut linker: Linker<()> = Linker::new(engine);
        let mut globals = Vec::with_capacity(ctx.len());
        for (name, value) in ctx.iter() {
            let ty = GlobalType::new(ValType::I64, Mutability::Var);
            let global = Global::new(&mut store, ty, Val::I64(*value)).map_err(execution_error)?;
            linker
                .define(&mut store, IMPORT_MODULE, name, global)
                .map_err(execution_error)?;
            globals.push((name.clone(), global));
        }

        let instance = linker
            .instantiate(&mut store, &unit.module)
            .map_err(execution_error)?;
        let entry = instance
            .get_typed_func::<(), i64>(&mut store, ENTRY_POINT)
            .map_err(execution_error)?;
        let result = entry.call(&mut store, ()).map_err(execution_error)?;

        for (name, global) in globals {
            if let Val::I64(value) = global.get(&mut store) {
                ctx.bind(name, value);
            }
        }

        Ok(result)
    }
}

/// Innermost cause of a runtime fault; outer layers only restate it.
fn execution_error(err: wasmtime::Error) -> EngineError {
    EngineError::Execution(err.root_cause().to_string())
}

/// Hex sha256 digest of the raw source text; the cache key
pub fn content_hash(source: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Wrap a snippet in the fixed module template: an import per context
/// binding plus the conventional entry function.
fn render_template(source: &str, ctx: &ExecutionContext) -> String {
    let mut wat = String::from("(module\n");
    for (name, _) in ctx.iter() {
        wat.push_str(&format!(
            "  (import \"{IMPORT_MODULE}\" \"{name}\" (global ${name} (mut i64)))\n"
        ));
    }
    wat.push_str(&format!("  (func (export \"{ENTRY_POINT}\") (result i64)\n"));
    wat.push_str(source);
    wat.push_str("\n  )\n)\n");
    wat
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADD_ONE_ONE: &str = "(i64.add (i64.const 1) (i64.const 1))";

    #[test]
    fn test_execute_arithmetic() {
        let mut engine = ScriptEngine::new().unwrap();
        let mut ctx = ExecutionContext::new();
        let result = engine.execute(ADD_ONE_ONE, &mut ctx).unwrap();
        assert_eq!(result, 2);
    }

    #[test]
    fn test_identical_source_compiles_once() {
        let mut engine = ScriptEngine::new().unwrap();
        let mut ctx = ExecutionContext::new();

        engine.execute(ADD_ONE_ONE, &mut ctx).unwrap();
        engine.execute(ADD_ONE_ONE, &mut ctx).unwrap();

        assert_eq!(engine.compilations(), 1);
        assert_eq!(engine.cached_units(), 1);
    }

    #[test]
    fn test_distinct_sources_compile_separately() {
        let mut engine = ScriptEngine::new().unwrap();
        let mut ctx = ExecutionContext::new();

        engine.execute("(i64.const 1)", &mut ctx).unwrap();
        engine.execute("(i64.const 2)", &mut ctx).unwrap();

        assert_eq!(engine.compilations(), 2);
        assert_eq!(engine.cached_units(), 2);
    }

    #[test]
    fn test_no_negative_caching() {
        let mut engine = ScriptEngine::new().unwrap();
        let mut ctx = ExecutionContext::new();

        for _ in 0..3 {
            let err = engine.execute("this is not wat", &mut ctx).unwrap_err();
            match err {
                EngineError::Compile(diagnostics) => assert!(!diagnostics.is_empty()),
                other => panic!("expected compile error, got {other:?}"),
            }
        }

        // Every failed attempt recompiled; nothing was cached.
        assert_eq!(engine.compilations(), 3);
        assert_eq!(engine.cached_units(), 0);
    }

    #[test]
    fn test_context_read_and_write_back() {
        let mut engine = ScriptEngine::new().unwrap();
        let mut ctx = ExecutionContext::new();
        ctx.bind("counter", 5);

        let source =
            "(global.set $counter (i64.add (global.get $counter) (i64.const 1)))\n(global.get $counter)";
        let result = engine.execute(source, &mut ctx).unwrap();

        assert_eq!(result, 6);
        assert_eq!(ctx.get("counter"), Some(6));
    }

    #[test]
    fn test_unknown_binding_is_compile_error() {
        let mut engine = ScriptEngine::new().unwrap();
        let mut ctx = ExecutionContext::new();
        let err = engine.execute("(global.get $nope)", &mut ctx).unwrap_err();
        assert!(matches!(err, EngineError::Compile(_)));
    }

    #[test]
    fn test_trap_reports_innermost_cause() {
        let mut engine = ScriptEngine::new().unwrap();
        let mut ctx = ExecutionContext::new();
        let err = engine.execute("unreachable", &mut ctx).unwrap_err();
        match err {
            EngineError::Execution(cause) => {
                assert!(cause.contains("unreachable"), "cause was: {cause}")
            }
            other => panic!("expected execution error, got {other:?}"),
        }
    }

    #[test]
    fn test_fault_leaves_cache_consistent() {
        let mut engine = ScriptEngine::new().unwrap();
        let source = "(global.get $x)";

        let mut ctx = ExecutionContext::new();
        ctx.bind("x", 9);
        assert_eq!(engine.execute(source, &mut ctx).unwrap(), 9);

        // Same source, a context missing the imported binding: the cached
        // unit fails at instantiation, not compilation.
        let mut bare = ExecutionContext::new();
        let err = engine.execute(source, &mut bare).unwrap_err();
        assert!(matches!(err, EngineError::Execution(_)));
        assert_eq!(engine.compilations(), 1);
        assert_eq!(engine.cached_units(), 1);

        // The original context still works against the cached unit.
        assert_eq!(engine.execute(source, &mut ctx).unwrap(), 9);
    }

    #[test]
    fn test_fuel_limit_stops_runaway_snippet() {
        let config = EngineConfig {
            fuel_limit: Some(10_000),
        };
        let mut engine = ScriptEngine::with_config(config).unwrap();
        let mut ctx = ExecutionContext::new();

        let err = engine
            .execute("(loop $spin (br $spin))\n(i64.const 0)", &mut ctx)
            .unwrap_err();
        assert!(matches!(err, EngineError::Execution(_)));
    }

    #[test]
    fn test_content_hash_is_deterministic() {
        assert_eq!(content_hash("abc"), content_hash("abc"));
        assert_ne!(content_hash("abc"), content_hash("abd"));
        assert_eq!(content_hash("abc").len(), 64);
    }
}
