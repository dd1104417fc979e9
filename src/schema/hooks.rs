/*!
Hook serialisation (spec.md §4.3, "Hook serialisation"). Hooks are supplied
as named source text, stored verbatim in the catalog, and rehydrated into
callable form through a caller-provided [`HookRegistry`] — never through a
raw `eval`. A hook whose name is missing from the registry at rehydration
time downgrades to a no-op and the miss is recorded as a diagnostic rather
than failing the whole schema compile.
*/

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::codec::Value;
use crate::error::Result;

/// Which side of an operation a hook runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HookPhase {
    /// Runs before the operation mutates anything.
    Pre,
    /// Runs after the operation has committed.
    Post,
}

/// A single hook as stored in the catalog: which C7 operation it attaches
/// to, which phase, a registry name, and the original source text kept
/// verbatim for round-tripping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookDescriptor {
    /// The record-lifecycle operation this hook attaches to (`"insert"`, `"update"`, ...).
    pub operation: String,
    /// Pre- or post-operation.
    pub phase: HookPhase,
    /// Name looked up in the [`HookRegistry`] at rehydration time.
    pub name: String,
    /// The hook's original source text, preserved verbatim.
    pub source: String,
}

/// The set of hooks declared for a resource, as stored in the catalog.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HookSet {
    /// Every declared hook, in declaration order.
    pub descriptors: Vec<HookDescriptor>,
}

/// A callable hook body: mutates the record in place, or fails the
/// operation.
pub type HookFn = Arc<dyn Fn(&mut BTreeMap<String, Value>) -> Result<()> + Send + Sync>;

/// Maps registry names to callable hook bodies. Populated once by the
/// embedder at startup; never constructed from the catalog's source text
/// directly.
#[derive(Clone, Default)]
pub struct HookRegistry {
    entries: BTreeMap<String, HookFn>,
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookRegistry")
            .field("names", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl HookRegistry {
    /// Register a callable hook body under `name`.
    pub fn register(&mut self, name: impl Into<String>, hook: HookFn) {
        self.entries.insert(name.into(), hook);
    }
}

/// The outcome of rehydrating a [`HookSet`] against a [`HookRegistry`]:
/// resolved callables plus any names that could not be found.
#[derive(Clone, Default)]
pub struct RehydratedHooks {
    by_key: BTreeMap<(String, HookPhase), Vec<HookFn>>,
    /// Registry names referenced by the catalog but absent from the
    /// registry at rehydration time; each was downgraded to a no-op.
    pub diagnostics: Vec<String>,
}

impl fmt::Debug for RehydratedHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RehydratedHooks")
            .field("operations", &self.by_key.keys().collect::<Vec<_>>())
            .field("diagnostics", &self.diagnostics)
            .finish()
    }
}

impl RehydratedHooks {
    /// Run every hook registered for `(operation, phase)`, in declaration
    /// order, short-circuiting on the first error.
    pub fn run(
        &self,
        operation: &str,
        phase: HookPhase,
        record: &mut BTreeMap<String, Value>,
    ) -> Result<()> {
        if let Some(hooks) = self.by_key.get(&(operation.to_string(), phase)) {
            for hook in hooks {
                hook(record)?;
            }
        }
        Ok(())
    }
}

/// Rehydrate a [`HookSet`] against `registry`. Unresolvable names never
/// fail the compile; they become no-ops with a recorded diagnostic.
pub fn rehydrate(hooks: &HookSet, registry: &HookRegistry) -> RehydratedHooks {
    let mut out = RehydratedHooks::default();
    for descriptor in &hooks.descriptors {
        let key = (descriptor.operation.clone(), descriptor.phase);
        match registry.entries.get(&descriptor.name) {
            Some(hook) => out.by_key.entry(key).or_default().push(hook.clone()),
            None => out
                .diagnostics
                .push(format!("hook `{}` not found in registry, downgraded to no-op", descriptor.name)),
        }
    }
    out
}
