//! Module representation

use super::layout::{DataLayout, DefaultLayout};
use super::{Function, Type};
use indexmap::{IndexMap, IndexSet};
use std::sync::Arc;

/// Ownership root: functions, globals and the memory layout they share.
#[derive(Debug, Clone)]
pub struct Module {
    /// Module name
    name: String,

    /// Functions in this module, in insertion order
    functions: IndexMap<String, Function>,

    /// Global variables
    globals: IndexMap<String, GlobalVariable>,

    /// Size/alignment oracle, read-only for passes
    layout: Arc<dyn DataLayout>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GlobalVariable {
    pub name: String,
    pub ty: Type,
    pub is_constant: bool,
}

impl GlobalVariable {
    pub fn new(name: impl Into<String>, ty: Type, is_constant: bool) -> Self {
        Self {
            name: name.into(),
            ty,
            is_constant,
        }
    }
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_layout(name, Arc::new(DefaultLayout::new()))
    }

    pub fn with_layout(name: impl Into<String>, layout: Arc<dyn DataLayout>) -> Self {
        Self {
            name: name.into(),
            functions: IndexMap::new(),
            globals: IndexMap::new(),
            layout,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn layout(&self) -> &dyn DataLayout {
        self.layout.as_ref()
    }

    /// Shared handle to the layout, for callers that also need the
    /// functions mutably.
    pub fn layout_handle(&self) -> Arc<dyn DataLayout> {
        Arc::clone(&self.layout)
    }

    /// Add a function, replacing any function with the same name.
    pub fn add_function(&mut self, func: Function) {
        self.functions.insert(func.name().to_string(), func);
    }

    pub fn add_global(&mut self, global: GlobalVariable) {
        self.globals.insert(global.name.clone(), global);
    }

    pub fn get_function(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }

    pub fn get_function_mut(&mut self, name: &str) -> Option<&mut Function> {
        self.functions.get_mut(name)
    }

    pub fn iter_functions(&self) -> impl Iterator<Item = &Function> {
        self.functions.values()
    }

    pub fn iter_functions_mut(&mut self) -> impl Iterator<Item = &mut Function> {
        self.functions.values_mut()
    }

    pub fn num_functions(&self) -> usize {
        self.functions.len()
    }

    pub fn get_global(&self, name: &str) -> Option<&GlobalVariable> {
        self.globals.get(name)
    }

    pub fn iter_globals(&self) -> impl Iterator<Item = &GlobalVariable> {
        self.globals.values()
    }

    /// Names of every global variable, for lookups while functions are
    /// borrowed mutably.
    pub fn global_names(&self) -> IndexSet<String> {
        self.globals.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_functions_keep_order() {
        let mut module = Module::new("m");
        module.add_function(Function::new("b", Type::Void, vec![]));
        module.add_function(Function::new("a", Type::Void, vec![]));
        let names: Vec<&str> = module.iter_functions().map(|f| f.name()).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert!(module.get_function("a").is_some());
        assert_eq!(module.layout().pointer_bits(), 64);
    }

    #[test]
    fn test_globals() {
        let mut module = Module::new("m");
        module.add_global(GlobalVariable::new("_ZTV4Base", Type::array(4, Type::Ptr), true));
        assert!(module.get_global("_ZTV4Base").unwrap().is_constant);
        assert_eq!(module.iter_globals().count(), 1);
        assert!(module.global_names().contains("_ZTV4Base"));
    }
}
