//! Scripts, functions and objects the stack consults while pushing frames.
//!
//! The stack never interprets bytecode or walks object graphs; it only needs
//! slot counts, formal arity, strictness and the parent link of a callee (for
//! the lazily materialized scope chain). A [`Realm`] is built up front and then
//! shared through `Rc`; objects may still be allocated through `&Realm`.

use std::cell::RefCell;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u32);

        impl $name {
            #[inline]
            pub const fn from_raw(raw: u32) -> Self {
                Self(raw)
            }

            #[inline]
            pub const fn raw(self) -> u32 {
                self.0
            }

            #[inline]
            pub(crate) const fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

id_type!(
    /// Index of a [`Script`] in its realm.
    ScriptId
);
id_type!(
    /// Index of a [`Function`] in its realm.
    FunctionId
);
id_type!(
    /// Handle of an object allocated in a realm.
    ObjectId
);

/// Bytecode unit metadata: only the parts the frame layout depends on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Script {
    pub name: Arc<str>,
    /// Local variable slots directly after the frame header.
    pub nfixed: u32,
    /// `nfixed` plus the maximum expression stack depth.
    pub nslots: u32,
    #[serde(default)]
    pub code_len: u32,
    #[serde(default)]
    pub strict: bool,
}

impl Script {
    pub fn new(name: impl Into<Arc<str>>, nfixed: u32, nslots: u32) -> Self {
        debug_assert!(nfixed <= nslots);
        Self {
            name: name.into(),
            nfixed,
            nslots,
            code_len: 0,
            strict: false,
        }
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_code_len(mut self, code_len: u32) -> Self {
        self.code_len = code_len;
        self
    }
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: Arc<str>,
    pub nargs: u32,
    pub script: ScriptId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Global,
    Call,
    Block,
    Function(FunctionId),
    Plain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Object {
    pub kind: ObjectKind,
    pub parent: Option<ObjectId>,
}

#[derive(Debug)]
pub struct Realm {
    scripts: Vec<Script>,
    functions: Vec<Function>,
    function_names: FxHashMap<Arc<str>, FunctionId>,
    objects: RefCell<Vec<Object>>,
    global: ObjectId,
}

impl Default for Realm {
    fn default() -> Self {
        Self::new()
    }
}

impl Realm {
    pub fn new() -> Self {
        let global = Object {
            kind: ObjectKind::Global,
            parent: None,
        };
        Self {
            scripts: Vec::new(),
            functions: Vec::new(),
            function_names: FxHashMap::default(),
            objects: RefCell::new(vec![global]),
            global: ObjectId(0),
        }
    }

    #[inline]
    pub fn global(&self) -> ObjectId {
        self.global
    }

    pub fn add_script(&mut self, script: Script) -> ScriptId {
        let id = ScriptId(self.scripts.len() as u32);
        self.scripts.push(script);
        id
    }

    /// Register a function; a later function with the same name shadows the earlier one.
    pub fn add_function(&mut self, name: impl Into<Arc<str>>, nargs: u32, script: ScriptId) -> FunctionId {
        let name = name.into();
        let id = FunctionId(self.functions.len() as u32);
        self.functions.push(Function {
            name: Arc::clone(&name),
            nargs,
            script,
        });
        self.function_names.insert(name, id);
        id
    }

    #[inline]
    pub fn script(&self, id: ScriptId) -> &Script {
        &self.scripts[id.index()]
    }

    #[inline]
    pub fn function(&self, id: FunctionId) -> &Function {
        &self.functions[id.index()]
    }

    /// Script executed by a function.
    #[inline]
    pub fn function_script(&self, id: FunctionId) -> &Script {
        self.script(self.function(id).script)
    }

    pub fn function_by_name(&self, name: &str) -> Option<FunctionId> {
        self.function_names.get(name).copied()
    }

    pub fn script_by_name(&self, name: &str) -> Option<ScriptId> {
        self.scripts
            .iter()
            .position(|s| &*s.name == name)
            .map(|idx| ScriptId(idx as u32))
    }

    pub fn new_object(&self, kind: ObjectKind, parent: Option<ObjectId>) -> ObjectId {
        let mut objects = self.objects.borrow_mut();
        let id = ObjectId(objects.len() as u32);
        objects.push(Object { kind, parent });
        id
    }

    /// Allocate a function object (closure) whose enclosing scope is `parent`.
    pub fn new_function_object(&self, fun: FunctionId, parent: ObjectId) -> ObjectId {
        self.new_object(ObjectKind::Function(fun), Some(parent))
    }

    pub fn object(&self, id: ObjectId) -> Option<Object> {
        self.objects.borrow().get(id.index()).copied()
    }

    pub fn function_of(&self, id: ObjectId) -> Option<FunctionId> {
        match self.object(id)?.kind {
            ObjectKind::Function(fun) => Some(fun),
            _ => None,
        }
    }

    /// Enclosing scope of an object; objects without a parent resolve to the global.
    pub fn parent_or_global(&self, id: ObjectId) -> ObjectId {
        self.object(id).and_then(|o| o.parent).unwrap_or(self.global)
    }

    pub fn object_count(&self) -> usize {
        self.objects.borrow().len()
    }
}
