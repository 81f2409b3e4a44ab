use crate::realm::{ObjectId, ScriptId};
use crate::value::Value;

/// Receives the roots held by stack memory.
pub trait Tracer {
    fn trace_value(&mut self, value: Value);

    fn trace_object(&mut self, _object: ObjectId) {}

    fn trace_script(&mut self, _script: ScriptId) {}
}

/// Collects every reported root; object values are also recorded as objects.
#[derive(Debug, Default)]
pub struct RootSet {
    pub values: usize,
    pub objects: Vec<ObjectId>,
    pub scripts: Vec<ScriptId>,
}

impl RootSet {
    pub fn contains_object(&self, object: ObjectId) -> bool {
        self.objects.contains(&object)
    }
}

impl Tracer for RootSet {
    fn trace_value(&mut self, value: Value) {
        self.values += 1;
        if let Some(object) = value.to_object() {
            self.objects.push(object);
        }
    }

    fn trace_object(&mut self, object: ObjectId) {
        self.objects.push(object);
    }

    fn trace_script(&mut self, script: ScriptId) {
        self.scripts.push(script);
    }
}
