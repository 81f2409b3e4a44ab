pub mod config;
pub mod error;
pub mod realm;
pub mod stack;
pub mod value;

pub use config::StackConfig;
pub use error::{StackError, StackResult};
pub use realm::{FunctionId, ObjectId, ObjectKind, Realm, Script, ScriptId};
pub use stack::{ContextStack, StackSpace};
pub use value::Value;

use std::cell::RefCell;
use std::rc::Rc;

/// Reserve a stack for the current thread and wrap it for sharing between
/// contexts.
pub fn new_thread_space(config: &StackConfig, realm: Rc<Realm>) -> StackResult<Rc<RefCell<StackSpace>>> {
    Ok(Rc::new(RefCell::new(StackSpace::new(config, realm)?)))
}
