use std::fmt;
use std::sync::Arc;

use crossbind_core::{CallError, Value};

use super::{Callable, Invocation};
use crate::priority::HOST_CALLBACK_PRIORITY;
use crate::runtime::Runtime;

/// A host function: receives the bound receiver, if any, as its first
/// argument.
pub type HostFn = Arc<dyn Fn(&Runtime, &[Value]) -> Result<Value, CallError> + Send + Sync>;

/// A host closure participating in overload resolution.
#[derive(Clone)]
pub struct HostCallback {
    func: HostFn,
    doc: Option<String>,
}

impl HostCallback {
    pub fn new(func: impl Fn(&Runtime, &[Value]) -> Result<Value, CallError> + Send + Sync + 'static) -> Self {
        Self {
            func: Arc::new(func),
            doc: None,
        }
    }

    pub fn from_fn(func: HostFn) -> Self {
        Self { func, doc: None }
    }

    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }
}

impl fmt::Debug for HostCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostCallback").field("doc", &self.doc).finish()
    }
}

impl Callable for HostCallback {
    fn signature(&self) -> &str {
        "(*args)"
    }

    fn prototype(&self) -> &str {
        "<callback>"
    }

    fn priority(&self) -> i32 {
        HOST_CALLBACK_PRIORITY
    }

    fn max_args(&self) -> usize {
        100
    }

    fn doc(&self) -> String {
        self.doc.clone().unwrap_or_else(|| self.prototype().to_string())
    }

    fn call(&self, rt: &Runtime, invocation: &Invocation<'_>) -> Result<Value, CallError> {
        match invocation.this {
            Some(this) => {
                rt.space.add_ref(this);
                let mut args = Vec::with_capacity(invocation.args.len() + 1);
                args.push(Value::Object(this));
                args.extend_from_slice(invocation.args);
                let result = (self.func)(rt, &args);
                rt.space.release(this);
                result
            }
            None => (self.func)(rt, invocation.args),
        }
    }
}
