//! Native callables.

use std::fmt;
use std::rc::Rc;

use crate::error::Result;
use crate::value::Value;

type NativeFn = dyn Fn(&Value, &[Value]) -> Result<Value>;

struct FunctionInner {
    name: String,
    body: Box<NativeFn>,
}

/// A named native function. Cloning shares identity.
#[derive(Clone)]
pub struct Function(Rc<FunctionInner>);

impl Function {
    pub fn new<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&Value, &[Value]) -> Result<Value> + 'static,
    {
        Self(Rc::new(FunctionInner {
            name: name.into(),
            body: Box::new(body),
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Invoke with an explicit receiver.
    #[inline]
    pub fn call(&self, this: &Value, args: &[Value]) -> Result<Value> {
        (self.0.body)(this, args)
    }

    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Rc::ptr_eq(&a.0, &b.0)
    }

    /// What `Function.prototype.toString` reports for this function.
    pub fn native_source(&self) -> String {
        format!("function {}() {{ [native code] }}", self.0.name)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[function {}]", self.0.name)
    }
}
