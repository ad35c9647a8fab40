//! Function interception.
//!
//! A [`Hook`] wraps one native [`Function`] and exposes a replacement with the
//! same calling convention. Each call builds a fresh [`CallContext`] and runs
//! the installed callbacks in registration order; their [`HookResult`] votes
//! decide whether the original runs, is skipped, or has its result replaced.
//!
//! # Dispatch rules
//!
//! - `EXECUTION_RETURN` stops the chain; the caller sees `return_value` and the
//!   original never runs.
//! - `EXECUTION_CONTINUE` / `EXECUTION_PASSTHROUGH` run the original at most
//!   once per call, with `args` as they are at the first such vote. Later
//!   callbacks observe the computed `return_value`.
//! - `EXECUTION_IGNORE` has no opinion.
//! - With no decisive vote the original runs once after the chain (fail-open).
//! - `ACTION_UNINSTALL` removes the voting callback once the call completes.
//!
//! Callback errors propagate to the caller untouched.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::Result;
use crate::function::Function;
use crate::value::Value;

// =============================================================================
// Hook Results
// =============================================================================

bitflags::bitflags! {
    /// Vote returned by a hook callback.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct HookResult: u8 {
        /// Run the original with the current `this`/`args`.
        const EXECUTION_CONTINUE = 1 << 0;
        /// Skip the original and the remaining callbacks; use `return_value`.
        const EXECUTION_RETURN = 1 << 1;
        /// Inspected, chose not to act; the original still runs.
        const EXECUTION_PASSTHROUGH = 1 << 2;
        /// Remove this callback after the current invocation.
        const ACTION_UNINSTALL = 1 << 7;
    }
}

impl HookResult {
    /// No opinion. Defers to later callbacks or the fail-open default.
    pub const EXECUTION_IGNORE: Self = Self::empty();

    /// The dispatch verdict, ignoring action bits.
    pub fn execution(self) -> Execution {
        if self.contains(Self::EXECUTION_RETURN) {
            Execution::Return
        } else if self.contains(Self::EXECUTION_CONTINUE) {
            Execution::Continue
        } else if self.contains(Self::EXECUTION_PASSTHROUGH) {
            Execution::Passthrough
        } else {
            Execution::Ignore
        }
    }

    pub fn wants_uninstall(self) -> bool {
        self.contains(Self::ACTION_UNINSTALL)
    }
}

/// Verdict part of a [`HookResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Execution {
    Ignore,
    Continue,
    Return,
    Passthrough,
}

// =============================================================================
// Call Context
// =============================================================================

/// Mutable per-invocation record shared by a callback chain.
#[derive(Debug)]
pub struct CallContext {
    /// The true original function.
    pub origin: Function,
    /// Receiver of the call.
    pub this: Value,
    /// Live argument list; callbacks may rewrite it.
    pub args: Vec<Value>,
    /// Result slot, `undefined` until the original runs or a callback fills it.
    pub return_value: Value,
}

impl CallContext {
    pub fn new(origin: Function, this: Value, args: Vec<Value>) -> Self {
        Self {
            origin,
            this,
            args,
            return_value: Value::Undefined,
        }
    }

    /// Argument `index`, or `undefined` when absent.
    pub fn arg(&self, index: usize) -> Value {
        self.args.get(index).cloned().unwrap_or_default()
    }

    /// Run the original with the current receiver and arguments.
    pub fn invoke_origin(&mut self) -> Result<()> {
        self.return_value = self.origin.call(&self.this, &self.args)?;
        Ok(())
    }
}

// =============================================================================
// Callbacks
// =============================================================================

/// Handle identifying one registered callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallbackId(u64);

impl CallbackId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

pub type HookCallback = Rc<dyn Fn(&mut CallContext) -> Result<HookResult>>;

/// Outcome of running a callback chain.
#[derive(Debug, Default)]
pub struct Dispatch {
    /// The original ran because of a CONTINUE/PASSTHROUGH vote.
    pub origin_invoked: bool,
    /// A callback voted RETURN.
    pub returned: bool,
    /// Callbacks that asked to be uninstalled.
    pub uninstall: Vec<CallbackId>,
}

impl Dispatch {
    /// Whether any callback voted something other than IGNORE.
    pub fn decisive(&self) -> bool {
        self.origin_invoked || self.returned
    }
}

/// Run `callbacks` over `ctx`, recording votes into `outcome`.
///
/// Uninstall requests are recorded before a failing callback's error is
/// returned, so callers can honour them either way.
pub fn dispatch(
    callbacks: &[(CallbackId, HookCallback)],
    ctx: &mut CallContext,
    outcome: &mut Dispatch,
) -> Result<()> {
    for (id, callback) in callbacks {
        let result = callback(ctx)?;
        if result.wants_uninstall() {
            outcome.uninstall.push(*id);
        }
        match result.execution() {
            Execution::Return => {
                outcome.returned = true;
                break;
            }
            Execution::Continue | Execution::Passthrough => {
                if !outcome.origin_invoked {
                    outcome.origin_invoked = true;
                    ctx.invoke_origin()?;
                }
            }
            Execution::Ignore => {}
        }
    }
    Ok(())
}

// =============================================================================
// Hook
// =============================================================================

struct HookInner {
    origin: Function,
    callbacks: RefCell<Vec<(CallbackId, HookCallback)>>,
    on_empty: RefCell<Option<Rc<dyn Fn()>>>,
}

impl HookInner {
    fn snapshot(&self) -> Vec<(CallbackId, HookCallback)> {
        self.callbacks.borrow().clone()
    }

    fn remove_all(&self, ids: &[CallbackId]) -> bool {
        if ids.is_empty() {
            return false;
        }
        let emptied = {
            let mut callbacks = self.callbacks.borrow_mut();
            let before = callbacks.len();
            callbacks.retain(|(id, _)| !ids.contains(id));
            callbacks.len() != before && callbacks.is_empty()
        };
        if emptied {
            log::debug!(target: "hook", "{}: last callback removed", self.origin.name());
            let handler = self.on_empty.borrow().clone();
            if let Some(handler) = handler {
                handler();
            }
        }
        emptied
    }

    fn call(&self, this: &Value, args: &[Value]) -> Result<Value> {
        let callbacks = self.snapshot();
        let mut ctx = CallContext::new(self.origin.clone(), this.clone(), args.to_vec());
        let mut outcome = Dispatch::default();

        log::trace!(
            target: "hook",
            "{}: dispatching to {} callbacks",
            self.origin.name(),
            callbacks.len()
        );

        let mut result = dispatch(&callbacks, &mut ctx, &mut outcome);
        if result.is_ok() && !outcome.decisive() {
            result = ctx.invoke_origin();
        }
        self.remove_all(&outcome.uninstall);
        result.map(|()| ctx.return_value)
    }
}

/// Interception wrapper around one original function.
#[derive(Clone)]
pub struct Hook {
    inner: Rc<HookInner>,
    wrapper: Function,
}

impl Hook {
    pub fn new(origin: Function) -> Self {
        let inner = Rc::new(HookInner {
            origin: origin.clone(),
            callbacks: RefCell::new(Vec::new()),
            on_empty: RefCell::new(None),
        });
        let target = inner.clone();
        let wrapper = Function::new(origin.name(), move |this, args| target.call(this, args));
        Self { inner, wrapper }
    }

    /// The original function.
    pub fn origin(&self) -> &Function {
        &self.inner.origin
    }

    /// The replacement callable to bind in place of the original.
    pub fn function(&self) -> Function {
        self.wrapper.clone()
    }

    /// Register a callback; chainable.
    pub fn install<F>(&self, callback: F) -> &Self
    where
        F: Fn(&mut CallContext) -> Result<HookResult> + 'static,
    {
        self.add(callback);
        self
    }

    pub fn add<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(&mut CallContext) -> Result<HookResult> + 'static,
    {
        self.add_shared(Rc::new(callback))
    }

    /// Register a callback that is also held elsewhere.
    pub fn add_shared(&self, callback: HookCallback) -> CallbackId {
        let id = CallbackId::next();
        self.inner.callbacks.borrow_mut().push((id, callback));
        id
    }

    /// Remove a callback. Emptying the chain fires the empty handler.
    pub fn remove(&self, id: CallbackId) -> bool {
        let present = self.inner.callbacks.borrow().iter().any(|(cid, _)| *cid == id);
        if present {
            self.inner.remove_all(&[id]);
        }
        present
    }

    pub fn len(&self) -> usize {
        self.inner.callbacks.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Called once the last callback is removed; the installer uses it to
    /// restore the original binding.
    pub fn set_empty_handler<F: Fn() + 'static>(&self, handler: F) {
        *self.inner.on_empty.borrow_mut() = Some(Rc::new(handler));
    }

    /// Invoke through the callback chain.
    pub fn call(&self, this: &Value, args: &[Value]) -> Result<Value> {
        self.inner.call(this, args)
    }

    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Rc::ptr_eq(&a.inner, &b.inner)
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook")
            .field("origin", &self.inner.origin.name())
            .field("callbacks", &self.len())
            .finish()
    }
}
