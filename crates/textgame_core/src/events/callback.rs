//! # Listener Callbacks
//!
//! A [`Callback`] is a shared handle to a listener function taking zero to
//! three arguments. The shape is fixed when the handle is built, and two
//! handles are "the same listener" only if they are clones of one another.
//!
//! Every handle carries the [`Signature`] of its argument list. A dispatcher
//! binds each event id to the signature of its first listener and rejects
//! listeners and fire calls that do not match it.

use std::any::{Any, TypeId};
use std::sync::Arc;

type UnaryFn<A> = Box<dyn Fn(&A) + Send + Sync>;
type BinaryFn<A, B> = Box<dyn Fn(&A, &B) + Send + Sync>;
type TernaryFn<A, B, C> = Box<dyn Fn(&A, &B, &C) + Send + Sync>;

/// Argument list of a listener or a fire call, as a tuple type.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Signature {
    args: TypeId,
    name: &'static str,
}

impl Signature {
    /// Signature of a call whose arguments are the tuple `Args`.
    pub(crate) fn of<Args: 'static>() -> Self {
        Self {
            args: TypeId::of::<Args>(),
            name: std::any::type_name::<Args>(),
        }
    }

    /// Readable name of the argument tuple, for error messages.
    #[inline]
    pub(crate) const fn name(self) -> &'static str {
        self.name
    }
}

impl PartialEq for Signature {
    fn eq(&self, other: &Self) -> bool {
        self.args == other.args
    }
}

impl Eq for Signature {}

/// Erased listener function. Only the typed constructors build one.
#[derive(Clone)]
enum Handler {
    Nullary(Arc<dyn Fn() + Send + Sync>),
    /// `Box<dyn Fn(&A..)>` for one to three arguments.
    Typed(Arc<dyn Any + Send + Sync>),
}

/// Shared, cloneable listener handle.
///
/// Arguments are passed by reference so one fire call can reach every
/// listener without cloning the payload. Typed shapes are stored erased and
/// recovered by downcast at fire time.
///
/// # Example
///
/// ```rust,ignore
/// let on_damage = Callback::unary(|amount: &u32| println!("took {amount}"));
///
/// dispatcher.add_listener(EVENT_DAMAGE, &on_damage)?;
/// dispatcher.fire1(EVENT_DAMAGE, &12u32)?;
/// dispatcher.remove_listener(EVENT_DAMAGE, &on_damage)?;
/// ```
#[derive(Clone)]
pub struct Callback {
    arity: usize,
    signature: Signature,
    handler: Handler,
}

impl Callback {
    /// Builds a listener taking no arguments.
    pub fn nullary<F>(f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            arity: 0,
            signature: Signature::of::<()>(),
            handler: Handler::Nullary(Arc::new(f)),
        }
    }

    /// Builds a listener taking one argument.
    pub fn unary<A, F>(f: F) -> Self
    where
        A: 'static,
        F: Fn(&A) + Send + Sync + 'static,
    {
        let f: UnaryFn<A> = Box::new(f);
        Self {
            arity: 1,
            signature: Signature::of::<(A,)>(),
            handler: Handler::Typed(Arc::new(f)),
        }
    }

    /// Builds a listener taking two arguments.
    pub fn binary<A, B, F>(f: F) -> Self
    where
        A: 'static,
        B: 'static,
        F: Fn(&A, &B) + Send + Sync + 'static,
    {
        let f: BinaryFn<A, B> = Box::new(f);
        Self {
            arity: 2,
            signature: Signature::of::<(A, B)>(),
            handler: Handler::Typed(Arc::new(f)),
        }
    }

    /// Builds a listener taking three arguments.
    pub fn ternary<A, B, C, F>(f: F) -> Self
    where
        A: 'static,
        B: 'static,
        C: 'static,
        F: Fn(&A, &B, &C) + Send + Sync + 'static,
    {
        let f: TernaryFn<A, B, C> = Box::new(f);
        Self {
            arity: 3,
            signature: Signature::of::<(A, B, C)>(),
            handler: Handler::Typed(Arc::new(f)),
        }
    }

    /// Returns the number of arguments this listener takes.
    #[inline]
    #[must_use]
    pub const fn arity(&self) -> usize {
        self.arity
    }

    /// Returns the name of the argument tuple, e.g. `(u32, alloc::string::String)`.
    #[inline]
    #[must_use]
    pub const fn signature_name(&self) -> &'static str {
        self.signature.name()
    }

    #[inline]
    pub(crate) const fn signature(&self) -> Signature {
        self.signature
    }

    /// Returns `true` if both handles refer to the same listener.
    #[must_use]
    pub fn same_handle(&self, other: &Self) -> bool {
        match (&self.handler, &other.handler) {
            (Handler::Nullary(a), Handler::Nullary(b)) => addr(a) == addr(b),
            (Handler::Typed(a), Handler::Typed(b)) => addr(a) == addr(b),
            _ => false,
        }
    }

    /// Invokes a nullary listener. Returns `false` on a shape mismatch.
    pub(crate) fn call0(&self) -> bool {
        match &self.handler {
            Handler::Nullary(f) => {
                f();
                true
            }
            Handler::Typed(_) => false,
        }
    }

    /// Invokes a unary listener. Returns `false` on a signature mismatch.
    pub(crate) fn call1<A: 'static>(&self, a: &A) -> bool {
        match self.typed::<UnaryFn<A>>() {
            Some(f) => {
                f(a);
                true
            }
            None => false,
        }
    }

    /// Invokes a binary listener. Returns `false` on a signature mismatch.
    pub(crate) fn call2<A: 'static, B: 'static>(&self, a: &A, b: &B) -> bool {
        match self.typed::<BinaryFn<A, B>>() {
            Some(f) => {
                f(a, b);
                true
            }
            None => false,
        }
    }

    /// Invokes a ternary listener. Returns `false` on a signature mismatch.
    pub(crate) fn call3<A: 'static, B: 'static, C: 'static>(&self, a: &A, b: &B, c: &C) -> bool {
        match self.typed::<TernaryFn<A, B, C>>() {
            Some(f) => {
                f(a, b, c);
                true
            }
            None => false,
        }
    }

    fn typed<F: 'static>(&self) -> Option<&F> {
        match &self.handler {
            Handler::Typed(erased) => (**erased).downcast_ref::<F>(),
            Handler::Nullary(_) => None,
        }
    }
}

/// Data address of a shared handle, ignoring any vtable.
#[inline]
fn addr<T: ?Sized>(handle: &Arc<T>) -> *const () {
    Arc::as_ptr(handle).cast::<()>()
}

impl std::fmt::Debug for Callback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callback")
            .field("arity", &self.arity())
            .field("signature", &self.signature_name())
            .finish_non_exhaustive()
    }
}
