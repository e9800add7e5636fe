//! Prioritized multi-listener dispatch.
//!
//! A [`Signal`] keeps an ordered list of bindings. Dispatch works on a snapshot of that list, so
//! listeners are free to add or remove bindings (on the same signal or any other) while a
//! dispatch is in flight; those changes only affect later dispatches.
//!
//! Listener failures are not swallowed. The first listener that returns an error aborts the
//! dispatch and the error is handed back to whoever called [`Signal::dispatch`].

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use thiserror::Error;

pub const DEFAULT_PRIORITY: i32 = 50;

pub type ListenerResult = Result<(), ListenerError>;

/// Callback stored in a binding. Identity (for [`Signal::remove`]) is the `Rc` allocation.
pub type Listener<A> = Rc<dyn Fn(&A) -> ListenerResult>;

#[derive(Debug, Error)]
#[error("signal listener failed: {source}")]
pub struct ListenerError {
    #[source]
    source: Box<dyn std::error::Error + 'static>,
}

impl ListenerError {
    pub fn new(source: impl std::error::Error + 'static) -> Self {
        Self {
            source: Box::new(source),
        }
    }

    pub fn inner(&self) -> &(dyn std::error::Error + 'static) {
        self.source.as_ref()
    }

    pub fn downcast_ref<E: std::error::Error + 'static>(&self) -> Option<&E> {
        self.source.downcast_ref::<E>()
    }
}

/// Opaque identity of the object a binding was registered on behalf of.
///
/// Two keys are equal when they were made from the same allocation. The key does not keep the
/// receiver alive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ReceiverKey(usize);

impl ReceiverKey {
    pub const NONE: ReceiverKey = ReceiverKey(0);

    pub fn of<T: ?Sized>(receiver: &Rc<T>) -> Self {
        Self(Rc::as_ptr(receiver) as *const () as usize)
    }

    pub fn from_ref<T: ?Sized>(receiver: &T) -> Self {
        Self(receiver as *const T as *const () as usize)
    }
}

pub struct Binding<A> {
    callback: Listener<A>,
    receiver: ReceiverKey,
    args: Option<A>,
    priority: i32,
    once: bool,
}

impl<A: Clone> Clone for Binding<A> {
    fn clone(&self) -> Self {
        Self {
            callback: Rc::clone(&self.callback),
            receiver: self.receiver,
            args: self.args.clone(),
            priority: self.priority,
            once: self.once,
        }
    }
}

impl<A> Binding<A> {
    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn is_once(&self) -> bool {
        self.once
    }

    pub fn receiver(&self) -> ReceiverKey {
        self.receiver
    }

    fn matches(&self, callback: &Listener<A>, receiver: ReceiverKey) -> bool {
        same_listener(&self.callback, callback) && self.receiver == receiver
    }
}

impl<A> fmt::Debug for Binding<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("receiver", &self.receiver)
            .field("priority", &self.priority)
            .field("once", &self.once)
            .field("has_args", &self.args.is_some())
            .finish()
    }
}

pub struct Signal<A = ()> {
    bindings: RefCell<Vec<Binding<A>>>,
}

impl<A> Default for Signal<A> {
    fn default() -> Self {
        Self {
            bindings: RefCell::new(Vec::new()),
        }
    }
}

impl<A> fmt::Debug for Signal<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("bindings", &self.bindings.borrow().len())
            .finish()
    }
}

impl<A: Clone + Default> Signal<A> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, callback: Listener<A>, receiver: ReceiverKey) {
        self.add_with(callback, receiver, None, DEFAULT_PRIORITY);
    }

    pub fn add_with(
        &self,
        callback: Listener<A>,
        receiver: ReceiverKey,
        args: Option<A>,
        priority: i32,
    ) {
        self.push_binding(callback, receiver, args, priority, false);
    }

    pub fn add_once(&self, callback: Listener<A>, receiver: ReceiverKey) {
        self.add_once_with(callback, receiver, None, DEFAULT_PRIORITY);
    }

    pub fn add_once_with(
        &self,
        callback: Listener<A>,
        receiver: ReceiverKey,
        args: Option<A>,
        priority: i32,
    ) {
        self.push_binding(callback, receiver, args, priority, true);
    }

    /// Convenience for the common case of a closure with no receiver identity.
    pub fn connect(&self, priority: i32, callback: impl Fn(&A) -> ListenerResult + 'static) {
        self.add_with(Rc::new(callback), ReceiverKey::NONE, None, priority);
    }

    /// One-shot variant of [`Signal::connect`].
    pub fn connect_once(&self, priority: i32, callback: impl Fn(&A) -> ListenerResult + 'static) {
        self.add_once_with(Rc::new(callback), ReceiverKey::NONE, None, priority);
    }

    /// Removes the first binding registered with this exact callback and receiver.
    pub fn remove(&self, callback: &Listener<A>, receiver: ReceiverKey) -> bool {
        let mut bindings = self.bindings.borrow_mut();
        match bindings
            .iter()
            .position(|binding| binding.matches(callback, receiver))
        {
            Some(index) => {
                bindings.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.bindings.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.bindings.borrow_mut().clear();
    }

    /// Dispatches with each binding's own stored arguments.
    pub fn dispatch(&self) -> ListenerResult {
        self.dispatch_inner(None)
    }

    /// Dispatches with `args`, overriding every binding's stored arguments.
    pub fn dispatch_with(&self, args: A) -> ListenerResult {
        self.dispatch_inner(Some(args))
    }

    fn dispatch_inner(&self, args: Option<A>) -> ListenerResult {
        let mut snapshot = {
            let mut bindings = self.bindings.borrow_mut();
            let snapshot = bindings.clone();
            bindings.retain(|binding| !binding.once);
            snapshot
        };
        // Stable: equal priorities keep registration order.
        snapshot.sort_by(|a, b| b.priority.cmp(&a.priority));

        let fallback = A::default();
        for binding in &snapshot {
            let payload = match (&args, &binding.args) {
                (Some(args), _) => args,
                (None, Some(stored)) => stored,
                (None, None) => &fallback,
            };
            (binding.callback)(payload)?;
        }
        Ok(())
    }

    fn push_binding(
        &self,
        callback: Listener<A>,
        receiver: ReceiverKey,
        args: Option<A>,
        priority: i32,
        once: bool,
    ) {
        self.bindings.borrow_mut().push(Binding {
            callback,
            receiver,
            args,
            priority,
            once,
        });
    }
}

fn same_listener<A>(a: &Listener<A>, b: &Listener<A>) -> bool {
    std::ptr::eq(
        Rc::as_ptr(a) as *const (),
        Rc::as_ptr(b) as *const (),
    )
}
