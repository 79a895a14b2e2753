use std::fmt;

use crate::context::Context;
use crate::value::Value;

/// A late bound object.
///
/// Objects let the host expose values whose members are computed when a
/// template accesses them.  Every access goes back to the object, so
/// `{{ counter.value }}` printed twice calls [`get_member`](Self::get_member)
/// twice.  Within a single path like `a.b.c` each member is resolved once.
///
/// The active [`Context`] is passed to the member lookup which allows
/// objects to produce contextual values (the `forloop` object is
/// implemented this way).
///
/// Objects are shared through [`Arc`](std::sync::Arc) and need to be
/// thread safe.  Use interior mutability if state needs to change.
pub trait Object: fmt::Debug + Send + Sync {
    /// Resolves a member by name.
    ///
    /// Returning `None` signals that the member does not exist.
    fn get_member(&self, name: &str, ctx: &Context<'_>) -> Option<Value> {
        let _name = name;
        let _ctx = ctx;
        None
    }

    /// Returns the items of the object if it can be iterated.
    fn enumerate(&self) -> Option<Vec<Value>> {
        None
    }

    /// Returns the structural size of the object.
    ///
    /// The default reports the number of enumerated items.
    fn size(&self) -> Option<usize> {
        self.enumerate().map(|x| x.len())
    }

    /// Checks if the object counts as true in conditions.
    fn is_truthy(&self) -> bool {
        true
    }

    /// Formats the object for output.
    ///
    /// The default implementation uses the [`Debug`](std::fmt::Debug)
    /// representation.
    fn render(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}
