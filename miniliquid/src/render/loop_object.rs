use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::context::Context;
use crate::value::{Object, Value};

/// The `forloop` variable.
///
/// One object is created per loop and shared by all iterations.  The index
/// is advanced by the renderer.
#[derive(Clone)]
pub(crate) struct ForLoop {
    pub status: Arc<LoopStatus>,
}

impl std::ops::Deref for ForLoop {
    type Target = LoopStatus;

    fn deref(&self) -> &Self::Target {
        &self.status
    }
}

pub(crate) struct LoopStatus {
    pub name: String,
    pub len: usize,
    pub idx: AtomicUsize,
    pub parentloop: Value,
}

impl LoopStatus {
    pub fn new(name: &str, len: usize, parentloop: Value) -> LoopStatus {
        LoopStatus {
            name: name.to_string(),
            len,
            idx: AtomicUsize::new(0),
            parentloop,
        }
    }

    pub fn advance(&self, idx: usize) {
        self.idx.store(idx, Ordering::Relaxed);
    }

    fn get_field(&self, name: &str) -> Option<Value> {
        let idx = self.idx.load(Ordering::Relaxed);
        let len = self.len;
        match name {
            "index0" => Some(Value::from(idx)),
            "index" => Some(Value::from(idx + 1)),
            "length" => Some(Value::from(len)),
            "rindex" => Some(Value::from(len.saturating_sub(idx))),
            "rindex0" => Some(Value::from(len.saturating_sub(idx).saturating_sub(1))),
            "first" => Some(Value::from(idx == 0)),
            "last" => Some(Value::from(len == 0 || idx == len - 1)),
            "name" => Some(Value::from(self.name.as_str())),
            "parentloop" => Some(self.parentloop.clone()),
            _ => None,
        }
    }
}

impl fmt::Debug for ForLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("ForLoop");
        for attr in ["index0", "index", "length", "rindex", "rindex0", "first", "last"] {
            s.field(attr, &self.get_field(attr).unwrap_or_default());
        }
        s.finish()
    }
}

impl Object for ForLoop {
    fn get_member(&self, name: &str, _ctx: &Context<'_>) -> Option<Value> {
        self.get_field(name)
    }

    fn render(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<forloop {}/{}>",
            self.idx.load(Ordering::Relaxed),
            self.len
        )
    }
}

/// The `tablerowloop` variable.
#[derive(Clone)]
pub(crate) struct TableRowLoop {
    pub status: Arc<LoopStatus>,
    pub cols: usize,
}

impl TableRowLoop {
    fn col0(&self) -> usize {
        self.status.idx.load(Ordering::Relaxed) % self.cols.max(1)
    }
}

impl fmt::Debug for TableRowLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableRowLoop")
            .field("index0", &self.status.idx.load(Ordering::Relaxed))
            .field("length", &self.status.len)
            .field("cols", &self.cols)
            .finish()
    }
}

impl Object for TableRowLoop {
    fn get_member(&self, name: &str, _ctx: &Context<'_>) -> Option<Value> {
        let idx = self.status.idx.load(Ordering::Relaxed);
        let cols = self.cols.max(1);
        match name {
            "col" => Some(Value::from(self.col0() + 1)),
            "col0" => Some(Value::from(self.col0())),
            "row" => Some(Value::from(idx / cols + 1)),
            "col_first" => Some(Value::from(self.col0() == 0)),
            "col_last" => Some(Value::from(self.col0() + 1 == cols)),
            "name" | "parentloop" => None,
            _ => self.status.get_field(name),
        }
    }

    fn render(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<tablerowloop {}/{}>",
            self.status.idx.load(Ordering::Relaxed),
            self.status.len
        )
    }
}
