//! Source locations and the diagnostic call stack (`Frame`).

use std::fmt;
use std::sync::{Mutex, Weak};
use std::sync::Arc;

use smol_str::SmolStr;

/// A (filename, line) pair attached to every AST node, statement and dep node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Loc {
    pub filename: SmolStr,
    pub line: u32,
}

impl Loc {
    pub fn new(filename: impl Into<SmolStr>, line: u32) -> Self {
        Self {
            filename: filename.into(),
            line,
        }
    }

    pub fn unknown() -> Self {
        Self::new("<unknown>", 0)
    }

    pub fn bump_line(&mut self, by: u32) {
        self.line += by;
    }
}

impl fmt::Display for Loc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.filename, self.line)
    }
}

/// What activity a [`Frame`] on the diagnostic stack represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Root,
    Phase,
    Parse,
    Call,
    Funcall,
    Statement,
    Dependency,
    Exec,
    Ninja,
}

/// A node in the runtime call stack, kept as a child of its parent so the
/// whole tree can be dumped for diagnostics after the fact.
///
/// Variables keep a [`Weak`] pointer to the frame active when they were
/// created, so error messages about a variable can point back at the
/// include/call chain that defined it without keeping that chain alive.
#[derive(Debug)]
pub struct Frame {
    pub kind: FrameKind,
    pub name: SmolStr,
    pub loc: Loc,
    pub children: Mutex<Vec<Arc<Frame>>>,
}

impl Frame {
    pub fn new_root() -> Arc<Frame> {
        Arc::new(Frame {
            kind: FrameKind::Root,
            name: "root".into(),
            loc: Loc::new("<root>", 0),
            children: Mutex::new(Vec::new()),
        })
    }

    /// Push a new child frame onto `self` and return it.
    pub fn push_child(self: &Arc<Frame>, kind: FrameKind, name: impl Into<SmolStr>, loc: Loc) -> Arc<Frame> {
        let child = Arc::new(Frame {
            kind,
            name: name.into(),
            loc,
            children: Mutex::new(Vec::new()),
        });
        self.children.lock().unwrap().push(Arc::clone(&child));
        child
    }

    pub fn downgrade(self: &Arc<Frame>) -> Weak<Frame> {
        Arc::downgrade(self)
    }

    /// Render this frame and its descendants as a human-readable include/call
    /// stack, innermost last, for use in fatal error messages.
    pub fn render_stack(self: &Arc<Frame>) -> String {
        let mut out = String::new();
        let mut cur = Some(Arc::clone(self));
        let mut stack = Vec::new();
        while let Some(f) = cur {
            stack.push(f.clone());
            cur = None; // Frame only links down to children, not up; callers
                        // build the stack as they descend instead. This method
                        // is therefore just a single-frame formatter used by
                        // callers that already track their own Vec<Arc<Frame>>.
        }
        for f in stack.iter().rev() {
            out.push_str(&format!("{:?} {} at {}\n", f.kind, f.name, f.loc));
        }
        out
    }
}
