//! The parsed-line representation produced by `assemble_line` and consumed
//! by the two-pass driver.
//!
//! Mirrors the `Node`/`CodeNode`/`ConstantNode`/... class hierarchy in
//! `cocas.py`, collapsed into one enum per `spec.md` §4.1's redesign note.

/// One assembled source line, ready for either pass-1 bookkeeping or
/// pass-2 byte emission.
#[derive(Debug, Clone)]
pub enum Node {
    /// A label with no further content on the line (`foo:`).
    Label { label: String },
    /// An instruction or `dc`-style directive that emits bytes.
    Code {
        label: Option<String>,
        bytes: Vec<u8>,
        /// Byte offsets within `bytes` that must be relocated by the
        /// linker (operands resolved against a relocatable label).
        rel_offsets: Vec<u32>,
        /// `(external name, byte offset within bytes)` pairs — sites the
        /// driver must register into `ctx.exts` at pass 2.
        ext_refs: Vec<(String, u32)>,
    },
    /// `ds` — reserves `count` bytes without emitting any.
    Space { label: Option<String>, count: u32 },
    /// `asect name` — start (or resume) an absolute section.
    Asect { name: String },
    /// `rsect name` — start (or resume) a relocatable section.
    Rsect { name: String },
    /// `tplate name` — start a template block.
    Tplate { name: String },
    /// `ext name` — declare `name` external to this section.
    Ext { name: String },
    /// `name> value` inside `$abs`, or a plain `set` — defines an alias.
    Set { label: String, value: u8 },
    /// `end` — terminates assembly of the current file.
    End,
    /// A macro invocation already expanded away during pass 1; carried
    /// only so listings can show the generated lines came from here.
    MacroCall { name: String },
    /// A line that produced no node (comment-only, macro directive, etc).
    Empty,
}

impl Node {
    /// The label this line defines, if any.
    pub fn label(&self) -> Option<&str> {
        match self {
            Node::Label { label } => Some(label),
            Node::Code { label, .. } => label.as_deref(),
            Node::Space { label, .. } => label.as_deref(),
            Node::Set { label, .. } => Some(label),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_node_label_accessor() {
        let n = Node::Code { label: Some("start".to_string()), bytes: vec![0x10], rel_offsets: vec![], ext_refs: vec![] };
        assert_eq!(n.label(), Some("start"));
    }

    #[test]
    fn space_node_without_label() {
        let n = Node::Space { label: None, count: 4 };
        assert_eq!(n.label(), None);
    }
}
