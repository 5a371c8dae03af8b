//! Turns an AST back into source text, driven entirely by the format
//! template carried on each tree node (see [`crate::ast::TreeNode`]).
//!
//! There is no separate pretty-printing grammar: the template characters
//! `%*`/`%%`/`%<`/`%>` and literal text are interpreted in a single
//! pre-order walk, mirroring the original's per-node `tree_param` print
//! hook rather than a general document/layout engine.

use crate::ast::{AstNode, AstValue, TreeNode};
use crate::intern::Interner;

const INDENT_WIDTH: usize = 4;

fn escape_char(b: u8) -> String {
  match b {
    b'\n' => "\\n".into(),
    b'\r' => "\\r".into(),
    b'\t' => "\\t".into(),
    b'\\' => "\\\\".into(),
    b'\'' => "\\'".into(),
    _ => (b as char).to_string(),
  }
}

fn escape_string(bytes: &[u8]) -> String {
  let mut out = String::new();
  for &b in bytes {
    match b {
      b'"' => out.push_str("\\\""),
      b'\\' => out.push_str("\\\\"),
      b'\n' => out.push_str("\\n"),
      b'\t' => out.push_str("\\t"),
      _ => out.push(b as char),
    }
  }
  out
}

struct Unparser<'a> {
  out: String,
  indent: usize,
  pending_newline: bool,
  interner: &'a Interner,
}

impl<'a> Unparser<'a> {
  fn new(interner: &'a Interner) -> Self {
    Self { out: String::new(), indent: 0, pending_newline: false, interner }
  }

  fn note_newline(&mut self) {
    self.pending_newline = true;
  }

  /// Appends `text`, flushing a deferred newline (as newline + current
  /// indent) first, and inserting a single space if doing so would run
  /// two alphanumeric tokens together.
  fn emit_raw(&mut self, text: &str) {
    if text.is_empty() {
      return;
    }
    if self.pending_newline {
      self.out.push('\n');
      self.out.push_str(&" ".repeat(self.indent * INDENT_WIDTH));
      self.pending_newline = false;
    } else if let (Some(last), Some(first)) = (self.out.chars().last(), text.chars().next()) {
      if last.is_alphanumeric() && first.is_alphanumeric() {
        self.out.push(' ');
      }
    }
    self.out.push_str(text);
  }

  fn unparse_value(&mut self, value: &AstValue) {
    match value.node() {
      None => {}
      Some(AstNode::Ident(n)) => {
        let text = self.interner.resolve(n.name).to_string();
        self.emit_raw(&text);
      }
      Some(AstNode::Char(n)) => {
        let text = format!("'{}'", escape_char(n.value));
        self.emit_raw(&text);
      }
      Some(AstNode::Str(n)) => {
        let text = format!("\"{}\"", escape_string(&n.value));
        self.emit_raw(&text);
      }
      Some(AstNode::Int(n)) => {
        let text = n.value.to_string();
        self.emit_raw(&text);
      }
      Some(AstNode::Tree(t)) => self.unparse_tree(t),
    }
  }

  fn unparse_tree(&mut self, t: &TreeNode) {
    if t.is_list() {
      for (i, child) in t.children.iter().enumerate() {
        if i > 0 && !t.format.is_empty() {
          self.emit_raw(t.format);
        }
        self.unparse_value(child);
      }
      return;
    }

    let chars: Vec<char> = t.format.chars().collect();
    let mut i = 0;
    let mut child_idx = 0;
    let mut literal = String::new();

    while i < chars.len() {
      let c = chars[i];
      if c == '%' && i + 1 < chars.len() {
        if !literal.is_empty() {
          self.emit_raw(&literal);
          literal.clear();
        }
        match chars[i + 1] {
          '*' => {
            match t.children.get(child_idx) {
              Some(child) => self.unparse_value(child),
              None => self.emit_raw("(ERR: missing child)"),
            }
            child_idx += 1;
          }
          '%' => self.emit_raw("%"),
          '<' => self.indent = self.indent.saturating_sub(1),
          '>' => self.indent += 1,
          other => {
            let text = format!("(ERR: unknown template escape %{other})");
            self.emit_raw(&text);
          }
        }
        i += 2;
        continue;
      }
      if c == '\n' {
        if !literal.is_empty() {
          self.emit_raw(&literal);
          literal.clear();
        }
        self.note_newline();
        i += 1;
        continue;
      }
      literal.push(c);
      i += 1;
    }
    if !literal.is_empty() {
      self.emit_raw(&literal);
    }
    if child_idx < t.children.len() {
      self.emit_raw("(ERR: unconsumed children)");
    }
  }
}

/// Renders `value` back to source text using the format templates carried
/// on its tree nodes, resolving identifiers through `interner`.
pub fn unparse(value: &AstValue, interner: &Interner) -> String {
  let mut u = Unparser::new(interner);
  u.unparse_value(value);
  u.out
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ast::{make_ident, make_int, make_tree};
  use crate::text::Position;

  #[test]
  fn unparses_a_binary_expression() {
    let mut interner = Interner::new();
    let a = make_ident(interner.intern("a"), Position::START);
    let b = make_int(1, Position::START);
    let tree = make_tree("add", "%* + %*", vec![a, b], Position::START);
    assert_eq!(unparse(&tree, &interner), "a + 1");
  }

  #[test]
  fn unparses_an_if_with_indent_and_newlines() {
    let interner = Interner::new();
    let cond = make_int(1, Position::START);
    let body = make_tree("semi", "%*;\n", vec![make_int(2, Position::START)], Position::START);
    let else_branch = AstValue::empty();
    let tree = make_tree("if", "if (%*)\n%>%*%<%*", vec![cond, body, else_branch], Position::START);
    // The body's trailing newline is deferred and never flushed because
    // nothing follows it (the else branch here is empty).
    assert_eq!(unparse(&tree, &interner), "if (1)\n    2;");
  }

  #[test]
  fn unparses_a_list_with_separator() {
    let interner = Interner::new();
    let items = vec![make_int(1, Position::START), make_int(2, Position::START), make_int(3, Position::START)];
    let list = make_tree(crate::ast::LIST_KIND, ", ", items, Position::START);
    assert_eq!(unparse(&list, &interner), "1, 2, 3");
  }

  #[test]
  fn missing_child_surfaces_an_error_marker() {
    let interner = Interner::new();
    let tree = make_tree("semi", "%*;\n", Vec::new(), Position::START);
    assert_eq!(unparse(&tree, &interner), "(ERR: missing child);");
  }

  #[test]
  fn alphanumeric_adjacency_inserts_a_separating_space() {
    let mut interner = Interner::new();
    let name = make_ident(interner.intern("x"), Position::START);
    let storage = make_tree("storage", "task", Vec::new(), Position::START);
    let tree = make_tree("pair", "%*%*", vec![storage, name], Position::START);
    assert_eq!(unparse(&tree, &interner), "task x");
  }

  #[test]
  fn round_trips_a_declaration_with_initializer() {
    // No end-to-end test exercised `decl` unparsing before: its template
    // used to carry one `%*` for four children, dropping the type,
    // declarator, and initializer and trailing off in an error marker.
    let grammar = crate::cgrammar::build();
    let out = crate::parser::parse(&grammar, "root", b"int x = 1;").unwrap();
    // The leading space comes from the (empty) storage-class slot; the
    // trailing newline is a deferred one that's never flushed because
    // nothing follows the last top-level statement.
    assert_eq!(unparse(&out.value, &out.interner), " int x = 1;");
  }

  #[test]
  fn round_trips_a_declaration_without_initializer() {
    let grammar = crate::cgrammar::build();
    let out = crate::parser::parse(&grammar, "root", b"int x;").unwrap();
    assert_eq!(unparse(&out.value, &out.interner), " int x;");
  }
}
