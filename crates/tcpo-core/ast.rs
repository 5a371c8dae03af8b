//! The parse result value and the AST node shapes it can carry.
//!
//! The original parser propagates a reference-counted `void*` tagged at
//! runtime by a chain of type descriptors. Because the set of payload
//! shapes this front end ever produces is closed (identifier, character,
//! string, integer, generic tree), this reimplementation collapses that
//! into a single tagged enum shared via [`Rc`], following the same shape as
//! the teacher's `HCObj` value type.

use std::rc::Rc;

use crate::intern::Ident;
use crate::text::Position;

/// The kind name used for a variable-length, format-free sequence
/// container, mirroring the original grammar's `list_type`.
pub const LIST_KIND: &str = "list";

#[derive(Debug)]
pub struct IdentNode {
  pub name: Ident,
  pub pos:  Position,
}

#[derive(Debug)]
pub struct CharNode {
  pub value: u8,
  pub pos:   Position,
}

#[derive(Debug)]
pub struct StrNode {
  pub value: Vec<u8>,
  pub pos:   Position,
}

#[derive(Debug)]
pub struct IntNode {
  pub value: i64,
  pub pos:   Position,
}

/// A generic typed tree: a kind name (used both for `tree_is` matching and
/// for picking the `list` special case) plus an unparse format template and
/// an ordered array of children.
#[derive(Debug)]
pub struct TreeNode {
  pub kind:     &'static str,
  pub format:   &'static str,
  pub children: Vec<AstValue>,
  pub pos:      Position,
}

impl TreeNode {
  pub fn is(&self, kind: &str) -> bool {
    self.kind == kind
  }

  pub fn is_list(&self) -> bool {
    self.kind == LIST_KIND
  }

  pub fn child(&self, i: usize) -> Option<&AstValue> {
    self.children.get(i)
  }
}

/// A parsed AST node. A closed set of shapes: identifier, character,
/// string, integer, and generic tree.
#[derive(Debug)]
pub enum AstNode {
  Ident(IdentNode),
  Char(CharNode),
  Str(StrNode),
  Int(IntNode),
  Tree(TreeNode),
}

impl AstNode {
  pub fn pos(&self) -> Position {
    match self {
      AstNode::Ident(n) => n.pos,
      AstNode::Char(n) => n.pos,
      AstNode::Str(n) => n.pos,
      AstNode::Int(n) => n.pos,
      AstNode::Tree(n) => n.pos,
    }
  }
}

#[cfg(debug_assertions)]
thread_local! {
  /// Mirrors the original's `ENTER_RESULT_CONTEXT`/`DISP_RESULT` scope
  /// balance check, which asserted every result obtained in a scope was
  /// explicitly released before the scope exited. `Rc` drops a node
  /// automatically, so there's nothing to assert mid-scope; instead this
  /// counts nodes currently live and [`AstValue`]'s `Drop` impl decrements
  /// it exactly once per allocation, when its last reference goes away —
  /// a test can then confirm the count returns to baseline once everything
  /// it built is dropped. Only a test-time sanity aid; release builds
  /// never touch it.
  static LIVE_RESULTS: std::cell::Cell<i64> = const { std::cell::Cell::new(0) };
}

/// Reads the current live-node count. Debug builds only.
#[cfg(debug_assertions)]
pub fn live_results() -> i64 {
  LIVE_RESULTS.with(|c| c.get())
}

/// A parse result: either empty, or a reference-counted AST node plus the
/// source position that produced it. Cloning is an `Rc` clone; dropping the
/// last clone releases the node. There is no explicit release step.
#[derive(Clone, Debug)]
pub struct AstValue(Option<Rc<AstNode>>);

impl AstValue {
  pub fn empty() -> Self {
    Self(None)
  }

  pub fn new(node: AstNode) -> Self {
    #[cfg(debug_assertions)]
    LIVE_RESULTS.with(|c| c.set(c.get() + 1));
    Self(Some(Rc::new(node)))
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_none()
  }

  pub fn node(&self) -> Option<&AstNode> {
    self.0.as_deref()
  }

  pub fn pos(&self) -> Option<Position> {
    self.node().map(AstNode::pos)
  }

  pub fn ptr_eq(&self, other: &AstValue) -> bool {
    match (&self.0, &other.0) {
      (Some(a), Some(b)) => Rc::ptr_eq(a, b),
      (None, None) => true,
      _ => false,
    }
  }

  pub fn as_ident(&self) -> Option<&IdentNode> {
    match self.node()? {
      AstNode::Ident(n) => Some(n),
      _ => None,
    }
  }

  pub fn as_tree(&self) -> Option<&TreeNode> {
    match self.node()? {
      AstNode::Tree(n) => Some(n),
      _ => None,
    }
  }

  pub fn is_tree(&self, kind: &str) -> bool {
    self.as_tree().is_some_and(|t| t.is(kind))
  }

  /// Returns the nth (1-based, matching the original's child indexing)
  /// child of a tree, or `AstValue::empty()` if this isn't a tree or the
  /// index is out of range.
  pub fn tree_child(&self, n: usize) -> AstValue {
    self
      .as_tree()
      .and_then(|t| t.children.get(n - 1))
      .cloned()
      .unwrap_or_else(AstValue::empty)
  }

  /// Panics with a descriptive message if this value isn't a tree of
  /// `kind`. For use where the transformer assumes a structural
  /// invariant that a violation of represents an internal bug, mirroring
  /// the original's fatal `CAST` assertion.
  pub fn expect_tree(&self, kind: &str) -> &TreeNode {
    match self.as_tree() {
      Some(t) if t.is(kind) => t,
      Some(t) => panic!("expected tree of kind `{kind}`, found `{}`", t.kind),
      None => panic!("expected tree of kind `{kind}`, found non-tree value"),
    }
  }

  pub fn expect_ident(&self) -> &IdentNode {
    match self.as_ident() {
      Some(n) => n,
      None => panic!("expected an identifier node"),
    }
  }
}

impl Default for AstValue {
  fn default() -> Self {
    Self::empty()
  }
}

impl Drop for AstValue {
  fn drop(&mut self) {
    #[cfg(debug_assertions)]
    {
      if let Some(rc) = &self.0 {
        if Rc::strong_count(rc) == 1 {
          LIVE_RESULTS.with(|c| c.set(c.get() - 1));
        }
      }
    }
  }
}

/// Builds a tree node from a kind/format pair and already-ordered
/// children, mirroring `make_tree_for`/`make_tree_with_children`.
pub fn make_tree(kind: &'static str, format: &'static str, children: Vec<AstValue>, pos: Position) -> AstValue {
  AstValue::new(AstNode::Tree(TreeNode { kind, format, children, pos }))
}

/// As [`make_tree`], but when there is exactly one child and that child is
/// itself a `list` tree, its children are flattened into the new tree
/// instead, matching `make_tree_from_list`.
pub fn make_tree_from_list(kind: &'static str, format: &'static str, children: Vec<AstValue>, pos: Position) -> AstValue {
  if let [only] = children.as_slice() {
    if let Some(list) = only.as_tree() {
      if list.is_list() {
        return make_tree(kind, format, list.children.clone(), pos);
      }
    }
  }
  make_tree(kind, format, children, pos)
}

/// Unwraps a one-element child holder, matching `pass_tree`.
pub fn pass_tree(mut children: Vec<AstValue>) -> AstValue {
  children.pop().unwrap_or_else(AstValue::empty)
}

pub fn make_ident(name: Ident, pos: Position) -> AstValue {
  AstValue::new(AstNode::Ident(IdentNode { name, pos }))
}

pub fn make_int(value: i64, pos: Position) -> AstValue {
  AstValue::new(AstNode::Int(IntNode { value, pos }))
}

pub fn make_char(value: u8, pos: Position) -> AstValue {
  AstValue::new(AstNode::Char(CharNode { value, pos }))
}

pub fn make_str(value: Vec<u8>, pos: Position) -> AstValue {
  AstValue::new(AstNode::Str(StrNode { value, pos }))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn cloning_an_ast_value_shares_the_node() {
    let value = make_int(42, Position::START);
    let clone = value.clone();
    assert!(value.ptr_eq(&clone));
  }

  #[test]
  fn make_tree_from_list_flattens_a_single_list_child() {
    let list = make_tree(LIST_KIND, "", vec![make_int(1, Position::START), make_int(2, Position::START)], Position::START);
    let wrapped = make_tree_from_list("decl", "%*;\n", vec![list], Position::START);
    let tree = wrapped.as_tree().unwrap();
    assert_eq!(tree.kind, "decl");
    assert_eq!(tree.children.len(), 2);
  }

  #[test]
  fn make_tree_from_list_leaves_non_list_single_child_alone() {
    let child = make_int(7, Position::START);
    let wrapped = make_tree_from_list("semi", "%*;", vec![child], Position::START);
    let tree = wrapped.as_tree().unwrap();
    assert_eq!(tree.children.len(), 1);
  }

  #[test]
  fn expect_tree_panics_on_shape_mismatch() {
    let value = make_int(1, Position::START);
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| value.expect_tree("decl")));
    assert!(result.is_err());
  }

  #[test]
  #[cfg(debug_assertions)]
  fn live_result_count_returns_to_baseline_once_everything_is_dropped() {
    let baseline = live_results();
    {
      let tree = make_tree("x", "", vec![make_int(1, Position::START), make_int(2, Position::START)], Position::START);
      assert!(live_results() > baseline);
      drop(tree);
    }
    assert_eq!(live_results(), baseline);
  }

  #[test]
  #[cfg(debug_assertions)]
  fn cloned_values_share_one_live_node() {
    let baseline = live_results();
    let value = make_int(9, Position::START);
    let clone = value.clone();
    assert_eq!(live_results(), baseline + 1);
    drop(value);
    assert_eq!(live_results(), baseline + 1);
    drop(clone);
    assert_eq!(live_results(), baseline);
  }
}
