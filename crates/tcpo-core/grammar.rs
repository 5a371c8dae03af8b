//! The data-driven grammar model and the fluent builder used to construct
//! it, standing in for the original's `HEADER`/`NT_DEF`/`RULE`/`CHAR`/
//! `CHARSET`/`OPT`/`SEQ`/`GROUPING` macro DSL.
//!
//! A rule threads a single accumulator — an ordered `Vec<AstValue>` of
//! collected children — through its elements, mirroring the original's
//! `prev_result` chain where the payload happens to always be a child list
//! for this grammar. Each element either leaves the accumulator alone
//! (the default, used for punctuation and keywords with no semantic
//! payload) or combines its own parsed value into it via an explicit `add`
//! function (`push_child`, `take_child`, or a caller-supplied closure).

use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::AstValue;
use crate::charset::CharSet;
use crate::intern::Interner;
use crate::text::Position;

/// Stable handle to a non-terminal within a [`Grammar`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NtId(pub(crate) u32);

pub type AddCharFn = Rc<dyn Fn(Vec<AstValue>, u8, Position) -> Vec<AstValue>>;
pub type AddFn = Rc<dyn Fn(Vec<AstValue>, AstValue) -> Vec<AstValue>>;
pub type SkipFn = Rc<dyn Fn(Vec<AstValue>) -> Vec<AstValue>>;
pub type BeginSeqFn = Rc<dyn Fn(&[AstValue]) -> Vec<AstValue>>;
pub type AddSeqFn = Rc<dyn Fn(Vec<AstValue>, Vec<AstValue>, Position) -> Vec<AstValue>>;
pub type ConditionFn = Rc<dyn Fn(&AstValue, &Interner) -> bool>;
pub type EndFn = Rc<dyn Fn(Vec<AstValue>, Position) -> Option<AstValue>>;
pub type RecStartFn = Rc<dyn Fn(&AstValue) -> Option<Vec<AstValue>>>;
/// A hand-rolled scanner used for the small handful of non-terminals whose
/// original definition is a custom per-character state machine rather than
/// a declarative rule chain (whitespace, numbers, identifiers, characters,
/// strings, and integers). See `cgrammar.rs` for the concrete scanners.
pub type BuiltinFn = Rc<dyn Fn(&mut crate::text::TextBuffer<'_>, &mut Interner) -> Option<AstValue>>;

/// Appends `own` to the accumulator; the generic stand-in for `ADD_CHILD`.
pub fn push_child(mut acc: Vec<AstValue>, own: AstValue) -> Vec<AstValue> {
  acc.push(own);
  acc
}

/// Replaces the accumulator with a single child; the generic stand-in for
/// `take_child` (used by `NTP`).
pub fn take_child(_acc: Vec<AstValue>, own: AstValue) -> Vec<AstValue> {
  vec![own]
}

/// An `add_seq` that flattens the finished sequence accumulator directly
/// into the outer one, used for sequences whose items are themselves the
/// thing being collected (e.g. a repeated statement list).
pub fn extend_children(mut outer: Vec<AstValue>, inner: Vec<AstValue>, _pos: Position) -> Vec<AstValue> {
  outer.extend(inner);
  outer
}

/// An `add_seq` that wraps the finished sequence accumulator into a single
/// `list`-kind tree and appends that as one child of the outer
/// accumulator, the generic stand-in for `SEQL`/`add_seq_as_list`.
pub fn wrap_as_list(mut outer: Vec<AstValue>, inner: Vec<AstValue>, pos: Position) -> Vec<AstValue> {
  outer.push(crate::ast::make_tree(crate::ast::LIST_KIND, "", inner, pos));
  outer
}

pub enum ElementKind {
  NonTerminal(NtId),
  /// A parenthesized set of alternative rules, matched as a single element
  /// (the original's `GROUPING`).
  Grouping(Vec<Rule>),
  Char(u8),
  CharSet(CharSet),
  EndOfInput,
}

#[derive(Default)]
pub struct Element {
  pub kind: Option<ElementKind>,
  pub optional: bool,
  pub sequence: bool,
  pub back_tracking: bool,
  pub avoid: bool,
  pub chain_rule: Option<Rule>,
  pub expect_msg: Option<String>,
  pub add_char: Option<AddCharFn>,
  pub add: Option<AddFn>,
  pub add_skip: Option<SkipFn>,
  pub begin_seq: Option<BeginSeqFn>,
  pub add_seq: Option<AddSeqFn>,
  pub condition: Option<ConditionFn>,
}

impl Element {
  fn new(kind: ElementKind) -> Self {
    Self { kind: Some(kind), ..Default::default() }
  }
}

#[derive(Default)]
pub struct Rule {
  pub elements: Vec<Element>,
  pub end: Option<EndFn>,
  pub rec_start: Option<RecStartFn>,
}

pub struct NonTerminal {
  pub name: &'static str,
  pub normal: Vec<Rule>,
  pub recursive: Vec<Rule>,
  pub builtin: Option<BuiltinFn>,
}

pub struct Grammar {
  non_terminals: Vec<NonTerminal>,
  names: HashMap<&'static str, NtId>,
}

impl Grammar {
  pub fn get(&self, id: NtId) -> &NonTerminal {
    &self.non_terminals[id.0 as usize]
  }

  pub fn find(&self, name: &str) -> Option<NtId> {
    self.names.get(name).copied()
  }

  fn nt_id(&mut self, name: &'static str) -> NtId {
    if let Some(&id) = self.names.get(name) {
      return id;
    }
    let id = NtId(self.non_terminals.len() as u32);
    self.non_terminals.push(NonTerminal { name, normal: Vec::new(), recursive: Vec::new(), builtin: None });
    self.names.insert(name, id);
    id
  }
}

pub struct GrammarBuilder {
  grammar: Grammar,
}

impl Default for GrammarBuilder {
  fn default() -> Self {
    Self::new()
  }
}

impl GrammarBuilder {
  pub fn new() -> Self {
    Self { grammar: Grammar { non_terminals: Vec::new(), names: HashMap::new() } }
  }

  pub fn nt(&mut self, name: &'static str) -> NtBuilder<'_> {
    let id = self.grammar.nt_id(name);
    NtBuilder { grammar: &mut self.grammar, id }
  }

  /// Registers `name` as a builtin scanner rather than a rule-based
  /// non-terminal.
  pub fn builtin(&mut self, name: &'static str, scan: BuiltinFn) {
    let id = self.grammar.nt_id(name);
    self.grammar.non_terminals[id.0 as usize].builtin = Some(scan);
  }

  pub fn build(self) -> Grammar {
    self.grammar
  }
}

pub struct NtBuilder<'g> {
  grammar: &'g mut Grammar,
  id: NtId,
}

impl<'g> NtBuilder<'g> {
  pub fn id(&self) -> NtId {
    self.id
  }

  pub fn rule(&mut self) -> RuleBuilder<'_> {
    RuleBuilder { grammar: self.grammar, target: Target::Normal(self.id), rule: Rule::default() }
  }

  /// A left-recursive rule: `rec_start` decides, given the result already
  /// accumulated by an earlier (successful) parse of this non-terminal,
  /// whether to seed another iteration (`Some(seed)`) or reject this
  /// attempt (`None`).
  pub fn rec_rule(&mut self, rec_start: RecStartFn) -> RuleBuilder<'_> {
    let rule = Rule { rec_start: Some(rec_start), ..Default::default() };
    RuleBuilder { grammar: self.grammar, target: Target::Recursive(self.id), rule }
  }
}

enum Target {
  Normal(NtId),
  Recursive(NtId),
}

pub struct RuleBuilder<'g> {
  grammar: &'g mut Grammar,
  target: Target,
  rule: Rule,
}

impl<'g> Drop for RuleBuilder<'g> {
  fn drop(&mut self) {
    let rule = std::mem::take(&mut self.rule);
    let id = match self.target {
      Target::Normal(id) => &mut self.grammar.non_terminals[id.0 as usize].normal,
      Target::Recursive(id) => &mut self.grammar.non_terminals[id.0 as usize].recursive,
    };
    id.push(rule);
  }
}

impl<'g> RuleBuilder<'g> {
  fn push(&mut self, kind: ElementKind) -> &mut Self {
    self.rule.elements.push(Element::new(kind));
    self
  }

  fn last(&mut self) -> &mut Element {
    self.rule.elements.last_mut().expect("modifier applied with no preceding element")
  }

  pub fn nt(&mut self, name: &'static str) -> &mut Self {
    let id = self.grammar.nt_id(name);
    self.push(ElementKind::NonTerminal(id))
  }

  pub fn char_(&mut self, c: u8) -> &mut Self {
    self.push(ElementKind::Char(c))
  }

  pub fn charset(&mut self, set: CharSet) -> &mut Self {
    self.push(ElementKind::CharSet(set))
  }

  pub fn end_of_input(&mut self) -> &mut Self {
    self.push(ElementKind::EndOfInput)
  }

  /// A parenthesized alternation matched as a single element.
  pub fn grouping(&mut self, rules: Vec<Rule>) -> &mut Self {
    self.push(ElementKind::Grouping(rules))
  }

  pub fn optional(&mut self) -> &mut Self {
    self.last().optional = true;
    self
  }

  pub fn sequence(&mut self) -> &mut Self {
    self.last().sequence = true;
    self
  }

  pub fn back_tracking(&mut self) -> &mut Self {
    self.last().back_tracking = true;
    self
  }

  pub fn avoid(&mut self) -> &mut Self {
    self.last().avoid = true;
    self
  }

  pub fn chain(&mut self, rule: Rule) -> &mut Self {
    self.last().chain_rule = Some(rule);
    self
  }

  pub fn expect(&mut self, msg: impl Into<String>) -> &mut Self {
    self.last().expect_msg = Some(msg.into());
    self
  }

  pub fn add_char(&mut self, f: AddCharFn) -> &mut Self {
    self.last().add_char = Some(f);
    self
  }

  pub fn add(&mut self, f: AddFn) -> &mut Self {
    self.last().add = Some(f);
    self
  }

  pub fn add_skip(&mut self, f: SkipFn) -> &mut Self {
    self.last().add_skip = Some(f);
    self
  }

  pub fn begin_seq(&mut self, f: BeginSeqFn) -> &mut Self {
    self.last().begin_seq = Some(f);
    self
  }

  pub fn add_seq(&mut self, f: AddSeqFn) -> &mut Self {
    self.last().add_seq = Some(f);
    self
  }

  pub fn condition(&mut self, f: ConditionFn) -> &mut Self {
    self.last().condition = Some(f);
    self
  }

  /// `ADD_CHILD`: the common case of appending the element's own result to
  /// the rule's accumulator.
  pub fn add_child(&mut self) -> &mut Self {
    self.add(Rc::new(push_child))
  }

  /// `NTP`/`take_child`: replace the accumulator with this element's own
  /// result alone.
  pub fn take_child(&mut self) -> &mut Self {
    self.add(Rc::new(take_child))
  }

  pub fn end(&mut self, f: EndFn) -> &mut Self {
    self.rule.end = Some(f);
    self
  }

  /// `PASS`: the rule's result is its single collected child.
  pub fn pass(&mut self) -> &mut Self {
    self.end(Rc::new(|acc, _pos| Some(crate::ast::pass_tree(acc))))
  }

  /// `TREE(kind, format)`: wrap the collected children into a new tree.
  pub fn tree(&mut self, kind: &'static str, format: &'static str) -> &mut Self {
    self.end(Rc::new(move |acc, pos| Some(crate::ast::make_tree(kind, format, acc, pos))))
  }

  /// `TREE_FROM_LIST(kind, format)`: as `tree`, but flattens a lone `list`
  /// child instead of nesting it.
  pub fn tree_from_list(&mut self, kind: &'static str, format: &'static str) -> &mut Self {
    self.end(Rc::new(move |acc, pos| Some(crate::ast::make_tree_from_list(kind, format, acc, pos))))
  }
}
