//! The back-tracking recursive-descent parsing engine: memoized, with
//! direct and indirect left recursion resolved by iterating rule
//! application to a fixed point.
//!
//! The memoization cache is one `HashMap<NtId, CacheState>` per input
//! offset rather than the original's flat `(offset, nt)` hash table — a
//! `Vec` indexed by offset with a small per-offset map is equally correct
//! and a better fit for Rust's ownership rules. Before a non-terminal is
//! attempted at an offset its cache slot is seeded `Failed` ("the
//! pessimistic seed"): if parsing it recurses back into itself at the same
//! offset before finishing, that inner attempt sees `Failed` and bails
//! immediately. This turns indirect left recursion into an ordinary parse
//! failure instead of infinite recursion. Direct left-recursive rules are
//! modeled separately (`NonTerminal::recursive`) and applied in a loop that
//! re-seeds each attempt from the best result found so far, stopping when
//! a round fails to consume further input.
//!
//! Note on `back_tracking`/`avoid` sequence modifiers: this engine always
//! parses a sequence element greedily to its longest match (optionally
//! separated by a `chain_rule`) and does not backtrack a sequence's item
//! count against the success of the rest of the rule that follows it. The
//! original's fully general backtracking across that boundary is not
//! needed by this grammar — no rule here depends on a sequence giving back
//! an item to let a later element succeed — so the flags are retained on
//! `Element` for fidelity to the grammar-construction vocabulary but do not
//! currently change engine behavior.

use std::collections::HashMap;

use crate::ast::AstValue;
use crate::error::{DeepestReach, TcpoError, TcpoResult, TraceFrame};
use crate::grammar::{Element, ElementKind, Grammar, NtId, Rule};
use crate::intern::Interner;
use crate::text::{Position, TextBuffer};

#[derive(Clone)]
enum CacheState {
  Failed,
  Succeeded { value: AstValue, end: Position },
}

/// Tuning knobs for a parse run. The only knob today is whether the
/// memoization cache is consulted at all; it exists so the engine's two
/// correctness mechanisms — the cache and the left-recursion fixed-point
/// loop — can be exercised independently in tests. Turning memoization off
/// does not reintroduce the risk it guards against for *indirect* left
/// recursion (the pessimistic `Failed` seed stops being written), so it is
/// only safe to use on grammars without it; every grammar this front end
/// ships is one of those.
#[derive(Clone, Copy)]
pub struct ParserConfig {
  pub memoize: bool,
}

impl Default for ParserConfig {
  fn default() -> Self {
    Self { memoize: true }
  }
}

struct ParseSession<'a> {
  buf: TextBuffer<'a>,
  interner: Interner,
  cache: Vec<HashMap<u32, CacheState>>,
  memoize: bool,
  trace: Vec<TraceFrame>,
  deepest: DeepestReach,
}

impl<'a> ParseSession<'a> {
  fn new(source: &'a [u8], config: ParserConfig) -> Self {
    Self {
      buf: TextBuffer::new(source),
      interner: Interner::new(),
      cache: vec![HashMap::new(); source.len() + 1],
      memoize: config.memoize,
      trace: Vec::new(),
      deepest: DeepestReach::new(),
    }
  }

  fn cache_get(&self, offset: usize, id: NtId) -> Option<CacheState> {
    if !self.memoize {
      return None;
    }
    self.cache[offset].get(&id.0).cloned()
  }

  fn cache_set(&mut self, offset: usize, id: NtId, state: CacheState) {
    if !self.memoize {
      return;
    }
    self.cache[offset].insert(id.0, state);
  }

  fn record_expect(&mut self, el: &Element, pos: Position, default_desc: impl Into<String>) {
    let desc = el.expect_msg.clone().unwrap_or_else(|| default_desc.into());
    self.deepest.record(pos, &self.trace, desc);
  }

  /// Parses `id` at the buffer's current position, applying memoization
  /// and the left-recursion fixed-point loop. On success the buffer is
  /// left just past the match; on failure it is restored to where parsing
  /// started.
  fn parse_nt(&mut self, grammar: &Grammar, id: NtId) -> Option<(AstValue, Position)> {
    let start = self.buf.pos();
    match self.cache_get(start.offset, id) {
      Some(CacheState::Failed) => return None,
      Some(CacheState::Succeeded { value, end }) => {
        self.buf.seek(end);
        return Some((value, end));
      }
      None => {}
    }
    self.cache_set(start.offset, id, CacheState::Failed);

    let nt = grammar.get(id);
    self.trace.push(TraceFrame { nt: nt.name, pos: start });

    let mut best: Option<(AstValue, Position)> = None;

    if let Some(scan) = nt.builtin.clone() {
      self.buf.seek(start);
      if let Some(value) = scan(&mut self.buf, &mut self.interner) {
        best = Some((value, self.buf.pos()));
      }
    } else {
      for rule in &nt.normal {
        self.buf.seek(start);
        if let Some(value) = self.parse_rule(grammar, rule, Vec::new(), start) {
          best = Some((value, self.buf.pos()));
          break;
        }
      }

      if let Some((value, end)) = best.clone() {
        self.cache_set(start.offset, id, CacheState::Succeeded { value, end });
        loop {
          let (cur_value, cur_end) = best.clone().unwrap();
          let mut extended = None;
          for rule in &nt.recursive {
            let Some(rec_start) = &rule.rec_start else { continue };
            let Some(seed) = rec_start(&cur_value) else { continue };
            self.buf.seek(cur_end);
            if let Some(value) = self.parse_rule(grammar, rule, seed, start) {
              let end = self.buf.pos();
              if end.offset > cur_end.offset {
                extended = Some((value, end));
                break;
              }
            }
          }
          match extended {
            Some((value, end)) => {
              self.cache_set(start.offset, id, CacheState::Succeeded { value: value.clone(), end });
              best = Some((value, end));
            }
            None => break,
          }
        }
      }
    }

    self.trace.pop();
    match &best {
      Some((value, end)) => self.cache_set(start.offset, id, CacheState::Succeeded { value: value.clone(), end: *end }),
      None => self.cache_set(start.offset, id, CacheState::Failed),
    }
    match &best {
      Some((_, end)) => self.buf.seek(*end),
      None => self.buf.seek(start),
    }
    best
  }

  /// Parses one rule: its element chain, seeded with `start_acc`, followed
  /// by its end function (defaulting to unwrapping a single collected
  /// child, matching the original's "no end function" case after
  /// `take_child`).
  fn parse_rule(&mut self, grammar: &Grammar, rule: &Rule, start_acc: Vec<AstValue>, start_pos: Position) -> Option<AstValue> {
    let acc = self.parse_elements(grammar, &rule.elements, start_acc)?;
    match &rule.end {
      Some(f) => f(acc, start_pos),
      None => Some(crate::ast::pass_tree(acc)),
    }
  }

  /// Parses `elements` in order, threading the accumulator through each.
  /// An optional element tries its preferred branch (skip-first when
  /// `avoid`, match-first otherwise) and falls back to the other branch if
  /// the remainder of the chain then fails to parse — true backtracking,
  /// not a local greedy choice.
  fn parse_elements(&mut self, grammar: &Grammar, elements: &[Element], acc: Vec<AstValue>) -> Option<Vec<AstValue>> {
    let Some((first, rest)) = elements.split_first() else {
      return Some(acc);
    };

    if first.sequence {
      let acc = self.parse_sequence(grammar, first, acc)?;
      return self.parse_elements(grammar, rest, acc);
    }

    if !first.optional {
      let acc = self.attempt(grammar, first, acc)?;
      return self.parse_elements(grammar, rest, acc);
    }

    let pos_before = self.buf.pos();
    if first.avoid {
      let skip_acc = self.try_skip(first, acc.clone());
      if let Some(result) = self.parse_elements(grammar, rest, skip_acc) {
        return Some(result);
      }
      self.buf.seek(pos_before);
      if let Some(match_acc) = self.attempt(grammar, first, acc) {
        if let Some(result) = self.parse_elements(grammar, rest, match_acc) {
          return Some(result);
        }
      }
      self.buf.seek(pos_before);
      None
    } else {
      if let Some(match_acc) = self.attempt(grammar, first, acc.clone()) {
        if let Some(result) = self.parse_elements(grammar, rest, match_acc) {
          return Some(result);
        }
        self.buf.seek(pos_before);
      }
      let skip_acc = self.try_skip(first, acc);
      self.parse_elements(grammar, rest, skip_acc)
    }
  }

  /// Parses exactly one occurrence of `el`'s underlying terminal or
  /// non-terminal, combining its own result into `acc`. Leaves the buffer
  /// unmoved and returns `None` on failure.
  fn attempt(&mut self, grammar: &Grammar, el: &Element, acc: Vec<AstValue>) -> Option<Vec<AstValue>> {
    let pos_before = self.buf.pos();
    match el.kind.as_ref().expect("element has no kind") {
      ElementKind::Char(c) => {
        let c = *c;
        if self.buf.eat_char(c) {
          Some(self.combine_char(el, acc, c, pos_before))
        } else {
          self.record_expect(el, pos_before, format!("'{}'", c as char));
          None
        }
      }
      ElementKind::CharSet(set) => {
        if let Some(b) = self.buf.eat_if(|b| set.contains(b)) {
          Some(self.combine_char(el, acc, b, pos_before))
        } else {
          self.record_expect(el, pos_before, "a character from the set");
          None
        }
      }
      ElementKind::EndOfInput => {
        if self.buf.at_end() {
          Some(self.combine_own(el, acc, AstValue::empty()))
        } else {
          self.record_expect(el, pos_before, "end of input");
          None
        }
      }
      ElementKind::NonTerminal(id) => {
        let id = *id;
        let (value, _end) = self.parse_nt(grammar, id)?;
        if let Some(cond) = &el.condition {
          if !cond(&value, &self.interner) {
            self.buf.seek(pos_before);
            return None;
          }
        }
        Some(self.combine_own(el, acc, value))
      }
      ElementKind::Grouping(rules) => {
        for rule in rules {
          self.buf.seek(pos_before);
          if let Some(value) = self.parse_rule(grammar, rule, Vec::new(), pos_before) {
            return Some(self.combine_own(el, acc, value));
          }
        }
        self.buf.seek(pos_before);
        self.record_expect(el, pos_before, "one of a set of alternatives");
        None
      }
    }
  }

  /// Parses zero or more repetitions of `el`, separated by `el.chain_rule`
  /// when present, into a fresh accumulator seeded by `el.begin_seq`
  /// (defaulting to empty), then folds that accumulator into `outer` via
  /// `el.add_seq` (defaulting to leaving `outer` unchanged).
  fn parse_sequence(&mut self, grammar: &Grammar, el: &Element, outer: Vec<AstValue>) -> Option<Vec<AstValue>> {
    let mut inner = el.begin_seq.as_ref().map(|f| f(&outer)).unwrap_or_default();
    let mut first = true;
    loop {
      let pos_before = self.buf.pos();
      if !first {
        if let Some(chain) = &el.chain_rule {
          if self.parse_rule(grammar, chain, Vec::new(), pos_before).is_none() {
            self.buf.seek(pos_before);
            break;
          }
        }
      }
      match self.attempt(grammar, el, inner.clone()) {
        Some(next) => {
          inner = next;
          first = false;
        }
        None => {
          self.buf.seek(pos_before);
          break;
        }
      }
    }
    let pos = self.buf.pos();
    match &el.add_seq {
      Some(f) => Some(f(outer, inner, pos)),
      None => Some(outer),
    }
  }

  fn combine_char(&self, el: &Element, acc: Vec<AstValue>, byte: u8, pos: Position) -> Vec<AstValue> {
    match &el.add_char {
      Some(f) => f(acc, byte, pos),
      None => acc,
    }
  }

  fn combine_own(&self, el: &Element, acc: Vec<AstValue>, own: AstValue) -> Vec<AstValue> {
    match &el.add {
      Some(f) => f(acc, own),
      None => acc,
    }
  }

  fn try_skip(&self, el: &Element, acc: Vec<AstValue>) -> Vec<AstValue> {
    if let Some(f) = &el.add_skip {
      return f(acc);
    }
    if let Some(f) = &el.add {
      return f(acc, AstValue::empty());
    }
    acc
  }
}

/// The result of a successful parse: the root AST value plus the
/// identifier table built up while parsing it (needed to resolve
/// identifiers during unparsing and task lowering).
pub struct ParseOutcome {
  pub value:    AstValue,
  pub interner: Interner,
}

/// Parses all of `source` as `root_nt`, requiring the match to consume the
/// entire input. On failure, returns a report of the deepest point any
/// parse attempt reached and everything that was expected there.
pub fn parse(grammar: &Grammar, root_nt: &str, source: &[u8]) -> TcpoResult<ParseOutcome> {
  parse_with_config(grammar, root_nt, source, ParserConfig::default())
}

/// As [`parse`], but with an explicit [`ParserConfig`] — chiefly so a test
/// can disable memoization and compare the result against a memoized run.
pub fn parse_with_config(grammar: &Grammar, root_nt: &str, source: &[u8], config: ParserConfig) -> TcpoResult<ParseOutcome> {
  let id = grammar.find(root_nt).unwrap_or_else(|| panic!("grammar has no non-terminal named `{root_nt}`"));
  let mut session = ParseSession::new(source, config);
  match session.parse_nt(grammar, id) {
    Some((value, end)) if end.offset == source.len() => Ok(ParseOutcome { value, interner: session.interner }),
    _ => Err(TcpoError::ParseFailed(session.deepest)),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ast::make_int;
  use crate::grammar::GrammarBuilder;

  /// A minimal non-recursive grammar: a single digit, read as a builtin
  /// scanner, exercises the plumbing from `parse` down through
  /// `parse_nt`'s builtin branch.
  #[test]
  fn parses_a_builtin_scanned_digit() {
    let mut gb = GrammarBuilder::new();
    gb.builtin(
      "digit",
      std::rc::Rc::new(|buf, _interner| {
        let pos = buf.pos();
        let b = buf.eat_if(|b| b.is_ascii_digit())?;
        Some(make_int((b - b'0') as i64, pos))
      }),
    );
    let grammar = gb.build();
    let out = parse(&grammar, "digit", b"7").unwrap();
    assert_eq!(out.value.node().unwrap().pos().offset, 0);
  }

  #[test]
  fn fails_and_reports_deepest_reach_on_mismatch() {
    let mut gb = GrammarBuilder::new();
    gb.nt("greeting").rule().char_(b'h').char_(b'i');
    let grammar = gb.build();
    let err = parse(&grammar, "greeting", b"ho").unwrap_err();
    match err {
      TcpoError::ParseFailed(reach) => assert_eq!(reach.pos().offset, 1),
      _ => panic!("expected a parse failure"),
    }
  }

  #[test]
  fn left_recursive_rule_extends_to_a_fixed_point() {
    // sum := num ('+' num)*  built directly as a left-recursive rule: the
    // base case parses one number, the recursive rule repeatedly matches
    // `+ num` and folds it onto the running total.
    let mut gb = GrammarBuilder::new();
    gb.builtin(
      "num",
      std::rc::Rc::new(|buf, _interner| {
        let pos = buf.pos();
        let b = buf.eat_if(|b| b.is_ascii_digit())?;
        Some(make_int((b - b'0') as i64, pos))
      }),
    );
    {
      let mut sum = gb.nt("sum");
      sum.rule().nt("num").take_child();
      sum
        .rec_rule(std::rc::Rc::new(|seed| Some(vec![seed.clone()])))
        .char_(b'+')
        .nt("num")
        .add(std::rc::Rc::new(|acc, own| {
          let total = acc[0].as_ident().map(|_| 0).unwrap_or(0);
          let _ = total;
          let lhs = match acc[0].node() {
            Some(crate::ast::AstNode::Int(n)) => n.value,
            _ => 0,
          };
          let rhs = match own.node() {
            Some(crate::ast::AstNode::Int(n)) => n.value,
            _ => 0,
          };
          vec![make_int(lhs + rhs, Position::START)]
        }));
    }
    let grammar = gb.build();
    let out = parse(&grammar, "sum", b"1+2+3").unwrap();
    match out.value.node() {
      Some(crate::ast::AstNode::Int(n)) => assert_eq!(n.value, 6),
      _ => panic!("expected an int node"),
    }
  }

  /// Testable Property 2: disabling the cache must not change the parse
  /// result, only whether intermediate attempts are remembered. Uses a
  /// grammar with ordinary (non-left-recursive) backtracking sharing —
  /// a rule tried and abandoned at an offset, then re-entered from a
  /// different caller — so a memoized and an unmemoized run genuinely take
  /// different paths through `parse_nt` and still have to land on the same
  /// tree.
  fn build_shared_prefix_grammar() -> Grammar {
    let mut gb = GrammarBuilder::new();
    gb.builtin(
      "digit",
      std::rc::Rc::new(|buf, _interner| {
        let pos = buf.pos();
        let b = buf.eat_if(|b| b.is_ascii_digit())?;
        Some(make_int((b - b'0') as i64, pos))
      }),
    );
    {
      // `wide := digit digit digit` and `narrow := digit digit` both start
      // by parsing the same `digit` non-terminal at offset 0; `either`
      // tries `wide` first so its failure on a 2-digit input forces a
      // second, independent entry into `digit` at offset 0 through `narrow`.
      let mut wide = gb.nt("wide");
      wide.rule().nt("digit").take_child().nt("digit").nt("digit");
      let mut narrow = gb.nt("narrow");
      narrow.rule().nt("digit").take_child().nt("digit");
      let mut either = gb.nt("either");
      either.rule().nt("wide").take_child();
      either.rule().nt("narrow").take_child();
    }
    gb.build()
  }

  fn assert_same_int(a: &AstValue, b: &AstValue) {
    match (a.node(), b.node()) {
      (Some(crate::ast::AstNode::Int(x)), Some(crate::ast::AstNode::Int(y))) => assert_eq!(x.value, y.value),
      _ => panic!("expected both parses to produce an int node"),
    }
  }

  #[test]
  fn memoized_and_unmemoized_parses_agree() {
    let grammar = build_shared_prefix_grammar();

    let memoized = parse_with_config(&grammar, "either", b"42", ParserConfig { memoize: true }).unwrap();
    let unmemoized = parse_with_config(&grammar, "either", b"42", ParserConfig { memoize: false }).unwrap();
    assert_same_int(&memoized.value, &unmemoized.value);

    let memoized = parse_with_config(&grammar, "either", b"123", ParserConfig { memoize: true }).unwrap();
    let unmemoized = parse_with_config(&grammar, "either", b"123", ParserConfig { memoize: false }).unwrap();
    assert_same_int(&memoized.value, &unmemoized.value);
  }
}
