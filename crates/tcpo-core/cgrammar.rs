//! The concrete grammar: a C expression/statement/declaration core extended
//! with the cooperative-multitasking statement forms (`task`, `queue for`,
//! `poll`/`at most`, `timer`, `every`).
//!
//! Lexical non-terminals (`white_space`, `ident`, `char`, `string`, `int`)
//! are hand-written scanners registered as builtins rather than declarative
//! rules, matching the original's treatment of them as custom
//! per-character state machines (`CHARSET`/`CHARF` callbacks) rather than a
//! reusable rule shape. Everything above the lexical layer is built with
//! the [`crate::grammar`] fluent API.

use std::rc::Rc;

use crate::ast::{make_char, make_ident, make_int, make_str, make_tree, AstValue};
use crate::grammar::{extend_children, push_child, wrap_as_list, Element, ElementKind, Grammar, GrammarBuilder, NtId, Rule, RuleBuilder};
use crate::intern::Interner;
use crate::text::{Position, TextBuffer};

/// Words reserved by the language that `ident` itself refuses to treat as
/// plain identifiers when a rule checks `not_a_keyword`, and that the
/// `KEYWORD` rules below match by name.
const KEYWORDS: &[&str] = &[
  "task", "queue", "for", "poll", "at", "most", "timer", "every", "start", "if", "else", "while", "do", "for", "return",
  "break", "continue", "goto", "switch", "case", "default", "struct", "union", "enum", "sizeof", "int", "char", "void",
  "float", "long", "short", "unsigned", "signed", "const", "static", "extern",
];

fn is_letter(b: u8) -> bool {
  b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_cont(b: u8) -> bool {
  is_letter(b) || b.is_ascii_digit()
}

// ---------------------------------------------------------------------
// Lexical scanners
// ---------------------------------------------------------------------

fn scan_white_space(buf: &mut TextBuffer<'_>, _interner: &mut Interner) -> Option<AstValue> {
  loop {
    match buf.current() {
      Some(b' ' | b'\t' | b'\r' | b'\n') => {
        buf.advance();
      }
      Some(b'/') => {
        let save = buf.pos();
        buf.advance();
        match buf.current() {
          Some(b'/') => {
            buf.advance();
            while !matches!(buf.current(), None | Some(b'\n')) {
              buf.advance();
            }
          }
          Some(b'*') => {
            buf.advance();
            loop {
              match buf.current() {
                None => break,
                Some(b'*') => {
                  buf.advance();
                  if buf.current() == Some(b'/') {
                    buf.advance();
                    break;
                  }
                }
                _ => buf.advance(),
              }
            }
          }
          _ => {
            buf.seek(save);
            break;
          }
        }
      }
      _ => break,
    }
  }
  Some(AstValue::empty())
}

fn scan_ident(buf: &mut TextBuffer<'_>, interner: &mut Interner) -> Option<AstValue> {
  let pos = buf.pos();
  let first = buf.eat_if(is_letter)?;
  let mut bytes = vec![first];
  while let Some(b) = buf.eat_if(is_ident_cont) {
    bytes.push(b);
  }
  let text = String::from_utf8(bytes).ok()?;
  let id = interner.intern(&text);
  if KEYWORDS.contains(&text.as_str()) {
    interner.mark_keyword(id);
  }
  Some(make_ident(id, pos))
}

fn escape_value(b: u8) -> Option<u8> {
  Some(match b {
    b'0' => 0,
    b'"' => b'"',
    b'\'' => b'\'',
    b'\\' => b'\\',
    b'a' => 0x07,
    b'b' => 0x08,
    b'f' => 0x0C,
    b'n' => b'\n',
    b'r' => b'\r',
    b't' => b'\t',
    b'v' => 0x0B,
    _ => return None,
  })
}

fn scan_char(buf: &mut TextBuffer<'_>, _interner: &mut Interner) -> Option<AstValue> {
  let pos = buf.pos();
  if !buf.eat_char(b'\'') {
    return None;
  }
  let value = if buf.eat_char(b'\\') {
    let b = buf.eat_if(|_| true)?;
    escape_value(b)?
  } else {
    buf.eat_if(|b| (32..=126).contains(&b) && b != b'\\' && b != b'\'')?
  };
  if !buf.eat_char(b'\'') {
    return None;
  }
  Some(make_char(value, pos))
}

fn scan_string(buf: &mut TextBuffer<'_>, interner: &mut Interner) -> Option<AstValue> {
  let pos = buf.pos();
  let mut value = Vec::new();
  let mut matched_any = false;
  loop {
    let save = buf.pos();
    if !buf.eat_char(b'"') {
      buf.seek(save);
      break;
    }
    loop {
      if buf.eat_char(b'"') {
        break;
      }
      if buf.eat_char(b'\\') {
        let b = match buf.eat_if(|_| true) {
          Some(b) => b,
          None => return None,
        };
        match escape_value(b) {
          Some(v) => value.push(v),
          None => return None,
        }
      } else {
        match buf.eat_if(|b| b != b'"') {
          Some(b) => value.push(b),
          None => return None,
        }
      }
    }
    matched_any = true;
    scan_white_space(buf, interner);
  }
  if !matched_any {
    return None;
  }
  Some(make_str(value, pos))
}

fn scan_int(buf: &mut TextBuffer<'_>, _interner: &mut Interner) -> Option<AstValue> {
  let pos = buf.pos();
  let negative = buf.eat_char(b'-');
  let start = buf.pos();
  let magnitude: i64 = if buf.current() == Some(b'0') {
    buf.advance();
    match buf.current() {
      Some(b'x' | b'X') => {
        buf.advance();
        let mut digits = String::new();
        while let Some(b) = buf.eat_if(|b| b.is_ascii_hexdigit()) {
          digits.push(b as char);
        }
        if digits.is_empty() {
          return None;
        }
        i64::from_str_radix(&digits, 16).ok()?
      }
      Some(b'0'..=b'7') => {
        let mut digits = String::new();
        while let Some(b) = buf.eat_if(|b| (b'0'..=b'7').contains(&b)) {
          digits.push(b as char);
        }
        i64::from_str_radix(&digits, 8).ok()?
      }
      _ => 0,
    }
  } else {
    let mut digits = String::new();
    while let Some(b) = buf.eat_if(|b| b.is_ascii_digit()) {
      digits.push(b as char);
    }
    if digits.is_empty() {
      buf.seek(pos);
      return None;
    }
    digits.parse().ok()?
  };
  let _ = start;
  while buf.eat_if(|b| matches!(b, b'u' | b'U' | b'l' | b'L')).is_some() {}
  Some(make_int(if negative { -magnitude } else { magnitude }, pos))
}

// ---------------------------------------------------------------------
// Grammar construction helpers
// ---------------------------------------------------------------------

fn ws(rb: &mut RuleBuilder<'_>) {
  rb.nt("white_space");
}

/// Matches a fixed ASCII literal, char by char, contributing nothing to
/// the rule's accumulator, followed by whitespace.
fn lit(rb: &mut RuleBuilder<'_>, text: &'static str) {
  for b in text.bytes() {
    rb.char_(b);
  }
  ws(rb);
}

/// Matches an identifier equal to `word`, contributing nothing — the
/// concrete-grammar analogue of the original's `KEYWORD` macro.
fn keyword(rb: &mut RuleBuilder<'_>, word: &'static str) {
  rb.nt("ident").condition(Rc::new(move |value, interner| value.as_ident().is_some_and(|n| interner.resolve(n.name) == word)));
  ws(rb);
}

fn not_a_keyword() -> Rc<dyn Fn(&AstValue, &Interner) -> bool> {
  Rc::new(|value, interner| value.as_ident().is_some_and(|n| !interner.is_keyword(n.name)))
}

/// Builds one precedence level that simply falls through to the next
/// tighter level when no operator at this level is present.
fn fallthrough_level(gb: &mut GrammarBuilder, name: &'static str, next: &'static str) {
  let mut rb = gb.nt(name).rule();
  rb.nt(next);
  rb.take_child();
}

/// Builds a standalone `,` (plus trailing whitespace) rule for use as a
/// sequence's chain rule, without registering it against any non-terminal.
fn comma_chain(ws_id: NtId) -> Rule {
  Rule {
    elements: vec![
      Element { kind: Some(ElementKind::Char(b',')), ..Default::default() },
      Element { kind: Some(ElementKind::NonTerminal(ws_id)), ..Default::default() },
    ],
    ..Default::default()
  }
}

/// Adds one left-associative binary operator rule to a precedence level
/// already seeded by [`fallthrough_level`]: `name := name OP next`.
fn binary_op(gb: &mut GrammarBuilder, name: &'static str, next: &'static str, op: &'static str, kind: &'static str, format: &'static str) {
  let mut nt = gb.nt(name);
  let mut rb = nt.rec_rule(Rc::new(|seed| Some(vec![seed.clone()])));
  for b in op.bytes() {
    rb.char_(b);
  }
  ws(&mut rb);
  rb.nt(next);
  rb.add_child();
  rb.tree(kind, format);
}

pub fn build() -> Grammar {
  let mut gb = GrammarBuilder::new();

  gb.builtin("white_space", Rc::new(scan_white_space));
  gb.builtin("ident", Rc::new(scan_ident));
  gb.builtin("char", Rc::new(scan_char));
  gb.builtin("string", Rc::new(scan_string));
  gb.builtin("int", Rc::new(scan_int));

  let ws_id = gb.nt("white_space").id();

  // -- primary / postfix / unary -----------------------------------

  {
    let mut nt = gb.nt("primary_expr");
    {
      let mut rb = nt.rule();
      rb.nt("ident").condition(not_a_keyword()).take_child();
      ws(&mut rb);
    }
    {
      let mut rb = nt.rule();
      rb.nt("int").take_child();
      ws(&mut rb);
    }
    {
      let mut rb = nt.rule();
      rb.nt("char").take_child();
      ws(&mut rb);
    }
    {
      let mut rb = nt.rule();
      rb.nt("string").take_child();
      ws(&mut rb);
    }
    {
      let mut rb = nt.rule();
      lit(&mut rb, "(");
      rb.nt("expr");
      rb.take_child();
      lit(&mut rb, ")");
    }
  }

  fallthrough_level(&mut gb, "postfix_expr", "primary_expr");
  {
    let mut nt = gb.nt("postfix_expr");
    {
      // call: postfix_expr '(' argument_expr_list? ')'
      let mut rb = nt.rec_rule(Rc::new(|seed| Some(vec![seed.clone()])));
      lit(&mut rb, "(");
      rb.nt("argument_expr_list");
      rb.add_child();
      lit(&mut rb, ")");
      rb.tree("call", "%*(%*)");
    }
    {
      // array index: postfix_expr '[' expr ']'
      let mut rb = nt.rec_rule(Rc::new(|seed| Some(vec![seed.clone()])));
      lit(&mut rb, "[");
      rb.nt("expr");
      rb.add_child();
      lit(&mut rb, "]");
      rb.tree("array", "%*[%*]");
    }
    {
      // field: postfix_expr '.' ident
      let mut rb = nt.rec_rule(Rc::new(|seed| Some(vec![seed.clone()])));
      lit(&mut rb, ".");
      rb.nt("ident");
      rb.add_child();
      ws(&mut rb);
      rb.tree("field", "%*.%*");
    }
    {
      // field through pointer: postfix_expr '->' ident
      let mut rb = nt.rec_rule(Rc::new(|seed| Some(vec![seed.clone()])));
      rb.char_(b'-');
      rb.char_(b'>');
      rb.nt("ident");
      rb.add_child();
      ws(&mut rb);
      rb.tree("fieldderef", "%*->%*");
    }
    {
      // post-increment: postfix_expr '++'
      let mut rb = nt.rec_rule(Rc::new(|seed| Some(vec![seed.clone()])));
      rb.char_(b'+');
      rb.char_(b'+');
      ws(&mut rb);
      rb.tree("postinc", "%*++");
    }
    {
      // post-decrement: postfix_expr '--'
      let mut rb = nt.rec_rule(Rc::new(|seed| Some(vec![seed.clone()])));
      rb.char_(b'-');
      rb.char_(b'-');
      ws(&mut rb);
      rb.tree("postdec", "%*--");
    }
  }

  {
    // A possibly-empty, comma-separated list of arguments, collected into a
    // single `list`-kind tree (the rule's result, via the default
    // `pass_tree` end behavior unwrapping the one-element outer
    // accumulator `add_seq` leaves behind).
    let mut nt = gb.nt("argument_expr_list");
    let mut rb = nt.rule();
    rb.nt("assignment_expr");
    rb.sequence();
    rb.optional();
    rb.chain(comma_chain(ws_id));
    rb.begin_seq(Rc::new(|_outer| Vec::new()));
    rb.add(Rc::new(push_child));
    rb.add_seq(Rc::new(wrap_as_list));
  }

  {
    let mut nt = gb.nt("unary_expr");
    nt.rule().nt("postfix_expr").take_child();
    for (op, kind, fmt) in [("!", "not", "!%*"), ("~", "bitnot", "~%*"), ("-", "neg", "-%*"), ("+", "pos", "+%*"), ("*", "deref", "*%*"), ("&", "addrof", "&%*")] {
      let mut rb = nt.rule();
      for b in op.bytes() {
        rb.char_(b);
      }
      ws(&mut rb);
      rb.nt("unary_expr");
      rb.add_child();
      rb.tree(kind, fmt);
    }
    {
      let mut rb = nt.rule();
      rb.char_(b'+');
      rb.char_(b'+');
      ws(&mut rb);
      rb.nt("unary_expr");
      rb.add_child();
      rb.tree("preinc", "++%*");
    }
    {
      let mut rb = nt.rule();
      rb.char_(b'-');
      rb.char_(b'-');
      ws(&mut rb);
      rb.nt("unary_expr");
      rb.add_child();
      rb.tree("predec", "--%*");
    }
  }

  fallthrough_level(&mut gb, "cast_expr", "unary_expr");

  // -- binary precedence ladder -------------------------------------

  fallthrough_level(&mut gb, "l_expr1", "cast_expr");
  binary_op(&mut gb, "l_expr1", "cast_expr", "*", "mul", "%* * %*");
  binary_op(&mut gb, "l_expr1", "cast_expr", "/", "div", "%* / %*");
  binary_op(&mut gb, "l_expr1", "cast_expr", "%", "mod", "%* %% %*");

  fallthrough_level(&mut gb, "l_expr2", "l_expr1");
  binary_op(&mut gb, "l_expr2", "l_expr1", "+", "add", "%* + %*");
  binary_op(&mut gb, "l_expr2", "l_expr1", "-", "sub", "%* - %*");

  fallthrough_level(&mut gb, "l_expr3", "l_expr2");
  binary_op(&mut gb, "l_expr3", "l_expr2", "<<", "shl", "%* << %*");
  binary_op(&mut gb, "l_expr3", "l_expr2", ">>", "shr", "%* >> %*");

  fallthrough_level(&mut gb, "l_expr4", "l_expr3");
  binary_op(&mut gb, "l_expr4", "l_expr3", "<=", "le", "%* <= %*");
  binary_op(&mut gb, "l_expr4", "l_expr3", ">=", "ge", "%* >= %*");
  binary_op(&mut gb, "l_expr4", "l_expr3", "<", "lt", "%* < %*");
  binary_op(&mut gb, "l_expr4", "l_expr3", ">", "gt", "%* > %*");

  fallthrough_level(&mut gb, "l_expr5", "l_expr4");
  binary_op(&mut gb, "l_expr5", "l_expr4", "==", "eq", "%* == %*");
  binary_op(&mut gb, "l_expr5", "l_expr4", "!=", "ne", "%* != %*");

  fallthrough_level(&mut gb, "l_expr6", "l_expr5");
  binary_op(&mut gb, "l_expr6", "l_expr5", "&", "bitand", "%* & %*");

  fallthrough_level(&mut gb, "l_expr7", "l_expr6");
  binary_op(&mut gb, "l_expr7", "l_expr6", "^", "bitxor", "%* ^ %*");

  fallthrough_level(&mut gb, "l_expr8", "l_expr7");
  binary_op(&mut gb, "l_expr8", "l_expr7", "|", "bitor", "%* | %*");

  fallthrough_level(&mut gb, "l_expr9a", "l_expr8");
  binary_op(&mut gb, "l_expr9a", "l_expr8", "&&", "and", "%* && %*");

  fallthrough_level(&mut gb, "l_expr9", "l_expr9a");
  binary_op(&mut gb, "l_expr9", "l_expr9a", "||", "or", "%* || %*");

  {
    let mut nt = gb.nt("conditional_expr");
    nt.rule().nt("l_expr9").take_child();
    {
      let mut rb = nt.rule();
      rb.nt("l_expr9");
      rb.add_child();
      lit(&mut rb, "?");
      rb.nt("assignment_expr");
      rb.add_child();
      lit(&mut rb, ":");
      rb.nt("conditional_expr");
      rb.add_child();
      rb.tree("ternary", "%* ? %* : %*");
    }
  }

  {
    let mut nt = gb.nt("assignment_expr");
    nt.rule().nt("conditional_expr").take_child();
    for (op, kind) in [("=", "assign"), ("+=", "assignadd"), ("-=", "assignsub"), ("*=", "assignmul"), ("/=", "assigndiv")] {
      let mut rb = nt.rule();
      rb.nt("unary_expr");
      rb.add_child();
      lit(&mut rb, op);
      rb.nt("assignment_expr");
      rb.add_child();
      rb.tree(kind, "%* = %*");
    }
  }

  {
    let mut nt = gb.nt("expr");
    nt.rule().nt("assignment_expr").take_child();
  }

  // -- declarations ----------------------------------------------------

  {
    let mut nt = gb.nt("storage_class_specifier");
    for word in ["task", "static", "extern"] {
      let mut rb = nt.rule();
      keyword(&mut rb, word);
      rb.end(Rc::new(move |_acc, pos| Some(make_tree("storage", word, Vec::new(), pos))));
    }
  }

  {
    let mut nt = gb.nt("simple_type_specifier");
    for word in ["int", "char", "void", "float"] {
      let mut rb = nt.rule();
      keyword(&mut rb, word);
      rb.end(Rc::new(move |_acc, pos| Some(make_tree("type", word, Vec::new(), pos))));
    }
  }

  {
    let mut nt = gb.nt("declarator");
    let mut rb = nt.rule();
    rb.nt("ident");
    rb.take_child();
    ws(&mut rb);
  }

  {
    let mut nt = gb.nt("initializer");
    let mut rb = nt.rule();
    rb.nt("assignment_expr");
    rb.take_child();
  }

  {
    // '=' initializer as a single unit, so the owning declaration can treat
    // the whole thing as one optional element and keep a fixed child count.
    // Wrapped in its own tree (rather than passed through bare) so its own
    // format template carries the literal `= ` the parser consumed but the
    // AST otherwise wouldn't record — `decl`'s template has no conditional,
    // so the `= ` can only render by living on this wrapper, where an empty
    // (no-initializer) value naturally renders nothing.
    let mut nt = gb.nt("declaration_initializer");
    let mut rb = nt.rule();
    lit(&mut rb, "=");
    rb.nt("initializer");
    rb.add_child();
    rb.tree("declinit", " = %*");
  }

  {
    let mut nt = gb.nt("declaration");
    {
      // storage_class? type_specifier declarator ('=' initializer)? ';'
      let mut rb = nt.rule();
      rb.nt("storage_class_specifier");
      rb.optional();
      rb.avoid();
      rb.add_child();
      rb.nt("simple_type_specifier");
      rb.add_child();
      rb.nt("declarator");
      rb.add_child();
      {
        let mut init_rb = rb.nt("declaration_initializer");
        init_rb.optional();
        init_rb.avoid();
        init_rb.add(Rc::new(push_child));
      }
      lit(&mut rb, ";");
      rb.tree("decl", "%* %* %*%*;\n");
    }
  }

  // -- statements --------------------------------------------------

  {
    let mut nt = gb.nt("else_clause");
    let mut rb = nt.rule();
    keyword(&mut rb, "else");
    rb.nt("statement");
    rb.take_child();
  }

  {
    let mut nt = gb.nt("statement");

    {
      // block: '{' decl_or_stat* '}'
      let mut rb = nt.rule();
      lit(&mut rb, "{");
      rb.nt("decl_or_stat");
      rb.sequence();
      rb.optional();
      rb.begin_seq(Rc::new(|_| Vec::new()));
      rb.add(Rc::new(push_child));
      rb.add_seq(Rc::new(extend_children));
      lit(&mut rb, "}");
      rb.tree("block", "{\n%>%*%<}\n");
    }

    {
      // expression statement: expr ';'
      let mut rb = nt.rule();
      rb.nt("expr");
      rb.take_child();
      lit(&mut rb, ";");
      rb.tree("semi", "%*;\n");
    }

    {
      // if / if-else
      let mut rb = nt.rule();
      keyword(&mut rb, "if");
      lit(&mut rb, "(");
      rb.nt("expr");
      rb.add_child();
      lit(&mut rb, ")");
      rb.nt("statement");
      rb.add_child();
      {
        let mut else_rb = rb.nt("else_clause");
        else_rb.optional();
        else_rb.avoid();
        else_rb.add(Rc::new(push_child));
      }
      rb.tree("if", "if (%*)\n%>%*%<%*");
    }

    {
      // while
      let mut rb = nt.rule();
      keyword(&mut rb, "while");
      lit(&mut rb, "(");
      rb.nt("expr");
      rb.add_child();
      lit(&mut rb, ")");
      rb.nt("statement");
      rb.add_child();
      rb.tree("while", "while (%*)\n%>%*%<");
    }

    {
      // for (init; cond; step) statement
      let mut rb = nt.rule();
      keyword(&mut rb, "for");
      lit(&mut rb, "(");
      rb.nt("expr");
      rb.add_child();
      lit(&mut rb, ";");
      rb.nt("expr");
      rb.add_child();
      lit(&mut rb, ";");
      rb.nt("expr");
      rb.add_child();
      lit(&mut rb, ")");
      rb.nt("statement");
      rb.add_child();
      rb.tree("for", "for (%*; %*; %*)\n%>%*%<");
    }

    {
      // return [expr]? ;
      let mut rb = nt.rule();
      keyword(&mut rb, "return");
      {
        let mut val_rb = rb.nt("expr");
        val_rb.optional();
        val_rb.avoid();
      }
      lit(&mut rb, ";");
      rb.tree("ret", "return %*;\n");
    }

    {
      let mut rb = nt.rule();
      keyword(&mut rb, "break");
      lit(&mut rb, ";");
      rb.tree("break", "break;\n");
    }

    {
      let mut rb = nt.rule();
      keyword(&mut rb, "continue");
      lit(&mut rb, ";");
      rb.tree("continue", "continue;\n");
    }

    {
      // queue for <call> <statement>
      let mut rb = nt.rule();
      keyword(&mut rb, "queue");
      keyword(&mut rb, "for");
      rb.nt("expr");
      rb.add_child();
      rb.nt("statement");
      rb.add_child();
      rb.tree("queuefor", "queue for %*\n%>%*%<");
    }

    {
      // poll <statement> [at most (<expr>) <statement>]?
      let mut rb = nt.rule();
      keyword(&mut rb, "poll");
      rb.nt("statement");
      rb.add_child();
      {
        let mut at_most = rb.nt("at_most_clause");
        at_most.optional();
        at_most.avoid();
        at_most.add(Rc::new(push_child));
      }
      rb.tree("poll", "poll\n%>%*%<%*");
    }

    {
      let mut nt = gb.nt("at_most_clause");
      let mut rb = nt.rule();
      keyword(&mut rb, "at");
      keyword(&mut rb, "most");
      lit(&mut rb, "(");
      rb.nt("expr");
      rb.add_child();
      lit(&mut rb, ")");
      rb.nt("statement");
      rb.add_child();
      rb.tree("atmost", "\nat most (%*)\n%>%*%<\n");
    }

    {
      // timer <expr> ;
      let mut rb = nt.rule();
      keyword(&mut rb, "timer");
      rb.nt("expr");
      rb.add_child();
      lit(&mut rb, ";");
      rb.tree("timer", "timer %*;");
    }

    {
      // every (<expr>) start <call> ;
      let mut rb = nt.rule();
      keyword(&mut rb, "every");
      lit(&mut rb, "(");
      rb.nt("expr");
      rb.add_child();
      lit(&mut rb, ")");
      keyword(&mut rb, "start");
      rb.nt("expr");
      rb.add_child();
      lit(&mut rb, ";");
      rb.tree("every", "every (%*) start %*;");
    }

    {
      // do <statement> while (<expr>) ;
      let mut rb = nt.rule();
      keyword(&mut rb, "do");
      rb.nt("statement");
      rb.add_child();
      keyword(&mut rb, "while");
      lit(&mut rb, "(");
      rb.nt("expr");
      rb.add_child();
      lit(&mut rb, ")");
      lit(&mut rb, ";");
      rb.tree("dowhile", "do\n%>%*%<while (%*);\n");
    }

    {
      // switch (<expr>) <statement>
      let mut rb = nt.rule();
      keyword(&mut rb, "switch");
      lit(&mut rb, "(");
      rb.nt("expr");
      rb.add_child();
      lit(&mut rb, ")");
      rb.nt("statement");
      rb.add_child();
      rb.tree("switch", "switch (%*)\n%>%*%<");
    }

    {
      // case <constant_expr> : <statement>
      let mut rb = nt.rule();
      keyword(&mut rb, "case");
      rb.nt("expr");
      rb.add_child();
      lit(&mut rb, ":");
      rb.nt("statement");
      rb.add_child();
      rb.tree("case", "case %*:\n%>%*%<");
    }

    {
      // default : <statement>
      let mut rb = nt.rule();
      keyword(&mut rb, "default");
      lit(&mut rb, ":");
      rb.nt("statement");
      rb.add_child();
      rb.tree("default", "default:\n%>%*%<");
    }

    {
      // goto <ident> ;
      let mut rb = nt.rule();
      keyword(&mut rb, "goto");
      rb.nt("ident");
      rb.add_child();
      ws(&mut rb);
      lit(&mut rb, ";");
      rb.tree("goto", "goto %*;\n");
    }

    {
      // <ident> : <statement>
      let mut rb = nt.rule();
      rb.nt("ident");
      rb.condition(not_a_keyword());
      rb.add_child();
      ws(&mut rb);
      lit(&mut rb, ":");
      rb.nt("statement");
      rb.add_child();
      rb.tree("label", "%*:\n%*");
    }
  }

  {
    let mut nt = gb.nt("decl_or_stat");
    nt.rule().nt("declaration").take_child();
    nt.rule().nt("statement").take_child();
  }

  // -- function definitions ------------------------------------------

  {
    let mut nt = gb.nt("parameter_declaration");
    let mut rb = nt.rule();
    rb.nt("simple_type_specifier");
    rb.add_child();
    rb.nt("declarator");
    rb.add_child();
    rb.tree("param", "%* %*");
  }

  {
    // A possibly-empty, comma-separated parameter list, collected the same
    // way as `argument_expr_list`.
    let mut nt = gb.nt("parameter_declaration_list");
    let mut rb = nt.rule();
    rb.nt("parameter_declaration");
    rb.sequence();
    rb.optional();
    rb.chain(comma_chain(ws_id));
    rb.begin_seq(Rc::new(|_outer| Vec::new()));
    rb.add(Rc::new(push_child));
    rb.add_seq(Rc::new(wrap_as_list));
  }

  {
    // storage_class? type_specifier declarator '(' parameter_list? ')' block
    let mut nt = gb.nt("function_definition");
    let mut rb = nt.rule();
    rb.nt("storage_class_specifier");
    rb.optional();
    rb.avoid();
    rb.add_child();
    rb.nt("simple_type_specifier");
    rb.add_child();
    rb.nt("declarator");
    rb.add_child();
    lit(&mut rb, "(");
    rb.nt("parameter_declaration_list");
    rb.add_child();
    lit(&mut rb, ")");
    rb.nt("statement");
    rb.add_child();
    rb.tree("funcdef", "%* %* %*(%*)\n%*");
  }

  {
    // A top-level item is a function definition if one is present (its
    // parameter list and body distinguish it from a plain declaration),
    // else a declaration.
    let mut nt = gb.nt("top_level_item");
    nt.rule().nt("function_definition").take_child();
    nt.rule().nt("declaration").take_child();
  }

  {
    let mut nt = gb.nt("root");
    let mut rb = nt.rule();
    ws(&mut rb);
    rb.nt("top_level_item");
    rb.sequence();
    rb.optional();
    rb.begin_seq(Rc::new(|_| Vec::new()));
    rb.add(Rc::new(push_child));
    rb.add_seq(Rc::new(extend_children));
    rb.end_of_input();
    rb.tree("program", "%*");
  }

  gb.build()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ast::AstNode;
  use crate::parser::parse;

  #[test]
  fn parses_a_var_declaration() {
    let grammar = build();
    let out = parse(&grammar, "root", b"int x = 1;").unwrap();
    let program = out.value.as_tree().unwrap();
    assert_eq!(program.children.len(), 1);
    assert!(program.children[0].is_tree("decl"));
  }

  #[test]
  fn parses_an_if_else_statement() {
    let grammar = build();
    let out = parse(&grammar, "root", b"if (x) { y = 1; } else { y = 2; }").unwrap();
    let program = out.value.as_tree().unwrap();
    assert!(program.children[0].is_tree("if"));
  }

  #[test]
  fn parses_a_queue_for_statement() {
    let grammar = build();
    let out = parse(&grammar, "root", b"queue for make_toast() { x = 1; }").unwrap();
    let program = out.value.as_tree().unwrap();
    assert!(program.children[0].is_tree("queuefor"));
  }

  #[test]
  fn parses_poll_with_at_most() {
    let grammar = build();
    let out = parse(&grammar, "root", b"poll { x = 1; } at most (100) { y = 2; }").unwrap();
    let program = out.value.as_tree().unwrap();
    let poll = program.children[0].as_tree().unwrap();
    assert!(poll.is("poll"));
    assert!(poll.children[1].is_tree("atmost"));
  }

  #[test]
  fn parses_a_binary_expression_with_precedence() {
    let grammar = build();
    let out = parse(&grammar, "root", b"x = 1 + 2 * 3;").unwrap();
    let program = out.value.as_tree().unwrap();
    let assign = program.children[0].as_tree().unwrap().children[0].as_tree().unwrap();
    assert!(assign.is("assign"));
    let rhs = assign.child(2).unwrap();
    assert!(rhs.is_tree("add"));
    assert!(rhs.tree_child(2).is_tree("mul"));
  }

  #[test]
  fn parses_a_task_function_definition() {
    let grammar = build();
    let mut out = parse(&grammar, "root", b"task void t() { int x = 1; f(); }").unwrap();
    let program = out.value.as_tree().unwrap();
    let funcdef = program.children[0].as_tree().unwrap();
    assert!(funcdef.is("funcdef"));
    let storage = funcdef.child(0).unwrap().as_tree().unwrap();
    assert!(storage.is("storage"));
    assert_eq!(storage.format, "task");
    let name = funcdef.child(2).unwrap().as_ident().unwrap();
    assert_eq!(name.name, out.interner.intern("t"));
    let body = funcdef.child(4).unwrap().as_tree().unwrap();
    assert!(body.is("block"));
  }

  #[test]
  fn parses_a_plain_function_definition_without_storage_class() {
    let grammar = build();
    let out = parse(&grammar, "root", b"int add(int a, int b) { return a + b; }").unwrap();
    let program = out.value.as_tree().unwrap();
    let funcdef = program.children[0].as_tree().unwrap();
    assert!(funcdef.is("funcdef"));
    let storage = funcdef.child(0).unwrap();
    assert!(storage.is_empty());
    let params = funcdef.child(3).unwrap().as_tree().unwrap();
    assert_eq!(params.children.len(), 2);
  }

  #[test]
  fn parses_a_declaration_without_initializer() {
    let grammar = build();
    let out = parse(&grammar, "root", b"int x;").unwrap();
    let program = out.value.as_tree().unwrap();
    let decl = program.children[0].as_tree().unwrap();
    assert!(decl.child(3).unwrap().is_empty());
  }

  #[test]
  fn parses_multiple_call_arguments() {
    let grammar = build();
    let out = parse(&grammar, "root", b"f(a, b, c);").unwrap();
    let program = out.value.as_tree().unwrap();
    let call = program.children[0].as_tree().unwrap().children[0].as_tree().unwrap();
    assert!(call.is("call"));
    let args = call.child(1).unwrap().as_tree().unwrap();
    assert_eq!(args.children.len(), 3);
  }

  // The literal scan_int/scan_string/scan_char/expr scenarios.

  #[test]
  fn scans_a_decimal_integer_literal() {
    let grammar = build();
    let out = parse(&grammar, "int", b"123").unwrap();
    match out.value.node() {
      Some(AstNode::Int(n)) => assert_eq!(n.value, 123),
      _ => panic!("expected an integer-literal node"),
    }
  }

  #[test]
  fn scans_a_hex_integer_literal() {
    let grammar = build();
    let out = parse(&grammar, "int", b"0xAbc").unwrap();
    match out.value.node() {
      Some(AstNode::Int(n)) => assert_eq!(n.value, 2748),
      _ => panic!("expected an integer-literal node"),
    }
  }

  #[test]
  fn scans_an_octal_integer_literal() {
    let grammar = build();
    let out = parse(&grammar, "int", b"017").unwrap();
    match out.value.node() {
      Some(AstNode::Int(n)) => assert_eq!(n.value, 15),
      _ => panic!("expected an integer-literal node"),
    }
  }

  #[test]
  fn adjacent_string_literals_concatenate_across_a_block_comment() {
    let grammar = build();
    let out = parse(&grammar, "string", b"\"abc\" /* */ \"def\"").unwrap();
    match out.value.node() {
      Some(AstNode::Str(n)) => assert_eq!(n.value, b"abcdef"),
      _ => panic!("expected a string-literal node"),
    }
  }

  #[test]
  fn scans_a_newline_escape_character_literal() {
    let grammar = build();
    let out = parse(&grammar, "char", b"'\\n'").unwrap();
    match out.value.node() {
      Some(AstNode::Char(n)) => assert_eq!(n.value, 10),
      _ => panic!("expected a character-literal node"),
    }
  }

  #[test]
  fn parses_a_multiplication_expression() {
    let grammar = build();
    let mut out = parse(&grammar, "expr", b"a*b").unwrap();
    let mul = out.value.as_tree().unwrap();
    assert!(mul.is("mul"));
    let lhs = mul.child(0).unwrap().as_ident().unwrap();
    assert_eq!(out.interner.resolve(lhs.name), "a");
    let rhs = mul.child(1).unwrap().as_ident().unwrap();
    assert_eq!(out.interner.resolve(rhs.name), "b");
  }
}
