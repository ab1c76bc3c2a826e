// Rule text parser
// Produces a name-based parse tree; name resolution to ids happens in
// `rule::Rule::compile` where the dimension and cube registries are known
//
// Grammar:
//   rule    := target '=' expr
//   target  := '[' slot (',' slot)* ']'
//   slot    := '*' | '' | element-name
//   expr    := sum (cmp-op sum)?
//   sum     := term (('+'|'-') term)*
//   term    := unary (('*'|'/') unary)*
//   unary   := '-' unary | primary
//   primary := number | "string" | reference | ident '(' args ')' | '(' expr ')'
//   reference := '[' (cube-name ':')? slot (',' slot)* ']'
//
// Element and cube names are single-quoted, string literals double-quoted.

use crate::core::{OlapError, OlapResult};

/// Parsed rule before name resolution
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRule {
    /// Target slot per dimension; `None` matches any element
    pub target: Vec<Option<String>>,

    /// Right-hand side expression
    pub expr: RawExpr,
}

/// Expression tree with unresolved names
#[derive(Debug, Clone, PartialEq)]
pub enum RawExpr {
    Number(f64),
    Text(String),
    Binary(super::BinOp, Box<RawExpr>, Box<RawExpr>),
    Call(String, Vec<RawExpr>),
    Ref {
        cube: Option<String>,
        slots: Vec<Option<String>>,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Number(f64),
    Str(String),
    Name(String),
    Ident(String),
    LBracket,
    RBracket,
    LParen,
    RParen,
    Comma,
    Colon,
    Star,
    Plus,
    Minus,
    Slash,
    Assign,
    EqEq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

fn syntax(msg: impl Into<String>) -> OlapError {
    OlapError::RuleSyntaxError(msg.into())
}

fn lex(text: &str) -> OlapResult<Vec<Tok>> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\r' | '\n' => i += 1,
            '[' => {
                tokens.push(Tok::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Tok::RBracket);
                i += 1;
            }
            '(' => {
                tokens.push(Tok::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Tok::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Tok::Comma);
                i += 1;
            }
            ':' => {
                tokens.push(Tok::Colon);
                i += 1;
            }
            '*' => {
                tokens.push(Tok::Star);
                i += 1;
            }
            '+' => {
                tokens.push(Tok::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Tok::Minus);
                i += 1;
            }
            '/' => {
                tokens.push(Tok::Slash);
                i += 1;
            }
            '=' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Tok::EqEq);
                    i += 2;
                } else {
                    tokens.push(Tok::Assign);
                    i += 1;
                }
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Tok::Ne);
                    i += 2;
                } else {
                    return Err(syntax("unexpected '!'"));
                }
            }
            '<' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Tok::Le);
                    i += 2;
                } else {
                    tokens.push(Tok::Lt);
                    i += 1;
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Tok::Ge);
                    i += 2;
                } else {
                    tokens.push(Tok::Gt);
                    i += 1;
                }
            }
            '\'' | '"' => {
                let quote = c;
                let mut value = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        Some(&ch) if ch == quote => {
                            // doubled quote escapes itself
                            if chars.get(i + 1) == Some(&quote) {
                                value.push(quote);
                                i += 2;
                            } else {
                                i += 1;
                                break;
                            }
                        }
                        Some(&ch) => {
                            value.push(ch);
                            i += 1;
                        }
                        None => return Err(syntax("unterminated quote")),
                    }
                }
                if quote == '\'' {
                    tokens.push(Tok::Name(value));
                } else {
                    tokens.push(Tok::Str(value));
                }
            }
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let value: f64 = text
                    .parse()
                    .map_err(|_| syntax(format!("bad number '{}'", text)))?;
                tokens.push(Tok::Number(value));
            }
            _ if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Tok::Ident(chars[start..i].iter().collect()));
            }
            _ => return Err(syntax(format!("unexpected character '{}'", c))),
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Tok>,
    at: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.at)
    }

    fn next(&mut self) -> Option<Tok> {
        let tok = self.tokens.get(self.at).cloned();
        if tok.is_some() {
            self.at += 1;
        }
        tok
    }

    fn expect(&mut self, tok: Tok) -> OlapResult<()> {
        match self.next() {
            Some(found) if found == tok => Ok(()),
            other => Err(syntax(format!("expected {:?}, found {:?}", tok, other))),
        }
    }

    /// `[' slot (',' slot)* ']` with an optional leading cube qualifier
    fn bracket_list(&mut self) -> OlapResult<(Option<String>, Vec<Option<String>>)> {
        self.expect(Tok::LBracket)?;

        let mut cube = None;
        if let (Some(Tok::Name(name)), Some(Tok::Colon)) =
            (self.tokens.get(self.at), self.tokens.get(self.at + 1))
        {
            cube = Some(name.clone());
            self.at += 2;
        }

        let mut slots = Vec::new();
        loop {
            match self.peek() {
                Some(Tok::RBracket) | Some(Tok::Comma) => slots.push(None),
                Some(Tok::Star) => {
                    slots.push(None);
                    self.at += 1;
                }
                Some(Tok::Name(name)) => {
                    slots.push(Some(name.clone()));
                    self.at += 1;
                }
                other => return Err(syntax(format!("bad reference slot: {:?}", other))),
            }
            match self.next() {
                Some(Tok::Comma) => continue,
                Some(Tok::RBracket) => break,
                other => return Err(syntax(format!("expected ',' or ']', found {:?}", other))),
            }
        }

        Ok((cube, slots))
    }

    fn expr(&mut self) -> OlapResult<RawExpr> {
        let lhs = self.sum()?;
        let op = match self.peek() {
            Some(Tok::EqEq) => Some(super::BinOp::Eq),
            Some(Tok::Ne) => Some(super::BinOp::Ne),
            Some(Tok::Lt) => Some(super::BinOp::Lt),
            Some(Tok::Le) => Some(super::BinOp::Le),
            Some(Tok::Gt) => Some(super::BinOp::Gt),
            Some(Tok::Ge) => Some(super::BinOp::Ge),
            _ => None,
        };
        if let Some(op) = op {
            self.at += 1;
            let rhs = self.sum()?;
            return Ok(RawExpr::Binary(op, Box::new(lhs), Box::new(rhs)));
        }
        Ok(lhs)
    }

    fn sum(&mut self) -> OlapResult<RawExpr> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Plus) => super::BinOp::Add,
                Some(Tok::Minus) => super::BinOp::Sub,
                _ => break,
            };
            self.at += 1;
            let rhs = self.term()?;
            lhs = RawExpr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn term(&mut self) -> OlapResult<RawExpr> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Star) => super::BinOp::Mul,
                Some(Tok::Slash) => super::BinOp::Div,
                _ => break,
            };
            self.at += 1;
            let rhs = self.unary()?;
            lhs = RawExpr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> OlapResult<RawExpr> {
        if self.peek() == Some(&Tok::Minus) {
            self.at += 1;
            let inner = self.unary()?;
            return Ok(RawExpr::Binary(
                super::BinOp::Sub,
                Box::new(RawExpr::Number(0.0)),
                Box::new(inner),
            ));
        }
        self.primary()
    }

    fn primary(&mut self) -> OlapResult<RawExpr> {
        match self.peek().cloned() {
            Some(Tok::Number(value)) => {
                self.at += 1;
                Ok(RawExpr::Number(value))
            }
            Some(Tok::Str(value)) => {
                self.at += 1;
                Ok(RawExpr::Text(value))
            }
            Some(Tok::LBracket) => {
                let (cube, slots) = self.bracket_list()?;
                Ok(RawExpr::Ref { cube, slots })
            }
            Some(Tok::LParen) => {
                self.at += 1;
                let inner = self.expr()?;
                self.expect(Tok::RParen)?;
                Ok(inner)
            }
            Some(Tok::Ident(name)) => {
                self.at += 1;
                self.expect(Tok::LParen)?;
                let mut args = Vec::new();
                if self.peek() != Some(&Tok::RParen) {
                    loop {
                        args.push(self.expr()?);
                        match self.next() {
                            Some(Tok::Comma) => continue,
                            Some(Tok::RParen) => break,
                            other => {
                                return Err(syntax(format!(
                                    "expected ',' or ')', found {:?}",
                                    other
                                )))
                            }
                        }
                    }
                } else {
                    self.at += 1;
                }
                Ok(RawExpr::Call(name, args))
            }
            other => Err(syntax(format!("unexpected token {:?}", other))),
        }
    }
}

/// Parse a rule definition `target = expression`
pub fn parse_rule(text: &str) -> OlapResult<ParsedRule> {
    let tokens = lex(text)?;
    let mut parser = Parser { tokens, at: 0 };

    let (cube, target) = parser.bracket_list()?;
    if cube.is_some() {
        return Err(syntax("rule target cannot name a cube"));
    }
    parser.expect(Tok::Assign)?;
    let expr = parser.expr()?;

    if parser.peek().is_some() {
        return Err(syntax("trailing input after expression"));
    }

    Ok(ParsedRule { target, expr })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::BinOp;

    #[test]
    fn test_simple_rule() {
        let rule = parse_rule("['Jan','Sales'] = ['Feb','Sales'] + 1").unwrap();
        assert_eq!(
            rule.target,
            vec![Some("Jan".to_string()), Some("Sales".to_string())]
        );
        match rule.expr {
            RawExpr::Binary(BinOp::Add, lhs, rhs) => {
                assert!(matches!(*lhs, RawExpr::Ref { .. }));
                assert_eq!(*rhs, RawExpr::Number(1.0));
            }
            other => panic!("unexpected expr: {:?}", other),
        }
    }

    #[test]
    fn test_wildcard_and_empty_slots() {
        let rule = parse_rule("['Jan', *] = [,'Costs'] * 2").unwrap();
        assert_eq!(rule.target, vec![Some("Jan".to_string()), None]);
        match rule.expr {
            RawExpr::Binary(BinOp::Mul, lhs, _) => match *lhs {
                RawExpr::Ref { cube, slots } => {
                    assert!(cube.is_none());
                    assert_eq!(slots, vec![None, Some("Costs".to_string())]);
                }
                other => panic!("unexpected lhs: {:?}", other),
            },
            other => panic!("unexpected expr: {:?}", other),
        }
    }

    #[test]
    fn test_cross_cube_reference() {
        let rule = parse_rule("[*] = ['Prices' : 'Jan'] * 1.1").unwrap();
        match rule.expr {
            RawExpr::Binary(_, lhs, _) => match *lhs {
                RawExpr::Ref { cube, slots } => {
                    assert_eq!(cube, Some("Prices".to_string()));
                    assert_eq!(slots, vec![Some("Jan".to_string())]);
                }
                other => panic!("unexpected lhs: {:?}", other),
            },
            other => panic!("unexpected expr: {:?}", other),
        }
    }

    #[test]
    fn test_if_and_comparison() {
        let rule = parse_rule("[*] = if(['A'] > 10, 1, 0)").unwrap();
        match rule.expr {
            RawExpr::Call(name, args) => {
                assert_eq!(name, "if");
                assert_eq!(args.len(), 3);
                assert!(matches!(args[0], RawExpr::Binary(BinOp::Gt, _, _)));
            }
            other => panic!("unexpected expr: {:?}", other),
        }
    }

    #[test]
    fn test_string_literal_and_quotes() {
        let rule = parse_rule("['Note'] = \"n/a\"").unwrap();
        assert_eq!(rule.expr, RawExpr::Text("n/a".to_string()));

        let quoted = parse_rule("['It''s'] = 1").unwrap();
        assert_eq!(quoted.target, vec![Some("It's".to_string())]);
    }

    #[test]
    fn test_errors() {
        assert!(parse_rule("['A'] 1").is_err());
        assert!(parse_rule("['A'] = ").is_err());
        assert!(parse_rule("['A'] = [1").is_err());
        assert!(parse_rule("['A'] = 1 2").is_err());
    }
}
