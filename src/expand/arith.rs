//! The arithmetic sublanguage (spec §4.3.1): an independent recursive-
//! descent expression parser plus its evaluator. Both $(( )) expansion and
//! the `((...))` command, C-style `for`, array subscripts, and
//! `${x:off:len}` all funnel through here.

use crate::ast::{ArithAssignOp, ArithBinOp, ArithExpr, ArithUnaryOp, Position};
use crate::error::{ArithError, BashboxError};
use crate::eval::scope::ScopeStack;

pub fn parse(text: &str) -> Result<ArithExpr, BashboxError> {
    let mut p = AParser { chars: text.chars().collect(), pos: 0 };
    p.skip_ws();
    let e = p.parse_comma()?;
    p.skip_ws();
    if p.pos != p.chars.len() {
        return Err(BashboxError::Syntax {
            pos: Position::default(),
            reason: format!("unexpected trailing arithmetic token near position {}", p.pos),
        });
    }
    Ok(e)
}

struct AParser {
    chars: Vec<char>,
    pos: usize,
}

impl AParser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }
    fn peek_at(&self, n: usize) -> Option<char> {
        self.chars.get(self.pos + n).copied()
    }
    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }
    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }
    fn eat_str(&mut self, s: &str) -> bool {
        self.skip_ws();
        let sc: Vec<char> = s.chars().collect();
        if self.chars[self.pos..].starts_with(&sc[..]) {
            self.pos += sc.len();
            true
        } else {
            false
        }
    }
    fn fail(&self, msg: impl Into<String>) -> BashboxError {
        BashboxError::Arith(ArithError::Other(msg.into()))
    }

    fn parse_comma(&mut self) -> Result<ArithExpr, BashboxError> {
        let mut left = self.parse_assign()?;
        loop {
            self.skip_ws();
            if self.peek() == Some(',') {
                self.bump();
                let right = self.parse_assign()?;
                left = ArithExpr::Binary(ArithBinOp::Add, Box::new(left), Box::new(right)); // comma keeps last value in practice; approximated as sequence
                continue;
            }
            break;
        }
        Ok(left)
    }

    fn parse_assign(&mut self) -> Result<ArithExpr, BashboxError> {
        let start = self.pos;
        self.skip_ws();
        if let Some(name) = self.try_name() {
            self.skip_ws();
            let subscript = if self.peek() == Some('[') {
                self.bump();
                let idx = self.parse_comma()?;
                self.skip_ws();
                if self.bump() != Some(']') {
                    return Err(self.fail("expected ']'"));
                }
                Some(Box::new(idx))
            } else {
                None
            };
            self.skip_ws();
            let op = if self.eat_str("+=") {
                Some(ArithAssignOp::Add)
            } else if self.eat_str("-=") {
                Some(ArithAssignOp::Sub)
            } else if self.eat_str("*=") {
                Some(ArithAssignOp::Mul)
            } else if self.eat_str("/=") {
                Some(ArithAssignOp::Div)
            } else if self.eat_str("%=") {
                Some(ArithAssignOp::Mod)
            } else if self.eat_str("<<=") {
                Some(ArithAssignOp::Shl)
            } else if self.eat_str(">>=") {
                Some(ArithAssignOp::Shr)
            } else if self.eat_str("&=") {
                Some(ArithAssignOp::And)
            } else if self.eat_str("^=") {
                Some(ArithAssignOp::Xor)
            } else if self.eat_str("|=") {
                Some(ArithAssignOp::Or)
            } else if self.peek() == Some('=') && self.peek_at(1) != Some('=') {
                self.bump();
                Some(ArithAssignOp::Assign)
            } else {
                None
            };
            if let Some(op) = op {
                let value = self.parse_assign()?;
                return Ok(ArithExpr::Assign(op, name, subscript, Box::new(value)));
            }
        }
        self.pos = start;
        self.parse_ternary()
    }

    fn try_name(&mut self) -> Option<String> {
        let start = self.pos;
        self.skip_ws();
        let first = self.peek()?;
        if !(first.is_alphabetic() || first == '_') {
            self.pos = start;
            return None;
        }
        let mut s = String::new();
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_') {
            s.push(self.bump().unwrap());
        }
        Some(s)
    }

    fn parse_ternary(&mut self) -> Result<ArithExpr, BashboxError> {
        let cond = self.parse_logor()?;
        self.skip_ws();
        if self.peek() == Some('?') {
            self.bump();
            let then_e = self.parse_assign()?;
            self.skip_ws();
            if self.bump() != Some(':') {
                return Err(self.fail("expected ':' in ternary"));
            }
            let else_e = self.parse_assign()?;
            return Ok(ArithExpr::Ternary(Box::new(cond), Box::new(then_e), Box::new(else_e)));
        }
        Ok(cond)
    }

    fn bin_level(
        &mut self,
        ops: &[(&str, ArithBinOp)],
        next: fn(&mut Self) -> Result<ArithExpr, BashboxError>,
    ) -> Result<ArithExpr, BashboxError> {
        let mut left = next(self)?;
        loop {
            self.skip_ws();
            let mut matched = None;
            for (lit, op) in ops {
                if self.chars[self.pos..].starts_with(&lit.chars().collect::<Vec<_>>()[..]) {
                    // avoid `<` matching a `<=`/`<<` prefix incorrectly
                    let after = self.pos + lit.chars().count();
                    let next_char = self.chars.get(after).copied();
                    if matches!((*lit, next_char), ("<", Some('<')) | ("<", Some('=')) | (">", Some('>')) | (">", Some('=')) | ("&", Some('&')) | ("|", Some('|'))) {
                        continue;
                    }
                    matched = Some((*lit, *op));
                    break;
                }
            }
            let Some((lit, op)) = matched else { break };
            self.pos += lit.chars().count();
            let right = next(self)?;
            left = ArithExpr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_logor(&mut self) -> Result<ArithExpr, BashboxError> {
        self.bin_level(&[("||", ArithBinOp::LogOr)], Self::parse_logand)
    }
    fn parse_logand(&mut self) -> Result<ArithExpr, BashboxError> {
        self.bin_level(&[("&&", ArithBinOp::LogAnd)], Self::parse_bitor)
    }
    fn parse_bitor(&mut self) -> Result<ArithExpr, BashboxError> {
        self.bin_level(&[("|", ArithBinOp::BitOr)], Self::parse_bitxor)
    }
    fn parse_bitxor(&mut self) -> Result<ArithExpr, BashboxError> {
        self.bin_level(&[("^", ArithBinOp::BitXor)], Self::parse_bitand)
    }
    fn parse_bitand(&mut self) -> Result<ArithExpr, BashboxError> {
        self.bin_level(&[("&", ArithBinOp::BitAnd)], Self::parse_eq)
    }
    fn parse_eq(&mut self) -> Result<ArithExpr, BashboxError> {
        self.bin_level(&[("==", ArithBinOp::Eq), ("!=", ArithBinOp::Ne)], Self::parse_rel)
    }
    fn parse_rel(&mut self) -> Result<ArithExpr, BashboxError> {
        self.bin_level(
            &[("<=", ArithBinOp::Le), (">=", ArithBinOp::Ge), ("<", ArithBinOp::Lt), (">", ArithBinOp::Gt)],
            Self::parse_shift,
        )
    }
    fn parse_shift(&mut self) -> Result<ArithExpr, BashboxError> {
        self.bin_level(&[("<<", ArithBinOp::Shl), (">>", ArithBinOp::Shr)], Self::parse_add)
    }
    fn parse_add(&mut self) -> Result<ArithExpr, BashboxError> {
        self.bin_level(&[("+", ArithBinOp::Add), ("-", ArithBinOp::Sub)], Self::parse_mul)
    }
    fn parse_mul(&mut self) -> Result<ArithExpr, BashboxError> {
        self.bin_level(&[("*", ArithBinOp::Mul), ("/", ArithBinOp::Div), ("%", ArithBinOp::Mod)], Self::parse_pow)
    }
    fn parse_pow(&mut self) -> Result<ArithExpr, BashboxError> {
        let base = self.parse_unary()?;
        self.skip_ws();
        if self.eat_str("**") {
            let exp = self.parse_pow()?; // right-assoc
            return Ok(ArithExpr::Binary(ArithBinOp::Pow, Box::new(base), Box::new(exp)));
        }
        Ok(base)
    }

    fn parse_unary(&mut self) -> Result<ArithExpr, BashboxError> {
        self.skip_ws();
        if self.eat_str("++") {
            let name = self.try_name().ok_or_else(|| self.fail("expected name after ++"))?;
            return Ok(ArithExpr::PreIncDec(name, true));
        }
        if self.eat_str("--") {
            let name = self.try_name().ok_or_else(|| self.fail("expected name after --"))?;
            return Ok(ArithExpr::PreIncDec(name, false));
        }
        match self.peek() {
            Some('-') => {
                self.bump();
                Ok(ArithExpr::Unary(ArithUnaryOp::Neg, Box::new(self.parse_unary()?)))
            }
            Some('+') => {
                self.bump();
                Ok(ArithExpr::Unary(ArithUnaryOp::Pos, Box::new(self.parse_unary()?)))
            }
            Some('!') => {
                self.bump();
                Ok(ArithExpr::Unary(ArithUnaryOp::Not, Box::new(self.parse_unary()?)))
            }
            Some('~') => {
                self.bump();
                Ok(ArithExpr::Unary(ArithUnaryOp::BitNot, Box::new(self.parse_unary()?)))
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> Result<ArithExpr, BashboxError> {
        let start = self.pos;
        if let Some(name) = self.try_name() {
            self.skip_ws();
            if self.peek() == Some('[') {
                self.bump();
                let idx = self.parse_comma()?;
                self.skip_ws();
                if self.bump() != Some(']') {
                    return Err(self.fail("expected ']'"));
                }
                return Ok(ArithExpr::ArrayElem(name, Box::new(idx)));
            }
            if self.eat_str("++") {
                return Ok(ArithExpr::PostIncDec(name, true));
            }
            if self.eat_str("--") {
                return Ok(ArithExpr::PostIncDec(name, false));
            }
            return Ok(ArithExpr::Var(name));
        }
        self.pos = start;
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<ArithExpr, BashboxError> {
        self.skip_ws();
        match self.peek() {
            Some('(') => {
                self.bump();
                let e = self.parse_comma()?;
                self.skip_ws();
                if self.bump() != Some(')') {
                    return Err(self.fail("expected ')'"));
                }
                Ok(ArithExpr::Group(Box::new(e)))
            }
            Some('$') => {
                self.bump();
                if self.peek() == Some('{') {
                    self.bump();
                    let mut s = String::new();
                    while matches!(self.peek(), Some(c) if c != '}') {
                        s.push(self.bump().unwrap());
                    }
                    self.bump();
                    Ok(ArithExpr::Var(s))
                } else if let Some(name) = self.try_name() {
                    Ok(ArithExpr::Var(name))
                } else {
                    Err(self.fail("bad $ in arithmetic"))
                }
            }
            Some(c) if c.is_ascii_digit() => self.parse_number(),
            Some(c) => Err(self.fail(format!("invalid arithmetic token '{c}'"))),
            None => Err(self.fail("unexpected end of arithmetic expression")),
        }
    }

    fn parse_number(&mut self) -> Result<ArithExpr, BashboxError> {
        let start = self.pos;
        if self.peek() == Some('0') && matches!(self.peek_at(1), Some('x') | Some('X')) {
            self.pos += 2;
            let digits_start = self.pos;
            while matches!(self.peek(), Some(c) if c.is_ascii_hexdigit()) {
                self.bump();
            }
            let text: String = self.chars[digits_start..self.pos].iter().collect();
            let v = i64::from_str_radix(&text, 16)
                .map_err(|_| BashboxError::Arith(ArithError::InvalidToken(text.clone())))?;
            return Ok(ArithExpr::Number(v));
        }
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.bump();
        }
        // base#number form, e.g. 2#101
        if self.peek() == Some('#') {
            let base_text: String = self.chars[start..self.pos].iter().collect();
            let base: u32 = base_text.parse().unwrap_or(10);
            self.bump();
            let digits_start = self.pos;
            while matches!(self.peek(), Some(c) if c.is_alphanumeric()) {
                self.bump();
            }
            let text: String = self.chars[digits_start..self.pos].iter().collect();
            let v = i64::from_str_radix(&text, base)
                .map_err(|_| BashboxError::Arith(ArithError::InvalidToken(text.clone())))?;
            return Ok(ArithExpr::Number(v));
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        let v: i64 = text.parse().map_err(|_| BashboxError::Arith(ArithError::InvalidToken(text.clone())))?;
        Ok(ArithExpr::Number(v))
    }
}

/// Evaluate a parsed arithmetic expression against the current scope,
/// with 64-bit two's-complement wraparound per spec §4.3.1.
pub fn eval(expr: &ArithExpr, scope: &mut ScopeStack) -> Result<i64, BashboxError> {
    match expr {
        ArithExpr::Number(n) => Ok(*n),
        ArithExpr::Var(name) => Ok(resolve_var(scope, name)?),
        ArithExpr::ArrayElem(name, idx) => {
            let i = eval(idx, scope)?;
            Ok(scope.get_array_element(name, i).and_then(|s| parse_num(&s)).unwrap_or(0))
        }
        ArithExpr::Group(e) => eval(e, scope),
        ArithExpr::Unary(op, e) => {
            let v = eval(e, scope)?;
            Ok(match op {
                crate::ast::ArithUnaryOp::Neg => v.wrapping_neg(),
                crate::ast::ArithUnaryOp::Pos => v,
                crate::ast::ArithUnaryOp::Not => (v == 0) as i64,
                crate::ast::ArithUnaryOp::BitNot => !v,
            })
        }
        ArithExpr::PreIncDec(name, inc) => {
            let cur = resolve_var(scope, name)?;
            let next = if *inc { cur.wrapping_add(1) } else { cur.wrapping_sub(1) };
            scope.set_scalar(name, next.to_string());
            Ok(next)
        }
        ArithExpr::PostIncDec(name, inc) => {
            let cur = resolve_var(scope, name)?;
            let next = if *inc { cur.wrapping_add(1) } else { cur.wrapping_sub(1) };
            scope.set_scalar(name, next.to_string());
            Ok(cur)
        }
        ArithExpr::Binary(op, l, r) => eval_binary(*op, l, r, scope),
        ArithExpr::Ternary(c, t, e) => {
            if eval(c, scope)? != 0 {
                eval(t, scope)
            } else {
                eval(e, scope)
            }
        }
        ArithExpr::Assign(op, name, subscript, value) => {
            let rhs = eval(value, scope)?;
            let result = if *op == ArithAssignOp::Assign {
                rhs
            } else {
                let cur = if let Some(sub) = subscript {
                    let i = eval(sub, scope)?;
                    scope.get_array_element(name, i).and_then(|s| parse_num(&s)).unwrap_or(0)
                } else {
                    resolve_var(scope, name)?
                };
                apply_assign_op(*op, cur, rhs)?
            };
            if let Some(sub) = subscript {
                let i = eval(sub, scope)?;
                scope.set_array_element(name, i, result.to_string());
            } else {
                scope.set_scalar(name, result.to_string());
            }
            Ok(result)
        }
        ArithExpr::Comma(_, _) => unreachable!("comma lowered during parse"),
    }
}

fn apply_assign_op(op: ArithAssignOp, cur: i64, rhs: i64) -> Result<i64, ArithError> {
    Ok(match op {
        ArithAssignOp::Assign => rhs,
        ArithAssignOp::Add => cur.wrapping_add(rhs),
        ArithAssignOp::Sub => cur.wrapping_sub(rhs),
        ArithAssignOp::Mul => cur.wrapping_mul(rhs),
        ArithAssignOp::Div => {
            if rhs == 0 {
                return Err(ArithError::DivisionByZero);
            }
            cur.wrapping_div(rhs)
        }
        ArithAssignOp::Mod => {
            if rhs == 0 {
                return Err(ArithError::DivisionByZero);
            }
            cur.wrapping_rem(rhs)
        }
        ArithAssignOp::Shl => cur.wrapping_shl(rhs as u32),
        ArithAssignOp::Shr => cur.wrapping_shr(rhs as u32),
        ArithAssignOp::And => cur & rhs,
        ArithAssignOp::Or => cur | rhs,
        ArithAssignOp::Xor => cur ^ rhs,
    })
}

fn eval_binary(op: ArithBinOp, l: &ArithExpr, r: &ArithExpr, scope: &mut ScopeStack) -> Result<i64, BashboxError> {
    use ArithBinOp::*;
    if op == LogAnd {
        let lv = eval(l, scope)?;
        if lv == 0 {
            return Ok(0);
        }
        return Ok((eval(r, scope)? != 0) as i64);
    }
    if op == LogOr {
        let lv = eval(l, scope)?;
        if lv != 0 {
            return Ok(1);
        }
        return Ok((eval(r, scope)? != 0) as i64);
    }
    let lv = eval(l, scope)?;
    let rv = eval(r, scope)?;
    Ok(match op {
        Add => lv.wrapping_add(rv),
        Sub => lv.wrapping_sub(rv),
        Mul => lv.wrapping_mul(rv),
        Div => {
            if rv == 0 {
                return Err(BashboxError::Arith(ArithError::DivisionByZero));
            }
            lv.wrapping_div(rv)
        }
        Mod => {
            if rv == 0 {
                return Err(BashboxError::Arith(ArithError::DivisionByZero));
            }
            lv.wrapping_rem(rv)
        }
        Pow => {
            if rv < 0 {
                0
            } else {
                let mut acc: i64 = 1;
                for _ in 0..rv {
                    acc = acc.wrapping_mul(lv);
                }
                acc
            }
        }
        Shl => lv.wrapping_shl(rv as u32),
        Shr => lv.wrapping_shr(rv as u32),
        Lt => (lv < rv) as i64,
        Le => (lv <= rv) as i64,
        Gt => (lv > rv) as i64,
        Ge => (lv >= rv) as i64,
        Eq => (lv == rv) as i64,
        Ne => (lv != rv) as i64,
        BitAnd => lv & rv,
        BitOr => lv | rv,
        BitXor => lv ^ rv,
        LogAnd | LogOr => unreachable!(),
    })
}

fn resolve_var(scope: &mut ScopeStack, name: &str) -> Result<i64, BashboxError> {
    // Bare names resolve recursively until non-numeric or a cycle, else 0.
    let mut seen = std::collections::HashSet::new();
    let mut cur = name.to_string();
    loop {
        if !seen.insert(cur.clone()) {
            return Ok(0);
        }
        let Some(val) = scope.get_scalar(&cur) else { return Ok(0) };
        match parse_num(&val) {
            Some(n) => return Ok(n),
            None => {
                if val.chars().next().map(|c| c.is_alphabetic() || c == '_').unwrap_or(false) {
                    cur = val;
                    continue;
                }
                return Ok(0);
            }
        }
    }
}

fn parse_num(s: &str) -> Option<i64> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16).ok();
    }
    s.parse::<i64>().ok()
}
