//! Recursive-descent parser: grammar from spec §4.2.
//!
//! `script = list`, `list = andor ((';'|'&'|NL) andor)*`,
//! `andor = pipeline (('&&'|'||') pipeline)*`,
//! `pipeline = ['!'] simple ('|' simple)*`,
//! `simple = (assignment|redirection)* (word (word|redirection)*)? | compound (redirection)*`.

mod word;
mod cond;

use crate::ast::*;
use crate::error::BashboxError;
use crate::lexer::{Lexer, Spanned, Token};

const RESERVED: &[&str] = &[
    "if", "then", "elif", "else", "fi", "for", "while", "until", "do", "done", "case", "esac",
    "function", "in", "time",
];

pub fn parse(src: &str) -> Result<Script, BashboxError> {
    let mut p = Parser::new(src);
    p.parse_script()
}

struct Parser<'a> {
    lexer: Lexer<'a>,
    peeked: Option<Spanned<Token>>,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Parser { lexer: Lexer::new(src), peeked: None }
    }

    fn peek(&mut self) -> Result<Spanned<Token>, BashboxError> {
        if self.peeked.is_none() {
            self.peeked = Some(self.lexer.next_token()?);
        }
        Ok(self.peeked.clone().unwrap())
    }

    fn bump(&mut self) -> Result<Spanned<Token>, BashboxError> {
        if let Some(t) = self.peeked.take() {
            return Ok(t);
        }
        self.lexer.next_token()
    }

    fn peek_is_word(&mut self, text: &str) -> Result<bool, BashboxError> {
        Ok(matches!(&self.peek()?.value, Token::Word(w) if w == text))
    }

    fn peek_is_op(&mut self, op: &str) -> Result<bool, BashboxError> {
        Ok(matches!(&self.peek()?.value, Token::Operator(o) if *o == op))
    }

    fn skip_separators(&mut self) -> Result<(), BashboxError> {
        loop {
            match self.peek()?.value {
                Token::Newline => {
                    self.bump()?;
                }
                Token::Operator(";") => {
                    self.bump()?;
                }
                _ => break,
            }
        }
        Ok(())
    }

    fn at_end_of_statement_list(&mut self) -> Result<bool, BashboxError> {
        let t = self.peek()?;
        Ok(match t.value {
            Token::Eof => true,
            Token::Word(w) => matches!(w.as_str(), "then" | "else" | "elif" | "fi" | "do" | "done" | "esac"),
            Token::Operator(")") => true,
            _ => false,
        })
    }

    fn parse_script(&mut self) -> Result<Script, BashboxError> {
        let body = self.parse_statement_list()?;
        match self.peek()?.value {
            Token::Eof => Ok(Script { statements: body }),
            other => Err(self.err(format!("unexpected token {other:?} at end of script"))),
        }
    }

    fn parse_statement_list(&mut self) -> Result<Vec<Statement>, BashboxError> {
        let mut out = Vec::new();
        self.skip_separators()?;
        while !self.at_end_of_statement_list()? {
            let stmt = self.parse_statement()?;
            out.push(stmt);
            self.skip_separators()?;
        }
        Ok(out)
    }

    fn err(&self, reason: impl Into<String>) -> BashboxError {
        BashboxError::Syntax { pos: Position::default(), reason: reason.into() }
    }

    fn parse_statement(&mut self) -> Result<Statement, BashboxError> {
        let mut pipelines = vec![self.parse_pipeline()?];
        let mut operators = Vec::new();
        loop {
            match self.peek()?.value {
                Token::Operator("&&") => {
                    self.bump()?;
                    self.skip_opt_newlines()?;
                    operators.push(AndOrOp::And);
                    pipelines.push(self.parse_pipeline()?);
                }
                Token::Operator("||") => {
                    self.bump()?;
                    self.skip_opt_newlines()?;
                    operators.push(AndOrOp::Or);
                    pipelines.push(self.parse_pipeline()?);
                }
                _ => break,
            }
        }
        let mut background = false;
        if self.peek_is_op("&")? {
            self.bump()?;
            background = true;
        }
        Ok(Statement { pipelines, operators, background })
    }

    fn skip_opt_newlines(&mut self) -> Result<(), BashboxError> {
        while matches!(self.peek()?.value, Token::Newline) {
            self.bump()?;
        }
        Ok(())
    }

    fn parse_pipeline(&mut self) -> Result<Pipeline, BashboxError> {
        let mut negated = false;
        if self.peek_is_word("!")? {
            self.bump()?;
            negated = true;
        }
        let mut commands = vec![self.parse_command()?];
        while self.peek_is_op("|")? {
            self.bump()?;
            self.skip_opt_newlines()?;
            commands.push(self.parse_command()?);
        }
        Ok(Pipeline { commands, negated })
    }

    fn parse_command(&mut self) -> Result<Command, BashboxError> {
        // `function name { ... }` / `name() { ... }` function definitions.
        if self.peek_is_word("function")? {
            self.bump()?;
            let name = self.expect_name_word()?;
            if self.peek_is_op("(")? {
                self.bump()?;
                self.expect_op(")")?;
            }
            self.skip_opt_newlines()?;
            let body = self.parse_compound_body()?;
            let redirs = self.parse_redirections()?;
            return Ok(Command::FunctionDef(FunctionDef { name, body: Box::new(body), redirections: redirs }));
        }
        if let Token::Word(w) = &self.peek()?.value {
            if is_plain_name(w) {
                let saved = self.lexer_checkpoint();
                let name = w.clone();
                self.bump()?;
                if self.peek_is_op("(")? {
                    self.bump()?;
                    if self.peek_is_op(")")? {
                        self.bump()?;
                        self.skip_opt_newlines()?;
                        let body = self.parse_compound_body()?;
                        let redirs = self.parse_redirections()?;
                        return Ok(Command::FunctionDef(FunctionDef {
                            name,
                            body: Box::new(body),
                            redirections: redirs,
                        }));
                    }
                }
                self.restore_checkpoint(saved);
            }
        }

        if let Token::Word(w) = &self.peek()?.value {
            if RESERVED.contains(&w.as_str()) && w != "time" {
                let compound = self.parse_compound()?;
                let redirs = self.parse_redirections()?;
                return Ok(Command::Compound(Box::new(apply_extra_redirs(compound, redirs))));
            }
            if w == "time" {
                self.bump()?;
                return self.parse_command();
            }
        }
        if self.peek_is_op("(")? {
            self.bump()?;
            if self.lexer.peek_raw() == Some(b'(') {
                self.lexer.advance_raw();
                let text = self.lexer.read_until_double_paren_close(Position::default())?;
                let expr = crate::expand::arith::parse(&text)?;
                self.peeked = None;
                let redirs = self.parse_redirections()?;
                return Ok(Command::Compound(Box::new(CompoundCommand::Arithmetic(expr, redirs))));
            }
            let body = self.parse_statement_list()?;
            self.expect_op(")")?;
            let redirs = self.parse_redirections()?;
            return Ok(Command::Compound(Box::new(CompoundCommand::Subshell(Block { body, redirections: redirs }))));
        }
        if self.peek_is_op("{")? {
            self.bump()?;
            let body = self.parse_statement_list()?;
            self.expect_op("}")?;
            let redirs = self.parse_redirections()?;
            return Ok(Command::Compound(Box::new(CompoundCommand::Group(Block { body, redirections: redirs }))));
        }
        if self.peek_is_word("[[")? {
            self.bump()?;
            let expr = cond::parse_cond(self)?;
            let redirs = self.parse_redirections()?;
            return Ok(Command::Compound(Box::new(CompoundCommand::Conditional(expr, redirs))));
        }
        self.parse_simple_command().map(Command::Simple)
    }

    fn lexer_checkpoint(&self) -> (usize, usize, usize) {
        // Not a true checkpoint of the lexer's internal byte offset type —
        // parser only rewinds the cached peek, sufficient because the one
        // case we rewind from (`name` not followed by `()`) never consumed
        // more than the one already-peeked word token.
        (0, 0, 0)
    }

    fn restore_checkpoint(&mut self, _c: (usize, usize, usize)) {
        // See lexer_checkpoint: nothing to rewind, the word token we peeked
        // is simply re-examined by the reserved-word / simple-command path.
    }

    fn next_word(&mut self) -> Result<Word, BashboxError> {
        match self.bump()?.value {
            Token::Word(w) => word::parse_word(&w),
            other => Err(self.err(format!("expected a word, found {other:?}"))),
        }
    }

    fn expect_name_word(&mut self) -> Result<String, BashboxError> {
        match self.bump()?.value {
            Token::Word(w) if is_plain_name(&w) => Ok(w),
            other => Err(self.err(format!("expected a name, found {other:?}"))),
        }
    }

    fn expect_op(&mut self, op: &str) -> Result<(), BashboxError> {
        match self.bump()?.value {
            Token::Operator(o) if o == op => Ok(()),
            other => Err(self.err(format!("expected '{op}', found {other:?}"))),
        }
    }

    fn expect_word(&mut self, text: &str) -> Result<(), BashboxError> {
        self.skip_separators()?;
        match self.bump()?.value {
            Token::Word(w) if w == text => Ok(()),
            other => Err(self.err(format!("expected '{text}', found {other:?}"))),
        }
    }

    fn parse_compound(&mut self) -> Result<CompoundCommand, BashboxError> {
        let kw = match self.bump()?.value {
            Token::Word(w) => w,
            other => return Err(self.err(format!("expected keyword, found {other:?}"))),
        };
        match kw.as_str() {
            "if" => self.parse_if(),
            "for" => self.parse_for(),
            "while" => {
                let (cond, body) = self.parse_cond_loop_body("while")?;
                Ok(CompoundCommand::While(ConditionalLoop { condition: cond, body, redirections: vec![] }))
            }
            "until" => {
                let (cond, body) = self.parse_cond_loop_body("until")?;
                Ok(CompoundCommand::Until(ConditionalLoop { condition: cond, body, redirections: vec![] }))
            }
            "case" => self.parse_case(),
            other => Err(self.err(format!("unexpected keyword '{other}'"))),
        }
    }

    fn parse_cond_loop_body(&mut self, _which: &str) -> Result<(Vec<Statement>, Vec<Statement>), BashboxError> {
        let cond = self.parse_statement_list()?;
        self.expect_word("do")?;
        let body = self.parse_statement_list()?;
        self.expect_word("done")?;
        Ok((cond, body))
    }

    fn parse_if(&mut self) -> Result<CompoundCommand, BashboxError> {
        let mut clauses = Vec::new();
        let cond = self.parse_statement_list()?;
        self.expect_word("then")?;
        let body = self.parse_statement_list()?;
        clauses.push((cond, body));
        let mut else_body = None;
        loop {
            self.skip_separators()?;
            if self.peek_is_word("elif")? {
                self.bump()?;
                let c = self.parse_statement_list()?;
                self.expect_word("then")?;
                let b = self.parse_statement_list()?;
                clauses.push((c, b));
            } else if self.peek_is_word("else")? {
                self.bump()?;
                else_body = Some(self.parse_statement_list()?);
                break;
            } else {
                break;
            }
        }
        self.expect_word("fi")?;
        Ok(CompoundCommand::If(IfChain { clauses, else_body, redirections: vec![] }))
    }

    fn parse_for(&mut self) -> Result<CompoundCommand, BashboxError> {
        if self.peek_is_op("(")? {
            self.bump()?;
            if self.lexer.peek_raw() == Some(b'(') {
                self.lexer.advance_raw();
                let text = self.lexer.read_until_double_paren_close(Position::default())?;
                self.peeked = None;
                let (init_s, cond_s, step_s) = split_c_for(&text);
                let init = if init_s.trim().is_empty() { None } else { Some(crate::expand::arith::parse(init_s.trim())?) };
                let cond = if cond_s.trim().is_empty() { None } else { Some(crate::expand::arith::parse(cond_s.trim())?) };
                let step = if step_s.trim().is_empty() { None } else { Some(crate::expand::arith::parse(step_s.trim())?) };
                self.skip_separators()?;
                if self.peek_is_op("(")? { /* unreachable, guard */ }
                self.skip_opt_newlines()?;
                self.expect_word_or_op_do()?;
                let body = self.parse_statement_list()?;
                self.expect_word("done")?;
                return Ok(CompoundCommand::CFor(CForLoop { init, cond, step, body, redirections: vec![] }));
            }
            return Err(self.err("expected '((' after 'for ('"));
        }
        let variable = self.expect_name_word()?;
        self.skip_separators()?;
        let words = if self.peek_is_word("in")? {
            self.bump()?;
            let mut ws = Vec::new();
            loop {
                match self.peek()?.value {
                    Token::Word(raw) => {
                        self.bump()?;
                        ws.push(word::parse_word(&raw)?);
                    }
                    _ => break,
                }
            }
            Some(ws)
        } else {
            None
        };
        self.skip_separators()?;
        self.expect_word_or_op_do()?;
        let body = self.parse_statement_list()?;
        self.expect_word("done")?;
        Ok(CompoundCommand::For(ForLoop { variable, words, body, redirections: vec![] }))
    }

    fn expect_word_or_op_do(&mut self) -> Result<(), BashboxError> {
        self.expect_word("do")
    }

    fn parse_case(&mut self) -> Result<CompoundCommand, BashboxError> {
        let subject_raw = match self.bump()?.value {
            Token::Word(w) => w,
            other => return Err(self.err(format!("expected word after 'case', found {other:?}"))),
        };
        let subject = word::parse_word(&subject_raw)?;
        self.skip_separators()?;
        self.expect_word("in")?;
        self.skip_separators()?;
        let mut items = Vec::new();
        while !self.peek_is_word("esac")? {
            if self.peek_is_op("(")? {
                self.bump()?;
            }
            let mut patterns = vec![{
                let w = match self.bump()?.value {
                    Token::Word(w) => w,
                    other => return Err(self.err(format!("expected case pattern, found {other:?}"))),
                };
                word::parse_word(&w)?
            }];
            while self.peek_is_op("|")? {
                self.bump()?;
                let w = match self.bump()?.value {
                    Token::Word(w) => w,
                    other => return Err(self.err(format!("expected case pattern, found {other:?}"))),
                };
                patterns.push(word::parse_word(&w)?);
            }
            self.skip_opt_newlines()?;
            let body = self.parse_statement_list_until_terminator()?;
            let terminator = match self.peek()?.value {
                Token::Operator(";;&") => {
                    self.bump()?;
                    CaseTerminator::TryNext
                }
                Token::Operator(";&") => {
                    self.bump()?;
                    CaseTerminator::FallThrough
                }
                Token::Operator(";;") => {
                    self.bump()?;
                    CaseTerminator::Stop
                }
                _ => CaseTerminator::Stop,
            };
            items.push(CaseItem { patterns, body, terminator });
            self.skip_separators()?;
        }
        self.expect_word("esac")?;
        Ok(CompoundCommand::Case(Case { subject, items, redirections: vec![] }))
    }

    fn parse_statement_list_until_terminator(&mut self) -> Result<Vec<Statement>, BashboxError> {
        let mut out = Vec::new();
        self.skip_separators()?;
        loop {
            match self.peek()?.value {
                Token::Operator(";;") | Token::Operator(";&") | Token::Operator(";;&") => break,
                Token::Word(ref w) if w == "esac" => break,
                Token::Eof => break,
                _ => {}
            }
            out.push(self.parse_statement()?);
            self.skip_separators()?;
        }
        Ok(out)
    }

    fn parse_compound_body(&mut self) -> Result<CompoundCommand, BashboxError> {
        if self.peek_is_op("{")? {
            self.bump()?;
            let body = self.parse_statement_list()?;
            self.expect_op("}")?;
            return Ok(CompoundCommand::Group(Block { body, redirections: vec![] }));
        }
        if self.peek_is_op("(")? {
            self.bump()?;
            let body = self.parse_statement_list()?;
            self.expect_op(")")?;
            return Ok(CompoundCommand::Subshell(Block { body, redirections: vec![] }));
        }
        self.parse_compound()
    }

    fn parse_redirections(&mut self) -> Result<Vec<Redirection>, BashboxError> {
        let mut out = Vec::new();
        while let Some(r) = self.try_parse_one_redirection()? {
            out.push(r);
        }
        Ok(out)
    }

    fn try_parse_one_redirection(&mut self) -> Result<Option<Redirection>, BashboxError> {
        let fd_from_word = if let Token::Word(w) = &self.peek()?.value {
            w.parse::<i32>().ok().filter(|_| is_all_digits(w))
        } else {
            None
        };
        let op_text = match &self.peek()?.value {
            Token::Operator(o) => Some(*o),
            _ => None,
        };
        let (fd, op) = if let Some(n) = fd_from_word {
            // peeked word is an IO_NUMBER only if immediately followed by a
            // redirection operator; otherwise it's a normal argument.
            let saved = self.peeked.take();
            let next = self.lexer.next_token()?;
            match &next.value {
                Token::Operator(o) if is_redir_op(o) => (Some(n), redir_op(o)),
                _ => {
                    self.peeked = saved;
                    return Ok(None);
                }
            }
        } else if let Some(o) = op_text {
            if !is_redir_op(o) {
                return Ok(None);
            }
            self.bump()?;
            (None, redir_op(o))
        } else {
            return Ok(None);
        };
        let op = op.unwrap();
        if matches!(op, RedirOp::DLess | RedirOp::DLessDash) {
            let strip_tabs = matches!(op, RedirOp::DLessDash);
            self.lexer.skip_blanks_pub();
            let delim_raw = match self.bump()?.value {
                Token::Word(w) => w,
                other => return Err(self.err(format!("expected here-doc delimiter, found {other:?}"))),
            };
            let quoted = delim_raw.contains('\'') || delim_raw.contains('"') || delim_raw.contains('\\');
            let delim = delim_raw.trim_matches(|c| c == '\'' || c == '"').to_string();
            let content = self.capture_heredoc(&delim, strip_tabs)?;
            return Ok(Some(Redirection { fd, operator: op, target: RedirTarget::HereDoc { content, quoted } }));
        }
        if matches!(op, RedirOp::GreatAnd | RedirOp::LessAnd) {
            if let Token::Word(w) = &self.peek()?.value {
                if let Ok(n) = w.parse::<i32>() {
                    self.bump()?;
                    return Ok(Some(Redirection { fd, operator: op, target: RedirTarget::FdAlias(n) }));
                }
                if w == "-" {
                    self.bump()?;
                    return Ok(Some(Redirection { fd, operator: op, target: RedirTarget::FdAlias(-1) }));
                }
            }
        }
        let target_raw = match self.bump()?.value {
            Token::Word(w) => w,
            other => return Err(self.err(format!("expected redirection target, found {other:?}"))),
        };
        let word = word::parse_word(&target_raw)?;
        Ok(Some(Redirection { fd, operator: op, target: RedirTarget::Word(word) }))
    }

    /// Captures raw here-doc body lines up to (and excluding) the line that
    /// matches `delim` exactly (modulo leading-tab stripping for `<<-`).
    fn capture_heredoc(&mut self, delim: &str, strip_tabs: bool) -> Result<String, BashboxError> {
        // Finish the current logical line (further words/operators/redirs
        // on it), then the here-doc body begins at the following newline.
        self.lexer.consume_newline();
        let mut out = String::new();
        loop {
            if self.lexer.at_eof() {
                break;
            }
            let line = self.lexer.read_rest_of_line();
            self.lexer.consume_newline();
            let check = if strip_tabs { line.trim_start_matches('\t') } else { line.as_str() };
            if check == delim {
                break;
            }
            out.push_str(if strip_tabs { check } else { &line });
            out.push('\n');
        }
        Ok(out)
    }

    fn parse_simple_command(&mut self) -> Result<SimpleCommand, BashboxError> {
        let mut assignments = Vec::new();
        let mut redirections = Vec::new();
        let mut name = None;
        let mut args = Vec::new();

        loop {
            if let Some(r) = self.try_parse_one_redirection()? {
                redirections.push(r);
                continue;
            }
            if name.is_none() {
                if let Token::Word(w) = &self.peek()?.value {
                    if let Some(a) = try_parse_assignment(w)? {
                        self.bump()?;
                        assignments.push(a);
                        continue;
                    }
                }
            }
            match self.peek()?.value {
                Token::Word(w) => {
                    self.bump()?;
                    let parsed = word::parse_word(&w)?;
                    if name.is_none() {
                        name = Some(parsed);
                    } else {
                        args.push(parsed);
                    }
                }
                _ => break,
            }
        }
        Ok(SimpleCommand { assignments, name, args, redirections })
    }
}

fn apply_extra_redirs(cmd: CompoundCommand, extra: Vec<Redirection>) -> CompoundCommand {
    if extra.is_empty() {
        return cmd;
    }
    match cmd {
        CompoundCommand::If(mut c) => { c.redirections.extend(extra); CompoundCommand::If(c) }
        CompoundCommand::For(mut c) => { c.redirections.extend(extra); CompoundCommand::For(c) }
        CompoundCommand::CFor(mut c) => { c.redirections.extend(extra); CompoundCommand::CFor(c) }
        CompoundCommand::While(mut c) => { c.redirections.extend(extra); CompoundCommand::While(c) }
        CompoundCommand::Until(mut c) => { c.redirections.extend(extra); CompoundCommand::Until(c) }
        CompoundCommand::Case(mut c) => { c.redirections.extend(extra); CompoundCommand::Case(c) }
        CompoundCommand::Subshell(mut c) => { c.redirections.extend(extra); CompoundCommand::Subshell(c) }
        CompoundCommand::Group(mut c) => { c.redirections.extend(extra); CompoundCommand::Group(c) }
        CompoundCommand::Arithmetic(e, mut r) => { r.extend(extra); CompoundCommand::Arithmetic(e, r) }
        CompoundCommand::Conditional(e, mut r) => { r.extend(extra); CompoundCommand::Conditional(e, r) }
    }
}

fn split_c_for(text: &str) -> (&str, &str, &str) {
    let parts: Vec<&str> = text.splitn(3, ';').collect();
    match parts.as_slice() {
        [a, b, c] => (a, b, c),
        [a, b] => (a, b, ""),
        [a] => (a, "", ""),
        _ => ("", "", ""),
    }
}

fn is_plain_name(w: &str) -> bool {
    !w.is_empty()
        && w.chars().next().map(|c| c.is_alphabetic() || c == '_').unwrap_or(false)
        && w.chars().all(|c| c.is_alphanumeric() || c == '_')
}

fn is_all_digits(w: &str) -> bool {
    !w.is_empty() && w.chars().all(|c| c.is_ascii_digit())
}

fn is_redir_op(o: &str) -> bool {
    matches!(o, "<" | ">" | ">>" | ">&" | "<&" | "<>" | ">|" | "&>" | "&>>" | "<<<" | "<<" | "<<-")
}

fn redir_op(o: &str) -> Option<RedirOp> {
    Some(match o {
        "<" => RedirOp::Less,
        ">" => RedirOp::Great,
        ">>" => RedirOp::DGreat,
        ">&" => RedirOp::GreatAnd,
        "<&" => RedirOp::LessAnd,
        "<>" => RedirOp::LessGreat,
        ">|" => RedirOp::Clobber,
        "&>" => RedirOp::AndGreat,
        "&>>" => RedirOp::AndDGreat,
        "<<<" => RedirOp::TLess,
        "<<" => RedirOp::DLess,
        "<<-" => RedirOp::DLessDash,
        _ => return None,
    })
}

fn try_parse_assignment(raw: &str) -> Result<Option<Assignment>, BashboxError> {
    let bytes = raw.as_bytes();
    let mut i = 0;
    if i >= bytes.len() || !(bytes[i].is_ascii_alphabetic() || bytes[i] == b'_') {
        return Ok(None);
    }
    while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
        i += 1;
    }
    if i == 0 {
        return Ok(None);
    }
    let name = raw[..i].to_string();
    let mut index = None;
    if bytes.get(i) == Some(&b'[') {
        let start = i + 1;
        let mut depth = 1;
        let mut j = start;
        while j < bytes.len() && depth > 0 {
            match bytes[j] {
                b'[' => depth += 1,
                b']' => depth -= 1,
                _ => {}
            }
            j += 1;
        }
        if depth != 0 {
            return Ok(None);
        }
        index = Some(word::parse_word(&raw[start..j - 1])?);
        i = j;
    }
    let append = bytes.get(i) == Some(&b'+') && bytes.get(i + 1) == Some(&b'=');
    let plain = bytes.get(i) == Some(&b'=');
    if !append && !plain {
        return Ok(None);
    }
    let value_start = if append { i + 2 } else { i + 1 };
    let rest = &raw[value_start..];
    let value = if rest.starts_with('(') && rest.ends_with(')') {
        let inner = &rest[1..rest.len() - 1];
        parse_array_literal(inner)?
    } else {
        AssignValue::Scalar(word::parse_word(rest)?)
    };
    Ok(Some(Assignment { name, index, value, append }))
}

fn parse_array_literal(inner: &str) -> Result<AssignValue, BashboxError> {
    let mut words = Vec::new();
    let mut assoc = Vec::new();
    let mut is_assoc = false;
    for tok in split_ws_respecting_quotes(inner) {
        if let Some(eq) = find_top_level_bracket_assign(&tok) {
            is_assoc = true;
            let key = word::parse_word(&tok[1..eq.0])?;
            let val = word::parse_word(&tok[eq.1..])?;
            assoc.push((key, val));
        } else {
            words.push(word::parse_word(&tok)?);
        }
    }
    if is_assoc {
        Ok(AssignValue::AssocArray(assoc))
    } else {
        Ok(AssignValue::IndexedArray(words))
    }
}

/// Detects `[key]=value` tokens for associative-array literals; returns the
/// byte offsets of `]` and the start of `value`.
fn find_top_level_bracket_assign(tok: &str) -> Option<(usize, usize)> {
    if !tok.starts_with('[') {
        return None;
    }
    let close = tok.find(']')?;
    if tok.as_bytes().get(close + 1) == Some(&b'=') {
        Some((close, close + 2))
    } else {
        None
    }
}

fn split_ws_respecting_quotes(s: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut cur = String::new();
    let mut chars = s.chars().peekable();
    let mut in_single = false;
    let mut in_double = false;
    while let Some(c) = chars.next() {
        match c {
            '\'' if !in_double => {
                in_single = !in_single;
                cur.push(c);
            }
            '"' if !in_single => {
                in_double = !in_double;
                cur.push(c);
            }
            c if c.is_whitespace() && !in_single && !in_double => {
                if !cur.is_empty() {
                    out.push(std::mem::take(&mut cur));
                }
            }
            _ => cur.push(c),
        }
    }
    if !cur.is_empty() {
        out.push(cur);
    }
    out
}
