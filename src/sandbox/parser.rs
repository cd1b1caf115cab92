//! Pipeline parser. Turns a model-suggested snippet into an allow-listed
//! plan. Anything outside the allowed operation set is rejected before any
//! evaluation happens (deny by default).

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("operation not allowed: {0}")]
    Forbidden(String),
    #[error("{0}")]
    Syntax(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Contains,
    IsNull,
    NotNull,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggFunc {
    Sum,
    Mean,
    Min,
    Max,
    Median,
    Std,
    Count,
    NUnique,
}

impl AggFunc {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "sum" => Self::Sum,
            "mean" | "avg" => Self::Mean,
            "min" => Self::Min,
            "max" => Self::Max,
            "median" => Self::Median,
            "std" => Self::Std,
            "count" => Self::Count,
            "n_unique" | "nunique" => Self::NUnique,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Mean => "mean",
            Self::Min => "min",
            Self::Max => "max",
            Self::Median => "median",
            Self::Std => "std",
            Self::Count => "count",
            Self::NUnique => "n_unique",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Agg {
    pub func: AggFunc,
    pub column: String,
    pub alias: Option<String>,
}

impl Agg {
    pub fn output_name(&self) -> String {
        self.alias
            .clone()
            .unwrap_or_else(|| format!("{}_{}", self.column, self.func.name()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Select(Vec<String>),
    Filter { column: String, op: CmpOp, value: Option<Literal> },
    GroupBy { keys: Vec<String>, aggs: Vec<Agg> },
    Aggregate(Vec<Agg>),
    Sort { column: String, descending: bool },
    Head(usize),
    Tail(usize),
    Unique,
    DropNulls(Vec<String>),
    Count,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub stages: Vec<Stage>,
}

/// Capability-shaped tokens. The pipeline language has no way to express
/// any of these; their presence means the model tried to step outside the
/// sandbox, so the snippet is rejected without parsing further.
const DENIED_TOKENS: &[&str] = &[
    "import",
    "open(",
    "exec",
    "eval",
    "__",
    "os.",
    "sys.",
    "subprocess",
    "shutil",
    "socket",
    "http",
    "urllib",
    "requests",
    "read_csv",
    "to_csv",
    "to_parquet",
    "write",
    "system",
    "std::",
    "fs::",
    "command",
    "spawn",
    "shell",
    "popen",
    "getattr",
    "globals",
];

pub fn parse(snippet: &str) -> Result<Plan, ParseError> {
    let lowered = snippet.to_ascii_lowercase();
    for tok in DENIED_TOKENS {
        if lowered.contains(tok) {
            return Err(ParseError::Forbidden(format!("`{}`", tok.trim_end_matches('('))));
        }
    }

    let mut stages = Vec::new();
    for raw in snippet.split(['|', '\n']) {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        stages.push(parse_stage(raw)?);
    }
    if stages.is_empty() {
        return Err(ParseError::Syntax("empty pipeline".into()));
    }
    // `count` collapses the frame to a single number; nothing can follow it.
    for (i, stage) in stages.iter().enumerate() {
        if matches!(stage, Stage::Count) && i + 1 != stages.len() {
            return Err(ParseError::Syntax("`count` must be the final stage".into()));
        }
    }
    Ok(Plan { stages })
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Num(String),
    Str(String),
    Op(String),
    Comma,
    LParen,
    RParen,
}

fn tokenize(stage: &str) -> Result<Vec<Tok>, ParseError> {
    let mut toks = Vec::new();
    let mut chars = stage.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            ',' => {
                chars.next();
                toks.push(Tok::Comma);
            }
            '(' => {
                chars.next();
                toks.push(Tok::LParen);
            }
            ')' => {
                chars.next();
                toks.push(Tok::RParen);
            }
            '"' | '\'' => {
                let quote = c;
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some(ch) if ch == quote => break,
                        Some(ch) => s.push(ch),
                        None => {
                            return Err(ParseError::Syntax(format!(
                                "unterminated string starting with {}",
                                quote
                            )))
                        }
                    }
                }
                toks.push(Tok::Str(s));
            }
            '=' | '!' | '<' | '>' => {
                let mut op = String::new();
                op.push(c);
                chars.next();
                if chars.peek() == Some(&'=') {
                    op.push('=');
                    chars.next();
                }
                match op.as_str() {
                    "==" | "!=" | ">" | ">=" | "<" | "<=" => toks.push(Tok::Op(op)),
                    other => {
                        return Err(ParseError::Syntax(format!("unknown operator `{}`", other)))
                    }
                }
            }
            c if c.is_ascii_digit() || c == '-' => {
                let mut s = String::new();
                s.push(c);
                chars.next();
                while let Some(&ch) = chars.peek() {
                    if ch.is_ascii_digit() || ch == '.' || ch == 'e' || ch == 'E' {
                        s.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                toks.push(Tok::Num(s));
            }
            c if c.is_alphanumeric() || c == '_' => {
                let mut s = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_alphanumeric() || ch == '_' {
                        s.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                toks.push(Tok::Ident(s));
            }
            other => {
                return Err(ParseError::Syntax(format!("unexpected character `{}`", other)))
            }
        }
    }
    Ok(toks)
}

struct Cursor {
    toks: Vec<Tok>,
    pos: usize,
}

impl Cursor {
    fn next(&mut self) -> Option<Tok> {
        let t = self.toks.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos)
    }

    fn done(&self) -> bool {
        self.pos >= self.toks.len()
    }

    fn expect_name(&mut self, what: &str) -> Result<String, ParseError> {
        match self.next() {
            Some(Tok::Ident(s)) | Some(Tok::Str(s)) => Ok(s),
            other => Err(ParseError::Syntax(format!("expected {}, found {:?}", what, other))),
        }
    }

    /// Comma-separated column names; stops at `until` (if given) without
    /// consuming it.
    fn name_list(&mut self, until: Option<&str>) -> Result<Vec<String>, ParseError> {
        let mut names = Vec::new();
        loop {
            if let (Some(stop), Some(Tok::Ident(s))) = (until, self.peek()) {
                if s == stop {
                    break;
                }
            }
            if self.done() {
                break;
            }
            names.push(self.expect_name("a column name")?);
            match self.peek() {
                Some(Tok::Comma) => {
                    self.next();
                }
                _ => {
                    if until.is_none() {
                        break;
                    }
                }
            }
        }
        if names.is_empty() {
            return Err(ParseError::Syntax("expected at least one column name".into()));
        }
        Ok(names)
    }

    fn agg_list(&mut self) -> Result<Vec<Agg>, ParseError> {
        let mut aggs = Vec::new();
        loop {
            let fname = self.expect_name("an aggregate function")?;
            let func = AggFunc::from_name(&fname.to_ascii_lowercase())
                .ok_or_else(|| ParseError::Forbidden(format!("aggregate function `{}`", fname)))?;
            match self.next() {
                Some(Tok::LParen) => {}
                other => {
                    return Err(ParseError::Syntax(format!(
                        "expected `(` after {}, found {:?}",
                        fname, other
                    )))
                }
            }
            let column = self.expect_name("a column name")?;
            match self.next() {
                Some(Tok::RParen) => {}
                other => {
                    return Err(ParseError::Syntax(format!("expected `)`, found {:?}", other)))
                }
            }
            let alias = if matches!(self.peek(), Some(Tok::Ident(s)) if s == "as") {
                self.next();
                Some(self.expect_name("an alias")?)
            } else {
                None
            };
            aggs.push(Agg { func, column, alias });
            match self.peek() {
                Some(Tok::Comma) => {
                    self.next();
                }
                _ => break,
            }
        }
        Ok(aggs)
    }

    fn expect_count(&mut self, verb: &str) -> Result<usize, ParseError> {
        match self.next() {
            Some(Tok::Num(s)) => s
                .parse::<usize>()
                .map_err(|_| ParseError::Syntax(format!("`{}` needs a positive integer", verb))),
            other => Err(ParseError::Syntax(format!(
                "`{}` needs a row count, found {:?}",
                verb, other
            ))),
        }
    }
}

fn parse_stage(raw: &str) -> Result<Stage, ParseError> {
    let mut cur = Cursor { toks: tokenize(raw)?, pos: 0 };
    let verb = match cur.next() {
        Some(Tok::Ident(v)) => v.to_ascii_lowercase(),
        other => return Err(ParseError::Syntax(format!("expected a stage verb, found {:?}", other))),
    };

    let stage = match verb.as_str() {
        "select" => Stage::Select(cur.name_list(None)?),
        "filter" | "where" => parse_filter(&mut cur)?,
        "groupby" | "group_by" => {
            let keys = cur.name_list(Some("agg"))?;
            match cur.next() {
                Some(Tok::Ident(ref s)) if s == "agg" => {}
                other => {
                    return Err(ParseError::Syntax(format!(
                        "groupby needs an `agg` clause, found {:?}",
                        other
                    )))
                }
            }
            Stage::GroupBy { keys, aggs: cur.agg_list()? }
        }
        "agg" | "aggregate" => Stage::Aggregate(cur.agg_list()?),
        "sort" | "sort_by" => {
            let column = cur.expect_name("a column name")?;
            let descending = match cur.next() {
                None => false,
                Some(Tok::Ident(ref s)) if s.eq_ignore_ascii_case("desc") => true,
                Some(Tok::Ident(ref s)) if s.eq_ignore_ascii_case("asc") => false,
                other => {
                    return Err(ParseError::Syntax(format!(
                        "expected `asc` or `desc`, found {:?}",
                        other
                    )))
                }
            };
            Stage::Sort { column, descending }
        }
        "head" | "limit" => Stage::Head(cur.expect_count(&verb)?),
        "tail" => Stage::Tail(cur.expect_count(&verb)?),
        "unique" | "distinct" => Stage::Unique,
        "drop_nulls" | "dropna" => {
            if cur.done() {
                Stage::DropNulls(Vec::new())
            } else {
                Stage::DropNulls(cur.name_list(None)?)
            }
        }
        "count" => Stage::Count,
        other => return Err(ParseError::Forbidden(format!("`{}`", other))),
    };

    if !cur.done() {
        return Err(ParseError::Syntax(format!(
            "trailing input after `{}` stage: {:?}",
            verb,
            cur.next()
        )));
    }
    Ok(stage)
}

fn parse_filter(cur: &mut Cursor) -> Result<Stage, ParseError> {
    let column = cur.expect_name("a column name")?;
    let (op, needs_value) = match cur.next() {
        Some(Tok::Op(op)) => (
            match op.as_str() {
                "==" => CmpOp::Eq,
                "!=" => CmpOp::Ne,
                ">" => CmpOp::Gt,
                ">=" => CmpOp::Ge,
                "<" => CmpOp::Lt,
                "<=" => CmpOp::Le,
                _ => unreachable!("tokenizer only emits known operators"),
            },
            true,
        ),
        Some(Tok::Ident(ref s)) if s.eq_ignore_ascii_case("contains") => (CmpOp::Contains, true),
        Some(Tok::Ident(ref s)) if s.eq_ignore_ascii_case("is_null") => (CmpOp::IsNull, false),
        Some(Tok::Ident(ref s)) if s.eq_ignore_ascii_case("not_null") => (CmpOp::NotNull, false),
        other => {
            return Err(ParseError::Syntax(format!(
                "expected a comparison after `{}`, found {:?}",
                column, other
            )))
        }
    };

    let value = if needs_value {
        Some(match cur.next() {
            Some(Tok::Num(s)) => {
                if s.contains(['.', 'e', 'E']) {
                    Literal::Float(s.parse::<f64>().map_err(|_| {
                        ParseError::Syntax(format!("invalid number `{}`", s))
                    })?)
                } else {
                    Literal::Int(s.parse::<i64>().map_err(|_| {
                        ParseError::Syntax(format!("invalid number `{}`", s))
                    })?)
                }
            }
            Some(Tok::Str(s)) => Literal::Str(s),
            Some(Tok::Ident(s)) if s.eq_ignore_ascii_case("true") => Literal::Bool(true),
            Some(Tok::Ident(s)) if s.eq_ignore_ascii_case("false") => Literal::Bool(false),
            // Bare words compare as strings; lets the model skip quotes.
            Some(Tok::Ident(s)) => Literal::Str(s),
            other => {
                return Err(ParseError::Syntax(format!(
                    "expected a comparison value, found {:?}",
                    other
                )))
            }
        })
    } else {
        None
    };

    Ok(Stage::Filter { column, op, value })
}
