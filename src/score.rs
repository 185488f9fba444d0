// ABOUTME: Result-file comparator: parses rendered row sets and scores
// ABOUTME: gold vs predicted output row-order and column-order insensitively

use crate::value::py_bytes;
use anyhow::{bail, Context, Result};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

/// A parsed literal from a result line, mirroring the repr the batch
/// writer emits: nested lists/tuples of ints, floats, strings, bytes,
/// booleans and None.
#[derive(Debug, Clone, PartialEq)]
pub enum PyVal {
    List(Vec<PyVal>),
    Tuple(Vec<PyVal>),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Bool(bool),
    None,
}

/// A cell after normalization. Floats are rounded to 8 decimal places
/// and keyed by their canonical bit pattern so 2.0 and 2.00000000004
/// and the integer 2 all land in the same bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Norm {
    Num(u64),
    Text(String),
}

impl Norm {
    fn num(v: f64) -> Norm {
        // Scaling by 1e8 overflows to infinity near f64::MAX; values that
        // large carry no sub-integer precision anyway, so compare them raw.
        let rounded = if v.abs() >= 1e300 {
            v
        } else {
            (v * 1e8).round() / 1e8
        };
        // -0.0 and 0.0 must collide
        let rounded = if rounded == 0.0 { 0.0 } else { rounded };
        Norm::Num(rounded.to_bits())
    }

    fn from_text(s: &str) -> Norm {
        match s.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => Norm::num(v),
            _ => Norm::Text(s.trim().to_string()),
        }
    }

    fn sort_key(&self) -> (u8, String) {
        match self {
            Norm::Num(bits) => (0, format!("{}", f64::from_bits(*bits))),
            Norm::Text(s) => (1, s.clone()),
        }
    }
}

fn normalize_cell(value: &PyVal) -> Norm {
    match value {
        PyVal::Int(i) => Norm::num(*i as f64),
        PyVal::Float(f) if f.is_finite() => Norm::num(*f),
        PyVal::Float(f) => Norm::Text(f.to_string()),
        PyVal::Bool(b) => Norm::num(if *b { 1.0 } else { 0.0 }),
        PyVal::None => Norm::Text("None".to_string()),
        PyVal::Str(s) => Norm::from_text(s),
        PyVal::Bytes(b) => match std::str::from_utf8(b) {
            Ok(s) => Norm::from_text(s),
            Err(_) => Norm::Text(py_bytes(b)),
        },
        PyVal::List(_) | PyVal::Tuple(_) => Norm::Text(format!("{value:?}")),
    }
}

/// Turn a parsed result literal into a set of column-sorted rows. A
/// list of scalars is treated as a list of one-element rows.
fn row_set(value: &PyVal) -> Option<HashSet<Vec<Norm>>> {
    let rows = match value {
        PyVal::List(rows) => rows,
        _ => return None,
    };
    let mut set = HashSet::with_capacity(rows.len());
    for row in rows {
        let cells: Vec<Norm> = match row {
            PyVal::Tuple(cells) | PyVal::List(cells) => {
                cells.iter().map(normalize_cell).collect()
            }
            scalar => vec![normalize_cell(scalar)],
        };
        let mut cells = cells;
        cells.sort_by_key(|c| c.sort_key());
        set.insert(cells);
    }
    Some(set)
}

/// Whether two rendered result payloads denote the same result. Both
/// must parse as row lists to get set comparison; otherwise the raw
/// strings are compared, which is how error lines and statement
/// markers match.
pub fn results_match(gold: &str, pred: &str) -> bool {
    let gold_set = parse_literal(gold).ok().as_ref().and_then(row_set);
    let pred_set = parse_literal(pred).ok().as_ref().and_then(row_set);
    match (gold_set, pred_set) {
        (Some(g), Some(p)) => g == p,
        _ => gold.trim() == pred.trim(),
    }
}

#[derive(Debug, Clone)]
pub struct ScoreReport {
    pub matched: usize,
    pub total: usize,
}

impl ScoreReport {
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.matched as f64 / self.total as f64
        }
    }
}

/// Read a result file into index -> payload. Lines without a tab
/// separator are skipped with a warning, same as malformed batch lines.
pub fn read_result_file(path: &Path) -> Result<HashMap<String, String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read result file {}", path.display()))?;
    let mut entries = HashMap::new();
    for (lineno, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match line.split_once('\t') {
            Some((index, payload)) => {
                entries.insert(index.trim().to_string(), payload.to_string());
            }
            None => {
                tracing::warn!("{}:{}: no tab separator, skipping", path.display(), lineno + 1);
            }
        }
    }
    Ok(entries)
}

/// Score a prediction file against a gold file. Every gold index
/// counts toward the total; a missing prediction is a miss.
pub fn score_files(gold_path: &Path, pred_path: &Path) -> Result<ScoreReport> {
    let gold = read_result_file(gold_path)?;
    let pred = read_result_file(pred_path)?;

    let mut matched = 0;
    for (index, gold_payload) in &gold {
        if let Some(pred_payload) = pred.get(index) {
            if results_match(gold_payload, pred_payload) {
                matched += 1;
            }
        }
    }
    Ok(ScoreReport {
        matched,
        total: gold.len(),
    })
}

/// Parse the literal syntax the batch writer emits. Accepts nested
/// lists and tuples, numbers, quoted strings with escapes, bytes
/// literals, True/False/None.
pub fn parse_literal(input: &str) -> Result<PyVal> {
    let mut parser = Parser {
        chars: input.trim().chars().collect(),
        pos: 0,
    };
    let value = parser.value()?;
    parser.skip_ws();
    if parser.pos != parser.chars.len() {
        bail!("trailing characters at offset {}", parser.pos);
    }
    Ok(value)
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
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

    fn expect(&mut self, want: char) -> Result<()> {
        match self.bump() {
            Some(c) if c == want => Ok(()),
            other => bail!("expected '{}', found {:?}", want, other),
        }
    }

    fn value(&mut self) -> Result<PyVal> {
        self.skip_ws();
        match self.peek() {
            Some('[') => self.sequence('[', ']').map(PyVal::List),
            Some('(') => self.sequence('(', ')').map(PyVal::Tuple),
            Some('\'') | Some('"') => self.string().map(PyVal::Str),
            Some('b') if matches!(self.chars.get(self.pos + 1), Some('\'') | Some('"')) => {
                self.pos += 1;
                self.string().map(|s| PyVal::Bytes(s.into_bytes()))
            }
            Some(c) if c.is_ascii_digit() || c == '-' || c == '+' || c == '.' => self.number(),
            Some(c) if c.is_alphabetic() => self.keyword(),
            other => bail!("unexpected character {:?}", other),
        }
    }

    fn sequence(&mut self, open: char, close: char) -> Result<Vec<PyVal>> {
        self.expect(open)?;
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() == Some(close) {
                self.pos += 1;
                return Ok(items);
            }
            items.push(self.value()?);
            self.skip_ws();
            match self.peek() {
                Some(',') => {
                    self.pos += 1;
                }
                Some(c) if c == close => {
                    self.pos += 1;
                    return Ok(items);
                }
                other => bail!("expected ',' or '{}', found {:?}", close, other),
            }
        }
    }

    fn string(&mut self) -> Result<String> {
        let quote = self.bump().context("unterminated string")?;
        let mut out = String::new();
        loop {
            match self.bump() {
                None => bail!("unterminated string"),
                Some(c) if c == quote => return Ok(out),
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some('\\') => out.push('\\'),
                    Some('\'') => out.push('\''),
                    Some('"') => out.push('"'),
                    Some('0') => out.push('\0'),
                    Some('x') => {
                        let hi = self.bump().context("truncated \\x escape")?;
                        let lo = self.bump().context("truncated \\x escape")?;
                        let byte = u8::from_str_radix(&format!("{hi}{lo}"), 16)
                            .context("invalid \\x escape")?;
                        out.push(byte as char);
                    }
                    other => bail!("unsupported escape {:?}", other),
                },
                Some(c) => out.push(c),
            }
        }
    }

    fn number(&mut self) -> Result<PyVal> {
        let start = self.pos;
        if matches!(self.peek(), Some('-') | Some('+')) {
            self.pos += 1;
        }
        let mut is_float = false;
        while let Some(c) = self.peek() {
            match c {
                '0'..='9' => self.pos += 1,
                '.' => {
                    is_float = true;
                    self.pos += 1;
                }
                'e' | 'E' => {
                    is_float = true;
                    self.pos += 1;
                    if matches!(self.peek(), Some('-') | Some('+')) {
                        self.pos += 1;
                    }
                }
                _ => break,
            }
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        if is_float {
            text.parse::<f64>()
                .map(PyVal::Float)
                .with_context(|| format!("invalid float literal {text:?}"))
        } else {
            // Ints wider than i64 fall back to float, matching how the
            // renderer would have produced them in the first place.
            match text.parse::<i64>() {
                Ok(i) => Ok(PyVal::Int(i)),
                Err(_) => text
                    .parse::<f64>()
                    .map(PyVal::Float)
                    .with_context(|| format!("invalid numeric literal {text:?}")),
            }
        }
    }

    fn keyword(&mut self) -> Result<PyVal> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_alphanumeric()) {
            self.pos += 1;
        }
        let word: String = self.chars[start..self.pos].iter().collect();
        match word.as_str() {
            "None" => Ok(PyVal::None),
            "True" => Ok(PyVal::Bool(true)),
            "False" => Ok(PyVal::Bool(false)),
            w if w.eq_ignore_ascii_case("nan") => Ok(PyVal::Float(f64::NAN)),
            w if w.eq_ignore_ascii_case("inf") => Ok(PyVal::Float(f64::INFINITY)),
            other => bail!("unknown keyword {other:?}"),
        }
    }
}
