//! Query syntax: bare words (implicit AND), quoted phrases, the uppercase
//! operators AND / OR / NOT, and parentheses. Binary operators associate
//! strictly left to right with equal precedence.

use crate::error::QueryError;

/// Parentheses and NOT may nest this deep; deeper input is rejected.
pub const MAX_NESTING: usize = 64;

/// Parsed query. Runs of the same binary operator are kept flat, so the
/// tree depth follows parenthesis and NOT nesting, not query length.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    Term(String),
    Phrase(String),
    And(Vec<Query>),
    Or(Vec<Query>),
    Not(Box<Query>),
}

impl Query {
    /// Words and phrases that contribute positively (not under a NOT).
    pub fn positive_texts(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_positive(&mut out);
        out
    }

    fn collect_positive<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Query::Term(t) | Query::Phrase(t) => out.push(t),
            Query::And(clauses) | Query::Or(clauses) => {
                for clause in clauses {
                    clause.collect_positive(out);
                }
            }
            Query::Not(_) => {}
        }
    }

    fn and(left: Query, right: Query) -> Query {
        match left {
            Query::And(mut clauses) => {
                clauses.push(right);
                Query::And(clauses)
            }
            left => Query::And(vec![left, right]),
        }
    }

    fn or(left: Query, right: Query) -> Query {
        match left {
            Query::Or(mut clauses) => {
                clauses.push(right);
                Query::Or(clauses)
            }
            left => Query::Or(vec![left, right]),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Phrase(String),
    LParen,
    RParen,
    And,
    Or,
    Not,
}

fn lex(input: &str) -> Result<Vec<(Token, usize)>, QueryError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();
    while let Some(&(pos, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push((Token::LParen, pos));
            }
            ')' => {
                chars.next();
                tokens.push((Token::RParen, pos));
            }
            '"' => {
                chars.next();
                let start = pos + 1;
                let end = loop {
                    match chars.next() {
                        Some((i, '"')) => break i,
                        Some(_) => {}
                        None => return Err(QueryError::new("unterminated quote", pos)),
                    }
                };
                let text = &input[start..end];
                if text.trim().is_empty() {
                    return Err(QueryError::new("empty phrase", pos));
                }
                tokens.push((Token::Phrase(text.to_string()), pos));
            }
            _ => {
                let mut end = input.len();
                while let Some(&(i, c)) = chars.peek() {
                    if c.is_whitespace() || matches!(c, '(' | ')' | '"') {
                        end = i;
                        break;
                    }
                    chars.next();
                }
                let token = match &input[pos..end] {
                    "AND" => Token::And,
                    "OR" => Token::Or,
                    "NOT" => Token::Not,
                    word => Token::Word(word.to_string()),
                };
                tokens.push((token, pos));
            }
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    end: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&(Token, usize)> { self.tokens.get(self.pos) }

    fn advance(&mut self) -> Option<(Token, usize)> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn descend(&mut self, at: usize) -> Result<(), QueryError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(QueryError::new("query nested too deeply", at));
        }
        Ok(())
    }

    fn starts_operand(&self) -> bool {
        matches!(self.peek(), Some((Token::Word(_) | Token::Phrase(_) | Token::LParen | Token::Not, _)))
    }

    /// Each time an operator change wraps the clauses so far in a new node,
    /// the tree gets one level deeper; that counts against the nesting limit.
    fn expr(&mut self) -> Result<Query, QueryError> {
        let entered = self.depth;
        let mut left = self.unary()?;
        loop {
            let (is_and, at) = match self.peek() {
                None | Some((Token::RParen, _)) => break,
                Some((Token::And | Token::Or, _)) => {
                    let Some((op, at)) = self.advance() else { break };
                    if !self.starts_operand() {
                        let name = if op == Token::And { "AND" } else { "OR" };
                        return Err(QueryError::new(format!("{name} is missing its right operand"), at));
                    }
                    (op == Token::And, at)
                }
                Some((_, at)) => (true, *at),
            };
            let wraps = if is_and { !matches!(left, Query::And(_)) } else { !matches!(left, Query::Or(_)) };
            if wraps {
                self.descend(at)?;
            }
            let right = self.unary()?;
            left = if is_and { Query::and(left, right) } else { Query::or(left, right) };
        }
        self.depth = entered;
        Ok(left)
    }

    fn unary(&mut self) -> Result<Query, QueryError> {
        if let Some((Token::Not, at)) = self.peek() {
            let at = *at;
            self.advance();
            if !self.starts_operand() {
                return Err(QueryError::new("NOT is missing its operand", at));
            }
            self.descend(at)?;
            let inner = self.unary()?;
            self.depth -= 1;
            return Ok(Query::Not(Box::new(inner)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Query, QueryError> {
        match self.advance() {
            Some((Token::Word(w), _)) => Ok(Query::Term(w)),
            Some((Token::Phrase(p), _)) => Ok(Query::Phrase(p)),
            Some((Token::LParen, at)) => {
                if let Some((Token::RParen, _)) = self.peek() {
                    return Err(QueryError::new("empty parentheses", at));
                }
                self.descend(at)?;
                let inner = self.expr()?;
                self.depth -= 1;
                match self.advance() {
                    Some((Token::RParen, _)) => Ok(inner),
                    _ => Err(QueryError::new("unclosed '('", at)),
                }
            }
            Some((Token::RParen, at)) => Err(QueryError::new("unmatched ')'", at)),
            Some((Token::And, at)) => Err(QueryError::new("AND is missing its left operand", at)),
            Some((Token::Or, at)) => Err(QueryError::new("OR is missing its left operand", at)),
            Some((Token::Not, at)) => Err(QueryError::new("NOT is missing its operand", at)),
            None => Err(QueryError::new("unexpected end of query", self.end)),
        }
    }
}

pub fn parse(input: &str) -> Result<Query, QueryError> {
    if input.trim().is_empty() {
        return Err(QueryError::new("empty query", 0));
    }
    let tokens = lex(input)?;
    let mut parser = Parser { tokens, pos: 0, end: input.len(), depth: 0 };
    let query = parser.expr()?;
    if let Some((_, at)) = parser.peek() {
        return Err(QueryError::new("unmatched ')'", *at));
    }
    Ok(query)
}
