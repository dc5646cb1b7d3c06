//! Scope script parser.

use super::{CatchArm, Script, ScriptFunction, Stmt};
use crate::core::{CompileError, CompileResult};

pub fn parse_script(text: &str) -> CompileResult<Script> {
    let parser = Parser::new(text);
    parser.parse()
}

fn error(line: usize, reason: impl Into<String>) -> CompileError {
    CompileError::Script {
        line,
        reason: reason.into(),
    }
}

/// How a statement block ended.
enum Closer {
    Brace,
    Catch(String),
}

struct Parser<'a> {
    /// Non-empty lines with comments stripped, tokenized, with 1-based numbers.
    lines: Vec<(usize, Vec<&'a str>)>,
    pos: usize,
    last_line: usize,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        let mut lines = Vec::new();
        let mut last_line = 0;
        for (idx, raw) in text.lines().enumerate() {
            last_line = idx + 1;
            let code = match raw.find(';') {
                Some(comment) => &raw[..comment],
                None => raw,
            };
            let tokens: Vec<&str> = code.split_whitespace().collect();
            if !tokens.is_empty() {
                lines.push((idx + 1, tokens));
            }
        }
        Self {
            lines,
            pos: 0,
            last_line,
        }
    }

    fn parse(mut self) -> CompileResult<Script> {
        let mut functions = Vec::new();
        while self.pos < self.lines.len() {
            let (line, tokens) = &self.lines[self.pos];
            let line = *line;
            let name = match tokens.as_slice() {
                ["func", name, "{"] => name.to_string(),
                _ => {
                    return Err(error(
                        line,
                        format!("expected 'func NAME {{' but found '{}'", tokens.join(" ")),
                    ))
                }
            };
            if functions.iter().any(|f: &ScriptFunction| f.name == name) {
                return Err(error(line, format!("function {} defined twice", name)));
            }
            self.pos += 1;

            let body = self.parse_block_until_brace(line, "function body")?;
            functions.push(ScriptFunction { name, body, line });
        }
        Ok(Script { functions })
    }

    fn parse_block_until_brace(&mut self, open_line: usize, what: &str) -> CompileResult<Vec<Stmt>> {
        let (body, closer, line) = self.parse_block(open_line)?;
        match closer {
            Closer::Brace => Ok(body),
            Closer::Catch(class) => Err(error(
                line,
                format!("catch {} closes a {}, not a try body", class, what),
            )),
        }
    }

    /// Parse statements up to the closing `}` or `} catch CLASS {`.
    fn parse_block(&mut self, open_line: usize) -> CompileResult<(Vec<Stmt>, Closer, usize)> {
        let mut stmts = Vec::new();
        loop {
            let Some((line, tokens)) = self.lines.get(self.pos) else {
                return Err(error(
                    self.last_line,
                    format!("unexpected end of input, block opened at line {} is not closed", open_line),
                ));
            };
            let (line, tokens) = (*line, tokens.clone());
            self.pos += 1;

            let stmt = match tokens.as_slice() {
                ["}"] => return Ok((stmts, Closer::Brace, line)),
                ["}", "catch", class, "{"] => {
                    return Ok((stmts, Closer::Catch(class.to_string()), line))
                }
                ["declare", var] => Stmt::Declare {
                    var: var.to_string(),
                    release: None,
                },
                ["declare", var, release] => Stmt::Declare {
                    var: var.to_string(),
                    release: Some(release.to_string()),
                },
                ["call", callee] => Stmt::Call {
                    callee: callee.to_string(),
                },
                ["throw", class] => Stmt::Throw {
                    class: class.to_string(),
                },
                ["return"] => Stmt::Return,
                ["break"] => Stmt::Break,
                ["scope", "{"] => Stmt::Scope(self.parse_block_until_brace(line, "scope")?),
                ["loop", "{"] => Stmt::Loop(self.parse_block_until_brace(line, "loop")?),
                ["try", "{"] => self.parse_try(line)?,
                ["func", ..] => return Err(error(line, "functions cannot be nested")),
                _ => {
                    return Err(error(
                        line,
                        format!("unknown statement '{}'", tokens.join(" ")),
                    ))
                }
            };
            stmts.push(stmt);
        }
    }

    fn parse_try(&mut self, open_line: usize) -> CompileResult<Stmt> {
        let (body, mut closer, _) = self.parse_block(open_line)?;
        let mut catches = Vec::new();
        while let Closer::Catch(class) = closer {
            let (catch_body, next, _) = self.parse_block(open_line)?;
            catches.push(CatchArm {
                class,
                body: catch_body,
            });
            closer = next;
        }
        Ok(Stmt::Try { body, catches })
    }
}
