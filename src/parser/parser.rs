// src/parser/parser.rs
//! Parser that converts tokens into an Abstract Syntax Tree

use super::ast::*;
use super::lexer::{LexError, Lexer, Token};
use std::fmt;

#[derive(Debug)]
pub struct ParseError {
    pub message: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Parse error: {}", self.message)
    }
}

impl std::error::Error for ParseError {}

impl From<LexError> for ParseError {
    fn from(err: LexError) -> Self {
        ParseError {
            message: err.to_string(),
        }
    }
}

pub struct Parser {
    lexer: Lexer,
    current_token: Token,
}

impl Parser {
    pub fn new(input: &str) -> Result<Self, ParseError> {
        let mut lexer = Lexer::new(input);
        let current_token = lexer.next_token()?;

        Ok(Self {
            lexer,
            current_token,
        })
    }

    pub fn parse(&mut self) -> Result<Chunk, ParseError> {
        let body = self.parse_block()?;

        if self.current_token != Token::Eof {
            return Err(ParseError {
                message: format!("Unexpected {} after end of chunk", self.current_token),
            });
        }

        Ok(Chunk { body })
    }

    /// Parse statements until a block terminator (end/else/elseif/eof),
    /// leaving the terminator unconsumed.
    fn parse_block(&mut self) -> Result<Vec<Statement>, ParseError> {
        let mut statements = Vec::new();

        loop {
            match self.current_token {
                Token::End | Token::Else | Token::Elseif | Token::Eof => break,
                Token::Semicolon => self.advance()?,
                _ => statements.push(self.parse_statement()?),
            }
        }

        Ok(statements)
    }

    fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        match &self.current_token {
            Token::Local => {
                self.advance()?;
                let name = self.expect_identifier()?;
                self.expect(Token::Assign)?;
                let value = self.parse_expression()?;
                Ok(Statement::Local { name, value })
            }
            Token::Function => {
                self.advance()?;
                let name = self.expect_identifier()?;
                let (params, body) = self.parse_function_body()?;
                Ok(Statement::FunctionDecl { name, params, body })
            }
            Token::If => self.parse_if_statement(),
            Token::While => {
                self.advance()?;
                let condition = self.parse_expression()?;
                self.expect(Token::Do)?;
                let body = self.parse_block()?;
                self.expect(Token::End)?;
                Ok(Statement::WhileStatement { condition, body })
            }
            Token::Return => {
                self.advance()?;
                let value = match self.current_token {
                    Token::End | Token::Else | Token::Elseif | Token::Eof | Token::Semicolon => {
                        None
                    }
                    _ => Some(self.parse_expression()?),
                };
                Ok(Statement::Return(value))
            }
            _ => self.parse_expression_statement(),
        }
    }

    /// An expression statement is either an assignment (when the parsed
    /// prefix is a valid target followed by '=') or a bare call.
    fn parse_expression_statement(&mut self) -> Result<Statement, ParseError> {
        let expr = self.parse_postfix()?;

        if self.current_token == Token::Assign {
            self.advance()?;
            let value = self.parse_expression()?;

            let target = match expr {
                Expression::Variable(name) => AssignTarget::Name(name),
                Expression::FieldAccess { object, field } => AssignTarget::Field {
                    object: *object,
                    field,
                },
                Expression::IndexAccess { object, index } => AssignTarget::Index {
                    object: *object,
                    index: *index,
                },
                _ => {
                    return Err(ParseError {
                        message: "Invalid assignment target".to_string(),
                    })
                }
            };

            return Ok(Statement::Assignment { target, value });
        }

        match expr {
            Expression::Call { .. } => Ok(Statement::Expression(expr)),
            _ => Err(ParseError {
                message: format!("Unexpected {} (expected statement)", self.current_token),
            }),
        }
    }

    fn parse_if_statement(&mut self) -> Result<Statement, ParseError> {
        // Consumes 'if' or 'elseif'; the caller of the elseif branch owns
        // the final 'end'.
        self.advance()?;

        let condition = self.parse_expression()?;
        self.expect(Token::Then)?;

        let then_block = self.parse_block()?;

        let else_block = match self.current_token {
            Token::Elseif => {
                // Desugar into a nested if inside the else branch
                let nested = self.parse_if_chain()?;
                return Ok(Statement::IfStatement {
                    condition,
                    then_block,
                    else_block: Some(vec![nested]),
                });
            }
            Token::Else => {
                self.advance()?;
                let block = self.parse_block()?;
                self.expect(Token::End)?;
                Some(block)
            }
            Token::End => {
                self.advance()?;
                None
            }
            _ => {
                return Err(ParseError {
                    message: format!("Expected 'end', got {}", self.current_token),
                })
            }
        };

        Ok(Statement::IfStatement {
            condition,
            then_block,
            else_block,
        })
    }

    /// Parse an elseif continuation as a nested if statement sharing the
    /// outer 'end'.
    fn parse_if_chain(&mut self) -> Result<Statement, ParseError> {
        self.parse_if_statement()
    }

    /// Parameter list and body of a function, after the name (if any)
    fn parse_function_body(&mut self) -> Result<(Vec<String>, Vec<Statement>), ParseError> {
        self.expect(Token::LeftParen)?;

        let mut params = Vec::new();
        if self.current_token != Token::RightParen {
            loop {
                params.push(self.expect_identifier()?);

                if self.current_token == Token::Comma {
                    self.advance()?;
                } else {
                    break;
                }
            }
        }

        self.expect(Token::RightParen)?;

        let body = self.parse_block()?;

        self.expect(Token::End)?;

        Ok((params, body))
    }

    fn parse_expression(&mut self) -> Result<Expression, ParseError> {
        self.parse_logical_or()
    }

    fn parse_logical_or(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.parse_logical_and()?;

        while self.current_token == Token::Or {
            self.advance()?;
            let right = self.parse_logical_and()?;
            left = Expression::Binary {
                left: Box::new(left),
                op: BinaryOp::Or,
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_logical_and(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.parse_comparison()?;

        while self.current_token == Token::And {
            self.advance()?;
            let right = self.parse_comparison()?;
            left = Expression::Binary {
                left: Box::new(left),
                op: BinaryOp::And,
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.parse_concat()?;

        loop {
            let op = match self.current_token {
                Token::EqEq => BinaryOp::Eq,
                Token::NotEq => BinaryOp::Ne,
                Token::Gt => BinaryOp::Gt,
                Token::Gte => BinaryOp::Gte,
                Token::Lt => BinaryOp::Lt,
                Token::Lte => BinaryOp::Lte,
                _ => break,
            };

            self.advance()?;
            let right = self.parse_concat()?;

            left = Expression::Binary {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_concat(&mut self) -> Result<Expression, ParseError> {
        let left = self.parse_addition()?;

        // Right-associative
        if self.current_token == Token::Concat {
            self.advance()?;
            let right = self.parse_concat()?;
            return Ok(Expression::Binary {
                left: Box::new(left),
                op: BinaryOp::Concat,
                right: Box::new(right),
            });
        }

        Ok(left)
    }

    fn parse_addition(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.parse_multiplication()?;

        loop {
            let op = match self.current_token {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => break,
            };

            self.advance()?;
            let right = self.parse_multiplication()?;

            left = Expression::Binary {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_multiplication(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.parse_unary()?;

        loop {
            let op = match self.current_token {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                Token::Percent => BinaryOp::Mod,
                _ => break,
            };

            self.advance()?;
            let right = self.parse_unary()?;

            left = Expression::Binary {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expression, ParseError> {
        match self.current_token {
            Token::Not => {
                self.advance()?;
                let operand = self.parse_unary()?;
                Ok(Expression::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                })
            }
            Token::Minus => {
                self.advance()?;
                let operand = self.parse_unary()?;
                Ok(Expression::Unary {
                    op: UnaryOp::Neg,
                    operand: Box::new(operand),
                })
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> Result<Expression, ParseError> {
        let mut expr = self.parse_primary()?;

        loop {
            match self.current_token {
                Token::Dot => {
                    self.advance()?;
                    let field = self.expect_identifier()?;

                    expr = Expression::FieldAccess {
                        object: Box::new(expr),
                        field,
                    };
                }
                Token::LeftBracket => {
                    self.advance()?;
                    let index = self.parse_expression()?;
                    self.expect(Token::RightBracket)?;

                    expr = Expression::IndexAccess {
                        object: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                Token::LeftParen => {
                    self.advance()?;
                    let args = self.parse_argument_list()?;
                    self.expect(Token::RightParen)?;

                    expr = Expression::Call {
                        callee: Box::new(expr),
                        args,
                    };
                }
                _ => break,
            }
        }

        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expression, ParseError> {
        match &self.current_token {
            Token::Nil => {
                self.advance()?;
                Ok(Expression::Literal(Literal::Nil))
            }
            Token::True => {
                self.advance()?;
                Ok(Expression::Literal(Literal::Bool(true)))
            }
            Token::False => {
                self.advance()?;
                Ok(Expression::Literal(Literal::Bool(false)))
            }
            Token::Number(n) => {
                let val = *n;
                self.advance()?;
                Ok(Expression::Literal(Literal::Number(val)))
            }
            Token::Str(s) => {
                let val = s.clone();
                self.advance()?;
                Ok(Expression::Literal(Literal::Str(val)))
            }
            Token::Identifier(name) => {
                let name_clone = name.clone();
                self.advance()?;
                Ok(Expression::Variable(name_clone))
            }
            Token::Function => {
                self.advance()?;
                let (params, body) = self.parse_function_body()?;
                Ok(Expression::FunctionLiteral { params, body })
            }
            Token::LeftBrace => self.parse_table_literal(),
            Token::LeftParen => {
                self.advance()?;
                let expr = self.parse_expression()?;
                self.expect(Token::RightParen)?;
                Ok(expr)
            }
            _ => Err(ParseError {
                message: format!("Unexpected token in expression: {}", self.current_token),
            }),
        }
    }

    fn parse_table_literal(&mut self) -> Result<Expression, ParseError> {
        self.expect(Token::LeftBrace)?;

        let mut items = Vec::new();

        while self.current_token != Token::RightBrace {
            match &self.current_token {
                Token::LeftBracket => {
                    self.advance()?;
                    let key = self.parse_expression()?;
                    self.expect(Token::RightBracket)?;
                    self.expect(Token::Assign)?;
                    let value = self.parse_expression()?;
                    items.push(TableItem::Keyed { key, value });
                }
                _ => {
                    // `name = expr` is a named entry; a bare name not
                    // followed by '=' is an ordinary positional expression
                    let expr = self.parse_expression()?;

                    if let (Expression::Variable(name), Token::Assign) =
                        (&expr, &self.current_token)
                    {
                        let key = name.clone();
                        self.advance()?;
                        let value = self.parse_expression()?;
                        items.push(TableItem::Named { key, value });
                    } else {
                        items.push(TableItem::Positional(expr));
                    }
                }
            }

            match self.current_token {
                Token::Comma | Token::Semicolon => self.advance()?,
                Token::RightBrace => break,
                _ => {
                    return Err(ParseError {
                        message: format!(
                            "Expected ',' or '}}' in table constructor, got {}",
                            self.current_token
                        ),
                    })
                }
            }
        }

        self.expect(Token::RightBrace)?;

        Ok(Expression::TableLiteral(items))
    }

    fn parse_argument_list(&mut self) -> Result<Vec<Expression>, ParseError> {
        let mut args = Vec::new();

        if self.current_token != Token::RightParen {
            loop {
                args.push(self.parse_expression()?);

                if self.current_token == Token::Comma {
                    self.advance()?;
                } else {
                    break;
                }
            }
        }

        Ok(args)
    }

    fn expect(&mut self, expected: Token) -> Result<(), ParseError> {
        if std::mem::discriminant(&self.current_token) == std::mem::discriminant(&expected) {
            self.advance()?;
            Ok(())
        } else {
            Err(ParseError {
                message: format!("Expected {:?}, got {}", expected, self.current_token),
            })
        }
    }

    fn expect_identifier(&mut self) -> Result<String, ParseError> {
        match &self.current_token {
            Token::Identifier(name) => {
                let result = name.clone();
                self.advance()?;
                Ok(result)
            }
            _ => Err(ParseError {
                message: format!("Expected identifier, got {}", self.current_token),
            }),
        }
    }

    fn advance(&mut self) -> Result<(), ParseError> {
        self.current_token = self.lexer.next_token()?;
        Ok(())
    }
}
