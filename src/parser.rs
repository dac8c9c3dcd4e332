//! Parsing for qvickbuild configurations.
//!
//! Converts the token stream into an [`Ast`] by recursive descent:
//!
//! ```text
//! Ast     ::= (Field | Task)*
//! Field   ::= Identifier '=' Expr ';'
//! Task    ::= Expr ('as' Identifier)? '{' Field* '}'
//! Expr    ::= List
//! List    ::= Replace (',' Expr)?
//! Replace ::= Primary (':' Primary '->' Primary)?
//! Primary ::= Literal | Identifier | true | false | FormattedLiteral
//!           | '[' Expr ']'
//! ```
//!
//! Every missing terminal halts with its own error kind so the report can
//! point at the exact spot the construct went wrong.

use std::collections::HashMap;
use std::mem::discriminant;
use std::sync::Arc;

use crate::errors::{BuildError, BuildResult, Diagnostics};
use crate::lexer::{Token, TokenKind};
use crate::tracking::Reference;

/// An identifier occurrence: its spelling plus where it was written.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentifierRef {
    pub name: String,
    pub reference: Reference,
}

/// One expression node.
#[derive(Debug, Clone, PartialEq)]
pub enum AstExpr {
    Identifier(IdentifierRef),
    Literal {
        content: String,
        reference: Reference,
    },
    /// A `"…"` literal: literal runs and identifiers, concatenated at
    /// evaluation time.
    FormattedLiteral {
        contents: Vec<AstExpr>,
        reference: Reference,
    },
    List {
        contents: Vec<AstExpr>,
        reference: Reference,
    },
    Boolean {
        content: bool,
        reference: Reference,
    },
    /// `input : filter -> product`
    Replace {
        input: Box<AstExpr>,
        filter: Box<AstExpr>,
        product: Box<AstExpr>,
        reference: Reference,
    },
}

impl AstExpr {
    pub fn reference(&self) -> Reference {
        match self {
            AstExpr::Identifier(identifier) => identifier.reference,
            AstExpr::Literal { reference, .. }
            | AstExpr::FormattedLiteral { reference, .. }
            | AstExpr::List { reference, .. }
            | AstExpr::Boolean { reference, .. }
            | AstExpr::Replace { reference, .. } => *reference,
        }
    }
}

/// A named expression at global or task scope.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: IdentifierRef,
    pub expression: AstExpr,
    pub reference: Reference,
}

/// A unit of work keyed by one or more names.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub identifier: AstExpr,
    pub iterator: IdentifierRef,
    pub fields: HashMap<String, Field>,
    pub reference: Reference,
}

/// The iterator name a task gets when no `as` clause is present.
pub const DEFAULT_ITERATOR: &str = "__task__";

#[derive(Debug, Default)]
pub struct Ast {
    pub fields: HashMap<String, Field>,
    pub tasks: Vec<Arc<Task>>,
}

impl Ast {
    /// The first task in declaration order, built when no explicit task
    /// key is given.
    pub fn topmost_task(&self) -> Option<&Arc<Task>> {
        self.tasks.first()
    }
}

pub struct Parser<'d> {
    tokens: Vec<Token>,
    pos: usize,
    diags: &'d Diagnostics,
}

impl<'d> Parser<'d> {
    pub fn new(tokens: Vec<Token>, diags: &'d Diagnostics) -> Self {
        Parser {
            tokens,
            pos: 0,
            diags,
        }
    }

    fn current(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&self) -> Option<&Token> {
        self.tokens.get(self.pos + 1)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    /// Consume the current token if its kind matches, payload ignored.
    fn consume_if(&mut self, kind: &TokenKind) -> Option<Token> {
        match self.current() {
            Some(token) if discriminant(&token.kind) == discriminant(kind) => self.advance(),
            _ => None,
        }
    }

    fn consume_identifier(&mut self) -> Option<IdentifierRef> {
        match self.current() {
            Some(Token {
                kind: TokenKind::Identifier(_),
                ..
            }) => {
                let token = self.advance().unwrap();
                let TokenKind::Identifier(name) = token.kind else {
                    unreachable!()
                };
                Some(IdentifierRef {
                    name,
                    reference: token.reference,
                })
            }
            _ => None,
        }
    }

    /// Parse the whole stream into an [`Ast`].
    pub fn parse(mut self) -> BuildResult<Ast> {
        let mut ast = Ast::default();
        while self.current().is_some() {
            if let Some(field) = self.parse_field()? {
                if let Some(existing) = ast.fields.get(&field.name.name) {
                    return Err(self.diags.halt(BuildError::DuplicateIdentifier {
                        name: field.name.name.clone(),
                        first: existing.name.reference,
                        second: field.name.reference,
                    }));
                }
                ast.fields.insert(field.name.name.clone(), field);
                continue;
            }
            if let Some(task) = self.parse_task()? {
                ast.tasks.push(Arc::new(task));
                continue;
            }
            let reference = self.current().unwrap().reference;
            return Err(self.diags.halt(BuildError::InvalidGrammar { reference }));
        }
        Ok(ast)
    }

    /// A field is `Identifier '=' Expr ';'`; anything else is left for the
    /// task rule.
    fn parse_field(&mut self) -> BuildResult<Option<Field>> {
        let starts_field = matches!(
            (self.current(), self.next()),
            (
                Some(Token {
                    kind: TokenKind::Identifier(_),
                    ..
                }),
                Some(Token {
                    kind: TokenKind::Equals,
                    ..
                })
            )
        );
        if !starts_field {
            return Ok(None);
        }

        let name = self.consume_identifier().unwrap();
        self.advance(); // the `=`

        let Some(expression) = self.parse_expr()? else {
            return Err(self.diags.halt(BuildError::NoValue {
                name: name.name.clone(),
                reference: name.reference,
            }));
        };

        let Some(linestop) = self.consume_if(&TokenKind::LineStop) else {
            let reference = self.tokens[self.pos.saturating_sub(1).min(self.tokens.len() - 1)]
                .reference;
            return Err(self.diags.halt(BuildError::NoLinestop { reference }));
        };

        let reference = name.reference.union(linestop.reference);
        Ok(Some(Field {
            name,
            expression,
            reference,
        }))
    }

    fn parse_task(&mut self) -> BuildResult<Option<Task>> {
        let Some(identifier) = self.parse_expr()? else {
            return Ok(None);
        };
        // the task reference is the identifier expression only, so a
        // report never excerpts the entire body.
        let reference = identifier.reference();

        let mut iterator = IdentifierRef {
            name: DEFAULT_ITERATOR.to_string(),
            reference,
        };
        if let Some(iterate_as) = self.consume_if(&TokenKind::IterateAs) {
            let Some(explicit) = self.consume_identifier() else {
                return Err(self.diags.halt(BuildError::NoIterator {
                    reference: iterate_as.reference,
                }));
            };
            iterator = explicit;
        }

        if self.consume_if(&TokenKind::TaskOpen).is_none() {
            return Err(self.diags.halt(BuildError::NoTaskOpen { reference }));
        }

        let mut fields: HashMap<String, Field> = HashMap::new();
        while let Some(field) = self.parse_field()? {
            if let Some(existing) = fields.get(&field.name.name) {
                return Err(self.diags.halt(BuildError::DuplicateIdentifier {
                    name: field.name.name.clone(),
                    first: existing.name.reference,
                    second: field.name.reference,
                }));
            }
            fields.insert(field.name.name.clone(), field);
        }

        if self.consume_if(&TokenKind::TaskClose).is_none() {
            return Err(self.diags.halt(BuildError::NoTaskClose { reference }));
        }

        Ok(Some(Task {
            identifier,
            iterator,
            fields,
            reference,
        }))
    }

    fn parse_expr(&mut self) -> BuildResult<Option<AstExpr>> {
        self.parse_list()
    }

    fn parse_list(&mut self) -> BuildResult<Option<AstExpr>> {
        let mut element = self.parse_replace()?;
        let mut contents = Vec::new();
        let mut separator = None;
        while element.is_some() {
            let Some(token) = self.consume_if(&TokenKind::Separator) else {
                break;
            };
            separator = Some(token);
            contents.push(element.take().unwrap());
            element = self.parse_expr()?;
        }

        let Some(element) = element else {
            if contents.is_empty() {
                return Ok(None);
            }
            return Err(self.diags.halt(BuildError::InvalidListEnd {
                reference: separator.unwrap().reference,
            }));
        };

        if contents.is_empty() {
            // a single element is not a list.
            return Ok(Some(element));
        }
        contents.push(element);

        let reference = contents[0]
            .reference()
            .union(contents.last().unwrap().reference());
        Ok(Some(AstExpr::List {
            contents,
            reference,
        }))
    }

    fn parse_replace(&mut self) -> BuildResult<Option<AstExpr>> {
        let input = self.parse_primary()?;
        let Some(modify) = self.consume_if(&TokenKind::Modify) else {
            return Ok(input); // not a replace.
        };

        let Some(input) = input else {
            return Err(self.diags.halt(BuildError::NoReplacementIdentifier {
                reference: modify.reference,
            }));
        };

        let Some(filter) = self.parse_primary()? else {
            return Err(self.diags.halt(BuildError::NoReplacementOriginal {
                reference: modify.reference,
            }));
        };

        let Some(arrow) = self.consume_if(&TokenKind::Arrow) else {
            return Err(self.diags.halt(BuildError::NoReplacementArrow {
                reference: filter.reference(),
            }));
        };

        let Some(product) = self.parse_primary()? else {
            return Err(self.diags.halt(BuildError::NoReplacementReplacement {
                reference: arrow.reference,
            }));
        };

        let reference = input.reference().union(product.reference());
        Ok(Some(AstExpr::Replace {
            input: Box::new(input),
            filter: Box::new(filter),
            product: Box::new(product),
            reference,
        }))
    }

    fn parse_primary(&mut self) -> BuildResult<Option<AstExpr>> {
        if let Some(token) = self.consume_if(&TokenKind::Literal(String::new())) {
            let TokenKind::Literal(content) = token.kind else {
                unreachable!()
            };
            return Ok(Some(AstExpr::Literal {
                content,
                reference: token.reference,
            }));
        }
        if let Some(identifier) = self.consume_identifier() {
            return Ok(Some(AstExpr::Identifier(identifier)));
        }
        if let Some(token) = self.consume_if(&TokenKind::True) {
            return Ok(Some(AstExpr::Boolean {
                content: true,
                reference: token.reference,
            }));
        }
        if let Some(token) = self.consume_if(&TokenKind::False) {
            return Ok(Some(AstExpr::Boolean {
                content: false,
                reference: token.reference,
            }));
        }
        if let Some(token) = self.consume_if(&TokenKind::FormattedLiteral(Vec::new())) {
            return self.flatten_formatted(token).map(Some);
        }
        if let Some(open) = self.consume_if(&TokenKind::ExpressionOpen) {
            let Some(expression) = self.parse_expr()? else {
                return Err(self.diags.halt(BuildError::EmptyExpression {
                    reference: open.reference,
                }));
            };
            if self.consume_if(&TokenKind::ExpressionClose).is_none() {
                return Err(self.diags.halt(BuildError::NoExpressionClose {
                    reference: expression.reference(),
                }));
            }
            return Ok(Some(expression));
        }
        Ok(None)
    }

    /// A formatted literal's sub-stream may only contain literal runs and
    /// identifiers once it reaches the AST.
    fn flatten_formatted(&mut self, token: Token) -> BuildResult<AstExpr> {
        let TokenKind::FormattedLiteral(stream) = token.kind else {
            unreachable!()
        };
        let mut contents = Vec::new();
        for inner in stream {
            match inner.kind {
                TokenKind::Literal(content) => contents.push(AstExpr::Literal {
                    content,
                    reference: inner.reference,
                }),
                TokenKind::Identifier(name) => {
                    contents.push(AstExpr::Identifier(IdentifierRef {
                        name,
                        reference: inner.reference,
                    }))
                }
                _ => {
                    return Err(self.diags.halt(BuildError::InvalidEscapedExpression {
                        reference: inner.reference,
                    }))
                }
            }
        }
        Ok(AstExpr::FormattedLiteral {
            contents,
            reference: token.reference,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn parse(source: &str) -> Ast {
        let diags = Diagnostics::new();
        let tokens = Lexer::new(source, &diags).token_stream().unwrap();
        Parser::new(tokens, &diags).parse().unwrap()
    }

    fn parse_err(source: &str) -> BuildError {
        let diags = Diagnostics::new();
        let tokens = Lexer::new(source, &diags).token_stream().unwrap();
        let result = Parser::new(tokens, &diags).parse();
        assert!(result.is_err());
        diags.reports().remove(0).error
    }

    #[test]
    fn parse_global_field() {
        let ast = parse("cc = \"gcc\";");
        assert_eq!(ast.fields.len(), 1);
        let field = &ast.fields["cc"];
        assert!(matches!(
            field.expression,
            AstExpr::FormattedLiteral { .. }
        ));
        assert_eq!(field.reference, Reference::new(0, 11));
    }

    #[test]
    fn parse_boolean_field() {
        let ast = parse("fast = true;");
        assert!(matches!(
            ast.fields["fast"].expression,
            AstExpr::Boolean { content: true, .. }
        ));
    }

    #[test]
    fn parse_task_with_fields_and_iterator() {
        let ast = parse("\"out\" as target { run = \"make\"; visible = false; }");
        assert_eq!(ast.tasks.len(), 1);
        let task = &ast.tasks[0];
        assert_eq!(task.iterator.name, "target");
        assert_eq!(task.fields.len(), 2);
        assert!(task.fields.contains_key("run"));
        assert!(task.fields.contains_key("visible"));
    }

    #[test]
    fn task_iterator_defaults() {
        let ast = parse("\"out\" { }");
        assert_eq!(ast.tasks[0].iterator.name, DEFAULT_ITERATOR);
    }

    #[test]
    fn single_element_list_collapses() {
        let ast = parse("x = \"one\";");
        assert!(!matches!(ast.fields["x"].expression, AstExpr::List { .. }));
    }

    #[test]
    fn list_is_right_nested() {
        let ast = parse("x = \"a\", \"b\", \"c\";");
        let AstExpr::List { contents, .. } = &ast.fields["x"].expression else {
            panic!("expected list");
        };
        assert_eq!(contents.len(), 2);
        assert!(matches!(contents[1], AstExpr::List { .. }));
    }

    #[test]
    fn parse_replace_operator() {
        let ast = parse("objs = srcs : \"*.c\" -> \"*.o\";");
        let AstExpr::Replace {
            input,
            filter,
            product,
            ..
        } = &ast.fields["objs"].expression
        else {
            panic!("expected replace");
        };
        assert!(matches!(**input, AstExpr::Identifier(_)));
        assert!(matches!(**filter, AstExpr::FormattedLiteral { .. }));
        assert!(matches!(**product, AstExpr::FormattedLiteral { .. }));
    }

    #[test]
    fn parse_bracketed_expression() {
        let ast = parse("x = [\"a\", \"b\"];");
        assert!(matches!(ast.fields["x"].expression, AstExpr::List { .. }));
    }

    #[test]
    fn missing_value_halts() {
        assert!(matches!(parse_err("x = ;"), BuildError::NoValue { .. }));
    }

    #[test]
    fn missing_linestop_halts() {
        assert!(matches!(
            parse_err("x = \"a\""),
            BuildError::NoLinestop { .. }
        ));
    }

    #[test]
    fn missing_iterator_halts() {
        assert!(matches!(
            parse_err("\"t\" as { }"),
            BuildError::NoIterator { .. }
        ));
    }

    #[test]
    fn missing_task_brackets_halt() {
        assert!(matches!(
            parse_err("\"t\" run = \"x\";"),
            BuildError::NoTaskOpen { .. }
        ));
        assert!(matches!(
            parse_err("\"t\" { run = \"x\";"),
            BuildError::NoTaskClose { .. }
        ));
    }

    #[test]
    fn dangling_separator_halts() {
        assert!(matches!(
            parse_err("x = \"a\", ;"),
            BuildError::InvalidListEnd { .. }
        ));
    }

    #[test]
    fn replace_error_kinds() {
        assert!(matches!(
            parse_err("x = : \"a\" -> \"b\";"),
            BuildError::NoReplacementIdentifier { .. }
        ));
        assert!(matches!(
            parse_err("x = \"a\" : -> \"b\";"),
            BuildError::NoReplacementOriginal { .. }
        ));
        assert!(matches!(
            parse_err("x = \"a\" : \"b\" \"c\";"),
            BuildError::NoReplacementArrow { .. }
        ));
        assert!(matches!(
            parse_err("x = \"a\" : \"b\" -> ;"),
            BuildError::NoReplacementReplacement { .. }
        ));
    }

    #[test]
    fn empty_expression_halts() {
        assert!(matches!(
            parse_err("x = [];"),
            BuildError::EmptyExpression { .. }
        ));
    }

    #[test]
    fn unclosed_expression_halts() {
        assert!(matches!(
            parse_err("x = [\"a\";"),
            BuildError::NoExpressionClose { .. }
        ));
    }

    #[test]
    fn duplicate_global_field_halts() {
        assert!(matches!(
            parse_err("x = \"a\"; x = \"b\";"),
            BuildError::DuplicateIdentifier { .. }
        ));
    }

    #[test]
    fn duplicate_task_field_halts() {
        assert!(matches!(
            parse_err("\"t\" { run = \"a\"; run = \"b\"; }"),
            BuildError::DuplicateIdentifier { .. }
        ));
    }

    #[test]
    fn escaped_expression_must_flatten_to_identifiers() {
        assert!(matches!(
            parse_err("x = \"[a -> b]\";"),
            BuildError::InvalidEscapedExpression { .. }
        ));
    }

    #[test]
    fn stray_token_is_invalid_grammar() {
        assert!(matches!(
            parse_err("x = \"a\"; ;"),
            BuildError::InvalidGrammar { .. }
        ));
    }

    #[test]
    fn node_references_are_lex_identical() {
        let source = "objs = srcs : \"*.c\" -> \"*.o\";";
        let ast = parse(source);
        let expression = &ast.fields["objs"].expression;
        let reference = expression.reference();
        let excerpt = &source[reference.index..reference.index + reference.length];
        assert_eq!(excerpt, "srcs : \"*.c\" -> \"*.o\"");
    }
}
