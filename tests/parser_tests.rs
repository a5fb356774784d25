//! Parser integration tests, including the seed scenarios and the AST
//! round-trip properties.

use flintc::ast::{BinOp, Expr, Stmt};
use flintc::lexer::{Lexer, Token, TokenKind};
use flintc::parser::Parser;

fn parse_program(src: &str) -> Vec<Stmt> {
    let lexer = Lexer::new(src).expect("lex");
    let mut parser = Parser::new(lexer);
    let mut nodes = Vec::new();
    while let Some(node) = parser.next_node().expect("parse") {
        nodes.push(node);
    }
    nodes
}

fn parse_one(src: &str) -> Stmt {
    let mut nodes = parse_program(src);
    assert_eq!(nodes.len(), 1, "expected exactly one node in {src:?}");
    nodes.remove(0)
}

fn int(value: f64) -> Expr {
    Expr::Number {
        value,
        is_float: false,
    }
}

#[test]
fn seed_assignment_with_nested_binop() {
    // varName = 2*(1-2);
    let node = parse_one("varName = 2*(1-2);");
    let expected = Stmt::Assign {
        name: "varName".to_string(),
        rvalue: Expr::Binary {
            op: BinOp::Mul,
            lhs: Box::new(int(2.0)),
            rhs: Box::new(Expr::Binary {
                op: BinOp::Sub,
                lhs: Box::new(int(1.0)),
                rhs: Box::new(int(2.0)),
            }),
        },
    };
    assert_eq!(node, expected);
}

#[test]
fn seed_function_definition() {
    let node = parse_one("def test(id1, id2, id3) { varPtr = (1+2+id1) * (2+1+id2); }");
    match node {
        Stmt::Function { proto, body } => {
            assert_eq!(proto.name, "test");
            assert_eq!(proto.params.len(), 3);
            assert_eq!(proto.params[0].name, "id1");
            match &body.statements[0] {
                Stmt::Assign { name, rvalue } => {
                    assert_eq!(name, "varPtr");
                    assert!(matches!(
                        rvalue,
                        Expr::Binary {
                            op: BinOp::Mul,
                            ..
                        }
                    ));
                }
                other => panic!("expected assignment, got {other:?}"),
            }
        }
        other => panic!("expected function, got {other:?}"),
    }
}

#[test]
fn seed_signed_literal_subtraction() {
    // -1-21.2; lexes the leading -1 as a signed literal.
    let node = parse_one("-1-21.2;");
    let expected = Stmt::Expr(Expr::Binary {
        op: BinOp::Sub,
        lhs: Box::new(int(-1.0)),
        rhs: Box::new(Expr::Number {
            value: 21.2,
            is_float: true,
        }),
    });
    assert_eq!(node, expected);
}

#[test]
fn seed_if_else_with_calls() {
    let node = parse_one("if (1) { print(1); } else { print(0); }");
    match node {
        Stmt::If {
            if_branch,
            else_if_branches,
            else_branch,
        } => {
            assert_eq!(if_branch.cond, int(1.0));
            assert!(else_if_branches.is_empty());

            let then_last = if_branch.body.statements.last().expect("then body");
            match then_last {
                Stmt::Expr(Expr::Call { callee, args }) => {
                    assert_eq!(callee, "print");
                    assert_eq!(args, &[int(1.0)]);
                }
                other => panic!("expected call, got {other:?}"),
            }

            let else_body = else_branch.expect("else branch");
            match else_body.statements.last().expect("else body") {
                Stmt::Expr(Expr::Call { callee, args }) => {
                    assert_eq!(callee, "print");
                    assert_eq!(args, &[int(0.0)]);
                }
                other => panic!("expected call, got {other:?}"),
            }
        }
        other => panic!("expected if, got {other:?}"),
    }
}

#[test]
fn seed_call_with_five_arguments() {
    let node = parse_one("foo(1, 12.1, id1, -1.2, (1+2));");
    match node {
        Stmt::Expr(Expr::Call { callee, args }) => {
            assert_eq!(callee, "foo");
            assert_eq!(args.len(), 5);
            assert_eq!(args[0], int(1.0));
            assert_eq!(
                args[1],
                Expr::Number {
                    value: 12.1,
                    is_float: true
                }
            );
            assert_eq!(
                args[2],
                Expr::Ident {
                    name: "id1".to_string()
                }
            );
            assert_eq!(
                args[3],
                Expr::Number {
                    value: -1.2,
                    is_float: true
                }
            );
            assert!(matches!(
                &args[4],
                Expr::Binary {
                    op: BinOp::Add,
                    ..
                }
            ));
        }
        other => panic!("expected call statement, got {other:?}"),
    }
}

#[test]
fn seed_for_loop_shape() {
    let node = parse_one("for (i=0; i<10; ++i) { print(i); }");
    match node {
        Stmt::For {
            init, cond, step, ..
        } => {
            match init.as_deref() {
                Some(Stmt::Assign { name, .. }) => assert_eq!(name, "i"),
                other => panic!("expected init assignment, got {other:?}"),
            }
            assert!(matches!(cond, Expr::Binary { op: BinOp::Lt, .. }));
            assert!(matches!(step, Expr::Unary { .. }));
        }
        other => panic!("expected for, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Round-trip properties

/// Expressions re-parse from their printed form to a structurally equal
/// tree.
#[test]
fn expression_round_trip() {
    let sources = [
        "1 + 2 * 3;",
        "-1-21.2;",
        "(1 + 2) * (3 - x);",
        "a < b && c > d || !e;",
        "foo(1, 12.1, id1, -1.2, (1+2));",
        "x ^ y & mask | bits;",
        "++i + j-- - -k;",
        "\"hello\" == name;",
        "true != false;",
    ];
    for src in sources {
        let first = parse_one(src);
        let printed = first.to_string();
        let second = parse_one(&printed);
        assert_eq!(first, second, "round trip diverged for {src:?} via {printed:?}");
    }
}

/// Statements re-parse from their printed form as well.
#[test]
fn statement_round_trip() {
    let sources = [
        "x = 2*(1-2);",
        "int x = 5;",
        "double* p;",
        "def f(int a, b) char { return a; }",
        "def ext(double v);",
        "def logf(double v, ...);",
        "if a { 1; } else if b { 2; } else { 3; }",
        "while (i < 10) { i = i + 1; }",
        "do { i = i - 1; } while (i > 0);",
        "for (i=0; i<10; ++i) { print(i); }",
        "return 1 + 2;",
    ];
    for src in sources {
        let first = parse_one(src);
        let printed = first.to_string();
        let second = parse_one(&printed);
        assert_eq!(first, second, "round trip diverged for {src:?} via {printed:?}");
    }
}

/// Re-lexing the printed tree preserves the token sequence up to grouping
/// parentheses, which the printer inserts freely.
#[test]
fn printed_tree_relexes_to_same_tokens() {
    let sources = ["varName = 2*(1-2);", "-1-21.2;", "foo(1, 12.1, id1);"];

    fn lex_filtered(src: &str) -> Vec<Token> {
        let mut lexer = Lexer::new(src).expect("lex");
        let mut tokens = Vec::new();
        loop {
            let token = lexer.current().clone();
            if token.kind == TokenKind::Eof {
                break;
            }
            if !matches!(token.kind, TokenKind::LParen | TokenKind::RParen) {
                tokens.push(token);
            }
            lexer.advance().expect("advance");
        }
        tokens
    }

    for src in sources {
        let printed = parse_one(src).to_string();
        let original: Vec<TokenKind> = lex_filtered(src).iter().map(|t| t.kind).collect();
        let reprinted: Vec<TokenKind> = lex_filtered(&printed).iter().map(|t| t.kind).collect();
        assert_eq!(original, reprinted, "token drift for {src:?} via {printed:?}");
    }
}

// ---------------------------------------------------------------------------
// Error reporting

#[test]
fn parse_error_renders_caret_at_offender() {
    let src = "x = 1 +;";
    let lexer = Lexer::new(src).unwrap();
    let mut parser = Parser::new(lexer);
    let err = parser.next_node().unwrap_err();
    let rendered = err.render(src);
    assert!(rendered.contains("x = 1 +;"));
    assert!(rendered.contains("^"));
    assert!(rendered.contains("parse error"));
}

#[test]
fn multiple_top_level_nodes() {
    let nodes = parse_program("def f(a) { return a; } x = 1; f(2);");
    assert_eq!(nodes.len(), 3);
    assert!(matches!(nodes[0], Stmt::Function { .. }));
    assert!(matches!(nodes[1], Stmt::Assign { .. }));
    assert!(matches!(nodes[2], Stmt::Expr(Expr::Call { .. })));
}
