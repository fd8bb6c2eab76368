use proptest::prelude::*;
use tracelab_core::{parse_program, StmtKind, SyntaxError};

#[test]
fn parses_a_recursive_program() {
    let source = "\
def fib(n):
    if n <= 1:
        return n
    return fib(n - 1) + fib(n - 2)

print(fib(6))
";
    let program = parse_program(source).unwrap();
    let names: Vec<&str> = program.functions().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["fib"]);
    assert_eq!(program.body.len(), 2);
    assert_eq!(program.body[1].span.line, 6);
    assert!(matches!(program.body[1].kind, StmtKind::Expr(_)));
}

#[test]
fn syntax_errors_serialize_with_position() {
    let err: SyntaxError = parse_program("x = (1, 2\n").unwrap_err();
    let json = serde_json::to_value(&err).unwrap();
    assert_eq!(json["line"], serde_json::json!(err.line));
    assert!(json["message"].is_string());
    assert!(err.to_string().starts_with("syntax error at line"));
}

proptest! {
    #[test]
    fn arbitrary_text_never_panics(source in "[a-z0-9 ():\\[\\]{}=+\\-*/,.'\"#\n]{0,64}") {
        let _ = parse_program(&source);
    }

    #[test]
    fn integer_assignments_parse(name in "[a-z][a-z_]{0,6}", value in 0i64..1_000_000) {
        prop_assume!(!["if", "in", "is", "or", "and", "not", "def", "for", "else", "elif", "pass", "while", "break", "return", "global", "import", "from", "as", "lambda", "continue"].contains(&name.as_str()));
        let program = parse_program(&format!("{} = {}\n", name, value)).unwrap();
        prop_assert_eq!(program.body.len(), 1);
    }
}
