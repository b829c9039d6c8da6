use rstest::rstest;

use crate::ast::{AssignOp, BinOp, InitFragment, Node, NodeKind, Program, Var};
use crate::lexer::{tokenize, TokenKind};
use crate::ty::{TypeId, TypeKind, Types};
use crate::{compile, SourceFile};

fn parse(text: &str) -> Program {
    let src = SourceFile::new("test.c", text);
    compile(&src).unwrap()
}

fn parse_err(text: &str) -> String {
    let src = SourceFile::new("test.c", text);
    compile(&src).unwrap_err().to_string()
}

fn global<'p>(program: &'p Program, name: &str) -> &'p Var {
    program
        .globals
        .iter()
        .map(|&id| program.vars.get(id))
        .find(|var| var.name == name)
        .unwrap_or_else(|| panic!("no global named {name}"))
}

/// The value of the first `return <integer literal>;` in the first function.
fn ret_value(program: &Program) -> i64 {
    let node = first_return(program);
    match &node.kind {
        NodeKind::Num(val) => *val,
        other => panic!("return value is not a literal: {other:?}"),
    }
}

fn ret_ty(program: &Program) -> TypeId {
    first_return(program).ty.expect("untyped return value")
}

fn first_return(program: &Program) -> &Node {
    program.fns[0]
        .body
        .iter()
        .find_map(|stmt| match &stmt.kind {
            NodeKind::Return(Some(value)) => Some(&**value),
            _ => None,
        })
        .expect("no return statement")
}

// ----------------------------------------------------------------------
// tokenizer

#[test]
fn keywords_need_a_word_boundary() {
    let src = SourceFile::new("test.c", "int returnx return;");
    let toks = tokenize(&src).unwrap();
    let kinds: Vec<_> = toks.iter().map(|t| t.kind).collect();
    assert_eq!(
        kinds,
        vec![
            TokenKind::Reserved,
            TokenKind::Ident,
            TokenKind::Reserved,
            TokenKind::Reserved,
            TokenKind::Eof,
        ]
    );
    assert_eq!(toks[1].text(&src), "returnx".as_bytes());
}

#[test]
fn operators_match_longest_first() {
    let src = SourceFile::new("test.c", "a <<= b >> 2; c->d");
    let toks = tokenize(&src).unwrap();
    let texts: Vec<String> = toks
        .iter()
        .filter(|t| t.kind == TokenKind::Reserved)
        .map(|t| String::from_utf8_lossy(t.text(&src)).into_owned())
        .collect();
    assert_eq!(texts, vec!["<<=", ">>", ";", "->"]);
}

#[test]
fn comments_are_skipped() {
    let src = SourceFile::new(
        "test.c",
        "a // line comment\n/* block\ncomment */ b",
    );
    let toks = tokenize(&src).unwrap();
    assert_eq!(toks.len(), 3); // a, b, eof
    assert_eq!(toks[0].text(&src), "a".as_bytes());
    assert_eq!(toks[1].text(&src), "b".as_bytes());
}

#[test]
fn unclosed_block_comment_is_fatal() {
    let err = parse_err("int x; /* no end");
    assert!(err.contains("unclosed block comment"), "{err}");
}

#[test]
fn string_escapes_decode() {
    let src = SourceFile::new("test.c", r#""a\tb\e\0c""#);
    let toks = tokenize(&src).unwrap();
    assert_eq!(toks[0].kind, TokenKind::Str);
    // decoded bytes plus the trailing NUL
    assert_eq!(toks[0].contents, vec![b'a', b'\t', b'b', 0x1b, 0, b'c', 0]);
}

#[test]
fn unknown_escapes_are_the_byte_itself() {
    let src = SourceFile::new("test.c", r#""\q\"""#);
    let toks = tokenize(&src).unwrap();
    assert_eq!(toks[0].contents, vec![b'q', b'"', 0]);
}

#[test]
fn char_literals_are_numbers() {
    let src = SourceFile::new("test.c", r"'a' '\n'");
    let toks = tokenize(&src).unwrap();
    assert_eq!(toks[0].kind, TokenKind::Num);
    assert_eq!(toks[0].val, 97);
    assert_eq!(toks[1].val, 10);
    assert_eq!(toks[0].ty, Some(Types::INT));
}

#[rstest]
#[case("0", 0, false)]
#[case("10", 10, false)]
#[case("0x10", 16, false)]
#[case("0X1f", 31, false)]
#[case("0b101", 5, false)]
#[case("017", 15, false)]
#[case("42L", 42, true)]
#[case("42ll", 42, true)]
#[case("2147483647", 2147483647, false)]
#[case("2147483648", 2147483648, true)]
fn int_literal(#[case] text: &str, #[case] val: i64, #[case] is_long: bool) {
    let src = SourceFile::new("test.c", text);
    let toks = tokenize(&src).unwrap();
    assert_eq!(toks[0].kind, TokenKind::Num);
    assert_eq!(toks[0].val, val);
    let expected = if is_long { Types::LONG } else { Types::INT };
    assert_eq!(toks[0].ty, Some(expected));
}

#[rstest]
#[case("char *s = \"abc;", "unclosed string literal")]
#[case("int x = 08;", "invalid digit")]
#[case("int \u{20ac} = 1;", "invalid token")]
fn lexical_errors(#[case] text: &str, #[case] msg: &str) {
    let err = parse_err(text);
    assert!(err.contains(msg), "{err}");
}

#[test]
fn oversize_string_literal_is_fatal() {
    let text = format!("char *s = \"{}\";", "a".repeat(1100));
    let err = parse_err(&text);
    assert!(err.contains("string literal too large"), "{err}");
}

#[test]
fn tokenizer_is_idempotent_over_token_spans() {
    let text = "int main() { char *s = \"a\\tb\"; return s[0] + 0x2A; }";
    let src = SourceFile::new("test.c", text);
    let toks = tokenize(&src).unwrap();

    let joined = toks
        .iter()
        .filter(|t| t.kind != TokenKind::Eof)
        .map(|t| String::from_utf8_lossy(t.text(&src)).into_owned())
        .collect::<Vec<_>>()
        .join(" ");
    let src2 = SourceFile::new("test.c", joined);
    let toks2 = tokenize(&src2).unwrap();

    assert_eq!(toks.len(), toks2.len());
    for (a, b) in toks.iter().zip(&toks2) {
        assert_eq!(a.kind, b.kind);
        assert_eq!(a.val, b.val);
        assert_eq!(a.contents, b.contents);
        assert_eq!(a.text(&src), b.text(&src2));
    }
}

// ----------------------------------------------------------------------
// end-to-end scenarios

#[test]
fn arithmetic_precedence_and_typing() {
    let program = parse("int main(){return 1+2*3;}");
    assert_eq!(program.fns.len(), 1);
    let func = &program.fns[0];
    assert_eq!(func.name, "main");
    assert_eq!(func.body.len(), 1);

    let NodeKind::Return(Some(value)) = &func.body[0].kind else {
        panic!("expected return");
    };
    assert_eq!(value.ty, Some(Types::INT));

    let NodeKind::Binary {
        op: BinOp::Add,
        lhs,
        rhs,
    } = &value.kind
    else {
        panic!("expected addition at the top");
    };
    assert!(matches!(lhs.kind, NodeKind::Num(1)));
    let NodeKind::Binary {
        op: BinOp::Mul,
        lhs: mul_lhs,
        rhs: mul_rhs,
    } = &rhs.kind
    else {
        panic!("expected multiplication on the right");
    };
    assert!(matches!(mul_lhs.kind, NodeKind::Num(2)));
    assert!(matches!(mul_rhs.kind, NodeKind::Num(3)));
}

#[test]
fn global_array_initializer_pads_with_element_zeros() {
    let program = parse("int a[4] = {1,2};");
    let a = global(&program, "a");
    assert_eq!(program.types.get(a.ty).size, 16);
    assert_eq!(
        a.initializer,
        vec![
            InitFragment::Val { size: 4, val: 1 },
            InitFragment::Val { size: 4, val: 2 },
            InitFragment::Val { size: 4, val: 0 },
            InitFragment::Val { size: 4, val: 0 },
        ]
    );
}

#[test]
fn string_literal_becomes_an_anonymous_global() {
    let program = parse("char *s = \"hi\";");

    let data = global(&program, ".L.data.0");
    let data_ty = program.types.get(data.ty);
    assert_eq!(data_ty.size, 3);
    assert!(matches!(data_ty.kind, TypeKind::Array { len: 3, .. }));
    assert_eq!(
        data.initializer,
        vec![
            InitFragment::Val { size: 1, val: 104 },
            InitFragment::Val { size: 1, val: 105 },
            InitFragment::Val { size: 1, val: 0 },
        ]
    );

    let s = global(&program, "s");
    assert_eq!(
        s.initializer,
        vec![InitFragment::Label {
            name: ".L.data.0".into(),
            addend: 0,
        }]
    );
}

#[test]
fn char_then_int_struct_is_eight_bytes() {
    let program = parse("struct P{char c; int i;} p;");
    let p = global(&program, "p");
    let ty = program.types.get(p.ty);
    assert_eq!(ty.size, 8);
    assert_eq!(ty.align, 4);

    let TypeKind::Struct { members } = &ty.kind else {
        panic!("not a struct");
    };
    assert_eq!(members[0].name, "c");
    assert_eq!(members[0].offset, 0);
    assert_eq!(members[1].name, "i");
    assert_eq!(members[1].offset, 4);
}

#[test]
fn greater_than_lowers_to_less_than_with_swapped_operands() {
    let program = parse("int f(int x){ if(x>0) return x; else return -x; }");
    let NodeKind::If { cond, .. } = &program.fns[0].body[0].kind else {
        panic!("expected if");
    };
    let NodeKind::Binary {
        op: BinOp::Lt,
        lhs,
        rhs,
    } = &cond.kind
    else {
        panic!("expected lowered comparison");
    };
    assert!(matches!(lhs.kind, NodeKind::Num(0)));
    assert!(matches!(rhs.kind, NodeKind::Var { .. }));
}

#[test]
fn enum_constants_resume_counting_after_assignment() {
    let program = parse("enum{A=3,B,C=10} e = B; int n = C;");
    let e = global(&program, "e");
    assert_eq!(e.initializer, vec![InitFragment::Val { size: 4, val: 4 }]);
    let n = global(&program, "n");
    assert_eq!(n.initializer, vec![InitFragment::Val { size: 4, val: 10 }]);
}

// ----------------------------------------------------------------------
// declarations and types

#[test]
fn parenthesized_declarator_builds_pointer_to_array() {
    let program = parse("int (*x)[3];");
    let x = global(&program, "x");
    assert_eq!(program.types.get(x.ty).size, 8);

    let TypeKind::Ptr { base } = program.types.get(x.ty).kind else {
        panic!("expected a pointer");
    };
    let TypeKind::Array { base: elem, len: 3 } =
        program.types.get(base).kind
    else {
        panic!("expected an array of 3");
    };
    assert_eq!(elem, Types::INT);
}

#[test]
fn typedef_binds_a_type_alias() {
    let program = parse("typedef int myint; myint x; int main(){ myint y; return y; }");
    assert_eq!(global(&program, "x").ty, Types::INT);
    assert_eq!(ret_ty(&program), Types::INT);
}

#[test]
fn typedef_of_array_type() {
    let program = parse("typedef int pair[2]; pair a;");
    let a = global(&program, "a");
    assert_eq!(program.types.get(a.ty).size, 8);
    assert!(matches!(
        program.types.get(a.ty).kind,
        TypeKind::Array { len: 2, .. }
    ));
}

#[rstest]
#[case("int main(){ long long x; return sizeof(x); }", 8)]
#[case("int main(){ short int x; return sizeof(x); }", 2)]
#[case("int main(){ int long x; return sizeof(x); }", 8)]
#[case("int main(){ _Bool b; return sizeof(b); }", 1)]
#[case("int main(){ char c; return sizeof(c); }", 1)]
fn multiword_type_specifiers(#[case] text: &str, #[case] size: i64) {
    assert_eq!(ret_value(&parse(text)), size);
}

#[test]
fn conflicting_specifiers_are_rejected() {
    let err = parse_err("int main(){ char int x; return 0; }");
    assert!(err.contains("invalid type"), "{err}");
}

#[test]
fn conflicting_storage_classes_are_rejected() {
    let err = parse_err("typedef static int x;");
    assert!(err.contains("may not be used together"), "{err}");
}

#[rstest]
#[case("int main(){return sizeof(int);}", 4)]
#[case("int main(){return sizeof(long);}", 8)]
#[case("int main(){return sizeof(int*);}", 8)]
#[case("int main(){return sizeof(int[3]);}", 12)]
#[case("int main(){int x; return sizeof x;}", 4)]
#[case("int main(){return sizeof 1L;}", 8)]
#[case("int main(){int a[4]; return sizeof(a);}", 16)]
#[case("int main(){return sizeof(struct {int a; char b;});}", 8)]
#[case("int main(){return _Alignof(struct {char c; long l;});}", 8)]
fn sizeof_and_alignof_fold_to_literals(#[case] text: &str, #[case] expected: i64) {
    assert_eq!(ret_value(&parse(text)), expected);
}

#[rstest]
#[case(
    "struct T {char a; char b; int c;} t;",
    &[("a", 0), ("b", 1), ("c", 4)],
    8,
    4
)]
#[case(
    "struct T {char a; long b; char c;} t;",
    &[("a", 0), ("b", 8), ("c", 16)],
    24,
    8
)]
#[case(
    "struct T {short a; short b; short c;} t;",
    &[("a", 0), ("b", 2), ("c", 4)],
    6,
    2
)]
#[case(
    "struct T {char a; struct {int x;} inner;} t;",
    &[("a", 0), ("inner", 4)],
    8,
    4
)]
fn struct_member_layout(
    #[case] text: &str,
    #[case] expected: &[(&str, i32)],
    #[case] size: i32,
    #[case] align: i32,
) {
    let program = parse(text);
    let t = global(&program, "t");
    let ty = program.types.get(t.ty);
    assert_eq!((ty.size, ty.align), (size, align));

    let TypeKind::Struct { members } = &ty.kind else {
        panic!("not a struct");
    };
    let got: Vec<_> =
        members.iter().map(|m| (m.name.as_str(), m.offset)).collect();
    assert_eq!(got, expected);
}

#[test]
fn forward_declared_struct_is_completed_in_place() {
    let program = parse("struct N; struct N {int v;}; struct N n;");
    let n = global(&program, "n");
    let ty = program.types.get(n.ty);
    assert!(!ty.incomplete);
    assert_eq!(ty.size, 4);
}

#[test]
fn self_referential_struct_through_pointer() {
    let program = parse("struct Node { int value; struct Node *next; } head;");
    let head = global(&program, "head");
    assert_eq!(program.types.get(head.ty).size, 16);
    assert_eq!(program.types.get(head.ty).align, 8);
}

#[test]
fn inner_struct_tag_shadows_outer() {
    let program = parse(
        "struct S {int a;};\
         int main(){ struct S {char c; char d;}; return sizeof(struct S); }\
         int g = sizeof(struct S);",
    );
    assert_eq!(ret_value(&program), 2);
    let g = global(&program, "g");
    assert_eq!(g.initializer, vec![InitFragment::Val { size: 4, val: 4 }]);
}

#[test]
fn incomplete_struct_cannot_be_defined() {
    let err = parse_err("struct S; struct S s;");
    assert!(err.contains("incomplete type"), "{err}");
}

#[test]
fn unknown_enum_tag_is_rejected() {
    let err = parse_err("enum X e;");
    assert!(err.contains("unknown enum type"), "{err}");
}

#[test]
fn tagged_enum_can_be_reused() {
    let program =
        parse("enum Color {RED, GREEN, BLUE}; enum Color c = GREEN; int n = BLUE;");
    assert_eq!(
        global(&program, "c").initializer,
        vec![InitFragment::Val { size: 4, val: 1 }]
    );
    assert_eq!(
        global(&program, "n").initializer,
        vec![InitFragment::Val { size: 4, val: 2 }]
    );
}

#[test]
fn extern_declarations_emit_no_storage() {
    let program = parse("extern int x; extern int a[]; int main(){ return x; }");
    assert!(program.globals.is_empty());
    assert_eq!(ret_ty(&program), Types::INT);
}

#[test]
fn array_parameters_decay_to_pointers() {
    let program = parse("int first(int a[10]){ return a[0]; }");
    let param = program.vars.get(program.fns[0].params[0]);
    let TypeKind::Ptr { base } = program.types.get(param.ty).kind else {
        panic!("parameter did not decay");
    };
    assert_eq!(base, Types::INT);
}

#[test]
fn void_parameter_list_is_empty() {
    let program = parse("int zero(void){ return 0; }");
    assert!(program.fns[0].params.is_empty());
}

#[test]
fn local_void_variable_is_rejected() {
    let err = parse_err("int main(){ void x; return 0; }");
    assert!(err.contains("variable declared void"), "{err}");
}

// ----------------------------------------------------------------------
// expressions

#[test]
fn indexing_lowers_to_pointer_arithmetic() {
    let program = parse("int main(){ int a[2]; return a[1]; }");
    let ret = first_return(&program);
    assert_eq!(ret.ty, Some(Types::INT));

    let NodeKind::Deref(inner) = &ret.kind else {
        panic!("expected deref");
    };
    let NodeKind::Binary {
        op: BinOp::PtrAdd,
        lhs,
        ..
    } = &inner.kind
    else {
        panic!("expected pointer addition");
    };
    assert!(matches!(lhs.kind, NodeKind::Var { .. }));
    // pointer arithmetic inherits the pointer operand's type
    assert_eq!(inner.ty, lhs.ty);
}

#[test]
fn int_plus_pointer_puts_the_pointer_left() {
    let program = parse("int main(){ int a[2]; return *(1 + a); }");
    let NodeKind::Deref(inner) = &first_return(&program).kind else {
        panic!("expected deref");
    };
    let NodeKind::Binary {
        op: BinOp::PtrAdd,
        lhs,
        rhs,
    } = &inner.kind
    else {
        panic!("expected pointer addition");
    };
    assert!(matches!(lhs.kind, NodeKind::Var { .. }));
    assert!(matches!(rhs.kind, NodeKind::Num(1)));
}

#[test]
fn pointer_difference_is_int() {
    let program =
        parse("int main(){ int a[2]; int *p; int *q; p = a; q = a + 1; return q - p; }");
    let ret = first_return(&program);
    assert!(matches!(
        ret.kind,
        NodeKind::Binary {
            op: BinOp::PtrDiff,
            ..
        }
    ));
    assert_eq!(ret.ty, Some(Types::INT));
}

#[test]
fn pointer_plus_pointer_is_rejected() {
    let err = parse_err("int main(){ int *p; int *q; return p + q; }");
    assert!(err.contains("invalid operands"), "{err}");
}

#[test]
fn compound_assignment_picks_the_pointer_flavor() {
    let program =
        parse("int main(){ int a[2]; int *p; p = a; p += 1; *p -= 1; return 0; }");
    let body = &program.fns[0].body;

    let NodeKind::ExprStmt(add) = &body[3].kind else {
        panic!("expected statement");
    };
    assert!(matches!(
        add.kind,
        NodeKind::Assign {
            op: AssignOp::PtrAdd,
            ..
        }
    ));

    let NodeKind::ExprStmt(sub) = &body[4].kind else {
        panic!("expected statement");
    };
    assert!(matches!(
        sub.kind,
        NodeKind::Assign {
            op: AssignOp::Sub,
            ..
        }
    ));
}

#[test]
fn bitwise_compound_assignments_parse() {
    let program = parse(
        "int main(){ int x; x = 6; x &= 3; x |= 8; x ^= 1; x <<= 2; x >>= 1; return x; }",
    );
    let ops: Vec<AssignOp> = program.fns[0]
        .body
        .iter()
        .filter_map(|stmt| match &stmt.kind {
            NodeKind::ExprStmt(inner) => match &inner.kind {
                NodeKind::Assign { op, .. } => Some(*op),
                _ => None,
            },
            _ => None,
        })
        .collect();
    assert_eq!(
        ops,
        vec![
            AssignOp::Plain,
            AssignOp::BitAnd,
            AssignOp::BitOr,
            AssignOp::BitXor,
            AssignOp::Shl,
            AssignOp::Shr,
        ]
    );
}

#[test]
fn member_access_through_pointer() {
    let program = parse(
        "struct S {char c; int i;};\
         int main(){ struct S s; struct S *p; p = &s; return p->i; }",
    );
    let ret = first_return(&program);
    assert_eq!(ret.ty, Some(Types::INT));

    let NodeKind::Member { base, member } = &ret.kind else {
        panic!("expected member access");
    };
    assert_eq!(member.name, "i");
    assert_eq!(member.offset, 4);
    assert!(matches!(base.kind, NodeKind::Deref(_)));
}

#[test]
fn comma_takes_the_type_of_its_right_side() {
    let program = parse("int main(){ long l; return (l = 1, 2); }");
    let ret = first_return(&program);
    let NodeKind::Comma { lhs, .. } = &ret.kind else {
        panic!("expected comma");
    };
    assert!(matches!(lhs.kind, NodeKind::ExprStmt(_)));
    assert_eq!(ret.ty, Some(Types::INT));
}

#[test]
fn ternary_takes_the_type_of_its_then_branch() {
    let program = parse("int main(){ long a; return a ? a : a; }");
    assert_eq!(ret_ty(&program), Types::LONG);
}

#[rstest]
#[case("int main(){ int i; long l; return i + l; }", Types::LONG)]
#[case("int main(){ long l; int i; return l - i; }", Types::LONG)]
#[case("int main(){ int i; char c; return i + c; }", Types::INT)]
#[case("int main(){ char c; int i; return c + i; }", Types::CHAR)]
#[case("int main(){ int i; long l; return i < l; }", Types::INT)]
#[case("int main(){ int i; return !i; }", Types::INT)]
#[case("int main(){ long l; return ~l; }", Types::LONG)]
fn arithmetic_result_types(#[case] text: &str, #[case] expected: TypeId) {
    assert_eq!(ret_ty(&parse(text)), expected);
}

#[test]
fn cast_keeps_the_operand_type_underneath() {
    let program = parse("int main(){ long l; return (int)l; }");
    let ret = first_return(&program);
    assert_eq!(ret.ty, Some(Types::INT));
    let NodeKind::Cast(inner) = &ret.kind else {
        panic!("expected cast");
    };
    assert_eq!(inner.ty, Some(Types::LONG));
}

#[test]
fn statement_expression_takes_the_last_value() {
    let program = parse("int main(){ return ({ int x; x = 42; x; }); }");
    let ret = first_return(&program);
    assert_eq!(ret.ty, Some(Types::INT));
    let NodeKind::StmtExpr(body) = &ret.kind else {
        panic!("expected statement expression");
    };
    assert!(matches!(body.last().unwrap().kind, NodeKind::Var { .. }));
}

#[test]
fn statement_expression_must_end_in_an_expression() {
    let err = parse_err("int main(){ return ({ int x; }); }");
    assert!(err.contains("stmt expr returning void"), "{err}");
}

#[test]
fn compound_literal_in_an_expression() {
    let program =
        parse("struct P {int x; int y;}; int main(){ return (struct P){7, 8}.x; }");
    let ret = first_return(&program);
    assert_eq!(ret.ty, Some(Types::INT));
    assert!(matches!(ret.kind, NodeKind::Member { .. }));
    // the literal lives in an anonymous local
    assert_eq!(program.fns[0].locals.len(), 1);
}

#[test]
fn global_compound_literal_is_emitted() {
    let program = parse("struct P {int x;}; struct P *p = &(struct P){5};");
    assert_eq!(
        global(&program, ".L.data.0").initializer,
        vec![InitFragment::Val { size: 4, val: 5 }]
    );
    assert_eq!(
        global(&program, "p").initializer,
        vec![InitFragment::Label {
            name: ".L.data.0".into(),
            addend: 0,
        }]
    );
}

#[test]
fn implicit_function_declaration_defaults_to_int() {
    let program = parse("int main(){ return probe(); }");
    let ret = first_return(&program);
    assert!(matches!(ret.kind, NodeKind::Funcall { .. }));
    assert_eq!(ret.ty, Some(Types::INT));
}

#[test]
fn call_type_comes_from_the_declaration() {
    let program = parse("long wide(); int main(){ return wide(); }");
    assert_eq!(ret_ty(&program), Types::LONG);
}

#[test]
fn calling_a_non_function_is_rejected() {
    let err = parse_err("int x; int main(){ return x(); }");
    assert!(err.contains("not a function"), "{err}");
}

#[rstest]
#[case("int main(){ return y; }", "undefined variable")]
#[case("int main(){ int x; return x.f; }", "not a struct")]
#[case(
    "struct S {int a;}; int main(){ struct S s; return s.b; }",
    "no such member"
)]
#[case("int main(){ int x; return *x; }", "invalid pointer dereference")]
#[case("int main(){ void *p; return *p; }", "dereferencing a void pointer")]
#[case("int main(){ do; }", "expected expression")]
fn semantic_errors(#[case] text: &str, #[case] msg: &str) {
    let err = parse_err(text);
    assert!(err.contains(msg), "{err}");
}

// ----------------------------------------------------------------------
// constant expressions

#[rstest]
#[case("int a = 1 ^ 3;", 2)]
#[case("int a = 1 | 2 ^ 2 & 3;", 1)]
#[case("int a = 1 ? 2 : 3;", 2)]
#[case("int a = !5;", 0)]
#[case("int a = ~0;", -1)]
#[case("int a = 1 << 4;", 16)]
#[case("int a = 256 >> 4;", 16)]
#[case("int a = 6 / 2 * 3;", 9)]
#[case("int a = (1 + 2) * 3 == 9;", 1)]
#[case("int a = 2 < 1;", 0)]
#[case("int a = 1 && 2;", 1)]
#[case("int a = 0 || 0;", 0)]
#[case("int a = -(3 - 5);", 2)]
fn constant_expressions_fold(#[case] text: &str, #[case] expected: i64) {
    let program = parse(text);
    assert_eq!(
        global(&program, "a").initializer,
        vec![InitFragment::Val {
            size: 4,
            val: expected,
        }]
    );
}

#[test]
fn constant_division_by_zero_is_rejected() {
    let err = parse_err("int a = 1 / 0;");
    assert!(err.contains("division by zero"), "{err}");
}

#[test]
fn non_constant_global_initializer_is_rejected() {
    let err = parse_err("int f(); int a = f();");
    assert!(err.contains("not a constant expression"), "{err}");
}

#[test]
fn address_initializers_scale_their_addend() {
    let program = parse("int arr[4]; int *p = arr + 2; int x; int *q = &x;");
    assert_eq!(
        global(&program, "p").initializer,
        vec![InitFragment::Label {
            name: "arr".into(),
            addend: 8,
        }]
    );
    assert_eq!(
        global(&program, "q").initializer,
        vec![InitFragment::Label {
            name: "x".into(),
            addend: 0,
        }]
    );
}

#[test]
fn address_of_a_literal_is_rejected() {
    let err = parse_err("int *p = &1;");
    assert!(err.contains("invalid initializer"), "{err}");
}

// ----------------------------------------------------------------------
// initializers

#[test]
fn char_array_from_string_pads_to_length() {
    let program = parse("char msg[6] = \"hi\";");
    let msg = global(&program, "msg");
    assert_eq!(
        msg.initializer,
        vec![
            InitFragment::Val { size: 1, val: 104 },
            InitFragment::Val { size: 1, val: 105 },
            InitFragment::Val { size: 1, val: 0 },
            InitFragment::Val { size: 1, val: 0 },
            InitFragment::Val { size: 1, val: 0 },
            InitFragment::Val { size: 1, val: 0 },
        ]
    );
}

#[test]
fn flexible_char_array_completes_to_the_literal() {
    let program = parse("char msg[] = \"hi\";");
    let msg = global(&program, "msg");
    let ty = program.types.get(msg.ty);
    assert!(!ty.incomplete);
    assert_eq!(ty.size, 3);
    assert!(matches!(ty.kind, TypeKind::Array { len: 3, .. }));
}

#[test]
fn flexible_array_completes_to_the_element_count() {
    let program = parse("int a[] = {1,2,3};");
    let a = global(&program, "a");
    assert_eq!(program.types.get(a.ty).size, 12);
    assert_eq!(a.initializer.len(), 3);
}

#[test]
fn struct_initializer_emits_alignment_padding() {
    let program = parse("struct {char c; int i;} s = {1, 2};");
    let s = global(&program, "s");
    assert_eq!(
        s.initializer,
        vec![
            InitFragment::Val { size: 1, val: 1 },
            InitFragment::Val { size: 1, val: 0 },
            InitFragment::Val { size: 1, val: 0 },
            InitFragment::Val { size: 1, val: 0 },
            InitFragment::Val { size: 4, val: 2 },
        ]
    );
}

#[test]
fn excess_initializer_elements_are_skipped_with_a_warning() {
    let program = parse("int a[2] = {1,2,3,4};");
    let a = global(&program, "a");
    assert_eq!(
        a.initializer,
        vec![
            InitFragment::Val { size: 4, val: 1 },
            InitFragment::Val { size: 4, val: 2 },
        ]
    );
}

#[rstest]
#[case("int a[4] = {1,2};")]
#[case("struct {char c; int i;} s = {1};")]
#[case("char m[10] = \"hey\";")]
#[case("struct {char c; struct {int x; int y;} inner;} s = {1, {2}};")]
#[case("int m[2][3] = {{1,2},{4}};")]
fn initializer_image_covers_the_type_exactly(#[case] text: &str) {
    let program = parse(text);
    for &id in &program.globals {
        let var = program.vars.get(id);
        let total: i64 = var
            .initializer
            .iter()
            .map(|fragment| match fragment {
                InitFragment::Val { size, .. } => *size as i64,
                InitFragment::Label { .. } => 8,
            })
            .sum();
        assert_eq!(total, program.types.get(var.ty).size as i64, "{text}");
    }
}

#[test]
fn local_array_initializer_lowers_to_assignments() {
    let program = parse("int main(){ int a[3] = {1,2}; return a[0]; }");
    let NodeKind::Block(stmts) = &program.fns[0].body[0].kind else {
        panic!("expected initializer block");
    };
    assert_eq!(stmts.len(), 3);

    // a[0] = 1 lowers to *(a + 0) = 1
    let NodeKind::ExprStmt(first) = &stmts[0].kind else {
        panic!("expected statement");
    };
    let NodeKind::Assign {
        op: AssignOp::Plain,
        lhs,
        rhs,
    } = &first.kind
    else {
        panic!("expected assignment");
    };
    assert!(matches!(rhs.kind, NodeKind::Num(1)));
    let NodeKind::Deref(sum) = &lhs.kind else {
        panic!("expected deref lvalue");
    };
    let NodeKind::Binary {
        op: BinOp::PtrAdd,
        rhs: index,
        ..
    } = &sum.kind
    else {
        panic!("expected pointer addition");
    };
    assert!(matches!(index.kind, NodeKind::Num(0)));

    // the missing tail element is zeroed
    let NodeKind::ExprStmt(last) = &stmts[2].kind else {
        panic!("expected statement");
    };
    let NodeKind::Assign { rhs: zero, .. } = &last.kind else {
        panic!("expected assignment");
    };
    assert!(matches!(zero.kind, NodeKind::Num(0)));
}

#[test]
fn nested_local_initializer_writes_every_element_once() {
    let program = parse("int main(){ int a[2][2] = {{1},{2,3}}; return a[0][0]; }");
    let NodeKind::Block(stmts) = &program.fns[0].body[0].kind else {
        panic!("expected initializer block");
    };
    assert_eq!(stmts.len(), 4);
    assert!(stmts.iter().all(|s| matches!(s.kind, NodeKind::ExprStmt(_))));
}

#[test]
fn local_string_initializer_assigns_each_byte() {
    let program = parse("int main(){ char s[4] = \"ab\"; return s[0]; }");
    let NodeKind::Block(stmts) = &program.fns[0].body[0].kind else {
        panic!("expected initializer block");
    };
    // 'a', 'b', NUL, plus the zero-filled fourth element
    assert_eq!(stmts.len(), 4);
}

#[test]
fn local_struct_initializer_zeroes_missing_members() {
    let program = parse(
        "struct P {int x; int y;}; int main(){ struct P p = {7}; return p.y; }",
    );
    let NodeKind::Block(stmts) = &program.fns[0].body[0].kind else {
        panic!("expected initializer block");
    };
    assert_eq!(stmts.len(), 2);
}

#[test]
fn static_local_becomes_an_anonymous_global() {
    let program = parse("int counter(){ static int n = 5; n = n + 1; return n; }");
    let data = global(&program, ".L.data.0");
    assert_eq!(data.initializer, vec![InitFragment::Val { size: 4, val: 5 }]);
    assert!(data.is_static);
    // the static does not occupy the frame
    assert!(program.fns[0].locals.is_empty());
    assert_eq!(program.fns[0].stack_size, 0);
}

// ----------------------------------------------------------------------
// statements and scopes

#[test]
fn switch_collects_cases_in_source_order() {
    let program = parse(
        "int main(int x){ switch(x){ case 1: return 10; case 5: return 50; default: return 0; } return 1; }",
    );
    let switch = program.fns[0]
        .body
        .iter()
        .find(|stmt| matches!(stmt.kind, NodeKind::Switch { .. }))
        .unwrap();
    let NodeKind::Switch {
        cases,
        has_default,
        then,
        ..
    } = &switch.kind
    else {
        unreachable!();
    };
    assert_eq!(cases, &vec![1, 5]);
    assert!(has_default);

    let NodeKind::Block(body) = &then.kind else {
        panic!("expected block");
    };
    let values: Vec<Option<i64>> = body
        .iter()
        .filter_map(|stmt| match &stmt.kind {
            NodeKind::Case { value, .. } => Some(*value),
            _ => None,
        })
        .collect();
    assert_eq!(values, vec![Some(1), Some(5), None]);
}

#[rstest]
#[case("int main(){ case 1: return 0; }", "stray case")]
#[case("int main(){ default: return 0; }", "stray default")]
fn case_outside_switch_is_rejected(#[case] text: &str, #[case] msg: &str) {
    let err = parse_err(text);
    assert!(err.contains(msg), "{err}");
}

#[test]
fn goto_and_labels_parse() {
    let program = parse("int main(){ goto end; end: return 7; }");
    let body = &program.fns[0].body;
    assert!(matches!(&body[0].kind, NodeKind::Goto(name) if name == "end"));
    let NodeKind::Label { name, body: inner } = &body[1].kind else {
        panic!("expected label");
    };
    assert_eq!(name, "end");
    assert!(matches!(inner.kind, NodeKind::Return(_)));
}

#[test]
fn control_flow_statements_parse() {
    let program = parse(
        "int main(){\
           int i; i = 0;\
           for (int j = 0; j < 10; j = j + 1) { if (j == 5) continue; if (j == 8) break; i = i + j; }\
           while (i > 0) i = i - 1;\
           return i;\
         }",
    );
    let kinds: Vec<bool> = program.fns[0]
        .body
        .iter()
        .map(|stmt| {
            matches!(
                stmt.kind,
                NodeKind::For { .. } | NodeKind::While { .. }
            )
        })
        .collect();
    assert_eq!(kinds, vec![false, false, true, true, false]);
}

#[test]
fn leaving_a_scope_restores_bindings() {
    let err = parse_err("int main(){ { int inner; inner = 1; } return inner; }");
    assert!(err.contains("undefined variable"), "{err}");
}

#[test]
fn for_initializer_declaration_is_loop_local() {
    let err =
        parse_err("int main(){ for (int i = 0; i < 1; i = i + 1) ; return i; }");
    assert!(err.contains("undefined variable"), "{err}");
}

#[test]
fn innermost_binding_wins() {
    let program = parse("long x; int main(){ char x; return sizeof(x); }");
    assert_eq!(ret_value(&program), 1);
}

// ----------------------------------------------------------------------
// program contract

#[test]
fn prototypes_are_discarded() {
    let program = parse("int three(); int main(){ return three(); }");
    assert_eq!(program.fns.len(), 1);
    assert_eq!(program.fns[0].name, "main");
}

#[test]
fn stack_offsets_are_positive_and_monotonic() {
    let program = parse("int main(){ int a; char b; long c; return 0; }");
    let func = &program.fns[0];
    let offsets: Vec<i32> = func
        .locals
        .iter()
        .map(|&id| program.vars.get(id).offset)
        .collect();
    assert_eq!(offsets, vec![4, 5, 13]);
    assert_eq!(func.stack_size, 16);
}

#[test]
fn parameters_occupy_the_frame() {
    let program = parse("int add2(int x, int y){ return x + y; }");
    let func = &program.fns[0];
    assert_eq!(func.params.len(), 2);
    assert_eq!(func.locals.len(), 2);
    assert_eq!(func.stack_size, 16);
}

#[test]
fn static_functions_are_marked() {
    let program = parse("static int helper(){ return 1; } int main(){ return helper(); }");
    assert!(program.fns[0].is_static);
    assert!(!program.fns[1].is_static);
}

#[test]
fn every_expression_is_typed_and_every_global_complete() {
    let program = parse(
        "struct Pt { int x; int y; };\
         int g[3] = {1,2,3};\
         char *msg = \"hello\";\
         int add(int a, int b);\
         int add(int a, int b) { return a + b; }\
         int main() {\
           struct Pt p = {1, 2};\
           int i;\
           for (i = 0; i < 3; i = i + 1) { g[i] = add(g[i], p.x); }\
           switch (g[0]) { case 1: break; default: ; }\
           char local[4] = \"ab\";\
           long n = 100L;\
           return (int)n + g[1] + *msg + local[0] + sizeof(struct Pt);\
         }",
    );

    for func in &program.fns {
        for stmt in &func.body {
            assert_fully_typed(stmt);
        }
        assert!(!func.body.is_empty());
    }
    for &id in &program.globals {
        let var = program.vars.get(id);
        assert!(!program.types.get(var.ty).incomplete, "{}", var.name);
    }
}

/// Walk a tree asserting that every expression node carries a type.
fn assert_fully_typed(node: &Node) {
    let is_expression = matches!(
        node.kind,
        NodeKind::Num(_)
            | NodeKind::Var { .. }
            | NodeKind::Binary { .. }
            | NodeKind::Assign { .. }
            | NodeKind::Not(_)
            | NodeKind::BitNot(_)
            | NodeKind::PreInc(_)
            | NodeKind::PreDec(_)
            | NodeKind::PostInc(_)
            | NodeKind::PostDec(_)
            | NodeKind::Addr(_)
            | NodeKind::Deref(_)
            | NodeKind::Member { .. }
            | NodeKind::Cast(_)
            | NodeKind::Funcall { .. }
            | NodeKind::Comma { .. }
            | NodeKind::Ternary { .. }
            | NodeKind::StmtExpr(_)
    );
    if is_expression {
        assert!(node.ty.is_some(), "untyped expression: {:?}", node.kind);
    }

    match &node.kind {
        NodeKind::Binary { lhs, rhs, .. }
        | NodeKind::Assign { lhs, rhs, .. }
        | NodeKind::Comma { lhs, rhs } => {
            assert_fully_typed(lhs);
            assert_fully_typed(rhs);
        }
        NodeKind::Not(x)
        | NodeKind::BitNot(x)
        | NodeKind::PreInc(x)
        | NodeKind::PreDec(x)
        | NodeKind::PostInc(x)
        | NodeKind::PostDec(x)
        | NodeKind::Addr(x)
        | NodeKind::Deref(x)
        | NodeKind::Cast(x)
        | NodeKind::ExprStmt(x) => assert_fully_typed(x),
        NodeKind::Member { base, .. } => assert_fully_typed(base),
        NodeKind::Funcall { args, .. } => {
            args.iter().for_each(assert_fully_typed)
        }
        NodeKind::Ternary { cond, then, els } => {
            assert_fully_typed(cond);
            assert_fully_typed(then);
            assert_fully_typed(els);
        }
        NodeKind::StmtExpr(body) | NodeKind::Block(body) => {
            body.iter().for_each(assert_fully_typed)
        }
        NodeKind::Return(value) => {
            if let Some(value) = value {
                assert_fully_typed(value);
            }
        }
        NodeKind::If { cond, then, els } => {
            assert_fully_typed(cond);
            assert_fully_typed(then);
            if let Some(els) = els {
                assert_fully_typed(els);
            }
        }
        NodeKind::While { cond, then } => {
            assert_fully_typed(cond);
            assert_fully_typed(then);
        }
        NodeKind::For {
            init,
            cond,
            inc,
            then,
        } => {
            [init, cond, inc]
                .into_iter()
                .flatten()
                .for_each(|n| assert_fully_typed(n));
            assert_fully_typed(then);
        }
        NodeKind::Switch { cond, then, .. } => {
            assert_fully_typed(cond);
            assert_fully_typed(then);
        }
        NodeKind::Case { body, .. } | NodeKind::Label { body, .. } => {
            assert_fully_typed(body)
        }
        NodeKind::Var { init, .. } => {
            if let Some(init) = init {
                assert_fully_typed(init);
            }
        }
        NodeKind::Num(_)
        | NodeKind::Break
        | NodeKind::Continue
        | NodeKind::Goto(_)
        | NodeKind::Null => {}
    }
}

// ----------------------------------------------------------------------
// diagnostics

#[test]
fn diagnostics_name_the_file_line_and_column() {
    let err = parse_err("int main() {\n  return $;\n}");
    assert!(err.contains("test.c:2:"), "{err}");
    assert!(err.contains("return $;"), "{err}");
    assert!(err.contains("^ expected expression"), "{err}");
}

#[test]
fn empty_input_is_an_empty_program() {
    let program = parse("");
    assert!(program.fns.is_empty());
    assert!(program.globals.is_empty());
}
