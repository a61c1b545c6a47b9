//! Compiler behaviour tests: emitted bytes, diagnostics and pattern semantics.

use std::sync::Arc;

use pretty_assertions::assert_eq;

use super::test_vm::{run, Outcome, TestValue};
use super::*;
use crate::ast::*;
use crate::bytecode::opcode::{Instructions, CLOSURE_TERMINATOR};
use crate::bytecode::{IvarIndexTable, OpCode::*};

// --- Tree builders ---

fn sp(line: usize) -> Span {
    Span::at(line, 1)
}

fn e(kind: ExprKind) -> Expr {
    Expr::new(kind, sp(1))
}

fn s(kind: StmtKind) -> Stmt {
    Stmt::new(kind, sp(1))
}

fn int(n: i64) -> Expr {
    e(ExprKind::Int(n))
}

fn ident(name: &str) -> Expr {
    e(ExprKind::Identifier(name.to_string()))
}

fn ivar(name: &str) -> Expr {
    e(ExprKind::InstanceVariable(name.to_string()))
}

fn list(items: Vec<Expr>) -> Expr {
    e(ExprKind::List(items))
}

fn expr_stmt(expr: Expr) -> Stmt {
    s(StmtKind::Expression(expr))
}

fn declare(name: &str, mutable: bool, initializer: Option<Expr>) -> Stmt {
    s(StmtKind::Variable(VariableDecl {
        name: name.to_string(),
        mutable,
        type_annotation: None,
        initializer,
    }))
}

fn var(name: &str, initializer: Expr) -> Stmt {
    declare(name, true, Some(initializer))
}

fn val(name: &str, initializer: Expr) -> Stmt {
    declare(name, false, Some(initializer))
}

fn assign(name: &str, value: Expr) -> Stmt {
    expr_stmt(e(ExprKind::Assign {
        target: AssignTarget::Local(name.to_string()),
        operator: None,
        value: Box::new(value),
    }))
}

fn closure(body: Vec<Stmt>) -> Expr {
    e(ExprKind::Closure {
        params: Vec::new(),
        body,
    })
}

fn namespace(kind: NamespaceKind, name: &str, superclass: Option<&str>, body: Vec<Stmt>) -> Stmt {
    s(StmtKind::Namespace(NamespaceDecl {
        kind,
        path: NamespacePath::parse(name),
        superclass: superclass.map(NamespacePath::parse),
        body,
    }))
}

fn class(name: &str, superclass: Option<&str>, body: Vec<Stmt>) -> Stmt {
    namespace(NamespaceKind::Class, name, superclass, body)
}

fn method(name: &str, params: Vec<Parameter>, body: Vec<Stmt>) -> Stmt {
    s(StmtKind::Method(MethodDecl {
        name: name.to_string(),
        params,
        body,
    }))
}

fn ivar_decl(name: &str) -> Stmt {
    s(StmtKind::InstanceVariable {
        name: name.to_string(),
        type_annotation: None,
    })
}

fn pat(kind: PatternKind) -> Pattern {
    Pattern::new(kind, sp(1))
}

fn bind(name: &str) -> Pattern {
    pat(PatternKind::Binding(name.to_string()))
}

fn lit(n: i64) -> Pattern {
    pat(PatternKind::Literal(Literal::Int(n)))
}

fn list_pattern(elements: Vec<Pattern>, rest: Option<RestElement>) -> Pattern {
    pat(PatternKind::Sequence {
        kind: SequenceKind::List,
        elements,
        rest,
    })
}

fn pattern_decl(pattern: Pattern, mutable: bool, initializer: Expr) -> Stmt {
    s(StmtKind::PatternVariable {
        pattern,
        mutable,
        initializer,
    })
}

// --- Drivers ---

fn compile_in(registry: &NamespaceRegistry, statements: Vec<Stmt>) -> CompileOutput {
    let program = Program::new(statements);
    compile(&program, &CompilerOptions::for_file("test.bas"), registry)
}

fn compile_unit(statements: Vec<Stmt>) -> CompileOutput {
    compile_in(&NamespaceRegistry::new(), statements)
}

fn compile_ok(statements: Vec<Stmt>) -> CompiledFunction {
    let output = compile_unit(statements);
    let failures: Vec<String> = output.diagnostics.failures().map(|f| f.to_string()).collect();
    assert_eq!(failures, Vec::<String>::new());
    output.function.expect("compiled function")
}

fn failures(statements: Vec<Stmt>) -> Vec<String> {
    let output = compile_unit(statements);
    assert!(output.function.is_none(), "expected no output");
    output.diagnostics.failures().map(|f| f.to_string()).collect()
}

fn bytes(ops: &[u8]) -> Vec<u8> {
    ops.to_vec()
}

fn nested<'a>(function: &'a CompiledFunction, name: &str) -> &'a CompiledFunction {
    function
        .find(name)
        .unwrap_or_else(|| panic!("no function named {}", name))
}

// --- Golden output ---

#[test]
fn test_top_level_constant() {
    let main = compile_ok(vec![s(StmtKind::Constant {
        name: "Foo".to_string(),
        type_annotation: None,
        value: int(3),
    })]);
    assert_eq!(
        main.instructions,
        bytes(&[GetConst8 as u8, 1, LoadValue2 as u8, LoadValue3 as u8, DefConst as u8, Nil as u8, Return as u8])
    );
    assert_eq!(
        main.constants,
        vec![
            Value::Nil,
            Value::symbol("Root"),
            Value::symbol("Foo"),
            Value::SmallInt(3)
        ]
    );
    assert_eq!(main.name, "<main>");
    assert_eq!(main.line_table.entries.len(), 1);
    assert_eq!(main.line_table.total(), 6);
}

#[test]
fn test_sibling_blocks_reuse_slots() {
    let block = |a: &str, b: &str, first: i64| {
        expr_stmt(e(ExprKind::Do(vec![
            var(a, int(first)),
            var(b, int(first + 1)),
        ])))
    };
    let main = compile_ok(vec![block("a", "b", 1), block("c", "d", 3)]);
    assert_eq!(
        main.instructions,
        bytes(&[
            PrepLocals8 as u8, 2,
            LoadInt1 as u8, SetLocal1 as u8, Pop as u8,
            LoadInt2 as u8, SetLocal2 as u8, Pop as u8,
            Nil as u8, Pop as u8,
            LoadInt3 as u8, SetLocal1 as u8, Pop as u8,
            LoadInt4 as u8, SetLocal2 as u8, Pop as u8,
            Nil as u8, Pop as u8,
            Nil as u8, Return as u8,
        ])
    );
}

#[test]
fn test_integer_literal_encodings() {
    let main = compile_ok(vec![
        expr_stmt(int(100)),
        expr_stmt(int(1000)),
        expr_stmt(int(-3)),
    ]);
    assert_eq!(
        main.instructions,
        bytes(&[
            LoadInt8 as u8, 100, Pop as u8,
            LoadValue1 as u8, Pop as u8,
            LoadInt8 as u8, 0xFD, Pop as u8,
            Nil as u8, Return as u8,
        ])
    );
    assert_eq!(main.constants[1], Value::SmallInt(1000));
}

#[test]
fn test_fifth_local_uses_operand_form() {
    let mut statements: Vec<Stmt> = ["a", "b", "c", "d", "e"]
        .iter()
        .map(|name| var(name, int(0)))
        .collect();
    statements.push(expr_stmt(e(ExprKind::Call {
        callee: Box::new(ident("e")),
        arguments: vec![ident("d")],
    })));
    let main = compile_ok(statements);
    let tail = &main.instructions[main.instructions.len() - 8..];
    assert_eq!(
        tail,
        &[GetLocal8 as u8, 5, GetLocal4 as u8, Call as u8, 1, Pop as u8, Nil as u8, Return as u8]
    );
}

#[test]
fn test_locals_past_255_use_wide_operands() {
    let mut statements: Vec<Stmt> = (0..300).map(|i| var(&format!("v{}", i), int(0))).collect();
    statements.push(expr_stmt(e(ExprKind::Call {
        callee: Box::new(ident("v299")),
        arguments: vec![],
    })));
    let main = compile_ok(statements);
    assert_eq!(&main.instructions[..3], &[PrepLocals16 as u8, 0x01, 0x2C]);

    let wide: Vec<(usize, OpCode)> = Instructions::new(&main.instructions)
        .filter(|(_, op)| matches!(op, GetLocal16 | SetLocal16))
        .collect();
    assert_eq!(wide.len(), 300 - 255 + 1);
    let (at, op) = wide[wide.len() - 1];
    assert_eq!(op, GetLocal16);
    assert_eq!(&main.instructions[at..at + 3], &[GetLocal16 as u8, 0x01, 0x2C]);
    assert_eq!(
        &main.instructions[at - 5..at],
        &[LoadInt0 as u8, SetLocal16 as u8, 0x01, 0x2C, Pop as u8]
    );
}

#[test]
fn test_while_loop() {
    let main = compile_ok(vec![
        var("i", int(0)),
        s(StmtKind::While {
            condition: e(ExprKind::Binary {
                operator: BinaryOp::Less,
                left: Box::new(ident("i")),
                right: Box::new(int(3)),
            }),
            body: vec![assign(
                "i",
                e(ExprKind::Binary {
                    operator: BinaryOp::Add,
                    left: Box::new(ident("i")),
                    right: Box::new(int(1)),
                }),
            )],
        }),
    ]);
    assert_eq!(
        main.instructions,
        bytes(&[
            PrepLocals8 as u8, 1,
            LoadInt0 as u8, SetLocal1 as u8, Pop as u8,
            GetLocal1 as u8, LoadInt3 as u8, Less as u8, JumpUnless as u8, 0, 8,
            GetLocal1 as u8, LoadInt1 as u8, Add as u8, SetLocal1 as u8, Pop as u8,
            Loop as u8, 0, 14,
            Nil as u8, Return as u8,
        ])
    );
}

#[test]
fn test_if_else_and_short_circuit() {
    let main = compile_ok(vec![
        expr_stmt(e(ExprKind::If {
            condition: Box::new(e(ExprKind::True)),
            then_branch: vec![expr_stmt(int(1))],
            else_branch: Some(vec![expr_stmt(int(2))]),
        })),
        expr_stmt(e(ExprKind::LogicalAnd {
            left: Box::new(e(ExprKind::True)),
            right: Box::new(e(ExprKind::False)),
        })),
    ]);
    assert_eq!(
        main.instructions,
        bytes(&[
            True as u8, JumpUnless as u8, 0, 4,
            LoadInt1 as u8, Jump as u8, 0, 1,
            LoadInt2 as u8, Pop as u8,
            True as u8, JumpUnlessNp as u8, 0, 2, Pop as u8, False as u8, Pop as u8,
            Nil as u8, Return as u8,
        ])
    );
}

#[test]
fn test_optional_parameter_prologue() {
    let main = compile_ok(vec![method(
        "f",
        vec![
            Parameter::required("a", sp(1)),
            Parameter::optional("b", int(2), sp(1)),
        ],
        vec![expr_stmt(ident("b"))],
    )]);
    let f = nested(&main, "f");
    assert_eq!(
        f.instructions,
        bytes(&[
            GetLocal2 as u8, JumpUnlessUndef as u8, 0, 3,
            LoadInt2 as u8, SetLocal2 as u8, Pop as u8,
            GetLocal2 as u8, Return as u8,
        ])
    );
    assert_eq!((f.required_params, f.optional_params), (1, 1));

    let definitions = nested(&main, "<methodDefinitions>");
    assert_eq!(definitions.constants[1], Value::symbol("Root::Std::Object"));
}

// --- Closures ---

#[test]
fn test_upvalues_in_first_capture_order() {
    let main = compile_ok(vec![
        var("a", int(1)),
        var("b", int(2)),
        val(
            "f",
            closure(vec![
                expr_stmt(ident("a")),
                expr_stmt(ident("b")),
                expr_stmt(ident("a")),
            ]),
        ),
    ]);
    assert_eq!(
        main.instructions,
        bytes(&[
            PrepLocals8 as u8, 3,
            LoadInt1 as u8, SetLocal1 as u8, Pop as u8,
            LoadInt2 as u8, SetLocal2 as u8, Pop as u8,
            Closure as u8, 0, 1, 1, 1, 1, 2, CLOSURE_TERMINATOR,
            SetLocal3 as u8, Pop as u8,
            Nil as u8, Return as u8,
        ])
    );
    let f = nested(&main, "<closure>");
    assert_eq!(f.upvalue_count, 2);
    assert_eq!(
        f.instructions,
        bytes(&[
            GetUpvalue0 as u8, Pop as u8,
            GetUpvalue1 as u8, Pop as u8,
            GetUpvalue0 as u8, Return as u8,
        ])
    );
}

#[test]
fn test_captured_slot_closed_once_at_scope_exit() {
    let main = compile_ok(vec![expr_stmt(e(ExprKind::Do(vec![
        var("x", int(1)),
        expr_stmt(closure(vec![expr_stmt(ident("x"))])),
        expr_stmt(closure(vec![expr_stmt(ident("x"))])),
    ])))]);
    assert_eq!(
        main.instructions,
        bytes(&[
            PrepLocals8 as u8, 1,
            LoadInt1 as u8, SetLocal1 as u8, Pop as u8,
            Closure as u8, 0, 1, 1, 1, CLOSURE_TERMINATOR, Pop as u8,
            Closure as u8, 0, 2, 1, 1, CLOSURE_TERMINATOR,
            CloseUpvalue1 as u8, Pop as u8,
            Nil as u8, Return as u8,
        ])
    );
    let closes = Instructions::new(&main.instructions)
        .filter(|(_, op)| *op == CloseUpvalue1)
        .count();
    assert_eq!(closes, 1);
}

#[test]
fn test_nested_closure_chains_through_parent_upvalue() {
    let main = compile_ok(vec![
        var("a", int(1)),
        expr_stmt(closure(vec![expr_stmt(closure(vec![expr_stmt(ident("a"))]))])),
    ]);
    let outer = nested(&main, "<closure>");
    // CLOSURE <fn> <parent upvalue 0> 0xFF, then RETURN
    assert_eq!(
        outer.instructions,
        bytes(&[Closure as u8, 0, 1, 0, 0, CLOSURE_TERMINATOR, Return as u8])
    );
    assert_eq!(outer.upvalue_count, 1);
    let inner = outer.nested_functions().next().expect("inner closure");
    assert_eq!(inner.instructions, bytes(&[GetUpvalue0 as u8, Return as u8]));
}

// --- Namespaces ---

#[test]
fn test_class_unit_layout() {
    let main = compile_ok(vec![class(
        "Foo",
        None,
        vec![ivar_decl("a"), method("get", vec![], vec![expr_stmt(ivar("a"))])],
    )]);
    assert_eq!(
        main.instructions,
        bytes(&[
            LoadValue1 as u8, Exec as u8, Pop as u8,
            LoadValue2 as u8, Exec as u8, Pop as u8,
            LoadValue3 as u8, Exec as u8, Pop as u8,
            Nil as u8, Return as u8,
        ])
    );
    let names: Vec<&str> = main.nested_functions().map(|f| f.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["<namespaceDefinitions>", "<ivarIndices>", "<methodDefinitions>"]
    );

    let namespaces = nested(&main, "<namespaceDefinitions>");
    assert_eq!(
        namespaces.instructions,
        bytes(&[GetConst8 as u8, 1, LoadValue2 as u8, DefNamespace as u8, 1, Nil as u8, Return as u8])
    );
    assert_eq!(namespaces.constants[1..], [Value::symbol("Root"), Value::symbol("Foo")]);

    let ivars = nested(&main, "<ivarIndices>");
    assert_eq!(
        ivars.instructions,
        bytes(&[GetConst8 as u8, 1, LoadValue2 as u8, DefIvars as u8, Nil as u8, Return as u8])
    );
    let expected: IvarIndexTable = ["a"].into_iter().collect();
    assert_eq!(ivars.constants[2], Value::IvarIndices(expected));

    let methods = nested(&main, "<methodDefinitions>");
    assert_eq!(
        methods.instructions,
        bytes(&[
            GetConst8 as u8, 1, LoadValue2 as u8, LoadValue3 as u8, DefMethod as u8,
            Nil as u8, Return as u8,
        ])
    );
    assert_eq!(methods.constants[3], Value::symbol("get"));
    assert_eq!(nested(&main, "get").instructions, bytes(&[GetIvar8 as u8, 0, Return as u8]));
}

#[test]
fn test_superclass_link() {
    let main = compile_ok(vec![class("A", None, vec![]), class("B", Some("A"), vec![])]);
    let namespaces = nested(&main, "<namespaceDefinitions>");
    assert_eq!(
        namespaces.instructions,
        bytes(&[
            GetConst8 as u8, 1, LoadValue2 as u8, DefNamespace as u8, 1,
            GetConst8 as u8, 1, LoadValue3 as u8, DefNamespace as u8, 1,
            GetConst8 as u8, 4, GetConst8 as u8, 5, SetSuperclass as u8,
            Nil as u8, Return as u8,
        ])
    );
    assert_eq!(namespaces.constants[4], Value::symbol("Root::B"));
    assert_eq!(namespaces.constants[5], Value::symbol("Root::A"));
    assert_eq!(main.instructions, bytes(&[LoadValue1 as u8, Exec as u8, Pop as u8, Nil as u8, Return as u8]));
}

#[test]
fn test_namespace_body_runs_through_init_namespace() {
    let main = compile_ok(vec![class(
        "Foo",
        None,
        vec![expr_stmt(e(ExprKind::Binary {
            operator: BinaryOp::Add,
            left: Box::new(int(1)),
            right: Box::new(int(2)),
        }))],
    )]);
    assert_eq!(
        main.instructions,
        bytes(&[
            LoadValue3 as u8, Exec as u8, Pop as u8,
            GetConst8 as u8, 1, LoadValue2 as u8, InitNamespace as u8,
            Nil as u8, Return as u8,
        ])
    );
    let body = nested(&main, "<namespace: Root::Foo>");
    assert_eq!(
        body.instructions,
        bytes(&[LoadInt1 as u8, LoadInt2 as u8, Add as u8, Pop as u8, Nil as u8, Return as u8])
    );
}

#[test]
fn test_singleton_members_target_the_singleton() {
    let main = compile_ok(vec![class(
        "Foo",
        None,
        vec![s(StmtKind::Singleton(vec![
            ivar_decl("count"),
            method("count", vec![], vec![expr_stmt(ivar("count"))]),
        ]))],
    )]);
    let methods = nested(&main, "<methodDefinitions>");
    assert_eq!(
        methods.instructions,
        bytes(&[
            GetConst8 as u8, 1, GetSingleton as u8, LoadValue2 as u8, LoadValue3 as u8,
            DefMethod as u8, Nil as u8, Return as u8,
        ])
    );
    let ivars = nested(&main, "<ivarIndices>");
    assert_eq!(
        ivars.instructions,
        bytes(&[
            GetConst8 as u8, 1, GetSingleton as u8, LoadValue2 as u8, DefIvars as u8,
            Nil as u8, Return as u8,
        ])
    );
    assert_eq!(nested(&main, "count").instructions, bytes(&[GetIvar8 as u8, 0, Return as u8]));
}

#[test]
fn test_attributes_and_aliases() {
    let main = compile_ok(vec![class(
        "Foo",
        None,
        vec![
            s(StmtKind::Attribute {
                kind: AttributeKind::Accessor,
                entries: vec![AttributeEntry {
                    name: "x".to_string(),
                    type_annotation: None,
                }],
            }),
            s(StmtKind::Alias(vec![AliasEntry {
                new_name: "y".to_string(),
                old_name: "x".to_string(),
            }])),
        ],
    )]);
    let methods = nested(&main, "<methodDefinitions>");
    assert_eq!(
        methods.instructions,
        bytes(&[
            GetConst8 as u8, 1, LoadValue2 as u8, DefGetter as u8,
            GetConst8 as u8, 1, LoadValue2 as u8, DefSetter as u8,
            GetConst8 as u8, 1, LoadValue3 as u8, LoadValue2 as u8, DefMethodAlias as u8,
            Nil as u8, Return as u8,
        ])
    );
    let ivars = nested(&main, "<ivarIndices>");
    let expected: IvarIndexTable = ["x"].into_iter().collect();
    assert_eq!(ivars.constants[2], Value::IvarIndices(expected));
}

#[test]
fn test_mixin_ivars_compile_to_name_lookups() {
    let registry = NamespaceRegistry::new();
    let output = compile_in(
        &registry,
        vec![
            namespace(
                NamespaceKind::Mixin,
                "M",
                None,
                vec![ivar_decl("m"), method("get_m", vec![], vec![expr_stmt(ivar("m"))])],
            ),
            class(
                "Foo",
                None,
                vec![
                    ivar_decl("a"),
                    s(StmtKind::Include(vec![NamespacePath::parse("M")])),
                    method("get_a", vec![], vec![expr_stmt(ivar("a"))]),
                ],
            ),
        ],
    );
    let main = output.function.expect("compiled");

    let get_m = nested(&main, "get_m");
    assert_eq!(get_m.instructions, bytes(&[GetIvarName8 as u8, 1, Return as u8]));
    assert_eq!(get_m.constants[1], Value::symbol("m"));
    let get_a = nested(&main, "get_a");
    assert_eq!(get_a.instructions, bytes(&[GetIvar8 as u8, 0, Return as u8]));

    let namespaces = nested(&main, "<namespaceDefinitions>");
    let includes = Instructions::new(&namespaces.instructions)
        .filter(|(_, op)| *op == Include)
        .count();
    assert_eq!(includes, 1);

    let snapshot = registry.snapshot();
    let foo = snapshot.namespace("Root::Foo").expect("published");
    assert_eq!(foo.ivars.index_of("a"), Some(0));
    assert_eq!(foo.ivars.index_of("m"), Some(1));
    assert_eq!(foo.mixins, vec!["Root::M".to_string()]);
}

#[test]
fn test_subclass_layout_extends_superclass() {
    let registry = NamespaceRegistry::new();
    compile_in(
        &registry,
        vec![
            class("Base", None, vec![ivar_decl("a"), ivar_decl("b")]),
            class("Derived", Some("Base"), vec![ivar_decl("c")]),
        ],
    )
    .function
    .expect("compiled");
    let snapshot = registry.snapshot();
    let base = &snapshot.namespace("Root::Base").expect("base").ivars;
    let derived = &snapshot.namespace("Root::Derived").expect("derived").ivars;
    assert!(derived.extends(base));
    assert!(derived.iter().skip(base.len()).all(|(_, index)| index >= base.len()));
    assert_eq!(derived.index_of("c"), Some(2));
}

#[test]
fn test_later_units_see_published_namespaces() {
    let registry = NamespaceRegistry::new();
    assert!(compile_in(&registry, vec![class("Foo", None, vec![])]).is_success());
    assert!(compile_in(&registry, vec![class("Bar", Some("Foo"), vec![])]).is_success());

    let output = compile_in(
        &registry,
        vec![namespace(NamespaceKind::Module, "Foo", None, vec![])],
    );
    let failures: Vec<String> = output.diagnostics.failures().map(|f| f.to_string()).collect();
    assert_eq!(failures, vec!["cannot redeclare class `Foo` as a module".to_string()]);

    let failed = compile_in(
        &registry,
        vec![class("Baz", None, vec![]), expr_stmt(ident("missing"))],
    );
    assert!(!failed.is_success());
    assert!(registry.snapshot().namespace("Root::Baz").is_none());
}

#[test]
fn test_unit_compiled_against_stale_snapshot() {
    let registry = NamespaceRegistry::new();
    let base = registry.snapshot();
    let options = CompilerOptions::for_file("test.bas");
    let against_base = |statements: Vec<Stmt>| {
        compile_against(&Program::new(statements), &options, &registry, Arc::clone(&base))
    };
    let failure_messages = |output: &CompileOutput| -> Vec<String> {
        output.diagnostics.failures().map(|f| f.to_string()).collect()
    };

    assert!(against_base(vec![class("Foo", None, vec![ivar_decl("a")])]).is_success());
    assert!(against_base(vec![class("Bar", None, vec![])]).is_success());

    let retyped = against_base(vec![namespace(NamespaceKind::Module, "Foo", None, vec![])]);
    assert!(!retyped.is_success());
    assert_eq!(
        failure_messages(&retyped),
        vec!["cannot redeclare class `Foo` as a module".to_string()]
    );

    let relaid = against_base(vec![class("Foo", None, vec![ivar_decl("b")])]);
    assert!(!relaid.is_success());
    assert_eq!(
        failure_messages(&relaid),
        vec![
            "instance variables of `Foo` were changed by another unit during compilation"
                .to_string()
        ]
    );

    assert!(against_base(vec![class("Foo", None, vec![])]).is_success());

    let snapshot = registry.snapshot();
    let foo = snapshot.namespace("Root::Foo").expect("Foo registered");
    assert_eq!(foo.kind, NamespaceKind::Class);
    let expected: IvarIndexTable = ["a"].into_iter().collect();
    assert_eq!(foo.ivars, expected);
    assert!(snapshot.namespace("Root::Bar").is_some());
}

#[test]
fn test_using_alias_resolves_constant() {
    let main = compile_ok(vec![
        namespace(
            NamespaceKind::Module,
            "A",
            None,
            vec![class("B", None, vec![])],
        ),
        s(StmtKind::Using(vec![UsingEntry::Constant {
            path: NamespacePath::parse("A::B"),
            alias: Some("C".to_string()),
        }])),
        expr_stmt(e(ExprKind::New {
            class: NamespacePath::parse("C"),
            arguments: vec![],
        })),
    ]);
    assert!(main.constants.contains(&Value::symbol("Root::A::B")));
    let tail = &main.instructions[main.instructions.len() - 7..];
    assert_eq!(
        tail,
        &[GetConst8 as u8, 1, Instantiate8 as u8, 0, Pop as u8, Nil as u8, Return as u8]
    );
}

#[test]
fn test_nested_namespace_does_not_shadow_outer_path() {
    let main = compile_ok(vec![
        namespace(
            NamespaceKind::Module,
            "A",
            None,
            vec![class("X", None, vec![])],
        ),
        namespace(
            NamespaceKind::Module,
            "C",
            None,
            vec![
                namespace(NamespaceKind::Module, "A", None, vec![]),
                s(StmtKind::Constant {
                    name: "Y".to_string(),
                    type_annotation: None,
                    value: e(ExprKind::Constant(NamespacePath::parse("A::X"))),
                }),
            ],
        ),
    ]);
    let body = nested(&main, "<namespace: Root::C>");
    assert!(body.constants.contains(&Value::symbol("Root::A::X")));
}

// --- Diagnostics ---

#[test]
fn test_singleton_in_method_reports_each_violation() {
    let failures = failures(vec![method(
        "m",
        vec![],
        vec![s(StmtKind::Singleton(vec![method("n", vec![], vec![])]))],
    )]);
    assert_eq!(
        failures,
        vec![
            "cannot declare singleton blocks in a method or block body".to_string(),
            "cannot declare methods in this context".to_string(),
        ]
    );
}

#[test]
fn test_local_failures() {
    assert_eq!(
        failures(vec![expr_stmt(ident("x")), expr_stmt(ident("y"))]),
        vec!["undefined local `x`".to_string(), "undefined local `y`".to_string()]
    );
    assert_eq!(
        failures(vec![val("a", int(1)), assign("a", int(2))]),
        vec!["cannot reassign a val: `a`".to_string()]
    );
    assert_eq!(
        failures(vec![declare("a", true, None), expr_stmt(ident("a"))]),
        vec!["cannot access uninitialised local `a`".to_string()]
    );
    assert_eq!(
        failures(vec![var("a", int(1)), var("a", int(2))]),
        vec!["cannot redeclare local `a` in the same scope".to_string()]
    );
}

#[test]
fn test_val_without_initializer_takes_one_assignment() {
    compile_ok(vec![
        declare("a", false, None),
        assign("a", int(1)),
        expr_stmt(e(ExprKind::Call {
            callee: Box::new(ident("a")),
            arguments: vec![],
        })),
    ]);
}

#[test]
fn test_parameter_failures() {
    let failures = failures(vec![method(
        "f",
        vec![
            Parameter::optional("a", int(1), sp(1)),
            Parameter::required("b", sp(1)),
            Parameter::required("b", sp(1)),
        ],
        vec![],
    )]);
    assert_eq!(
        failures,
        vec![
            "required parameter `b` cannot follow optional parameters".to_string(),
            "duplicated parameter `b`".to_string(),
            "required parameter `b` cannot follow optional parameters".to_string(),
        ]
    );
}

#[test]
fn test_declaration_context_failures() {
    assert_eq!(
        failures(vec![expr_stmt(ivar("x"))]),
        vec!["cannot use instance variables in this context".to_string()]
    );
    assert_eq!(
        failures(vec![namespace(NamespaceKind::Module, "M", None, vec![ivar_decl("x")])]),
        vec!["cannot declare instance variables in a module".to_string()]
    );
    assert_eq!(
        failures(vec![expr_stmt(e(ExprKind::Constant(NamespacePath::parse("Nope"))))]),
        vec!["undefined constant `Nope`".to_string()]
    );
    assert_eq!(
        failures(vec![namespace(
            NamespaceKind::Interface,
            "I",
            None,
            vec![method("m", vec![], vec![])]
        )]),
        vec!["cannot declare methods in an interface".to_string()]
    );
}

#[test]
fn test_signatures_and_includes_are_checked_in_place() {
    let signature = || {
        s(StmtKind::MethodSignature {
            name: "area".to_string(),
            params: vec![],
        })
    };
    let main = compile_ok(vec![namespace(
        NamespaceKind::Interface,
        "Shape",
        None,
        vec![signature()],
    )]);
    assert!(main.find("<namespace: Root::Shape>").is_none());

    assert_eq!(
        failures(vec![class("Square", None, vec![signature()])]),
        vec!["cannot declare method signatures in a class".to_string()]
    );
    assert_eq!(
        failures(vec![namespace(
            NamespaceKind::Module,
            "M",
            None,
            vec![s(StmtKind::Include(vec![NamespacePath::parse("Comparable")]))]
        )]),
        vec!["cannot declare includes in a module".to_string()]
    );
}

#[test]
fn test_warnings_keep_output() {
    let output = compile_unit(vec![
        expr_stmt(int(1)),
        method(
            "m",
            vec![],
            vec![
                s(StmtKind::Return(Some(int(1)))),
                expr_stmt(e(ExprKind::SelfCall {
                    name: "other".to_string(),
                    arguments: vec![],
                })),
            ],
        ),
    ]);
    assert!(output.is_success());
    let warnings: Vec<String> = output.diagnostics.warnings().map(|w| w.to_string()).collect();
    assert_eq!(
        warnings,
        vec!["unused expression value".to_string(), "unreachable code".to_string()]
    );

    let options = CompilerOptions {
        warn_unused_values: false,
        warn_unreachable_code: false,
        ..CompilerOptions::default()
    };
    let quiet = compile(
        &Program::new(vec![expr_stmt(int(1))]),
        &options,
        &NamespaceRegistry::new(),
    );
    assert!(quiet.diagnostics.is_empty());
}

#[test]
fn test_line_table_covers_every_instruction() {
    let program = vec![
        class(
            "Point",
            None,
            vec![
                ivar_decl("x"),
                method(
                    "shift",
                    vec![Parameter::optional("by", int(1), sp(3))],
                    vec![expr_stmt(closure(vec![expr_stmt(ident("by"))]))],
                ),
            ],
        ),
        pattern_decl(list_pattern(vec![lit(1), bind("a")], None), true, list(vec![int(1), int(2)])),
        var("i", int(0)),
        s(StmtKind::While {
            condition: ident("a"),
            body: vec![assign("i", int(1))],
        }),
    ];
    let main = compile_ok(program);
    let mut checked = 0;
    main.walk(&mut |function| {
        assert_eq!(
            function.line_table.total(),
            Instructions::new(&function.instructions).count(),
            "line table of {}",
            function.name
        );
        checked += 1;
    });
    assert!(checked >= 6);
}

// --- Patterns ---

#[test]
fn test_list_pattern_round_trip() {
    let declaration = |value: Expr| {
        compile_ok(vec![pattern_decl(
            list_pattern(vec![lit(1), bind("a")], None),
            false,
            value,
        )])
    };

    let matched = run(&declaration(list(vec![int(1), int(2)])));
    assert_eq!(matched.outcome, Outcome::Returned(TestValue::Nil));
    assert_eq!(matched.local(2), Some(&TestValue::Int(2)));

    for value in [list(vec![int(1), int(2), int(3)]), list(vec![int(9), int(2)])] {
        let failed = run(&declaration(value));
        assert_eq!(
            failed.outcome,
            Outcome::Thrown(TestValue::Instance {
                class: "Root::Std::PatternNotMatchedError".to_string(),
                args: vec![TestValue::Str(
                    "assigned value does not match the pattern defined in value declaration"
                        .to_string()
                )],
            })
        );
    }
}

#[test]
fn test_var_and_val_mismatch_messages_differ() {
    let pattern = || list_pattern(vec![bind("a")], None);
    let var_main = compile_ok(vec![pattern_decl(pattern(), true, list(vec![int(1)]))]);
    let val_main = compile_ok(vec![pattern_decl(pattern(), false, list(vec![int(1)]))]);
    assert!(var_main.constants.contains(&Value::String(
        "assigned value does not match the pattern defined in variable declaration".to_string()
    )));
    assert!(val_main.constants.contains(&Value::String(
        "assigned value does not match the pattern defined in value declaration".to_string()
    )));
}

#[test]
fn test_rest_pattern_binds_the_middle() {
    let main = compile_ok(vec![pattern_decl(
        list_pattern(
            vec![bind("first"), bind("last")],
            Some(RestElement {
                position: 1,
                binding: Some("middle".to_string()),
            }),
        ),
        true,
        list(vec![int(1), int(2), int(3), int(4)]),
    )]);
    let result = run(&main);
    assert_eq!(result.outcome, Outcome::Returned(TestValue::Nil));
    assert_eq!(result.local(2), Some(&TestValue::Int(1)));
    assert_eq!(result.local(3), Some(&TestValue::Int(4)));
    assert_eq!(
        result.local(4),
        Some(&TestValue::List(vec![TestValue::Int(2), TestValue::Int(3)]))
    );
}

#[test]
fn test_map_pattern() {
    let declaration = |key: &str| {
        compile_ok(vec![pattern_decl(
            pat(PatternKind::Map(vec![MapPatternEntry {
                key: Literal::Symbol("name".to_string()),
                pattern: bind("n"),
            }])),
            false,
            e(ExprKind::Map(vec![MapEntry {
                key: e(ExprKind::Symbol(key.to_string())),
                value: e(ExprKind::String("basalt".to_string())),
            }])),
        )])
    };
    let matched = run(&declaration("name"));
    assert_eq!(matched.local(2), Some(&TestValue::Str("basalt".to_string())));
    assert!(matches!(run(&declaration("other")).outcome, Outcome::Thrown(_)));
}

#[test]
fn test_switch_falls_through_to_else() {
    let switch = |subject: Expr| {
        compile_ok(vec![val(
            "r",
            e(ExprKind::Switch {
                subject: Box::new(subject),
                cases: vec![SwitchCase {
                    pattern: list_pattern(vec![lit(1), bind("x")], None),
                    body: vec![expr_stmt(ident("x"))],
                    span: sp(1),
                }],
                else_branch: Some(vec![expr_stmt(int(0))]),
            }),
        )])
    };
    assert_eq!(run(&switch(list(vec![int(1), int(7)]))).local(1), Some(&TestValue::Int(7)));
    assert_eq!(run(&switch(list(vec![int(2), int(7)]))).local(1), Some(&TestValue::Int(0)));
    assert_eq!(run(&switch(int(5))).local(1), Some(&TestValue::Int(0)));
}

#[test]
fn test_pattern_cannot_rebind_existing_local() {
    assert_eq!(
        failures(vec![
            var("a", int(1)),
            pattern_decl(list_pattern(vec![bind("a")], None), true, list(vec![int(2)])),
        ]),
        vec!["cannot redeclare local `a` in the same scope".to_string()]
    );
}
