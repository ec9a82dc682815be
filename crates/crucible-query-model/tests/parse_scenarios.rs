//! End-to-end parsing of hand-built pipelines into query models.

use crucible_query_model::expr::{BinaryOp, Expr, ExprRef, ItemType, Pipeline, Value};
use crucible_query_model::model::BodyClause;
use crucible_query_model::result_operators::ExecutionStrategy;
use crucible_query_model::{ParseError, ParserOptions, QueryParser, ResultOperator};
use insta::assert_snapshot;

fn people() -> Pipeline {
    Pipeline::table("people", ItemType::record("Person"))
}

fn orders() -> Pipeline {
    Pipeline::table("orders", ItemType::record("Order"))
}

fn numbers() -> Pipeline {
    Pipeline::list(ItemType::Int, Value::ints(0..10))
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::TRACE)
        .try_init();
}

fn gt(left: ExprRef, right: i64) -> ExprRef {
    Expr::binary(BinaryOp::GreaterThan, left, Expr::constant(right))
}

#[test]
fn test_filter_then_projection() {
    init_tracing();
    let pipeline = people()
        .call("Where", vec![Expr::lambda1("x", |x| gt(Expr::member(x, "Age"), 5))])
        .call("Select", vec![Expr::lambda1("x", |x| Expr::member(x, "Name"))])
        .build();

    let model = QueryParser::new().parse(&pipeline).unwrap();

    assert_eq!(model.body_clauses.len(), 1);
    assert!(model.result_operators.is_empty());
    let BodyClause::Where(filter) = &model.body_clauses[0] else {
        panic!("expected a filter clause");
    };
    let Expr::Binary(comparison) = filter.predicate.as_ref() else {
        panic!("expected a comparison");
    };
    let Expr::Member(age) = comparison.left.as_ref() else {
        panic!("expected member access");
    };
    let Expr::QuerySource(reference) = age.target.as_ref() else {
        panic!("expected a back-reference");
    };
    assert_eq!(reference.id, model.main_from_clause.id);
    assert_snapshot!(model.to_string(), @"from x in people where ([x].Age > 5) select [x].Name");
}

#[test]
fn test_nested_pipeline_is_discovered_once() {
    let pipeline = people()
        .call(
            "Select",
            vec![Expr::lambda1("p", |p| {
                orders()
                    .call(
                        "Where",
                        vec![Expr::lambda1("o", |o| {
                            Expr::binary(
                                BinaryOp::Equal,
                                Expr::member(o, "Owner"),
                                Expr::member(p, "Name"),
                            )
                        })],
                    )
                    .build()
            })],
        )
        .build();

    let model = QueryParser::new().parse(&pipeline).unwrap();

    let nested = model.nested_models();
    assert_eq!(nested.len(), 1);
    assert_eq!(nested[0].parent(), Some(model.id()));
    assert_snapshot!(
        model.to_string(),
        @"from p in people select {from o in orders where ([o].Owner == [p].Name) select [o]}"
    );
}

#[test]
fn test_take_skip_apply_in_declared_order() {
    let take_then_skip = numbers()
        .call("Take", vec![Expr::constant(5i64)])
        .call("Skip", vec![Expr::constant(2i64)])
        .build();
    let model = QueryParser::new().parse(&take_then_skip).unwrap();
    let result = model.execute_in_memory().unwrap();
    assert_eq!(result.into_value(), Value::ints([2, 3, 4]));

    let skip_then_take = numbers()
        .call("Skip", vec![Expr::constant(5i64)])
        .call("Take", vec![Expr::constant(2i64)])
        .build();
    let model = QueryParser::new().parse(&skip_then_take).unwrap();
    let result = model.execute_in_memory().unwrap();
    assert_eq!(result.into_value(), Value::ints([5, 6]));
}

#[test]
fn test_distinct_then_count() {
    let pipeline = Pipeline::list(ItemType::Int, Value::ints([1, 1, 2, 3, 3]))
        .call("Distinct", vec![])
        .call("Count", vec![])
        .build();

    let model = QueryParser::new().parse(&pipeline).unwrap();

    assert_eq!(model.result_operators.len(), 2);
    assert_eq!(
        model.result_operators[0].strategy(),
        ExecutionStrategy::Collection
    );
    assert_eq!(model.result_operators[1].strategy(), ExecutionStrategy::Scalar);
    assert_eq!(model.result_type(), ItemType::Int);
    assert_eq!(model.execute_in_memory().unwrap().into_value(), Value::Int(3));
}

#[test]
fn test_parsing_is_repeatable() {
    let pipeline = numbers()
        .call("Where", vec![Expr::lambda1("n", |n| gt(n, 3))])
        .call("OrderByDescending", vec![Expr::lambda1("n", |n| n)])
        .build();
    let parser = QueryParser::new();

    let first = parser.parse(&pipeline).unwrap();
    let second = parser.parse(&pipeline).unwrap();

    assert_ne!(first.id(), second.id());
    assert_eq!(first.to_string(), second.to_string());
    assert_snapshot!(
        first.to_string(),
        @"from n in [0, 1, 2, 3, 4, 5, 6, 7, 8, 9] where ([n] > 3) orderby [n] desc select [n]"
    );
}

#[test]
fn test_join_result_selector_is_looked_through() {
    let pipeline = people()
        .call(
            "Join",
            vec![
                orders().build(),
                Expr::lambda1("p", |p| Expr::member(p, "Name")),
                Expr::lambda1("o", |o| Expr::member(o, "Owner")),
                Expr::lambda2("p", "o", |p, o| Expr::anonymous(vec![("p", p), ("o", o)])),
            ],
        )
        .call(
            "Select",
            vec![Expr::lambda1("x", |x| {
                Expr::member(Expr::member(x, "o"), "Total")
            })],
        )
        .build();

    let model = QueryParser::new().parse(&pipeline).unwrap();

    let BodyClause::Join(join) = &model.body_clauses[0] else {
        panic!("expected a join clause");
    };
    assert_eq!(join.item_type, ItemType::record("Order"));
    assert_snapshot!(
        model.to_string(),
        @"from p in people join o in orders on [p].Name equals [o].Owner select [o].Total"
    );
}

#[test]
fn test_group_join_names_the_group() {
    let pipeline = people()
        .call(
            "GroupJoin",
            vec![
                orders().build(),
                Expr::lambda1("p", |p| Expr::member(p, "Name")),
                Expr::lambda1("o", |o| Expr::member(o, "Owner")),
                Expr::lambda2("p", "placed", |p, placed| {
                    Expr::anonymous(vec![("p", p), ("placed", placed)])
                }),
            ],
        )
        .call(
            "Select",
            vec![Expr::lambda1("x", |x| Expr::member(x, "placed"))],
        )
        .build();

    let model = QueryParser::new().parse(&pipeline).unwrap();

    let BodyClause::GroupJoin(group_join) = &model.body_clauses[0] else {
        panic!("expected a group join clause");
    };
    assert_eq!(
        group_join.item_type,
        ItemType::sequence(ItemType::record("Order"))
    );
    assert_snapshot!(
        model.to_string(),
        @"from p in people join o in orders on [p].Name equals [o].Owner into placed select [placed]"
    );
}

#[test]
fn test_select_many_flattens_into_additional_source() {
    let pipeline = people()
        .call(
            "SelectMany",
            vec![
                Expr::lambda1("p", |p| Expr::member(p, "Pets")),
                Expr::lambda2("p", "pet", |p, pet| {
                    Expr::anonymous(vec![("p", p), ("pet", pet)])
                }),
            ],
        )
        .call(
            "Where",
            vec![Expr::lambda1("x", |x| {
                gt(Expr::member(Expr::member(x, "pet"), "Age"), 2)
            })],
        )
        .call(
            "Select",
            vec![Expr::lambda1("x", |x| {
                Expr::binary(
                    BinaryOp::Add,
                    Expr::member(Expr::member(x.clone(), "p"), "Name"),
                    Expr::member(Expr::member(x, "pet"), "Name"),
                )
            })],
        )
        .build();

    let model = QueryParser::new().parse(&pipeline).unwrap();

    assert_snapshot!(
        model.to_string(),
        @"from p in people from pet in [p].Pets where ([pet].Age > 2) select ([p].Name + [pet].Name)"
    );
}

#[test]
fn test_clause_after_result_operator_wraps_model() {
    init_tracing();
    let pipeline = numbers()
        .call("Take", vec![Expr::constant(5i64)])
        .call("Where", vec![Expr::lambda1("x", |x| gt(x, 2))])
        .build();

    let model = QueryParser::new().parse(&pipeline).unwrap();

    assert!(model.result_operators.is_empty());
    let nested = model.nested_models();
    assert_eq!(nested.len(), 1);
    assert_eq!(nested[0].parent(), Some(model.id()));
    assert_eq!(model.main_from_clause.item_type, ItemType::Int);
    assert_snapshot!(
        model.to_string(),
        @"from x in {from <generated>_0 in [0, 1, 2, 3, 4, 5, 6, 7, 8, 9] select [<generated>_0] => Take(5)} where ([x] > 2) select [x]"
    );
    assert_eq!(
        model.execute_in_memory().unwrap().into_value(),
        Value::ints([3, 4])
    );
}

#[test]
fn test_clause_after_scalar_operator_is_rejected() {
    for (operator, args) in [
        ("Count", vec![]),
        ("Sum", vec![]),
        ("First", vec![]),
        ("Any", vec![]),
    ] {
        let pipeline = numbers()
            .call(operator, args)
            .call("Where", vec![Expr::lambda1("c", |c| gt(c, 1))])
            .build();

        let err = QueryParser::new().parse(&pipeline).unwrap_err();

        match err {
            ParseError::NotSupportedOperation(message) => {
                assert!(message.starts_with(operator), "{}", message)
            }
            other => panic!("{} then Where: expected NotSupportedOperation, got {:?}", operator, other),
        }
    }
}

#[test]
fn test_operator_after_scalar_operator_is_rejected() {
    let pipeline = numbers()
        .call("Count", vec![])
        .call("Take", vec![Expr::constant(1i64)])
        .build();

    let err = QueryParser::new().parse(&pipeline).unwrap_err();

    assert!(matches!(err, ParseError::NotSupportedOperation(_)));
}

#[test]
fn test_wrapping_can_be_disabled() {
    let pipeline = numbers()
        .call("Take", vec![Expr::constant(5i64)])
        .call("Select", vec![Expr::lambda1("x", |x| x)])
        .build();
    let options = ParserOptions {
        wrap_after_result_operators: false,
        ..ParserOptions::default()
    };

    let err = QueryParser::new()
        .with_options(options)
        .parse(&pipeline)
        .unwrap_err();

    assert!(matches!(err, ParseError::NotSupportedOperation(_)));
}

#[test]
fn test_group_by_then_select_reads_groups() {
    let pipeline = numbers()
        .call(
            "GroupBy",
            vec![Expr::lambda1("n", |n| {
                Expr::binary(BinaryOp::Modulo, n, Expr::constant(3i64))
            })],
        )
        .call("Select", vec![Expr::lambda1("g", |g| Expr::member(g, "Key"))])
        .build();

    let model = QueryParser::new().parse(&pipeline).unwrap();

    assert_snapshot!(
        model.to_string(),
        @"from g in {from n in [0, 1, 2, 3, 4, 5, 6, 7, 8, 9] select [n] => Group(([n] % 3), [n])} select [g].Key"
    );
    assert_eq!(
        model.execute_in_memory().unwrap().into_value(),
        Value::ints([0, 1, 2])
    );
}

#[test]
fn test_inline_predicate_becomes_filter() {
    let pipeline = numbers()
        .call("Count", vec![Expr::lambda1("x", |x| gt(x, 5))])
        .build();

    let model = QueryParser::new().parse(&pipeline).unwrap();

    assert!(matches!(model.body_clauses[0], BodyClause::Where(_)));
    assert!(matches!(model.result_operators[0], ResultOperator::Count));
    assert_snapshot!(
        model.to_string(),
        @"from x in [0, 1, 2, 3, 4, 5, 6, 7, 8, 9] where ([x] > 5) select [x] => Count()"
    );
    assert_eq!(model.execute_in_memory().unwrap().into_value(), Value::Int(4));
}

#[test]
fn test_inline_selector_becomes_projection() {
    let pipeline = numbers()
        .call(
            "Sum",
            vec![Expr::lambda1("x", |x| {
                Expr::binary(BinaryOp::Multiply, x, Expr::constant(2i64))
            })],
        )
        .build();

    let model = QueryParser::new().parse(&pipeline).unwrap();

    assert_snapshot!(
        model.to_string(),
        @"from x in [0, 1, 2, 3, 4, 5, 6, 7, 8, 9] select ([x] * 2) => Sum()"
    );
    assert_eq!(model.execute_in_memory().unwrap().into_value(), Value::Int(90));
}

#[test]
fn test_aggregate_accumulates_over_source() {
    let pipeline = numbers()
        .call(
            "Aggregate",
            vec![Expr::lambda2("acc", "n", |acc, n| {
                Expr::binary(BinaryOp::Add, acc, n)
            })],
        )
        .build();

    let model = QueryParser::new().parse(&pipeline).unwrap();

    assert_snapshot!(
        model.to_string(),
        @"from n in [0, 1, 2, 3, 4, 5, 6, 7, 8, 9] select [n] => Aggregate(acc => (acc + [n]))"
    );
    assert_eq!(model.execute_in_memory().unwrap().into_value(), Value::Int(45));
}

#[test]
fn test_unregistered_overload_names_call() {
    let pipeline = numbers()
        .call("Zip", vec![Expr::parameter("others")])
        .build();

    let err = QueryParser::new().parse(&pipeline).unwrap_err();

    match err {
        ParseError::UnsupportedCombinator { call } => {
            assert_eq!(call, "[0, 1, 2, 3, 4, 5, 6, 7, 8, 9].Zip(others)");
        }
        other => panic!("expected unsupported combinator, got {:?}", other),
    }
}

#[test]
fn test_nesting_depth_is_bounded() {
    let inner = orders().call("Count", vec![]).build();
    let pipeline = people()
        .call("Select", vec![Expr::lambda1("p", |_| inner.clone())])
        .build();
    let options = ParserOptions {
        max_nesting_depth: 0,
        ..ParserOptions::default()
    };

    let err = QueryParser::new()
        .with_options(options)
        .parse(&pipeline)
        .unwrap_err();

    assert!(matches!(err, ParseError::NotSupportedOperation(_)));
}
