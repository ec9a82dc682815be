//! Result operator semantics, driven through the textual front end.

use crucible_query_model::expr::{ItemType, Value};
use crucible_query_model::syntax::SourceCatalog;
use crucible_query_model::{ExecutionError, QueryParser};
use test_case::test_case;

fn catalog() -> SourceCatalog {
    SourceCatalog::new()
        .with_list("numbers", ItemType::Int, Value::ints(0..10))
        .with_list("dupes", ItemType::Int, Value::ints([3, 1, 3, 2, 1]))
        .with_list("empty", ItemType::Int, Value::ints([]))
        .with_list("one", ItemType::Int, Value::ints([7]))
        .with_list(
            "words",
            ItemType::String,
            Value::list(["pear", "apple", "fig"].map(Value::string)),
        )
}

fn run(input: &str) -> Result<Value, ExecutionError> {
    let model = QueryParser::new().parse_text(input, &catalog()).unwrap();
    model.execute_in_memory().map(|data| data.into_value())
}

#[test_case("numbers.First()", Value::Int(0) ; "first")]
#[test_case("numbers.First(n => n > 4)", Value::Int(5) ; "first with predicate")]
#[test_case("numbers.Last()", Value::Int(9) ; "last")]
#[test_case("numbers.Last(n => n < 4)", Value::Int(3) ; "last with predicate")]
#[test_case("one.Single()", Value::Int(7) ; "single")]
#[test_case("numbers.Single(n => n == 4)", Value::Int(4) ; "single with predicate")]
#[test_case("empty.FirstOrDefault()", Value::Int(0) ; "first or default on empty")]
#[test_case("empty.LastOrDefault()", Value::Int(0) ; "last or default on empty")]
#[test_case("numbers.SingleOrDefault(n => n > 100)", Value::Int(0) ; "single or default without match")]
#[test_case("words.FirstOrDefault(w => w == 'kiwi')", Value::Null ; "string default is null")]
fn test_element_operators(input: &str, expected: Value) {
    assert_eq!(run(input).unwrap(), expected);
}

#[test_case("empty.First()", ExecutionError::SequenceEmpty ; "first on empty")]
#[test_case("numbers.Last(n => n > 100)", ExecutionError::SequenceEmpty ; "last without match")]
#[test_case("empty.Single()", ExecutionError::SequenceEmpty ; "single on empty")]
#[test_case("numbers.Single()", ExecutionError::SequenceHasMultipleElements ; "single on many")]
#[test_case("numbers.SingleOrDefault(n => n > 1)", ExecutionError::SequenceHasMultipleElements ; "single or default on many")]
#[test_case("empty.Min()", ExecutionError::SequenceEmpty ; "min on empty")]
#[test_case("empty.Average()", ExecutionError::SequenceEmpty ; "average on empty")]
#[test_case("empty.Aggregate((acc, n) => acc + n)", ExecutionError::SequenceEmpty ; "aggregate on empty")]
fn test_element_operator_failures(input: &str, expected: ExecutionError) {
    assert_eq!(run(input).unwrap_err(), expected);
}

#[test_case("numbers.Any()", true ; "any")]
#[test_case("empty.Any()", false ; "any on empty")]
#[test_case("numbers.Any(n => n > 8)", true ; "any with predicate")]
#[test_case("numbers.All(n => n < 10)", true ; "all")]
#[test_case("numbers.All(n => n < 9)", false ; "all with a failing element")]
#[test_case("empty.All(n => n > 100)", true ; "all on empty")]
#[test_case("numbers.Contains(3)", true ; "contains")]
#[test_case("numbers.Contains(30)", false ; "contains missing")]
#[test_case("words.Contains('fig')", true ; "contains string")]
fn test_quantifiers(input: &str, expected: bool) {
    assert_eq!(run(input).unwrap(), Value::Bool(expected));
}

#[test_case("dupes.Distinct()", &[3, 1, 2] ; "distinct keeps first occurrence")]
#[test_case("dupes.Union([2, 5, 5])", &[3, 1, 2, 5] ; "union")]
#[test_case("dupes.Concat([2, 5])", &[3, 1, 3, 2, 1, 2, 5] ; "concat")]
#[test_case("dupes.Except([1])", &[3, 2] ; "except")]
#[test_case("dupes.Intersect([1, 3, 8])", &[3, 1] ; "intersect")]
#[test_case("one.DefaultIfEmpty()", &[7] ; "default if empty keeps items")]
#[test_case("empty.DefaultIfEmpty()", &[0] ; "default if empty with type default")]
#[test_case("empty.DefaultIfEmpty(42)", &[42] ; "default if empty with value")]
#[test_case("numbers.Reverse().Take(3)", &[9, 8, 7] ; "reverse")]
#[test_case("numbers.Take(0)", &[] ; "take zero")]
#[test_case("numbers.Take(-2)", &[] ; "negative take")]
#[test_case("numbers.Skip(10)", &[] ; "skip exactly the length")]
#[test_case("numbers.Skip(20)", &[] ; "skip past end")]
fn test_set_and_sequence_operators(input: &str, expected: &[i64]) {
    assert_eq!(run(input).unwrap(), Value::ints(expected.iter().copied()));
}

#[test_case("numbers.Count()", Value::Int(10) ; "count")]
#[test_case("numbers.LongCount(n => n % 2 == 0)", Value::Int(5) ; "long count with predicate")]
#[test_case("numbers.Sum()", Value::Int(45) ; "sum")]
#[test_case("empty.Sum()", Value::Int(0) ; "sum on empty")]
#[test_case("numbers.Min()", Value::Int(0) ; "min")]
#[test_case("numbers.Max(n => n * 3)", Value::Int(27) ; "max with selector")]
#[test_case("words.Min()", Value::string("apple") ; "min of strings")]
#[test_case("words.Max()", Value::string("pear") ; "max of strings")]
#[test_case("numbers.Average()", Value::Float(4.5) ; "average")]
#[test_case("numbers.Aggregate(100, (acc, n) => acc - n)", Value::Int(55) ; "aggregate with seed")]
#[test_case("empty.Aggregate(100, (acc, n) => acc - n)", Value::Int(100) ; "aggregate with seed on empty")]
#[test_case("numbers.Aggregate(0, (acc, n) => acc + n, total => total * 2)", Value::Int(90) ; "aggregate with result selector")]
fn test_aggregates(input: &str, expected: Value) {
    assert_eq!(run(input).unwrap(), expected);
}

#[test_case("words.Sum()", "Sum" ; "sum of strings")]
#[test_case("words.Average()", "Average" ; "average of strings")]
fn test_numeric_reduction_rejects_strings(input: &str, expected_operator: &str) {
    match run(input).unwrap_err() {
        ExecutionError::TypeNotSupported { operator, item_type } => {
            assert_eq!(operator, expected_operator);
            assert_eq!(item_type, "string");
        }
        other => panic!("expected TypeNotSupported, got {:?}", other),
    }
}

#[test]
fn test_cast_and_of_type() {
    let catalog = SourceCatalog::new().with_list(
        "mixed",
        ItemType::Unknown,
        Value::list([Value::Int(1), Value::string("a"), Value::Int(2)]),
    );
    let parser = QueryParser::new();

    let ints = parser.parse_text("mixed.OfType<int>()", &catalog).unwrap();
    assert_eq!(ints.result_type(), ItemType::sequence(ItemType::Int));
    assert_eq!(
        ints.execute_in_memory().unwrap().into_value(),
        Value::ints([1, 2])
    );

    let floats = parser
        .parse_text("mixed.OfType<int>().Cast<float>()", &catalog)
        .unwrap();
    assert_eq!(
        floats.execute_in_memory().unwrap().into_value(),
        Value::list([Value::Float(1.0), Value::Float(2.0)])
    );

    let err = parser
        .parse_text("mixed.Cast<int>()", &catalog)
        .unwrap()
        .execute_in_memory()
        .unwrap_err();
    assert!(matches!(err, ExecutionError::TypeMismatch(_)));
}

#[test]
fn test_operators_after_projection_see_projected_items() {
    let result = run("numbers.Where(n => n > 6).Select(n => n * 10).First()").unwrap();
    assert_eq!(result, Value::Int(70));
}
