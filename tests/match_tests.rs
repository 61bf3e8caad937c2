use grove_lang::{EvalContext, EvalError, Expression, MatchType, Tree, Value};

/// root ""
/// ├── alpha   "1"
/// ├── beta    "2"
/// │   └── gamma  "3"
/// └── delta   (null)
fn sample() -> Tree {
    let mut tree = Tree::new();
    let root = tree.root();
    tree.add(root, "alpha", Value::String("1".into()));
    let beta = tree.add(root, "beta", Value::String("2".into()));
    tree.add(beta, "gamma", Value::String("3".into()));
    tree.add(root, "delta", Value::Null);
    tree
}

fn eval(tree: &Tree, source: &str) -> grove_lang::Match {
    Expression::new(source)
        .unwrap()
        .evaluate(tree, tree.root(), &EvalContext::new())
        .unwrap()
}

#[test]
fn test_get_name() {
    let tree = sample();
    let matched = eval(&tree, "@/*/beta?name");
    assert_eq!(matched.match_type(), MatchType::Name);
    let ctx = EvalContext::new();
    assert_eq!(
        matched.get(0, &tree, &ctx).unwrap(),
        Value::String("beta".into())
    );
}

#[test]
fn test_get_value() {
    let tree = sample();
    let ctx = EvalContext::new();
    let matched = eval(&tree, "@/*/beta?value");
    assert_eq!(
        matched.get(0, &tree, &ctx).unwrap(),
        Value::String("2".into())
    );
    let matched = eval(&tree, "@/*/delta?value");
    assert_eq!(matched.get(0, &tree, &ctx).unwrap(), Value::Null);
}

#[test]
fn test_get_value_with_cast() {
    let tree = sample();
    let ctx = EvalContext::new();
    let matched = eval(&tree, "@/*/beta?value.int");
    assert_eq!(matched.get(0, &tree, &ctx).unwrap(), Value::Int(2));
    // Casting a null stays null instead of failing.
    let matched = eval(&tree, "@/*/delta?value.int");
    assert_eq!(matched.get(0, &tree, &ctx).unwrap(), Value::Null);
}

#[test]
fn test_cast_to_string_uses_the_string_form() {
    let mut tree = Tree::new();
    let root = tree.root();
    tree.add(root, "n", Value::Int(7));
    let ctx = EvalContext::new();
    let matched = eval(&tree, "@/*/n?value.string");
    assert_eq!(
        matched.get(0, &tree, &ctx).unwrap(),
        Value::String("7".into())
    );
}

#[test]
fn test_get_path() {
    let tree = sample();
    let ctx = EvalContext::new();
    let matched = eval(&tree, "@/*/beta/*?path");
    assert_eq!(
        matched.get(0, &tree, &ctx).unwrap(),
        Value::String("1-0".into())
    );
    let matched = eval(&tree, "@/?path");
    assert_eq!(matched.get(0, &tree, &ctx).unwrap(), Value::String("".into()));
}

#[test]
fn test_get_node() {
    let tree = sample();
    let ctx = EvalContext::new();
    let matched = eval(&tree, "@/*/beta?node");
    let Value::Node(id) = matched.get(0, &tree, &ctx).unwrap() else {
        panic!("expected a node value");
    };
    assert_eq!(tree.name(id), "beta");
}

#[test]
fn test_count() {
    let tree = sample();
    let matched = eval(&tree, "@/*?count");
    assert_eq!(matched.match_type(), MatchType::Count);
    assert_eq!(matched.count(), 3);
    // Count has no per-entity values to read.
    let ctx = EvalContext::new();
    assert!(matched.get(0, &tree, &ctx).is_err());
}

#[test]
fn test_set_name_then_requery() {
    let mut tree = sample();
    let matched = eval(&tree, "@/*/alpha?name");
    matched
        .set(0, &mut tree, Value::String("omega".into()))
        .unwrap();
    assert!(eval(&tree, "@/*/alpha").is_empty());
    assert_eq!(eval(&tree, "@/*/omega").count(), 1);
}

#[test]
fn test_set_value() {
    let mut tree = sample();
    let matched = eval(&tree, "@/*/beta?value");
    matched.set(0, &mut tree, Value::Int(42)).unwrap();
    // The typed value is stored as-is, not via its string form.
    assert_eq!(eval(&tree, "@/*/=42:int").count(), 1);
}

#[test]
fn test_set_node_to_null_removes_it() {
    let mut tree = sample();
    let matched = eval(&tree, "@/*/beta?node");
    matched.set(0, &mut tree, Value::Null).unwrap();
    let names: Vec<String> = eval(&tree, "@/*?name")
        .iter()
        .map(|entity| tree.name(entity.node).to_string())
        .collect();
    assert_eq!(names, vec!["alpha", "delta"]);
}

#[test]
fn test_root_cannot_be_removed() {
    let mut tree = sample();
    let matched = eval(&tree, "@/?node");
    assert!(matched.set(0, &mut tree, Value::Null).is_err());
}

#[test]
fn test_set_node_replaces_with_a_copy() {
    let mut tree = sample();
    let root = tree.root();
    let beta = tree.children(root)[1];

    let matched = eval(&tree, "@/*/alpha?node");
    matched.set(0, &mut tree, Value::Node(beta)).unwrap();

    let names: Vec<String> = tree
        .children(root)
        .iter()
        .map(|&id| tree.name(id).to_string())
        .collect();
    assert_eq!(names, vec!["beta", "beta", "delta"]);
    // The copy is deep and independent of the original.
    let copy = tree.children(root)[0];
    assert_ne!(copy, beta);
    assert_eq!(tree.name(tree.children(copy)[0]), "gamma");
}

#[test]
fn test_reference_expression_follows_inner_expressions() {
    let mut tree = sample();
    let root = tree.root();
    tree.add(
        root,
        "link",
        Value::String("@/../*/beta?value".into()),
    );
    let ctx = EvalContext::new();
    let matched = Expression::new("@@/*/link?value")
        .unwrap()
        .evaluate(&tree, root, &ctx)
        .unwrap();
    assert_eq!(matched.match_type(), MatchType::Value);
    assert_eq!(matched.count(), 1);
    assert_eq!(
        matched.get(0, &tree, &ctx).unwrap(),
        Value::String("2".into())
    );
}

#[test]
fn test_reference_expression_keeps_plain_nodes() {
    let mut tree = sample();
    let root = tree.root();
    tree.add(root, "link", Value::String("@/../*/beta?value".into()));
    let ctx = EvalContext::new();
    // 'alpha' holds "1", not an expression, so it passes through.
    let matched = Expression::new("@@/*/alpha|/*/link?value")
        .unwrap()
        .evaluate(&tree, root, &ctx)
        .unwrap();
    assert_eq!(matched.count(), 2);
    assert_eq!(
        matched.get(0, &tree, &ctx).unwrap(),
        Value::String("1".into())
    );
    assert_eq!(
        matched.get(1, &tree, &ctx).unwrap(),
        Value::String("2".into())
    );
}

#[test]
fn test_reference_expression_reports_the_outer_type() {
    let mut tree = sample();
    let root = tree.root();
    tree.add(root, "link", Value::String("@/../*/beta?name".into()));
    let ctx = EvalContext::new();
    let matched = Expression::new("@@/*/link?value")
        .unwrap()
        .evaluate(&tree, root, &ctx)
        .unwrap();
    // The match keeps the outer declaration; the entity reads as a name.
    assert_eq!(matched.match_type(), MatchType::Value);
    assert_eq!(matched.entities()[0].match_type, MatchType::Name);
    assert_eq!(
        matched.get(0, &tree, &ctx).unwrap(),
        Value::String("beta".into())
    );
}

#[test]
fn test_reference_expression_rejects_mixed_inner_types() {
    let mut tree = sample();
    let root = tree.root();
    tree.add(root, "p", Value::String("@/../*/beta?value".into()));
    tree.add(root, "q", Value::String("@/../*/beta?name".into()));
    let ctx = EvalContext::new();
    let result = Expression::new("@@/*/p|/*/q?value")
        .unwrap()
        .evaluate(&tree, root, &ctx);
    assert!(matches!(result, Err(EvalError::MixedReferenceTypes)));
}

#[test]
fn test_reference_expression_requires_name_or_value_type() {
    let tree = sample();
    let ctx = EvalContext::new();
    let result = Expression::new("@@/*?node")
        .unwrap()
        .evaluate(&tree, tree.root(), &ctx);
    assert!(matches!(result, Err(EvalError::ReferenceType(_))));
}

#[test]
fn test_conversion_errors_surface() {
    let tree = sample();
    let ctx = EvalContext::new();
    let result = Expression::new("@/*/=abc:int")
        .unwrap()
        .evaluate(&tree, tree.root(), &ctx);
    assert!(matches!(result, Err(EvalError::Conversion { .. })));
    let result = Expression::new("@/*/=abc:nope")
        .unwrap()
        .evaluate(&tree, tree.root(), &ctx);
    assert!(matches!(result, Err(EvalError::UnknownType(_))));
}

#[test]
fn test_custom_converter() {
    let mut tree = Tree::new();
    let root = tree.root();
    tree.add(root, "flag", Value::Bool(true));
    let converter = |text: &str, type_name: &str| match type_name {
        "yesno" => Ok(Value::Bool(text == "yes")),
        _ => grove_lang::evaluator::convert_builtin(text, type_name),
    };
    let ctx = EvalContext::with_converter(&converter);
    let matched = Expression::new("@/*/=yes:yesno")
        .unwrap()
        .evaluate(&tree, root, &ctx)
        .unwrap();
    assert_eq!(matched.count(), 1);
}

#[test]
fn test_like_with_type_is_rejected() {
    let tree = sample();
    let ctx = EvalContext::new();
    let result = Expression::new("@/*/=~2:int")
        .unwrap()
        .evaluate(&tree, tree.root(), &ctx);
    assert!(matches!(result, Err(EvalError::TypeError(_))));
}
