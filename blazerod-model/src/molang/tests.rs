use super::*;

struct Queries {
    anim_time: f32,
}

impl QueryProvider for Queries {
    fn query(&self, name: &str, args: &[f32]) -> Option<f32> {
        match name {
            "anim_time" => Some(self.anim_time),
            "position" => args.first().map(|axis| *axis * 10.0),
            _ => None,
        }
    }
}

fn eval_with(source: &str, anim_time: f32, variables: &mut Variables) -> f32 {
    let program = Program::parse(source).unwrap();
    let queries = Queries { anim_time };
    Runtime::new(&queries, variables).eval(&program).unwrap()
}

fn eval(source: &str) -> f32 {
    eval_with(source, 0.0, &mut Variables::new())
}

#[test]
fn test_arithmetic_precedence() {
    assert_eq!(eval("1 + 2 * 3"), 7.0);
    assert_eq!(eval("(1 + 2) * 3"), 9.0);
    assert_eq!(eval("-2 * -3"), 6.0);
    assert_eq!(eval("10 - 4 - 3"), 3.0);
    assert_eq!(eval("8 / 0"), 0.0);
}

#[test]
fn test_comparison_and_logic() {
    assert_eq!(eval("1 < 2 && 3 >= 3"), 1.0);
    assert_eq!(eval("!(1 == 1) || 0"), 0.0);
    assert_eq!(eval("'a' == 'a'"), 1.0);
    assert_eq!(eval("'a' != 'b'"), 1.0);
}

#[test]
fn test_ternary_and_conditional() {
    assert_eq!(eval("1 ? 5 : 6"), 5.0);
    assert_eq!(eval("0 ? 5 : 0 ? 6 : 7"), 7.0);
    assert_eq!(eval("0 ? 5"), 0.0);
}

#[test]
fn test_math_functions_use_degrees() {
    assert!((eval("math.sin(90)") - 1.0).abs() < 1e-6);
    assert!((eval("math.cos(180)") + 1.0).abs() < 1e-6);
    assert_eq!(eval("math.clamp(5, 0, 2)"), 2.0);
    assert_eq!(eval("math.lerp(0, 10, 0.25)"), 2.5);
    assert_eq!(eval("Math.Abs(-3)"), 3.0);
    assert!((eval("math.pi") - std::f32::consts::PI).abs() < 1e-6);
    assert_eq!(eval("math.lerprotate(350, 10, 0.5)"), 360.0);
}

#[test]
fn test_random_stays_in_range() {
    for _ in 0..32 {
        let value = eval("math.random(2, 3)");
        assert!((2.0..3.0).contains(&value));
        let die = eval("math.random_integer(1, 6)");
        assert!((1.0..=6.0).contains(&die) && die.fract() == 0.0);
    }
}

#[test]
fn test_queries_and_variables() {
    let mut variables = Variables::new();
    assert_eq!(eval_with("query.anim_time * 2", 1.5, &mut variables), 3.0);
    assert_eq!(eval_with("q.position(2)", 0.0, &mut variables), 20.0);
    assert_eq!(eval_with("query.unknown_thing", 0.0, &mut variables), 0.0);

    assert_eq!(eval_with("v.speed = 4; return v.speed * 2;", 0.0, &mut variables), 8.0);
    assert_eq!(variables.get("speed"), Some(4.0));
    // Variables persist, temporaries do not
    assert_eq!(eval_with("variable.speed", 0.0, &mut variables), 4.0);
    assert_eq!(eval_with("t.a = 1; return t.a;", 0.0, &mut variables), 1.0);
    assert_eq!(eval_with("temp.a ?? 9", 0.0, &mut variables), 9.0);
}

#[test]
fn test_complex_program_without_return_is_zero() {
    assert_eq!(eval("v.a = 3; v.a + 1;"), 0.0);
    assert_eq!(eval("v.a = 3; { v.b = 2; }; return v.a + v.b;"), 5.0);
}

#[test]
fn test_coalesce_prefers_defined_values() {
    let mut variables = Variables::new();
    variables.set("x", 2.0);
    assert_eq!(eval_with("v.x ?? 7", 0.0, &mut variables), 2.0);
    assert_eq!(eval_with("v.y ?? 7", 0.0, &mut variables), 7.0);
}

#[test]
fn test_eval_errors_are_reported() {
    let program = Program::parse("math.nope(1)").unwrap();
    let mut variables = Variables::new();
    let mut runtime = Runtime::new(&(), &mut variables);
    assert_eq!(
        runtime.eval(&program),
        Err(EvalError::UnknownFunction("nope".into()))
    );
    assert_eq!(runtime.eval_or_zero(&program), 0.0);

    let program = Program::parse("math.pow(1)").unwrap();
    assert!(matches!(runtime.eval(&program), Err(EvalError::Arity { expected: 2, got: 1, .. })));
}

#[test]
fn test_parse_errors() {
    assert!(Program::parse("1 +").is_err());
    assert!(Program::parse("query.anim_time = 1").is_err());
    assert!(Program::parse("foo").is_err());
    assert!(Program::parse("bogus.value").is_err());
    assert!(Program::parse("(1").is_err());
    assert!(Program::parse("").is_err());
}

#[test]
fn test_value_parse_folds_constants() {
    assert_eq!(MolangValue::parse("12.5"), MolangValue::Plain(12.5));
    assert_eq!(MolangValue::parse("-(4 * 2)"), MolangValue::Plain(-8.0));
    assert!(matches!(MolangValue::parse("q.anim_time"), MolangValue::Expression(_)));
    assert!(matches!(MolangValue::parse("v.a = 1; return 2;"), MolangValue::Expression(_)));
}

#[test]
fn test_malformed_value_recovers_to_zero() {
    assert_eq!(MolangValue::parse("math.sin("), MolangValue::ZERO);
}

#[test]
fn test_deeply_nested_input_recovers_to_zero() {
    for depth in [1_000, 20_000] {
        let source = format!("{}query.anim_time{}", "(".repeat(depth), ")".repeat(depth));
        assert!(Program::parse(&source).is_err());
        assert_eq!(MolangValue::parse(&source), MolangValue::ZERO);
    }

    let negations = format!("{}1", "-".repeat(200_000));
    assert_eq!(MolangValue::parse(&negations), MolangValue::ZERO);
    let blocks = format!("{}1{}", "{".repeat(5_000), "}".repeat(5_000));
    assert_eq!(MolangValue::parse(&blocks), MolangValue::ZERO);
    let sum = vec!["q.anim_time"; 10_000].join(" + ");
    assert!(Program::parse(&sum).is_err());
}

#[test]
fn test_nesting_below_limit_parses() {
    let depth = parser::MAX_DEPTH / 2;
    let source = format!("{}q.anim_time + 1{}", "(".repeat(depth), ")".repeat(depth));
    let mut variables = Variables::new();
    assert_eq!(eval_with(&source, 2.0, &mut variables), 3.0);
}

#[test]
fn test_vec3_helpers() {
    let plain = MolangVec3::plain(glam::Vec3::new(1.0, 2.0, 3.0));
    assert_eq!(plain.as_plain(), Some(glam::Vec3::new(1.0, 2.0, 3.0)));

    let mixed = MolangVec3::new(
        MolangValue::Plain(1.0),
        MolangValue::parse("q.anim_time * 10"),
        MolangValue::ZERO,
    );
    assert_eq!(mixed.as_plain(), None);
    let queries = Queries { anim_time: 0.5 };
    let mut variables = Variables::new();
    let mut runtime = Runtime::new(&queries, &mut variables);
    assert_eq!(mixed.evaluate(&mut runtime), glam::Vec3::new(1.0, 5.0, 0.0));
}
