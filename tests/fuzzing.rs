//! Property-based tests for the canonptr pass.
//!
//! This module contains:
//! - Identity law: pointers without the flag bit come out unchanged
//! - Offset-embedding law: flagged pointers gain `offset << 49`
//! - Constant folding: all-constant GEPs emit no offset arithmetic
//! - Idempotence: a second run rewrites nothing

use canonptr::ir::eval::Evaluator;
use canonptr::ir::{Attribute, BinOp, Function, InstId, InstKind, Module, Param, Type, Value};
use canonptr::{CanonPtrPass, ModulePass};
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;

const FLAG: u64 = 1 << 48;

/// One GEP index.
#[derive(Debug, Clone, Copy)]
enum Index {
    Const(i64),
    /// The i64 argument `%i`
    Wide,
    /// The i32 argument `%j`
    Narrow,
}

impl Index {
    fn value(self) -> Value {
        match self {
            Index::Const(c) => Value::const_i64(c),
            Index::Wide => Value::Arg(1),
            Index::Narrow => Value::Arg(2),
        }
    }

    fn is_const(self) -> bool {
        matches!(self, Index::Const(_))
    }
}

/// GEP shapes over increasingly nested types.
#[derive(Debug, Clone, Copy)]
enum Shape {
    /// `gep i32, ptr %p, a`
    Scalar(Index),
    /// `gep [8 x i64], ptr %p, a, b`
    Array(Index, Index),
    /// `gep { i8, [3 x { i16, i32 }] }, ptr %p, a, 1, b, field`
    Nested(Index, Index, bool),
}

impl Shape {
    fn source_ty(self) -> Type {
        match self {
            Shape::Scalar(_) => Type::i32(),
            Shape::Array(..) => Type::array(8, Type::i64()),
            Shape::Nested(..) => Type::struct_of(vec![
                Type::i8(),
                Type::array(3, Type::struct_of(vec![Type::Int(16), Type::i32()])),
            ]),
        }
    }

    fn indices(self) -> Vec<Value> {
        match self {
            Shape::Scalar(a) => vec![a.value()],
            Shape::Array(a, b) => vec![a.value(), b.value()],
            Shape::Nested(a, b, field) => vec![
                a.value(),
                Value::const_i32(1),
                b.value(),
                Value::const_i32(i32::from(field)),
            ],
        }
    }

    fn all_const(self) -> bool {
        match self {
            Shape::Scalar(a) => a.is_const(),
            Shape::Array(a, b) | Shape::Nested(a, b, _) => a.is_const() && b.is_const(),
        }
    }
}

fn index() -> impl Strategy<Value = Index> {
    prop_oneof![
        (-64i64..64).prop_map(Index::Const),
        Just(Index::Wide),
        Just(Index::Narrow),
    ]
}

fn shape() -> impl Strategy<Value = Shape> {
    prop_oneof![
        index().prop_map(Shape::Scalar),
        (index(), index()).prop_map(|(a, b)| Shape::Array(a, b)),
        (index(), index(), any::<bool>()).prop_map(|(a, b, f)| Shape::Nested(a, b, f)),
    ]
}

/// `ptr @f(ptr %p, i64 %i, i32 %j)` returning the GEP built from `shape`.
fn module_for(shape: Shape) -> (Module, InstId) {
    let mut func = Function::new(
        "f",
        Type::Ptr,
        vec![
            Param::new("p", Type::Ptr),
            Param::new("i", Type::i64()),
            Param::new("j", Type::i32()),
        ],
    )
    .with_attribute(Attribute::CanonPtr);
    let entry = func.add_block("entry");
    let gep = func
        .append_named(
            entry,
            "gep",
            InstKind::Gep {
                source_ty: shape.source_ty(),
                base: Value::Arg(0),
                indices: shape.indices(),
                inbounds: false,
            },
            Type::Ptr,
        )
        .unwrap();
    func.append_inst(entry, InstKind::Ret { value: Some(Value::Inst(gep)) }, Type::Void)
        .unwrap();

    let mut module = Module::new("fuzz");
    module.add_function(func);
    (module, gep)
}

fn returned(func: &Function) -> Value {
    let entry = func.entry_block().unwrap();
    match &func.inst(func.terminator(entry).unwrap()).unwrap().kind {
        InstKind::Ret { value: Some(v) } => v.clone(),
        other => panic!("expected ret, got {:?}", other),
    }
}

fn run_pass(module: &mut Module) -> Result<CanonPtrPass, TestCaseError> {
    let mut pass = CanonPtrPass::default();
    pass.run(module).map_err(|e| TestCaseError::fail(format!("{:#}", e)))?;
    Ok(pass)
}

proptest! {
    /// Property: the rewritten pointer equals the GEP result when bit 48 is
    /// clear, and the GEP result plus the shifted offset when it is set.
    #[test]
    fn prop_identity_and_embedding(
        shape in shape(),
        base in any::<u64>(),
        flagged in any::<bool>(),
        i in any::<i64>(),
        j in any::<i32>(),
    ) {
        let (mut module, gep) = module_for(shape);
        run_pass(&mut module)?;

        let func = module.get_function("f").unwrap();
        func.verify().map_err(|e| TestCaseError::fail(e.to_string()))?;
        let out = returned(func);

        let base = if flagged { base | FLAG } else { base & !FLAG };
        let eval = Evaluator::new(func, module.layout()).with_args(&[base, i as u64, j as u32 as u64]);
        let original = eval.eval(&Value::Inst(gep)).map_err(|e| TestCaseError::fail(e.to_string()))?;
        let result = eval.eval(&out).map_err(|e| TestCaseError::fail(e.to_string()))?;

        if original & FLAG == 0 {
            prop_assert_eq!(result, original);
        } else {
            let offset = original.wrapping_sub(base);
            prop_assert_eq!(result, original.wrapping_add(offset << 49));
        }
    }

    /// Property: all-constant GEPs fold their offset; no mul is emitted.
    #[test]
    fn prop_constant_offsets_fold(shape in shape()) {
        let (mut module, _) = module_for(shape);
        let pass = run_pass(&mut module)?;
        let func = module.get_function("f").unwrap();
        let has_mul = func
            .instructions()
            .any(|id| matches!(func.inst(id).unwrap().kind, InstKind::Binary { op: BinOp::Mul, .. }));

        if shape.all_const() && pass.stats().rewritten == 1 {
            prop_assert_eq!(pass.stats().constant_offsets, 1);
            prop_assert!(!has_mul);
        }
    }

    /// Property: running the pass twice is the same as running it once.
    #[test]
    fn prop_second_run_is_noop(shape in shape()) {
        let (mut module, _) = module_for(shape);
        run_pass(&mut module)?;
        let once = module.get_function("f").unwrap().to_string();

        let pass = run_pass(&mut module)?;
        prop_assert_eq!(pass.stats().rewritten, 0);
        prop_assert_eq!(module.get_function("f").unwrap().to_string(), once);
    }
}

#[test]
fn test_all_zero_constant_gep_is_untouched() {
    let _ = env_logger::builder().is_test(true).try_init();
    let (mut module, gep) = module_for(Shape::Array(Index::Const(0), Index::Const(0)));
    let pass = run_pass(&mut module).unwrap();
    assert_eq!(pass.stats().skipped_zero_index, 1);
    let func = module.get_function("f").unwrap();
    assert_eq!(returned(func), Value::Inst(gep));
}
