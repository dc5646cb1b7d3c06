//! Landing pad construction and caching.

mod common;

use bumpalo::Bump;
use common::{init_logging, release};
use unwindgen::builder::IrBuilder;
use unwindgen::context::{Context, EXCEPTION_OBJECT_VAR, EXCEPTION_SELECTOR_VAR};
use unwindgen::core::{CompilationSession, CompileError};
use unwindgen::ir::{runtime, Inst, Module, Value};

#[test]
fn test_empty_frame_landing_pad_cached_on_frame() {
    init_logging();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let mut builder = IrBuilder::new(&session, "pads");
    let mut ctx = Context::new(&mut builder, &session);

    ctx.begin_function("f").unwrap();
    let root = ctx.current_frame().unwrap();
    let next = ctx.builder().create_block("next").unwrap();

    let before = ctx.builder().insert_block();
    let first = ctx.get_landing_pad(root, next, None).unwrap();
    assert_eq!(ctx.builder().insert_block(), before);

    let second = ctx.get_landing_pad(root, next, None).unwrap();
    assert_eq!(first, second);
    assert_eq!(ctx.frame(root).landing_pad(), Some(first));
    assert_eq!(session.stats().landing_pads_built, 1);
}

#[test]
fn test_landing_pad_cached_on_front_entry() {
    init_logging();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let mut builder = IrBuilder::new(&session, "pads");
    let mut ctx = Context::new(&mut builder, &session);

    ctx.begin_function("f").unwrap();
    let root = ctx.current_frame().unwrap();
    let cleanup = release(&mut ctx, "release_a");
    ctx.add_cleanup(cleanup).unwrap();
    let next = ctx.builder().create_block("next").unwrap();

    let pad = ctx.get_landing_pad(root, next, None).unwrap();
    assert_eq!(ctx.frame(root).entry(0).unwrap().landing_pad(), Some(pad));
    assert_eq!(ctx.frame(root).landing_pad(), None);
    assert_eq!(ctx.get_landing_pad(root, next, None).unwrap(), pad);

    // Cleanups are registered at the front of the list: the old pad survives
    // on the entry it was built for (now entry 1), while the new front entry
    // gets a pad whose chain also covers the new cleanup.
    let cleanup = release(&mut ctx, "release_b");
    ctx.add_cleanup(cleanup).unwrap();
    assert_eq!(ctx.frame(root).entry(1).unwrap().landing_pad(), Some(pad));
    let newer = ctx.get_landing_pad(root, next, None).unwrap();
    assert_ne!(newer, pad);
    assert_eq!(ctx.frame(root).entry(0).unwrap().landing_pad(), Some(newer));
    assert_eq!(session.stats().landing_pads_built, 2);
}

#[test]
fn test_cleanup_landing_pad_contents() {
    init_logging();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let mut builder = IrBuilder::new(&session, "pads");

    let (pad, next) = {
        let mut ctx = Context::new(&mut builder, &session);
        ctx.begin_function("f").unwrap();
        let root = ctx.current_frame().unwrap();
        let next = ctx.builder().create_block("next").unwrap();
        (ctx.get_landing_pad(root, next, None).unwrap(), next)
    };

    let module = builder.module();
    let func = builder.current_function().unwrap();
    let insts: Vec<&Inst> = func.block_insts(pad).collect();
    assert_eq!(
        insts.iter().map(|i| i.opcode()).collect::<Vec<_>>(),
        vec!["call", "ptrcast", "call", "br"]
    );
    match insts[0] {
        Inst::Call { callee, .. } => {
            assert_eq!(module.function(*callee).name, runtime::EXCEPTION_INTRINSIC)
        }
        other => panic!("expected exception call, got {:?}", other),
    }
    match insts[2] {
        Inst::Call { callee, args } => {
            assert_eq!(module.function(*callee).name, runtime::SELECTOR_FUNCTION);
            assert_eq!(args.len(), 3);
            assert_eq!(args[2], Value::Null);
        }
        other => panic!("expected selector call, got {:?}", other),
    }
    assert_eq!(func.successors(pad), vec![next]);
    assert_eq!(func.personality, module.lookup_function(runtime::PERSONALITY));
}

#[test]
fn test_try_landing_pad_parks_one_selector_per_pad() {
    init_logging();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let mut builder = IrBuilder::new(&session, "pads");

    let (pad, next, selector_slot, object_slot) = {
        let mut ctx = Context::new(&mut builder, &session);
        ctx.begin_function("f").unwrap();
        let try_id = ctx.begin_try().unwrap();
        let body = ctx.current_frame().unwrap();
        let next = ctx.builder().create_block("next").unwrap();

        let pad = ctx.get_landing_pad(body, next, Some(try_id)).unwrap();
        assert_eq!(ctx.get_landing_pad(body, next, Some(try_id)).unwrap(), pad);
        let data = ctx.try_region(try_id).unwrap().catch_data();
        assert_eq!(data.selectors().len(), 1);
        assert_eq!(data.selectors()[0].block, pad);

        // A distinct pad in a nested frame parks a second selector.
        let inner = ctx.push_frame();
        let other = ctx.get_landing_pad(inner, next, Some(try_id)).unwrap();
        assert_ne!(other, pad);
        assert_eq!(ctx.try_region(try_id).unwrap().catch_data().selectors().len(), 2);
        assert_eq!(session.stats().selectors_created, 2);

        (
            pad,
            next,
            ctx.lookup_variable(EXCEPTION_SELECTOR_VAR).unwrap(),
            ctx.lookup_variable(EXCEPTION_OBJECT_VAR).unwrap(),
        )
    };

    let func = builder.current_function().unwrap();
    let insts: Vec<&Inst> = func.block_insts(pad).collect();
    assert_eq!(
        insts.iter().map(|i| i.opcode()).collect::<Vec<_>>(),
        vec!["call", "ptrcast", "selector", "store", "store", "br"]
    );
    let selector = Value::Inst(func.blocks[pad.0 as usize].insts[2]);
    let exception = Value::Inst(func.blocks[pad.0 as usize].insts[0]);
    assert_eq!(
        insts[3],
        &Inst::Store {
            value: selector,
            slot: selector_slot
        }
    );
    assert_eq!(
        insts[4],
        &Inst::Store {
            value: exception,
            slot: object_slot
        }
    );
    assert!(matches!(insts[2], Inst::Selector { clauses: None, .. }));
    assert_eq!(func.successors(pad), vec![next]);
}

#[test]
fn test_missing_exception_intrinsic() {
    init_logging();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    // No runtime declarations at all.
    let mut builder = IrBuilder::with_module(&session, Module::new(&session, "bare"));
    let mut ctx = Context::new(&mut builder, &session);

    ctx.begin_function("f").unwrap();
    let root = ctx.current_frame().unwrap();
    let next = ctx.builder().create_block("next").unwrap();

    let err = ctx.get_landing_pad(root, next, None).unwrap_err();
    assert_eq!(
        err,
        CompileError::MissingIntrinsic {
            name: runtime::EXCEPTION_INTRINSIC.to_string()
        }
    );
    assert!(err.is_internal());
    assert_eq!(ctx.frame(root).cached_landing_pad(), None);
    assert_eq!(session.stats().landing_pads_built, 0);
}

#[test]
fn test_unwind_block_reuses_cached_pad() {
    init_logging();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let mut builder = IrBuilder::new(&session, "pads");
    let mut ctx = Context::new(&mut builder, &session);

    ctx.begin_function("f").unwrap();
    ctx.declare_variable("a", "release_a").unwrap();
    assert!(ctx.unwind_required());

    let first = ctx.unwind_block().unwrap();
    let second = ctx.unwind_block().unwrap();
    assert_eq!(first, second);
    assert_eq!(session.stats().landing_pads_built, 1);
    assert_eq!(session.stats().unwind_blocks_built, 1);
}
