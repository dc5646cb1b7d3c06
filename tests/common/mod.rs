//! Helpers shared by the integration tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;
use unwindgen::cleanup::{CallCleanup, CleanupAction};
use unwindgen::context::Context;
use unwindgen::core::CompileResult;
use unwindgen::ir::{BlockId, Function, Inst, Module};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Wrap a closure as a cleanup action.
pub fn action<F>(f: F) -> Rc<dyn CleanupAction>
where
    F: Fn(&mut Context<'_, '_>) -> CompileResult<()> + 'static,
{
    Rc::new(f)
}

/// Action that only records its name when emitted.
pub fn logging_action(log: &Rc<RefCell<Vec<&'static str>>>, name: &'static str) -> Rc<dyn CleanupAction> {
    let log = Rc::clone(log);
    action(move |_ctx| {
        log.borrow_mut().push(name);
        Ok(())
    })
}

/// Action calling the release function `name` with no arguments.
pub fn release(ctx: &mut Context<'_, '_>, name: &str) -> Rc<dyn CleanupAction> {
    let callee = ctx.builder().declare_function(name);
    Rc::new(CallCleanup::new(callee, Vec::new(), name))
}

fn callee_name(module: &Module, inst: &Inst) -> Option<String> {
    match inst {
        Inst::Call { callee, .. } | Inst::Invoke { callee, .. } => {
            Some(module.function(*callee).name.to_string())
        }
        _ => None,
    }
}

/// Callees invoked along an unwind chain starting at `block`, following
/// normal edges until `stop` or a resume.
pub fn chain_callees(module: &Module, func: &Function, mut block: BlockId, stop: BlockId) -> Vec<String> {
    let mut names = Vec::new();
    let mut steps = 0;
    while block != stop {
        steps += 1;
        assert!(steps < 100, "unwind chain does not terminate");
        let terminator = func.terminator(block).expect("unterminated block in unwind chain");
        match terminator {
            Inst::Invoke { normal, .. } => {
                names.extend(callee_name(module, terminator));
                block = *normal;
            }
            Inst::Br { target } => block = *target,
            Inst::Resume => break,
            other => panic!("unexpected terminator in unwind chain: {:?}", other),
        }
    }
    names
}

/// Calls and invokes on the normal path from the entry block up to the
/// return, keeping only callees starting with `prefix`.
pub fn normal_path_callees(module: &Module, func: &Function, prefix: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut block = BlockId(0);
    for _ in 0..100 {
        for inst in func.block_insts(block) {
            if let Some(name) = callee_name(module, inst) {
                if name.starts_with(prefix) {
                    names.push(name);
                }
            }
        }
        match func.terminator(block) {
            Some(Inst::Invoke { normal, .. }) => block = *normal,
            Some(Inst::Br { target }) => block = *target,
            Some(Inst::Ret) => return names,
            other => panic!("unexpected terminator on normal path: {:?}", other),
        }
    }
    panic!("normal path does not reach a return");
}

/// Unwind target of the first invoke of `callee`.
pub fn unwind_target(module: &Module, func: &Function, callee: &str) -> BlockId {
    func.insts
        .iter()
        .find_map(|inst| match inst {
            Inst::Invoke { callee: c, unwind, .. } if module.function(*c).name == callee => Some(*unwind),
            _ => None,
        })
        .unwrap_or_else(|| panic!("no invoke of {}", callee))
}
