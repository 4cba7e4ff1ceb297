//! Runs a tiny made-up program through the recorder: `f` raises, `g`
//! catches and re-raises, nothing handles it, and the runtime prints the
//! trace before exiting.
//!
//! Pass parameters in `STASHTRACE_PARAMS`, e.g. `slots=3`.

use std::path::PathBuf;
use std::sync::Arc;

use stashtrace::debuginfo::{write, CodeUnit, DebugEvent, EventFlags, SourcePos};
use stashtrace::walk::{FrameDescr, TRAMPOLINE_FRAME};
use stashtrace::{
    entry, print, Backend, CodeFragments, Config, DebugInfoTable, ExecutionContext, ExnId, Fiber,
    FrameTable, NativeWalker, RaisePoint,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const BYTECODE_BASE: usize = 0x1000;
const NATIVE_BASE: usize = 0x8000;
const TRAMPOLINE: usize = 0xf000;

fn event(offset: usize, defname: &str, line: u32, flags: EventFlags) -> DebugEvent {
    DebugEvent {
        offset,
        defname: Arc::from(defname),
        pos: Some(SourcePos {
            file: Arc::from("demo.ml"),
            line,
            start_char: 2,
            end_char: 20,
        }),
        flags,
    }
}

fn debug_info() -> Vec<CodeUnit> {
    vec![
        CodeUnit {
            name: "Demo".into(),
            backend: Backend::Interpreted,
            base: BYTECODE_BASE,
            size: 0x1000,
            events: vec![
                event(0x10, "Demo.f", 3, EventFlags::RAISE),
                event(0x30, "Demo.g", 8, EventFlags::empty()),
                event(0x40, "Demo.g", 10, EventFlags::RAISE),
                event(0x50, "Demo.main", 14, EventFlags::empty()),
                event(0x70, "Demo", 20, EventFlags::empty()),
            ]
            .into(),
        },
        CodeUnit {
            name: "Demo_native".into(),
            backend: Backend::Compiled,
            base: NATIVE_BASE,
            size: 0x1000,
            events: vec![
                event(0x10, "Demo_native.make", 4, EventFlags::empty()),
                event(0x20, "Demo_native.make_all", 9, EventFlags::INLINED),
            ]
            .into(),
        },
    ]
}

fn main() -> std::io::Result<()> {
    let registry = tracing_subscriber::Registry::default().with(
        EnvFilter::builder()
            .with_default_directive(tracing::Level::INFO.into())
            .from_env()
            .unwrap(),
    );

    let tree_layer = tracing_tree::HierarchicalLayer::new(2)
        .with_targets(true)
        .with_bracketed_fields(true);

    registry.with(tree_layer).init();

    let mut config = Config::from_env();
    config.record_backtraces = true;
    let path = match &config.debug_info_path {
        Some(path) => path.clone(),
        None => {
            let path: PathBuf =
                std::env::temp_dir().join(format!("stashtrace-demo-{}.dbg", std::process::id()));
            write::write_file(&path, &debug_info())?;
            config.debug_info_path = Some(path.clone());
            path
        }
    };
    let status = entry::init_debug_info(&config);
    tracing::info!(?status, path = %path.display(), "debug info");

    interpreted(&config);
    native(&config);

    Ok(())
}

fn interpreted(config: &Config) {
    let mut ctx = ExecutionContext::with_config(Backend::Interpreted, config);
    let mut code = CodeFragments::new();
    code.register(BYTECODE_BASE..BYTECODE_BASE + 0x1000);

    // f's caller g at word 1, g's caller main at word 3, the toplevel at 5
    let words = [0, 0x1030, 0, 0x1050, 0, 0x1070];
    let fiber = Fiber::new(words, 0x1010, 0);
    let exn = Box::new("Not_found");
    let id = ExnId::of(&*exn);

    let raise = RaisePoint { pc: 0x1010, sp: 0, trap_sp: Some(2) };
    entry::stash_backtrace(&mut ctx, id, &code, &fiber, raise, false);
    let reraise = RaisePoint { pc: 0x1040, sp: 2, trap_sp: None };
    entry::stash_backtrace(&mut ctx, id, &code, &fiber, reraise, true);

    eprintln!("Fatal error: exception {exn}");
    entry::print_exception_backtrace(&ctx);
}

fn native(config: &Config) {
    let ctx = ExecutionContext::with_config(Backend::Compiled, config);
    let frames = FrameTable::new(vec![
        FrameDescr { retaddr: 0x8010, frame_size: 2 },
        FrameDescr { retaddr: 0x8020, frame_size: 1 },
        FrameDescr { retaddr: TRAMPOLINE, frame_size: TRAMPOLINE_FRAME },
    ]);
    let fiber = Fiber::new([0, 0x8020, TRAMPOLINE], 0x8010, 0);

    let walker = NativeWalker::for_snapshot(&frames, &fiber);
    let backtrace = ctx.snapshot_callstack(walker, config.max_slots, Some(0));
    let mut out = String::new();
    if print::write_backtrace(&mut out, &backtrace, DebugInfoTable::global()).is_ok() {
        println!("allocation profile sample:\n{out}");
    }
}
