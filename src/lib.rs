//! Exception backtrace recording for a managed-language runtime with two
//! execution engines: a bytecode interpreter and compiled native code.
//!
//! At every raise the runtime calls into [`entry`], which walks the live
//! frames of the raising context and stashes their code addresses in the
//! context's [`ExecutionContext`]. Re-raises of the exception in flight extend
//! that trace. Call stacks can also be captured on demand, optionally starting
//! at an allocation point. Traces are turned into source locations with the
//! program's debug info ([`DebugInfoTable`]) only when someone looks at them.

#[macro_use]
extern crate tracing;

mod stdext;

pub mod buffer;
pub mod config;
pub mod context;
pub mod debuginfo;
pub mod decode;
pub mod entry;
pub mod print;
pub mod slot;
pub mod walk;

#[cfg(test)]
mod testing;

pub use buffer::{GrowError, SlotBuffer, BACKTRACE_BUFFER_SIZE};
pub use config::Config;
pub use context::{ExecutionContext, PhysicalIdentity, ReraisePolicy};
pub use debuginfo::{DebugInfoStatus, DebugInfoTable};
pub use decode::{DecodedFrame, Decoder, FrameFlags};
pub use slot::{Backend, BackendMismatch, ExnId, RawBacktrace, Slot};
pub use walk::{BytecodeWalker, CodeFragments, Fiber, FrameTable, FrameWalker, NativeWalker, RaisePoint};
