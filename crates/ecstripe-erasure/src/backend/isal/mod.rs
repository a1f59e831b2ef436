//! Intel ISA-L backend (x86/x86_64, `isal` feature)
//!
//! `erasure-isa-l` builds ISA-L from its bundled sources, which needs nasm
//! and the autotools at build time. Chunk sizes may be odd.

mod backend;

pub use backend::IsalBackend;

/// Whether ISA-L was compiled into this build
pub const fn is_available() -> bool {
    cfg!(feature = "isal")
}
