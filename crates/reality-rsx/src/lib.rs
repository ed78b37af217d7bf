//! RSX shader microcode analysis and program cache identity.
//!
//! Guest software uploads raw 128-bit-instruction shader binaries to the GPU.
//! Before anything can be translated, the runtime has to know exactly which
//! instructions make up the program, what external state it touches, and how
//! to recognize the same program again. This crate answers those questions:
//! it walks vertex programs to their live instruction set and extracts them
//! in position-independent form, linearly scans fragment programs to their
//! end marker, and derives the content hash / equality pair the
//! compiled-shader cache is keyed on.
//!
//! The crate is self-contained so it can be used both by the emulator and by
//! host-side test harnesses.

pub mod config;
pub mod limits;
pub mod program;

pub use program::{
    analyse_fragment_program, analyse_vertex_program, fragment_program_ucode_size,
    FragmentAnalyserError, FragmentProgram, FragmentProgramMetadata, FragmentTextureState,
    InstructionMask, VertexAnalyserError, VertexProgram, VertexProgramMetadata,
    VertexTextureState,
};
