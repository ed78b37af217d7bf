//! Centralized limits for RSX microcode analysis.
//!
//! Guest-uploaded microcode is untrusted input. Every walk the analyser
//! performs is bounded by the values below; they are fixed by the hardware,
//! not tunable.

/// Number of 128-bit instruction slots in the vertex program instruction RAM.
///
/// Branch targets are 10-bit slot indices, but the hardware only implements
/// 512 slots and uploads address into a window of exactly this size. Any walk
/// that reaches a slot at or beyond this limit is a structural fault.
pub const MAX_VERTEX_PROGRAM_SLOTS: usize = 512;

/// 32-bit words per instruction slot.
pub const SLOT_WORDS: usize = 4;

/// Bytes per instruction slot.
pub const SLOT_BYTES: usize = 16;
