//! Fragment program microcode analysis.
//!
//! A fragment program's length is self-describing: the walk ends at the first
//! instruction carrying the end marker. There is no control-flow analysis
//! here; branch instructions are flagged for the translator and otherwise
//! treated as opaque, since the end marker fences the program even across
//! taken jumps.

use thiserror::Error;

use crate::limits::SLOT_BYTES;
use crate::program::isa::{fp, Instruction};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FragmentAnalyserError {
    /// The stream ran out before any instruction carried the end marker.
    /// The hardware contract requires uploaded programs to be terminated.
    #[error("no end marker within {scanned} bytes of fragment program ucode")]
    MissingEndMarker { scanned: usize },
}

/// Everything the runtime needs to know about a fragment program before
/// decoding it in full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentProgramMetadata {
    /// Bytes from the upload base to the first real opcode.
    pub program_start_offset: u32,
    /// Bytes of ucode from the start offset through the end marker, embedded
    /// constant slots included.
    pub program_ucode_length: u32,
    /// Bytes of embedded constant data.
    pub program_constants_buffer_length: u32,
    pub referenced_textures_mask: u16,
    pub has_branch_instructions: bool,
    pub has_pack_instructions: bool,
    /// The program carried the end marker before its first real opcode.
    pub is_nop_shader: bool,
}

/// Walk a fragment program and collect its metadata.
///
/// The walk is linear: each slot is either an instruction or, following a
/// constant-referencing instruction, a 128-bit literal that must be stepped
/// over. Branch-marked slots contribute only the branch flag.
pub fn analyse_fragment_program(
    data: &[u8],
) -> Result<FragmentProgramMetadata, FragmentAnalyserError> {
    let mut result = FragmentProgramMetadata {
        program_start_offset: u32::MAX,
        program_ucode_length: 0,
        program_constants_buffer_length: 0,
        referenced_textures_mask: 0,
        has_branch_instructions: false,
        has_pack_instructions: false,
        is_nop_shader: false,
    };

    let mut index = 0usize;
    loop {
        let Some(bytes) = data.get(index * SLOT_BYTES..(index + 1) * SLOT_BYTES) else {
            return Err(FragmentAnalyserError::MissingEndMarker {
                scanned: data.len(),
            });
        };
        let inst = Instruction::from_le_bytes(bytes);

        if fp::is_branch(inst.w2()) {
            // Jump targets are not chased; programs that branch are flagged
            // and left to the translator.
            result.has_branch_instructions = true;
        } else {
            let opcode = fp::opcode(inst.w0());
            if opcode != 0 {
                if result.program_start_offset == u32::MAX {
                    result.program_start_offset = (index * SLOT_BYTES) as u32;
                }

                if fp::is_texture_op(opcode) {
                    result.referenced_textures_mask |= 1 << fp::tex_num(inst.w0());
                } else if fp::is_pack_op(opcode) {
                    result.has_pack_instructions = true;
                }
            }

            if fp::is_constant(inst.w1())
                || fp::is_constant(inst.w2())
                || fp::is_constant(inst.w3())
            {
                // The next slot holds the literal, not an instruction.
                index += 1;
                result.program_ucode_length += SLOT_BYTES as u32;
                result.program_constants_buffer_length += SLOT_BYTES as u32;
            }
        }

        if result.program_start_offset != u32::MAX {
            result.program_ucode_length += SLOT_BYTES as u32;
        }

        if fp::is_last(inst.w0()) {
            if result.program_start_offset == u32::MAX {
                // Nothing but NOP slots up to the end marker.
                result.program_start_offset = (index * SLOT_BYTES) as u32;
                result.program_ucode_length = SLOT_BYTES as u32;
                result.is_nop_shader = true;
            }

            break;
        }

        index += 1;
    }

    Ok(result)
}

/// Measure a fragment program without collecting metadata.
///
/// Follows the same end-marker and constant-slot rules as the full analysis
/// and returns the byte length of the walked stream, constant slots included.
pub fn fragment_program_ucode_size(data: &[u8]) -> Result<usize, FragmentAnalyserError> {
    let mut index = 0usize;
    loop {
        let Some(bytes) = data.get(index * SLOT_BYTES..(index + 1) * SLOT_BYTES) else {
            return Err(FragmentAnalyserError::MissingEndMarker {
                scanned: data.len(),
            });
        };
        let inst = Instruction::from_le_bytes(bytes);

        let references_constant = fp::is_constant(inst.w1())
            || fp::is_constant(inst.w2())
            || fp::is_constant(inst.w3());

        index += if references_constant { 2 } else { 1 };

        if fp::is_last(inst.w0()) {
            return Ok(index * SLOT_BYTES);
        }
    }
}
