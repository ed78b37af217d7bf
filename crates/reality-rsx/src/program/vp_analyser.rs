//! Vertex program microcode analysis.
//!
//! Vertex programs are uploaded into a 512-slot instruction RAM at arbitrary
//! addresses and may branch within it. The analyser performs a reachability
//! walk from the entry slot, following calls and static jumps and merging the
//! targets of conditional branches, then extracts the live span into a
//! position-independent copy with every branch target rebased to the span's
//! first slot. The live mask, not the span, defines the program's identity:
//! slots the walk never reached are emitted as zeroes and ignored by the
//! cache key.

use std::collections::BTreeSet;
use std::fs;

use thiserror::Error;
use tracing::{error, warn};

use crate::config;
use crate::limits::{MAX_VERTEX_PROGRAM_SLOTS, SLOT_BYTES, SLOT_WORDS};
use crate::program::isa::{vp, Instruction};
use crate::program::{InstructionMask, VertexProgram};

const NUM_SLOTS: u32 = MAX_VERTEX_PROGRAM_SLOTS as u32;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VertexAnalyserError {
    /// The source must cover the whole instruction RAM; the walk may touch
    /// any slot a 10-bit branch target can reach within it.
    #[error("vertex program source holds {words} words, need {needed}")]
    SourceTooSmall { words: usize, needed: usize },
    /// A walk stepped or branched past the instruction RAM.
    #[error("vertex program walk left the instruction window at slot {slot:#x}")]
    WalkOutOfBounds { slot: u32 },
    /// A program without branch instructions must begin at its entry slot;
    /// anything else means the walk and the upload disagree about where the
    /// program starts.
    #[error("branchless vertex program spans from slot {base:#x} but enters at {entry:#x}")]
    EntryOutsideSpan { base: u32, entry: u32 },
}

/// Facts gathered during the walk, in upload coordinates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VertexProgramMetadata {
    /// Slots reached by the walk.
    pub instruction_mask: InstructionMask,
    /// Byte length of the extracted span, dead slots included.
    pub ucode_length: u32,
    /// Bit per vertex texture unit sampled by the program.
    pub referenced_textures_mask: u16,
    /// Bit per input attribute read by the program. Bit 0 (the position
    /// stream) is always set, else nothing could render.
    pub referenced_inputs_mask: u16,
}

struct Walk<'a> {
    data: &'a [u32],
    live: InstructionMask,
    /// Slots whose encoded branch target must be rebased on emission.
    to_patch: InstructionMask,
    /// Lowest and highest slot known to belong to the program.
    range: (u32, u32),
    has_branch_instruction: bool,
    call_stack: Vec<u32>,
    referenced_textures_mask: u16,
    referenced_inputs_mask: u16,
}

fn walk(ctx: &mut Walk<'_>, start: u32, fast_exit: bool) -> Result<(), VertexAnalyserError> {
    let mut cur = start;
    let mut conditional_targets = BTreeSet::new();
    let mut reported_loop = false;

    loop {
        if cur >= NUM_SLOTS {
            return Err(VertexAnalyserError::WalkOutOfBounds { slot: cur });
        }

        if ctx.live.test(cur) {
            if fast_exit {
                // Merging a conditional target into an already-walked block.
                break;
            }
            // Re-entry on the main walk. Can be harmless if a dangling RET
            // fell through earlier, so skip ahead looking for an end marker
            // rather than giving up.
            if !reported_loop {
                error!(slot = cur, "vp_analyser: possible infinite loop detected");
                reported_loop = true;
            }
            cur += 1;
            continue;
        }

        let base = cur as usize * SLOT_WORDS;
        let inst = Instruction::from_words(&ctx.data[base..base + SLOT_WORDS]);

        ctx.live.set(cur);
        ctx.range.0 = ctx.range.0.min(cur);
        ctx.range.1 = ctx.range.1.max(cur);

        // Whether this instruction can read an input attribute.
        let mut test_input_read = false;

        // Vector pipe side effects, before flow analysis.
        if vp::vec_opcode(inst.w1()) == vp::VEC_OPCODE_TXL {
            ctx.referenced_textures_mask |= 1 << vp::tex_num(inst.w2());
        } else {
            test_input_read = vp::input_src(inst.w1()) != 0;
        }

        let sca_opcode = vp::sca_opcode(inst.w1());
        match sca_opcode {
            vp::SCA_OPCODE_BRI
            | vp::SCA_OPCODE_BRB
            | vp::SCA_OPCODE_CAL
            | vp::SCA_OPCODE_CLI
            | vp::SCA_OPCODE_CLB => {
                let static_jump =
                    sca_opcode == vp::SCA_OPCODE_BRI && vp::cond(inst.w0()) == 0x7;
                let function_call = matches!(
                    sca_opcode,
                    vp::SCA_OPCODE_CAL | vp::SCA_OPCODE_CLI | vp::SCA_OPCODE_CLB
                );

                // The encoded target is absolute; it has to be rebased when
                // the program is emitted.
                ctx.to_patch.set(cur);
                ctx.has_branch_instruction = true;

                let jump_address = vp::branch_target(inst.w0(), inst.w2(), inst.w3());

                if function_call {
                    ctx.call_stack.push(cur + 1);
                    cur = jump_address;
                    continue;
                }
                if static_jump {
                    // Blocks between here and the target are skipped; they are
                    // only reachable as conditional targets of earlier slots.
                    cur = jump_address;
                    continue;
                }

                // Conditional: note the target as a possible end of the span
                // and keep walking sequentially.
                conditional_targets.insert(jump_address);
                ctx.range.1 = ctx.range.1.max(jump_address);
            }
            vp::SCA_OPCODE_RET => {
                if let Some(return_slot) = ctx.call_stack.pop() {
                    cur = return_slot;
                    continue;
                }
                error!(slot = cur, "vp_analyser: RET found outside subroutine call");
            }
            _ => {
                test_input_read = vp::input_src(inst.w1()) != 0;
            }
        }

        if test_input_read {
            // The register-type tag sits in the low 2 bits of each source
            // operand field.
            let sources = vp::src0l(inst.w2()) | vp::src1(inst.w2()) | vp::src2l(inst.w3());
            if sources & vp::REGISTER_TYPE_INPUT != 0 {
                ctx.referenced_inputs_mask |= 1 << vp::input_src(inst.w1());
            }
        }

        if (vp::is_last(inst.w3()) && (fast_exit || cur >= ctx.range.1))
            || cur + 1 == NUM_SLOTS
        {
            break;
        }

        cur += 1;
    }

    // Merge every block a conditional branch could reach. These walks only
    // extend the live set; they stop at the first already-walked slot.
    for target in conditional_targets {
        if !ctx.live.test(target) {
            walk(ctx, target, true)?;
        }
    }

    Ok(())
}

/// Walk a vertex program from `entry`, populate `dst` with the extracted
/// position-independent copy, and return the walk metadata.
///
/// `data` is the guest's view of the instruction RAM and must cover all of
/// it. The walk itself is read-only; `dst` is overwritten except for the
/// render-state fields (`output_mask`, `texture_state`), which the caller
/// owns.
pub fn analyse_vertex_program(
    data: &[u32],
    entry: u32,
    dst: &mut VertexProgram,
) -> Result<VertexProgramMetadata, VertexAnalyserError> {
    let needed = MAX_VERTEX_PROGRAM_SLOTS * SLOT_WORDS;
    if data.len() < needed {
        return Err(VertexAnalyserError::SourceTooSmall {
            words: data.len(),
            needed,
        });
    }

    if config::get().debug_program_analyser {
        dump_analyser_input(data, entry);
    }

    let mut ctx = Walk {
        data,
        live: InstructionMask::default(),
        to_patch: InstructionMask::default(),
        range: (u32::MAX, 0),
        has_branch_instruction: false,
        call_stack: Vec::new(),
        referenced_textures_mask: 0,
        referenced_inputs_mask: 0,
    };

    walk(&mut ctx, entry, false)?;

    let (first, last) = ctx.range;
    let instruction_count = last - first + 1;

    dst.base_address = first;
    dst.entry = entry;
    dst.instruction_mask = ctx.live.shr(first);
    dst.data.clear();
    dst.jump_table.clear();

    if !ctx.has_branch_instruction {
        if first != entry {
            return Err(VertexAnalyserError::EntryOutsideSpan { base: first, entry });
        }
        let begin = first as usize * SLOT_WORDS;
        dst.data
            .extend_from_slice(&data[begin..begin + instruction_count as usize * SLOT_WORDS]);
    } else {
        dst.data.resize(instruction_count as usize * SLOT_WORDS, 0);

        for (count, slot) in (first..=last).enumerate() {
            if !ctx.live.test(slot) {
                // Unreached slot inside the span: left as zeroes.
                continue;
            }

            let src = slot as usize * SLOT_WORDS;
            let emitted = &mut dst.data[count * SLOT_WORDS..(count + 1) * SLOT_WORDS];
            emitted.copy_from_slice(&data[src..src + SLOT_WORDS]);

            if ctx.to_patch.test(slot) {
                let target = vp::branch_target(emitted[0], emitted[2], emitted[3]) - first;
                vp::patch_branch_target(emitted, target);
                dst.jump_table.insert(target);
            }
        }

        for &target in &dst.jump_table {
            if !dst.instruction_mask.test(target) {
                error!(
                    target,
                    "vp_analyser: branch target was not resolved during extraction"
                );
            }
        }
    }

    Ok(VertexProgramMetadata {
        instruction_mask: ctx.live,
        ucode_length: instruction_count * SLOT_BYTES as u32,
        referenced_textures_mask: ctx.referenced_textures_mask,
        // The position stream is always enabled.
        referenced_inputs_mask: ctx.referenced_inputs_mask | 1,
    })
}

/// Dump the raw analyser input (entry slot plus the whole instruction window)
/// for offline debugging. A failed write is reported and otherwise ignored.
fn dump_analyser_input(data: &[u32], entry: u32) {
    let dir = config::get().cache_dir.join("shaderlog");
    let path = dir.join("vp_analyser.bin");

    let window = MAX_VERTEX_PROGRAM_SLOTS * SLOT_WORDS;
    let mut payload = Vec::with_capacity(4 + window * 4);
    payload.extend_from_slice(&entry.to_le_bytes());
    payload.extend_from_slice(bytemuck::cast_slice(&data[..window]));

    if let Err(err) = fs::create_dir_all(&dir).and_then(|()| fs::write(&path, &payload)) {
        warn!(
            path = %path.display(),
            error = %err,
            "vp_analyser: failed to write input dump"
        );
    }
}
