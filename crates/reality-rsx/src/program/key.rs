//! Program cache identity.
//!
//! The compiled-shader cache is keyed on a content hash plus a structural
//! equality check over the analysed program and the render state baked into
//! its translation. The two are defined together here so they cannot drift:
//! equality ignores dead vertex slots, relocation, and embedded fragment
//! constants, and the hash ignores exactly the same things.
//!
//! The hash is 64-bit FNV-1a with an extra shift-add fold after each 64-bit
//! half. The fold is not part of standard FNV; it is a frozen contract with
//! shader caches already on disk and must be reproduced exactly.

use std::hash::{Hash, Hasher};

use crate::limits::SLOT_WORDS;
use crate::program::isa::{fp, Instruction};
use crate::program::{FragmentProgram, VertexProgram};

const FNV1A_OFFSET_BASIS: u64 = 0xCBF2_9CE4_8422_2325;

fn mix(hash: u64, half: u64) -> u64 {
    let h = hash ^ half;
    h.wrapping_add(
        (h << 1)
            .wrapping_add(h << 4)
            .wrapping_add(h << 5)
            .wrapping_add(h << 7)
            .wrapping_add(h << 8)
            .wrapping_add(h << 40),
    )
}

impl VertexProgram {
    /// Hash of the live instructions alone. Dead slots and the original
    /// upload address do not participate, so relocated extractions of the
    /// same program collide as required.
    pub fn ucode_hash(&self) -> u64 {
        let mut hash = FNV1A_OFFSET_BASIS;
        for (slot, words) in self.data.chunks_exact(SLOT_WORDS).enumerate() {
            if !self.instruction_mask.test(slot as u32) {
                continue;
            }
            let inst = Instruction::from_words(words);
            hash = mix(hash, inst.lo());
            hash = mix(hash, inst.hi());
        }
        hash
    }

    /// Full cache-key hash: live ucode plus the render state that changes
    /// what the translator emits.
    pub fn key_hash(&self) -> u64 {
        self.ucode_hash()
            ^ u64::from(self.output_mask)
            ^ u64::from(self.texture_state.texture_dimensions)
    }
}

impl PartialEq for VertexProgram {
    fn eq(&self, other: &Self) -> bool {
        if self.output_mask != other.output_mask
            || self.texture_state != other.texture_state
            || self.data.len() != other.data.len()
            || self.jump_table != other.jump_table
        {
            return false;
        }

        let slots = self
            .data
            .chunks_exact(SLOT_WORDS)
            .zip(other.data.chunks_exact(SLOT_WORDS));
        for (slot, (a, b)) in slots.enumerate() {
            let live = self.instruction_mask.test(slot as u32);
            if live != other.instruction_mask.test(slot as u32) {
                return false;
            }
            if live && a != b {
                return false;
            }
        }

        true
    }
}

impl Eq for VertexProgram {}

impl Hash for VertexProgram {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.key_hash());
    }
}

impl FragmentProgram {
    /// Hash of the instruction stream through the end marker. Embedded
    /// constant slots are stepped over without being mixed in; their values
    /// are patched at draw time and do not change the generated shader.
    pub fn ucode_hash(&self) -> u64 {
        let mut hash = FNV1A_OFFSET_BASIS;
        let mut slots = self.data.chunks_exact(SLOT_WORDS);
        while let Some(words) = slots.next() {
            let inst = Instruction::from_words(words);
            hash = mix(hash, inst.lo());
            hash = mix(hash, inst.hi());

            if fp::is_constant(inst.w1())
                || fp::is_constant(inst.w2())
                || fp::is_constant(inst.w3())
            {
                slots.next();
            }

            if fp::is_last(inst.w0()) {
                break;
            }
        }
        hash
    }

    /// Full cache-key hash.
    pub fn key_hash(&self) -> u64 {
        self.ucode_hash()
            ^ u64::from(self.ctrl)
            ^ u64::from(self.two_sided_lighting)
            ^ u64::from(self.texture_state.texture_dimensions)
            ^ u64::from(self.texture_state.shadow_textures)
            ^ u64::from(self.texture_state.redirected_textures)
            ^ u64::from(self.texcoord_control_mask)
    }
}

impl PartialEq for FragmentProgram {
    fn eq(&self, other: &Self) -> bool {
        if self.ctrl != other.ctrl
            || self.texture_state != other.texture_state
            || self.texcoord_control_mask != other.texcoord_control_mask
            || self.two_sided_lighting != other.two_sided_lighting
        {
            return false;
        }

        // Lockstep walk over both streams. Stream structure (where constant
        // slots sit) is driven by the first stream; the byte comparison has
        // already proven the second agrees up to this point.
        let mut a = self.data.chunks_exact(SLOT_WORDS);
        let mut b = other.data.chunks_exact(SLOT_WORDS);
        loop {
            let (wa, wb) = match (a.next(), b.next()) {
                (Some(wa), Some(wb)) => (wa, wb),
                // One stream ended before the joint end marker; terminated
                // programs of equal content never get here.
                _ => return false,
            };

            let ia = Instruction::from_words(wa);
            let ib = Instruction::from_words(wb);
            if ia != ib {
                return false;
            }

            if fp::is_constant(ia.w1()) || fp::is_constant(ia.w2()) || fp::is_constant(ia.w3()) {
                a.next();
                b.next();
            }

            if fp::is_last(ia.w0()) && fp::is_last(ib.w0()) {
                return true;
            }
        }
    }
}

impl Eq for FragmentProgram {}

impl Hash for FragmentProgram {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.key_hash());
    }
}
