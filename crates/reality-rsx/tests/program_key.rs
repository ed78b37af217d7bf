use std::collections::HashMap;

use pretty_assertions::assert_eq;
use reality_rsx::program::isa::vp;
use reality_rsx::{analyse_vertex_program, FragmentProgram, FragmentTextureState, VertexProgram};

const SLOTS: usize = 512;

fn nop() -> [u32; 4] {
    [0; 4]
}

fn end(mut slot: [u32; 4]) -> [u32; 4] {
    slot[3] |= 1;
    slot
}

fn bri(target: u32, cond: u32) -> [u32; 4] {
    let mut slot = [0, vp::SCA_OPCODE_BRI << 27, 0, 0];
    slot[0] |= cond << 10;
    slot[0] |= ((target >> 9) & 0x1) << 28;
    slot[2] |= (target >> 3) & 0x3F;
    slot[3] |= (target & 0x7) << 29;
    slot
}

fn upload(slots: &[(u32, [u32; 4])]) -> Vec<u32> {
    let mut data = vec![0u32; SLOTS * 4];
    for &(slot, words) in slots {
        let at = slot as usize * 4;
        data[at..at + 4].copy_from_slice(&words);
    }
    data
}

fn analyse(data: &[u32], entry: u32) -> VertexProgram {
    let mut prog = VertexProgram::default();
    analyse_vertex_program(data, entry, &mut prog).expect("analysis");
    prog
}

/// The same three-slot program (conditional branch over a nop to the end)
/// uploaded at `base`.
fn relocatable_program(base: u32) -> Vec<u32> {
    upload(&[
        (base, bri(base + 2, 0)),
        (base + 1, nop()),
        (base + 2, end(nop())),
    ])
}

#[test]
fn relocated_uploads_extract_to_identical_programs() {
    let a = analyse(&relocatable_program(0), 0);
    let b = analyse(&relocatable_program(100), 100);

    assert_eq!(a.base_address, 0);
    assert_eq!(b.base_address, 100);
    assert_eq!(a.data, b.data);
    assert_eq!(a.jump_table, b.jump_table);
    assert_eq!(a.ucode_hash(), b.ucode_hash());
    assert_eq!(a.key_hash(), b.key_hash());
    assert!(a == b);
}

#[test]
fn dead_slot_contents_do_not_affect_identity() {
    // A static branch over slots 1..4; their contents never reach the
    // extraction.
    let build = |fill: u32| {
        upload(&[
            (0, bri(5, 0x7)),
            (1, [fill; 4]),
            (2, [fill; 4]),
            (3, [fill; 4]),
            (4, [fill; 4]),
            (5, end(nop())),
        ])
    };

    let a = analyse(&build(0xDEAD_BEEF), 0);
    let b = analyse(&build(0x0BAD_F00D), 0);

    assert_eq!(a.data, b.data);
    assert_eq!(a.key_hash(), b.key_hash());
    assert!(a == b);
}

#[test]
fn equal_vertex_programs_hash_equal() {
    let a = analyse(&relocatable_program(4), 4);
    let b = analyse(&relocatable_program(4), 4);
    assert!(a == b);
    assert_eq!(a.key_hash(), b.key_hash());
    assert_eq!(a.key_hash(), a.key_hash());
}

#[test]
fn render_state_participates_in_the_vertex_key() {
    let base = analyse(&relocatable_program(0), 0);

    let mut output_mask = base.clone();
    output_mask.output_mask = 0x0000_FFFF;
    assert!(base != output_mask);
    assert_ne!(base.key_hash(), output_mask.key_hash());

    let mut dims = base.clone();
    dims.texture_state.texture_dimensions = 0x5;
    assert!(base != dims);
    assert_ne!(base.key_hash(), dims.key_hash());
}

#[test]
fn jump_table_differences_break_equality() {
    let base = analyse(&relocatable_program(0), 0);
    let mut tampered = base.clone();
    tampered.jump_table.insert(1);
    assert!(base != tampered);
}

#[test]
fn live_instruction_differences_break_equality() {
    let a = analyse(&relocatable_program(0), 0);
    let mut data = relocatable_program(0);
    data[4] = 0x0000_0001; // w0 of the live nop at slot 1
    let b = analyse(&data, 0);
    assert!(a != b);
    assert_ne!(a.ucode_hash(), b.ucode_hash());
}

#[test]
fn vertex_programs_key_a_hash_map() {
    let mut cache: HashMap<VertexProgram, &'static str> = HashMap::new();
    cache.insert(analyse(&relocatable_program(0), 0), "compiled");

    // The same program uploaded elsewhere hits the same entry.
    let relocated = analyse(&relocatable_program(200), 200);
    assert_eq!(cache.get(&relocated), Some(&"compiled"));
}

// Fragment program helpers build the word stream directly; the key walks
// operate on the analysed copy, which starts at the first real instruction.

fn fp_inst(opcode: u32) -> [u32; 4] {
    [opcode << 16, 0, 0, 0]
}

fn fp_end(mut slot: [u32; 4]) -> [u32; 4] {
    slot[0] |= 1 << 8;
    slot
}

fn fp_const_src0(mut slot: [u32; 4]) -> [u32; 4] {
    slot[1] |= 2 << 8;
    slot
}

fn fp_words(slots: &[[u32; 4]]) -> Vec<u32> {
    slots.iter().flatten().copied().collect()
}

fn fragment(data: Vec<u32>) -> FragmentProgram {
    FragmentProgram {
        data,
        ctrl: 0x40,
        two_sided_lighting: false,
        texture_state: FragmentTextureState::default(),
        texcoord_control_mask: 0,
    }
}

#[test]
fn identical_fragment_streams_compare_and_hash_equal() {
    let words = fp_words(&[fp_inst(0x01), fp_end(fp_inst(0x02))]);
    let a = fragment(words.clone());
    let b = fragment(words);
    assert!(a == b);
    assert_eq!(a.key_hash(), b.key_hash());
    assert_eq!(a.ucode_hash(), b.ucode_hash());
}

#[test]
fn embedded_constant_values_are_not_identity() {
    // Constant literals are patched at draw time; two uploads that differ
    // only in literal values translate to the same shader.
    let with_payload = |payload: [u32; 4]| {
        fragment(fp_words(&[
            fp_const_src0(fp_inst(0x01)),
            payload,
            fp_end(fp_inst(0x02)),
        ]))
    };
    let a = with_payload([0x3F80_0000, 0, 0, 0]);
    let b = with_payload([0x4000_0000, 0x4040_0000, 0, 1]);

    assert!(a == b);
    assert_eq!(a.ucode_hash(), b.ucode_hash());
    assert_eq!(a.key_hash(), b.key_hash());
}

#[test]
fn instruction_differences_are_identity() {
    let a = fragment(fp_words(&[fp_inst(0x01), fp_end(fp_inst(0x02))]));
    let b = fragment(fp_words(&[fp_inst(0x03), fp_end(fp_inst(0x02))]));
    assert!(a != b);
    assert_ne!(a.ucode_hash(), b.ucode_hash());
}

#[test]
fn stream_length_differences_break_equality() {
    let a = fragment(fp_words(&[fp_end(fp_inst(0x01))]));
    let b = fragment(fp_words(&[fp_inst(0x01), fp_end(fp_inst(0x01))]));
    assert!(a != b);
}

#[test]
fn render_state_participates_in_the_fragment_key() {
    let words = fp_words(&[fp_end(fp_inst(0x01))]);
    let base = fragment(words);

    let mut ctrl = base.clone();
    ctrl.ctrl ^= 0x2;
    assert!(base != ctrl);
    assert_ne!(base.key_hash(), ctrl.key_hash());

    let mut two_sided = base.clone();
    two_sided.two_sided_lighting = true;
    assert!(base != two_sided);
    assert_ne!(base.key_hash(), two_sided.key_hash());

    let mut shadow = base.clone();
    shadow.texture_state.shadow_textures = 1 << 4;
    assert!(base != shadow);
    assert_ne!(base.key_hash(), shadow.key_hash());

    let mut redirected = base.clone();
    redirected.texture_state.redirected_textures = 1 << 2;
    assert!(base != redirected);
    assert_ne!(base.key_hash(), redirected.key_hash());

    let mut texcoord = base.clone();
    texcoord.texcoord_control_mask = 0x100;
    assert!(base != texcoord);
    assert_ne!(base.key_hash(), texcoord.key_hash());
}

#[test]
fn fragment_programs_key_a_hash_map() {
    let words = fp_words(&[fp_inst(0x01), fp_end(fp_inst(0x02))]);
    let mut cache: HashMap<FragmentProgram, &'static str> = HashMap::new();
    cache.insert(fragment(words.clone()), "compiled");
    assert_eq!(cache.get(&fragment(words)), Some(&"compiled"));
}
