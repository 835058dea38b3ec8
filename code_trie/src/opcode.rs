//! The small slice of EVM opcode knowledge chunking needs: which opcodes carry
//! immediate data, and how much.

/// `PUSH1`, the first opcode carrying immediate data.
pub const PUSH1: u8 = 0x60;
/// `PUSH32`, the last opcode carrying immediate data.
pub const PUSH32: u8 = 0x7f;

/// Returns `true` if `op` is one of `PUSH1..=PUSH32`.
pub const fn is_push(op: u8) -> bool {
    op >= PUSH1 && op <= PUSH32
}

/// Number of immediate bytes following `op`.
///
/// Every opcode other than a `PUSH` has no immediate, so this is `0` for
/// them and `1..=32` for `PUSH1..=PUSH32`.
pub const fn immediate_size(op: u8) -> usize {
    match is_push(op) {
        true => (op - PUSH1) as usize + 1,
        false => 0,
    }
}
