use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::opcode::{immediate_size, PUSH1, PUSH32};

pub(crate) fn common_setup() {
    // Try init since multiple tests calling `init` will cause an error.
    let _ = pretty_env_logger::try_init();
}

/// Builds code from `(hex, repetitions)` pieces.
pub(crate) fn concat_hex(pieces: &[(&str, usize)]) -> Vec<u8> {
    pieces
        .iter()
        .flat_map(|(h, n)| hex::decode(h.repeat(*n)).unwrap())
        .collect()
}

/// Generates roughly `len` bytes of well-formed code: every `PUSH` has all of
/// its immediate bytes, and about a quarter of the instructions are `PUSH`es
/// so that chunk boundaries regularly fall inside immediate data.
pub(crate) fn generate_random_code(seed: u64, len: usize) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut code = Vec::with_capacity(len + 32);

    while code.len() < len {
        match rng.gen_bool(0.25) {
            true => {
                let op = rng.gen_range(PUSH1..=PUSH32);
                code.push(op);
                code.extend((0..immediate_size(op)).map(|_| rng.gen::<u8>()));
            }
            false => code.push(rng.gen_range(0x00..PUSH1)),
        }
    }

    code
}
