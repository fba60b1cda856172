//! Single-block AES-128 encryption and decryption.

use crate::block::Block;
use crate::round::{
    add_round_key, inv_mix_columns, inv_shift_rows, inv_sub_bytes, mix_columns, shift_rows,
    sub_bytes,
};
use crate::schedule::RoundKeySchedule;

/// Encrypts one block in place.
pub fn encrypt_in_place(state: &mut Block, schedule: &RoundKeySchedule) {
    add_round_key(state, schedule.round_key(0));
    for round in 1..10 {
        sub_bytes(state);
        shift_rows(state);
        mix_columns(state);
        add_round_key(state, schedule.round_key(round));
    }
    sub_bytes(state);
    shift_rows(state);
    add_round_key(state, schedule.round_key(10));
}

/// Decrypts one block in place.
pub fn decrypt_in_place(state: &mut Block, schedule: &RoundKeySchedule) {
    add_round_key(state, schedule.round_key(10));
    for round in (1..10).rev() {
        inv_shift_rows(state);
        inv_sub_bytes(state);
        add_round_key(state, schedule.round_key(round));
        inv_mix_columns(state);
    }
    inv_shift_rows(state);
    inv_sub_bytes(state);
    add_round_key(state, schedule.round_key(0));
}

/// Encrypts a copy of `block`.
pub fn encrypt_block(block: &Block, schedule: &RoundKeySchedule) -> Block {
    let mut state = *block;
    encrypt_in_place(&mut state, schedule);
    state
}

/// Decrypts a copy of `block`.
pub fn decrypt_block(block: &Block, schedule: &RoundKeySchedule) -> Block {
    let mut state = *block;
    decrypt_in_place(&mut state, schedule);
    state
}
