// SPDX-License-Identifier: Apache-2.0

//! Generated operators checked by random simulation of their lowered gates.

use num_bigint::BigUint;
use test_case::test_case;

use xlsynth_bitheap::adders::AdderMapping;
use xlsynth_bitheap::operators::{
    MultiAdderConfig, MultiplierConfig, int_multi_adder, int_multiplier,
};
use xlsynth_bitheap::{BitHeapOptions, Fabric};

fn fabric(name: &str) -> Fabric {
    Fabric::from_preset(name).unwrap()
}

#[test_case("virtex6", 8, 8, None, false; "full 8x8 logic")]
#[test_case("stratixv", 8, 8, None, false; "full 8x8 logic on ternary fabric")]
#[test_case("virtex6", 8, 8, Some(8), false; "truncated 8x8")]
#[test_case("virtex6", 13, 5, Some(10), false; "truncated asymmetric")]
#[test_case("virtex6", 48, 34, None, true; "dsp supertile chains")]
#[test_case("virtex6", 48, 40, Some(40), true; "truncated dsp")]
#[test_case("stratixv", 30, 30, None, true; "stratix dsp with logic remainder")]
fn multiplier_matches_reference(
    preset: &str,
    width_x: usize,
    width_y: usize,
    output_width: Option<usize>,
    use_dsp: bool,
) {
    let _ = env_logger::try_init();
    let config = MultiplierConfig {
        width_x,
        width_y,
        output_width,
        use_dsp,
    };
    let mut op = int_multiplier(0, &config, fabric(preset), BitHeapOptions::default()).unwrap();
    op.heap.run_compression().unwrap();
    let mismatch = op
        .check_random_samples(AdderMapping::RippleCarry, 24, 0xbeef)
        .unwrap();
    assert!(mismatch.is_none(), "{}: {}", op.name, mismatch.unwrap());
}

#[test]
fn dsp_tiles_are_chained_into_a_supertile() {
    let config = MultiplierConfig {
        width_x: 20,
        width_y: 36,
        output_width: None,
        use_dsp: true,
    };
    let mut op = int_multiplier(2, &config, Fabric::virtex6(), BitHeapOptions::default()).unwrap();
    // A 24-bit x block does not fit in 20 bits.
    assert_eq!(op.heap.tiles().len(), 0);

    let config = MultiplierConfig {
        width_x: 24,
        width_y: 34,
        output_width: None,
        use_dsp: true,
    };
    op = int_multiplier(2, &config, Fabric::virtex6(), BitHeapOptions::default()).unwrap();
    assert_eq!(op.heap.tiles().len(), 2);
    op.heap.run_compression().unwrap();
    let tiles = op.heap.tiles();
    assert_eq!(tiles[0].next(), Some(1));
    assert_eq!(tiles[1].prev(), Some(0));
    assert_eq!(op.heap.stats().tiles, 2);
    assert!(
        op.check_random_samples(AdderMapping::BrentKung, 24, 3)
            .unwrap()
            .is_none()
    );
}

#[test_case(8, 5, false, false)]
#[test_case(8, 5, false, true)]
#[test_case(6, 9, true, false)]
#[test_case(6, 9, true, true)]
#[test_case(1, 17, false, false)]
#[test_case(16, 2, true, true)]
fn multi_adder_matches_reference(width: usize, count: usize, signed: bool, subtract_last: bool) {
    let _ = env_logger::try_init();
    let config = MultiAdderConfig {
        width,
        count,
        signed,
        subtract_last,
    };
    for preset in ["virtex6", "stratixv"] {
        let mut op = int_multi_adder(0, &config, fabric(preset), BitHeapOptions::default())
            .unwrap();
        op.heap.run_compression().unwrap();
        let mismatch = op
            .check_random_samples(AdderMapping::KoggeStone, 32, 7)
            .unwrap();
        assert!(mismatch.is_none(), "{} on {}: {}", op.name, preset, mismatch.unwrap());
    }
}

#[test]
fn truncated_output_is_taken_above_guard_bits() {
    let config = MultiplierConfig {
        width_x: 6,
        width_y: 6,
        output_width: Some(6),
        use_dsp: false,
    };
    let op = int_multiplier(0, &config, Fabric::virtex6(), BitHeapOptions::default()).unwrap();
    assert_eq!(op.output_lsb, 4);
    let result = BigUint::from(0b1_0110_1010u32);
    assert_eq!(op.output_from_result(&result), BigUint::from(0b1_0110u32));
    // 63 * 63 = 3969 = 0b111110000001; the top six bits are 62, rounding may
    // give 63.
    let inputs = [BigUint::from(63u32), BigUint::from(63u32)];
    assert!(op.accepts(&inputs, &BigUint::from(62u32)));
    assert!(op.accepts(&inputs, &BigUint::from(63u32)));
    assert!(!op.accepts(&inputs, &BigUint::from(61u32)));
}
