// SPDX-License-Identifier: Apache-2.0

//! Random heaps: whatever the compression does, the lowered circuit must
//! compute the sum of the bits and constants that went in, modulo
//! `2^max_weight`.

use bitvec::vec::BitVec;
use num_bigint::{BigInt, BigUint};
use num_traits::{One, Zero};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use test_case::test_case;

use xlsynth_bitheap::adders::AdderMapping;
use xlsynth_bitheap::aig::gate_sim::{self, Collect, biguint_from_bits};
use xlsynth_bitheap::lower::lower_to_gate_fn;
use xlsynth_bitheap::{
    BitExpr, BitHeap, BitHeapOptions, BitType, CompressionStrategy, Fabric, TimingOracle,
    WrapUpStrategy,
};

/// How one random bit is derived from the input bus.
#[derive(Debug, Clone, Copy)]
enum Source {
    Plain(usize),
    Negated(usize),
    Product(usize, usize),
}

impl Source {
    fn expr(&self, bus: xlsynth_bitheap::BusId) -> BitExpr {
        match *self {
            Source::Plain(i) => BitExpr::input(bus, i),
            Source::Negated(i) => BitExpr::input(bus, i).negated(),
            Source::Product(i, j) => BitExpr::and(BitExpr::input(bus, i), BitExpr::input(bus, j)),
        }
    }

    fn value(&self, x: &BitVec) -> bool {
        match *self {
            Source::Plain(i) => x[i],
            Source::Negated(i) => !x[i],
            Source::Product(i, j) => x[i] && x[j],
        }
    }
}

struct RandomHeap {
    heap: BitHeap,
    bits: Vec<(usize, Source)>,
    constant: BigInt,
    input_width: usize,
}

fn random_heap(
    rng: &mut Xoshiro256PlusPlus,
    fabric: Fabric,
    options: BitHeapOptions,
    max_weight: usize,
    bit_count: usize,
) -> RandomHeap {
    let input_width = 16;
    let mut heap = BitHeap::new(7, max_weight, Box::new(fabric), options);
    let bus = heap.declare_input("x", input_width);
    let mut bits = Vec::new();
    // Bits arrive over a few cycles so that stages actually wait on them.
    let period = heap.oracle().cycle_period();
    for _ in 0..bit_count {
        let weight = rng.gen_range(0..max_weight + 2);
        let i = rng.gen_range(0..input_width);
        let source = match rng.gen_range(0..3) {
            0 => Source::Plain(i),
            1 => Source::Negated(i),
            _ => Source::Product(i, rng.gen_range(0..input_width)),
        };
        let cycle = rng.gen_range(0..3);
        heap.clock_mut().set_cycle(cycle);
        heap.clock_mut()
            .set_critical_path(period * rng.gen_range(0.0..0.9));
        let added = heap
            .add_bit(weight as i64, source.expr(bus), None, BitType::External)
            .unwrap();
        assert_eq!(added.is_some(), weight < max_weight);
        if added.is_some() {
            bits.push((weight, source));
        }
    }
    let mut constant = BigInt::zero();
    for _ in 0..3 {
        let weight = rng.gen_range(0..max_weight);
        let value: i64 = rng.gen_range(-20..20);
        heap.add_constant(weight as i64, value).unwrap();
        constant += BigInt::from(value) << weight;
    }
    RandomHeap {
        heap,
        bits,
        constant,
        input_width,
    }
}

fn expected_sum(random: &RandomHeap, x: &BitVec) -> BigUint {
    let modulus = BigInt::one() << random.heap.max_weight();
    let mut sum = random.constant.clone();
    for (weight, source) in &random.bits {
        if source.value(x) {
            sum += BigInt::one() << *weight;
        }
    }
    let mut sum = sum % &modulus;
    if sum < BigInt::zero() {
        sum += &modulus;
    }
    sum.to_biguint().unwrap()
}

fn check_random_heaps(fabric: Fabric, options: BitHeapOptions, seed: u64) {
    let _ = env_logger::try_init();
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    for round in 0..6 {
        let max_weight = rng.gen_range(4..14);
        let bit_count = rng.gen_range(10..80);
        let mut random = random_heap(&mut rng, fabric.clone(), options.clone(), max_weight, bit_count);
        random.heap.run_compression().unwrap();
        assert_eq!(random.heap.max_height(), 0, "round {}", round);
        let gate_fn =
            lower_to_gate_fn(&random.heap, "random", AdderMapping::KoggeStone).unwrap();
        for _ in 0..16 {
            let x: BitVec = (0..random.input_width).map(|_| rng.r#gen::<bool>()).collect();
            let got = gate_sim::eval(&gate_fn, &[x.clone()], Collect::None);
            assert_eq!(
                biguint_from_bits(&got.outputs[0]),
                expected_sum(&random, &x),
                "round {} max weight {} bits {}",
                round,
                max_weight,
                bit_count
            );
        }
    }
}

#[test_case(0; "seed 0")]
#[test_case(1; "seed 1")]
#[test_case(2; "seed 2")]
fn random_heaps_on_virtex6(seed: u64) {
    check_random_heaps(Fabric::virtex6(), BitHeapOptions::default(), seed);
}

#[test_case(3; "seed 3")]
#[test_case(4; "seed 4")]
fn random_heaps_on_stratix_v(seed: u64) {
    check_random_heaps(Fabric::stratix_v(), BitHeapOptions::default(), seed);
}

#[test]
fn random_heaps_with_compressor_row_wrap_up() {
    let options = BitHeapOptions {
        wrap_up: WrapUpStrategy::CompressorRow,
        ..BitHeapOptions::default()
    };
    check_random_heaps(Fabric::virtex6(), options, 5);
}

#[test_case(Fabric::virtex6(), 7; "virtex6")]
#[test_case(Fabric::stratix_v(), 8; "stratix v")]
#[test_case(Fabric::virtex6().with_frequency_mhz(900.0), 9; "virtex6 fast clock")]
fn random_heaps_with_parandeh_afshar_strategy(fabric: Fabric, seed: u64) {
    let options = BitHeapOptions {
        strategy: CompressionStrategy::ParandehAfshar,
        ..BitHeapOptions::default()
    };
    check_random_heaps(fabric, options, seed);
}

#[test]
fn random_heaps_without_pipelining() {
    let options = BitHeapOptions {
        pipelined: false,
        ..BitHeapOptions::default()
    };
    check_random_heaps(Fabric::virtex6().with_frequency_mhz(900.0), options, 6);
}

#[test]
fn dense_columns_on_fast_clock() {
    // Tall, uniform columns exercise ternary chains and multi-cycle schedules.
    let _ = env_logger::try_init();
    let planned = BitHeapOptions {
        strategy: CompressionStrategy::ParandehAfshar,
        ..BitHeapOptions::default()
    };
    for (fabric, options) in [
        (Fabric::stratix_v().with_frequency_mhz(700.0), BitHeapOptions::default()),
        (Fabric::virtex6().with_frequency_mhz(700.0), BitHeapOptions::default()),
        (Fabric::virtex6().with_frequency_mhz(700.0), planned),
    ] {
        let mut heap = BitHeap::new(1, 14, Box::new(fabric), options);
        let bus = heap.declare_input("x", 96);
        for i in 0..96 {
            heap.add_bit((i % 8) as i64, BitExpr::input(bus, i), None, BitType::External)
                .unwrap();
        }
        heap.run_compression().unwrap();
        let gate_fn = lower_to_gate_fn(&heap, "dense", AdderMapping::BrentKung).unwrap();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(11);
        for _ in 0..16 {
            let x: BitVec = (0..96).map(|_| rng.r#gen::<bool>()).collect();
            let mut expected = 0u64;
            for i in 0..96 {
                if x[i] {
                    expected += 1 << (i % 8);
                }
            }
            let got = gate_sim::eval(&gate_fn, &[x], Collect::None);
            assert_eq!(
                biguint_from_bits(&got.outputs[0]),
                BigUint::from(expected % (1 << 14))
            );
        }
    }
}
