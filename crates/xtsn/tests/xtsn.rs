use aes::cipher::generic_array::GenericArray;
use aes::cipher::KeyInit;
use aes::Aes128;
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use xts_mode::Xts128;

use xtsn::{Backend, Direction, Error, SectorOffset, SectorParams, Xtsn};

fn random_keys(rng: &mut ChaCha20Rng) -> ([u8; 16], [u8; 16]) {
    let mut crypt = [0u8; 16];
    let mut tweak = [0u8; 16];
    rng.fill_bytes(&mut crypt);
    rng.fill_bytes(&mut tweak);
    (crypt, tweak)
}

fn random_bytes(rng: &mut ChaCha20Rng, len: usize) -> Vec<u8> {
    let mut data = vec![0u8; len];
    rng.fill_bytes(&mut data);
    data
}

/// Reference XTS over whole sectors with a big-endian tweak.
fn reference_encrypt(
    crypt: &[u8; 16],
    tweak: &[u8; 16],
    data: &[u8],
    sector_size: usize,
    first: u128,
) -> Vec<u8> {
    let xts = Xts128::<Aes128>::new(
        Aes128::new(GenericArray::from_slice(crypt)),
        Aes128::new(GenericArray::from_slice(tweak)),
    );
    let mut buf = data.to_vec();
    xts.encrypt_area(&mut buf, sector_size, first, |sector: u128| sector.to_be_bytes());
    buf
}

fn software(
    xtsn: &Xtsn,
    direction: Direction,
    data: &[u8],
    sector: impl Into<SectorOffset>,
    params: SectorParams,
) -> Vec<u8> {
    xtsn.crypt(&Backend::Software, direction, data, sector, params).unwrap()
}

#[test]
fn ieee_1619_vector_1() {
    let xtsn = Xtsn::new(&[0u8; 16], &[0u8; 16]).unwrap();
    let out = software(&xtsn, Direction::Encrypt, &[0u8; 32], 0u64, SectorParams::default());
    assert_eq!(
        hex::encode(&out),
        "917cf69ebd68b2ec9b9fe9a3eadda692cd43d2f59598ed858c02c2652fbf922e"
    );
    assert_eq!(
        software(&xtsn, Direction::Decrypt, &out, 0u64, SectorParams::default()),
        vec![0u8; 32]
    );
}

#[test]
fn matches_reference_xts_with_big_endian_tweak() {
    let mut rng = ChaCha20Rng::from_seed([11u8; 32]);
    let firsts: [u128; 5] = [
        0,
        1,
        0x1234_5678,
        u128::from(u64::MAX) - 1,
        (7u128 << 64) | 0xffff_ffff_ffff_fff0,
    ];
    for &sector_size in &[0x10usize, 0x200, 0x4000] {
        for &first in &firsts {
            let (crypt, tweak) = random_keys(&mut rng);
            let xtsn = Xtsn::from_keys(&crypt, &tweak);
            let data = random_bytes(&mut rng, sector_size * 3);

            let expected = reference_encrypt(&crypt, &tweak, &data, sector_size, first);
            let params = SectorParams::new(sector_size as u64);
            let sealed = software(&xtsn, Direction::Encrypt, &data, first, params);
            assert_eq!(sealed, expected, "sector size {sector_size:#x}, first {first:#x}");
            assert_eq!(software(&xtsn, Direction::Decrypt, &sealed, first, params), data);
        }
    }
}

#[test]
fn round_trips_across_lengths_skips_and_offsets() {
    let mut rng = ChaCha20Rng::from_seed([12u8; 32]);
    let (crypt, tweak) = random_keys(&mut rng);
    let xtsn = Xtsn::from_keys(&crypt, &tweak);
    let offsets = [
        SectorOffset::ZERO,
        SectorOffset::from_lanes(5, 0),
        SectorOffset::from_lanes(u64::MAX, 0),
        SectorOffset::from_lanes(u64::MAX - 1, 3),
        SectorOffset::from_lanes(u64::MAX, u64::MAX),
    ];

    for &len in &[0usize, 16, 32, 512, 4112] {
        for &skip in &[0u64, 16, 496, 1040] {
            for &offset in &offsets {
                let data = random_bytes(&mut rng, len);
                let params = SectorParams::default().with_skip(skip);
                let sealed = software(&xtsn, Direction::Encrypt, &data, offset, params);
                assert_eq!(sealed.len(), len);
                if len > 0 {
                    assert_ne!(sealed, data);
                }
                let opened = software(&xtsn, Direction::Decrypt, &sealed, offset, params);
                assert_eq!(opened, data, "len {len}, skip {skip}, offset {offset}");
            }
        }
    }
}

#[test]
fn skip_bytes_addresses_the_middle_of_an_image() {
    let mut rng = ChaCha20Rng::from_seed([13u8; 32]);
    let (crypt, tweak) = random_keys(&mut rng);
    let xtsn = Xtsn::from_keys(&crypt, &tweak);
    let sector_size = 0x200u64;
    let image = random_bytes(&mut rng, 0x1000);
    let params = SectorParams::new(sector_size);
    let sealed = software(&xtsn, Direction::Encrypt, &image, 0x40u64, params);

    for _ in 0..32 {
        let start = rng.gen_range(0..image.len() / 16) * 16;
        let end = rng.gen_range(start / 16 + 1..=image.len() / 16) * 16;
        let params = params.with_skip(start as u64);
        let part = software(&xtsn, Direction::Decrypt, &sealed[start..end], 0x40u64, params);
        assert_eq!(part, &image[start..end], "range {start:#x}..{end:#x}");

        let resealed = software(&xtsn, Direction::Encrypt, &image[start..end], 0x40u64, params);
        assert_eq!(resealed, &sealed[start..end]);
    }
}

#[test]
fn partial_sector_decrypt_agrees_with_full_sector() {
    let xtsn = Xtsn::from_keys(&[0x2b; 16], &[0x7e; 16]);
    let plain: Vec<u8> = (0..512u32).map(|i| i as u8).collect();
    let sealed = software(&xtsn, Direction::Encrypt, &plain, 0x99u64, SectorParams::default());

    let tail = software(
        &xtsn,
        Direction::Decrypt,
        &sealed[128..],
        0x99u64,
        SectorParams::default().with_skip(128),
    );
    assert_eq!(tail, &plain[128..]);
}

#[test]
fn low_lane_overflow_carries_into_high_lane() {
    let xtsn = Xtsn::from_keys(&[1; 16], &[2; 16]);
    let data = vec![0u8; 1024];
    let params = SectorParams::default();

    let last_low = SectorOffset::from_lanes(u64::MAX, 0);
    let first_high = SectorOffset::from_lanes(0, 1);

    let spanning = software(&xtsn, Direction::Encrypt, &data, last_low, params);
    let second = software(&xtsn, Direction::Encrypt, &data[512..], first_high, params);
    assert_eq!(&spanning[512..], &second[..]);

    let wrapped = software(&xtsn, Direction::Encrypt, &data[512..], SectorOffset::ZERO, params);
    assert_ne!(second, wrapped);
}

#[test]
fn tweak_depends_on_sector_index() {
    let xtsn = Xtsn::from_keys(&[3; 16], &[4; 16]);
    let data = [0u8; 16];
    let a = software(&xtsn, Direction::Encrypt, &data, 0u64, SectorParams::default());
    let b = software(&xtsn, Direction::Encrypt, &data, 1u64, SectorParams::default());
    let c = software(&xtsn, Direction::Encrypt, &data, 1u128 << 64, SectorParams::default());
    assert_ne!(a, b);
    assert_ne!(b, c);
    assert_ne!(a, c);
}

#[test]
fn process_backend_agrees_with_software() {
    let mut rng = ChaCha20Rng::from_seed([14u8; 32]);
    let (crypt, tweak) = random_keys(&mut rng);
    let xtsn = Xtsn::from_keys(&crypt, &tweak);
    let data = random_bytes(&mut rng, 0x4000 + 0x30);
    let params = SectorParams::new(0x4000).with_skip(0x3fd0);

    let sealed = xtsn.encrypt(&data, 0x1234u64, params).unwrap();
    assert_eq!(sealed, software(&xtsn, Direction::Encrypt, &data, 0x1234u64, params));
    assert_eq!(xtsn.decrypt(&sealed, 0x1234u64, params).unwrap(), data);
}

#[test]
fn validation_errors_do_not_depend_on_backend() {
    let xtsn = Xtsn::from_keys(&[5; 16], &[6; 16]);
    let err = xtsn
        .encrypt(&[0u8; 24], 0u64, SectorParams::default())
        .unwrap_err();
    assert!(matches!(err, Error::MisalignedLength(24)));
    assert_eq!(err.to_string(), "buffer length 24 is not divisible by 16");

    let err = xtsn
        .decrypt(&[0u8; 32], 0u64, SectorParams::new(0x208))
        .unwrap_err();
    assert!(matches!(err, Error::MisalignedSectorSize(0x208)));

    assert!(xtsn.decrypt(&[], 0u64, SectorParams::new(0)).unwrap().is_empty());
}
