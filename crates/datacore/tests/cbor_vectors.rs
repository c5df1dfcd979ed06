use datacore::{decode, encode, Data};
use num_bigint::BigInt;
use pretty_assertions::assert_eq;

fn hex_of(d: &Data) -> String {
    hex::encode(encode(d))
}

#[test]
fn enc_small_ints() {
    assert_eq!(hex_of(&Data::int(0)), "00");
    assert_eq!(hex_of(&Data::int(23)), "17");
    assert_eq!(hex_of(&Data::int(42)), "182a");
    assert_eq!(hex_of(&Data::int(-1)), "20");
    assert_eq!(hex_of(&Data::int(-100)), "3863");
}

#[test]
fn enc_u64_boundary_ints() {
    assert_eq!(hex_of(&Data::int(u64::MAX)), "1bffffffffffffffff");

    // 2^64 no longer fits the u64 head and becomes a tagged bignum
    let big = BigInt::from(u64::MAX) + 1;
    assert_eq!(hex_of(&Data::Int(big.clone())), "c249010000000000000000");
    assert_eq!(hex_of(&Data::Int(-big - 1)), "c349010000000000000000");

    // -(2^64) still fits major type 1
    let neg = -(BigInt::from(u64::MAX)) - 1;
    assert_eq!(hex_of(&Data::Int(neg)), "3bffffffffffffffff");
}

#[test]
fn enc_bytes_definite_up_to_64() {
    assert_eq!(hex_of(&Data::bytes(vec![])), "40");
    assert_eq!(
        hex_of(&Data::bytes(vec![0xde, 0xad, 0xbe, 0xef])),
        "44deadbeef"
    );
    let sixty_four = Data::bytes(vec![0xaa; 64]);
    assert_eq!(hex_of(&sixty_four), format!("5840{}", "aa".repeat(64)));
}

#[test]
fn enc_bytes_chunked_past_64() {
    let d = Data::bytes(vec![0xbb; 65]);
    assert_eq!(
        hex_of(&d),
        format!("5f5840{}41bbff", "bb".repeat(64))
    );
    assert_eq!(decode(&encode(&d)).unwrap(), d);
}

#[test]
fn enc_lists_and_maps() {
    assert_eq!(hex_of(&Data::list(vec![])), "80");
    assert_eq!(hex_of(&Data::list(vec![Data::int(1)])), "9f01ff");
    assert_eq!(hex_of(&Data::map(vec![])), "a0");
    assert_eq!(
        hex_of(&Data::map(vec![(Data::int(1), Data::int(10))])),
        "bf010aff"
    );
}

#[test]
fn enc_constr_tag_ranges() {
    assert_eq!(hex_of(&Data::constr(0, vec![])), "d87980");
    assert_eq!(hex_of(&Data::constr(1, vec![Data::int(7)])), "d87a9f07ff");
    assert_eq!(hex_of(&Data::constr(6, vec![])), "d87f80");
    assert_eq!(hex_of(&Data::constr(7, vec![])), "d9050080");
    assert_eq!(hex_of(&Data::constr(127, vec![])), "d9057880");
    assert_eq!(
        hex_of(&Data::constr(128, vec![Data::int(1)])),
        "d8668218809f01ff"
    );
}

#[test]
fn roundtrip_nested_value() {
    let d = Data::constr(
        2,
        vec![
            Data::int(-5),
            Data::map(vec![
                (Data::bytes(vec![0x01]), Data::list(vec![Data::int(9)])),
                (Data::bytes(vec![0x01]), Data::int(0)),
            ]),
            Data::some(Data::bool_(true)),
        ],
    );
    assert_eq!(decode(&encode(&d)).unwrap(), d);
}

#[test]
fn decode_rejects_noncanonical_forms() {
    // definite-length non-empty list
    assert!(decode(&hex::decode("8101").unwrap()).is_err());
    // indefinite empty list
    assert!(decode(&hex::decode("9fff").unwrap()).is_err());
    // bignum that fits the u64 head
    assert!(decode(&hex::decode("c2410a").unwrap()).is_err());
    // trailing garbage
    assert!(decode(&hex::decode("0000").unwrap()).is_err());
}
