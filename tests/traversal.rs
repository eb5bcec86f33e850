#![allow(missing_docs)]

//! End-to-end traversal behavior over synthetic table images.

use std::collections::HashSet;
use std::sync::Arc;

use proptest::prelude::*;
use tabulens::fixture::{TableImageBuilder, XorMaskedPointers};
use tabulens::group::occupied_byte;
use tabulens::{
    DisplayKey, DisplayRecord, InspectError, InspectOptions, Inspector, LayoutDescriptor,
    MemoryImage, PointerHandle, Role, TypeKey, U64Decoder, U64PairDecoder,
};

/// Splits a traversal's output into element values and placeholder reasons.
fn collect(records: impl Iterator<Item = DisplayRecord>) -> (Vec<String>, Vec<String>) {
    let mut values = Vec::new();
    let mut placeholders = Vec::new();
    for record in records {
        match record {
            DisplayRecord::Element { value, .. } => values.push(value),
            DisplayRecord::Placeholder { reason } => placeholders.push(reason),
        }
    }
    (values, placeholders)
}

fn value_set(values: &[String]) -> HashSet<String> {
    values.iter().cloned().collect()
}

#[test]
fn scalar_set_traversal_yields_exactly_the_built_elements() {
    // Scatter elements across slots so physical order differs from value order.
    let (image, table) = TableImageBuilder::new(LayoutDescriptor::new(Role::Set).scalar(), 8)
        .place(3, 300u64.to_le_bytes().to_vec())
        .place(0, 100u64.to_le_bytes().to_vec())
        .place(11, 500u64.to_le_bytes().to_vec())
        .place(7, 200u64.to_le_bytes().to_vec())
        .build();
    let inspector = Inspector::new(image);
    let (values, placeholders) = collect(inspector.traverse(&table, &U64Decoder).unwrap());
    assert!(placeholders.is_empty());
    assert_eq!(values.len(), 4, "each element exactly once");
    assert_eq!(
        value_set(&values),
        HashSet::from(["100".into(), "200".into(), "300".into(), "500".into()])
    );
}

#[test]
fn vectorized_and_scalar_layouts_emit_equal_sets() {
    let elements: Vec<u64> = (0..37).map(|i| i * 7 + 1).collect();
    let mut emitted = Vec::new();
    for scalar in [false, true] {
        let mut descriptor = LayoutDescriptor::new(Role::Set);
        if scalar {
            descriptor = descriptor.scalar();
        }
        let mut builder = TableImageBuilder::new(descriptor, 8);
        for &v in &elements {
            builder = builder.push_u64(v);
        }
        let (image, table) = builder.build();
        let inspector = Inspector::new(image);
        let (values, placeholders) = collect(inspector.traverse(&table, &U64Decoder).unwrap());
        assert!(placeholders.is_empty());
        emitted.push(value_set(&values));
    }
    assert_eq!(emitted[0], emitted[1]);
}

#[test]
fn group_boundary_elements_emit_once_each() {
    let (image, table) = TableImageBuilder::new(LayoutDescriptor::new(Role::Set), 8)
        .place(14, 111u64.to_le_bytes().to_vec()) // last slot of group 0
        .place(15, 222u64.to_le_bytes().to_vec()) // first slot of group 1
        .build();
    assert_eq!(table.group_count, 2);
    let inspector = Inspector::new(image);
    let (values, placeholders) = collect(inspector.traverse(&table, &U64Decoder).unwrap());
    assert!(placeholders.is_empty());
    // Physical order: group 0 before group 1.
    assert_eq!(values, vec!["111".to_string(), "222".to_string()]);
}

#[test]
fn zero_groups_traverses_to_nothing_without_error() {
    let (image, table) = TableImageBuilder::new(LayoutDescriptor::new(Role::Set), 8).build();
    assert_eq!(table.group_count, 0);
    let inspector = Inspector::new(image);
    let mut traversal = inspector.traverse(&table, &U64Decoder).unwrap();
    assert!(traversal.next().is_none());
    assert!(traversal.next().is_none(), "exhaustion is idempotent");
    assert_eq!(traversal.emitted(), 0);
}

#[test]
fn sentinel_trailer_ends_traversal_cleanly() {
    let (image, table) = TableImageBuilder::new(LayoutDescriptor::new(Role::Set), 8)
        .push_u64(1)
        .push_u64(2)
        .sentinel_trailer()
        .build();
    assert_eq!(table.group_count, 2);
    let inspector = Inspector::new(image);
    let (values, placeholders) = collect(inspector.traverse(&table, &U64Decoder).unwrap());
    assert_eq!(values.len(), 2);
    assert!(placeholders.is_empty(), "a sentinel group is not an error");
}

#[test]
fn partial_sentinel_group_truncates_with_placeholder() {
    let (mut image, table) = TableImageBuilder::new(LayoutDescriptor::new(Role::Set), 8)
        .push_u64(10)
        .push_u64(20)
        .build();
    let PointerHandle::Raw(groups_addr) = &table.groups else {
        panic!("fixture defaults to raw pointers");
    };
    // Corrupt slot 5's metadata into the vectorized sentinel value while
    // live slots remain: a partially-sentinel group.
    image.put(*groups_addr + 5, &[0x01]);
    let inspector = Inspector::new(image);
    let (values, placeholders) = collect(inspector.traverse(&table, &U64Decoder).unwrap());
    assert!(values.is_empty());
    assert_eq!(placeholders.len(), 1);
    assert!(placeholders[0].contains("truncated"), "{placeholders:?}");
}

#[test]
fn unreadable_element_keeps_partial_output_and_marks_truncation() {
    let base = 0x1000u64;
    let mut image = MemoryImage::new(base, Vec::new());
    // One group, slots 0 and 1 occupied.
    let mut block = [0u8; 16];
    block[0] = occupied_byte(0);
    block[1] = occupied_byte(1);
    image.put(base, &block);
    // Only the first element is mapped; slot 1's element lies past the end.
    image.put(base + 16, &77u64.to_le_bytes());

    let table = tabulens::TableHandle {
        descriptor: LayoutDescriptor::new(Role::Set),
        groups: PointerHandle::Raw(base),
        elements: PointerHandle::Raw(base + 16),
        group_count: 1,
        element_size: 8,
        stats: None,
    };
    let inspector = Inspector::new(image);
    let (values, placeholders) = collect(inspector.traverse(&table, &U64Decoder).unwrap());
    assert_eq!(values, vec!["77".to_string()]);
    assert_eq!(placeholders.len(), 1);
    assert!(placeholders[0].contains("inaccessible memory"), "{placeholders:?}");
}

#[test]
fn unregistered_opaque_table_aborts_with_zero_output() {
    let (image, table) = TableImageBuilder::new(LayoutDescriptor::new(Role::Set), 8)
        .push_u64(1)
        .opaque(TypeKey::new("segmented_ptr"), 0x1111_0000)
        .build();
    let inspector = Inspector::new(image);
    let err = inspector
        .traverse(&table, &U64Decoder)
        .map(|_| ())
        .expect_err("traversal must not start");
    match err {
        InspectError::UnsupportedPointerKind(ty) => assert_eq!(ty, "segmented_ptr"),
        other => panic!("expected UnsupportedPointerKind, got {other:?}"),
    }
}

#[test]
fn registered_opaque_table_traverses_like_a_raw_one() {
    let key = TypeKey::new("segmented_ptr");
    let mask = 0xDEAD_BEEF_0000_1111;
    let (image, table) = TableImageBuilder::new(LayoutDescriptor::new(Role::Set), 8)
        .push_u64(5)
        .push_u64(6)
        .opaque(key.clone(), mask)
        .build();
    let inspector = Inspector::new(image);
    inspector
        .registry()
        .register(key.clone(), Arc::new(XorMaskedPointers::new(key, mask)));
    let (values, placeholders) = collect(inspector.traverse(&table, &U64Decoder).unwrap());
    assert!(placeholders.is_empty());
    assert_eq!(value_set(&values), HashSet::from(["5".into(), "6".into()]));
}

#[test]
fn map_role_keys_records_by_key_text() {
    let (image, table) = TableImageBuilder::new(LayoutDescriptor::new(Role::Map), 16)
        .push_pair(7, 70)
        .push_pair(8, 80)
        .build();
    let inspector = Inspector::new(image);
    let records: Vec<DisplayRecord> = inspector
        .traverse(&table, &U64PairDecoder)
        .unwrap()
        .collect();
    assert_eq!(
        records[0],
        DisplayRecord::Element {
            key: DisplayKey::Text("7".into()),
            value: "70".into()
        }
    );
    assert_eq!(
        records[1],
        DisplayRecord::Element {
            key: DisplayKey::Text("8".into()),
            value: "80".into()
        }
    );
}

#[test]
fn element_limit_truncates_with_a_labeled_placeholder() {
    let mut builder = TableImageBuilder::new(LayoutDescriptor::new(Role::Set), 8);
    for i in 0..30 {
        builder = builder.push_u64(i);
    }
    let (image, table) = builder.build();
    let inspector = Inspector::with_options(
        image,
        InspectOptions {
            element_limit: Some(10),
            ..Default::default()
        },
    );
    let (values, placeholders) = collect(inspector.traverse(&table, &U64Decoder).unwrap());
    assert_eq!(values.len(), 10);
    assert_eq!(placeholders.len(), 1);
    assert!(placeholders[0].contains("capped"), "{placeholders:?}");
}

#[test]
fn traversal_is_reinvocable_from_scratch() {
    let (image, table) = TableImageBuilder::new(LayoutDescriptor::new(Role::Set), 8)
        .push_u64(1)
        .push_u64(2)
        .push_u64(3)
        .build();
    let inspector = Inspector::new(image);

    // Abandon a traversal mid-stream; already-produced output stays valid.
    let mut first = inspector.traverse(&table, &U64Decoder).unwrap();
    let head = first.next().unwrap();
    assert!(matches!(head, DisplayRecord::Element { .. }));
    drop(first);

    let (values, _) = collect(inspector.traverse(&table, &U64Decoder).unwrap());
    assert_eq!(values.len(), 3);
}

#[test]
fn seeded_stress_recovers_large_sparse_tables() {
    use rand::{Rng, SeedableRng};
    let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(0xBADC_0FFE);
    for _ in 0..8 {
        let mut builder = TableImageBuilder::new(LayoutDescriptor::new(Role::Set), 8)
            .group_count(64)
            .sentinel_trailer();
        let mut expected = HashSet::new();
        for _ in 0..rng.gen_range(50..400) {
            let slot = rng.gen_range(0usize..64 * 15);
            let value: u64 = rng.gen();
            builder = builder.place(slot, value.to_le_bytes().to_vec());
            expected.retain(|(s, _): &(usize, u64)| *s != slot);
            expected.insert((slot, value));
        }
        let (image, table) = builder.build();
        let inspector = Inspector::new(image);
        let (values, placeholders) = collect(inspector.traverse(&table, &U64Decoder).unwrap());
        assert!(placeholders.is_empty());
        let want: HashSet<String> = expected.iter().map(|(_, v)| v.to_string()).collect();
        assert_eq!(value_set(&values), want);
        assert_eq!(values.len(), expected.len());
    }
}

proptest! {
    // Whatever slots elements land in, and in either metadata encoding,
    // traversal recovers exactly the built set, each element once.
    #[test]
    fn traversal_recovers_arbitrary_placements(
        slots in proptest::collection::hash_set(0usize..60, 0..30),
        scalar in any::<bool>(),
    ) {
        let mut descriptor = LayoutDescriptor::new(Role::Set);
        if scalar {
            descriptor = descriptor.scalar();
        }
        let mut builder = TableImageBuilder::new(descriptor, 8);
        let mut expected = HashSet::new();
        for &slot in &slots {
            let value = slot as u64 * 1000 + 1;
            builder = builder.place(slot, value.to_le_bytes().to_vec());
            expected.insert(value.to_string());
        }
        let (image, table) = builder.build();
        let inspector = Inspector::new(image);
        let (values, placeholders) = collect(inspector.traverse(&table, &U64Decoder).unwrap());
        prop_assert!(placeholders.is_empty());
        prop_assert_eq!(values.len(), slots.len());
        prop_assert_eq!(value_set(&values), expected);
    }
}
