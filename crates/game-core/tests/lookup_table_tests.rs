use game_core::lookup_table::{MoveTable, RowEntry, as_table, fill};
use game_core::row::{pack_row, reverse_row, row_can_move_left, unpack_row};

/// Straightforward slide-and-merge written against plain tile values.
fn reference_left(row: u16) -> (u16, u32) {
    let values: Vec<u32> = unpack_row(row)
        .into_iter()
        .filter(|&e| e != 0)
        .map(|e| 1u32 << e)
        .collect();

    let mut merged = Vec::with_capacity(4);
    let mut score = 0;
    let mut i = 0;
    while i < values.len() {
        if i + 1 < values.len() && values[i] == values[i + 1] && values[i] < 1 << 15 {
            merged.push(values[i] * 2);
            score += values[i] * 2;
            i += 2;
        } else {
            merged.push(values[i]);
            i += 1;
        }
    }

    let mut cells = [0u8; 4];
    for (cell, value) in cells.iter_mut().zip(merged) {
        *cell = value.trailing_zeros() as u8;
    }
    (pack_row(cells), score)
}

#[test]
fn test_table_matches_reference_for_every_row() {
    let table = MoveTable::build();
    for row in 0..=u16::MAX {
        let (result, score) = reference_left(row);
        assert_eq!(table.get(row), RowEntry::new(result, score), "row {row:#06x}");
    }
}

#[test]
fn test_can_move_agrees_with_table() {
    let table = MoveTable::build();
    for row in 0..=u16::MAX {
        assert_eq!(row_can_move_left(row), table.get(row).result != row, "row {row:#06x}");
        let reversed = reverse_row(row);
        assert_eq!(
            row_can_move_left(reversed),
            table.get(reversed).result != reversed,
            "row {row:#06x}"
        );
    }
}

#[test]
fn test_fill_in_place_matches_owned_table() {
    let owned = MoveTable::build();
    let mut entries = vec![RowEntry::default(); 1 << 16];
    fill(&mut entries);
    let view = as_table(&entries).unwrap();
    assert_eq!(&view[..], &owned.table()[..]);
}
